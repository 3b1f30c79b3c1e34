use async_trait::async_trait;
use futures_util::StreamExt;
use pkg_types::kind::Kind;
use pkg_types::meta::{Labels, selector_string};
use reqwest::{Method, RequestBuilder, Response};
use rustls::ClientConfig;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, connect_async_tls_with_config};
use tracing::debug;

use crate::client::{ExecOutput, ObjectStore, PodExecutor, VersionSource};
use crate::error::StoreError;
use crate::exec::{EXEC_PROTOCOLS, ExecStreams, exec_url};
use crate::tls::client_config;

/// Object-store client speaking the platform's REST API over HTTP.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    tls: Arc<ClientConfig>,
    server: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Value>,
}

impl ApiClient {
    /// Build a client for `server` (e.g. `https://10.0.0.1:6443`).
    /// `ca_pem` is an extra CA bundle to trust; `insecure` skips TLS
    /// certificate verification.
    pub fn new(
        server: &str,
        token: Option<String>,
        ca_pem: Option<&[u8]>,
        insecure: bool,
    ) -> Result<Self, StoreError> {
        let tls = client_config(ca_pem, insecure)?;
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(ClientConfig::clone(&tls))
            .build()?;
        Ok(Self {
            http,
            tls,
            server: server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {}", token))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.server, path);
        debug!("{} {}", method, url);
        let builder = self.http.request(method, &url);
        match self.bearer() {
            Some(bearer) => builder.header("Authorization", bearer),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, target: &str) -> Result<Response, StoreError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(StoreError::from_status(status.as_u16(), target, message))
    }

    async fn send_json(&self, builder: RequestBuilder, target: &str) -> Result<Value, StoreError> {
        let resp = self.send(builder, target).await?;
        Ok(resp.json::<Value>().await?)
    }
}

fn target(kind: Kind, namespace: &str, name: &str) -> String {
    format!("{} {}/{}", kind, namespace, name)
}

#[async_trait]
impl ObjectStore for ApiClient {
    async fn create(&self, kind: Kind, namespace: &str, object: Value) -> Result<Value, StoreError> {
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let builder = self
            .request(Method::POST, &kind.collection_path(namespace))
            .json(&object);
        self.send_json(builder, &target(kind, namespace, &name)).await
    }

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Value, StoreError> {
        let builder = self.request(Method::GET, &kind.object_path(namespace, name));
        self.send_json(builder, &target(kind, namespace, name)).await
    }

    async fn update(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, StoreError> {
        let builder = self
            .request(Method::PUT, &kind.object_path(namespace, name))
            .json(&object);
        self.send_json(builder, &target(kind, namespace, name)).await
    }

    async fn update_status(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, StoreError> {
        let path = format!("{}/status", kind.object_path(namespace, name));
        let builder = self.request(Method::PUT, &path).json(&object);
        self.send_json(builder, &target(kind, namespace, name)).await
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<Value>, StoreError> {
        let mut path = kind.collection_path(namespace);
        if !selector.is_empty() {
            path = format!("{}?labelSelector={}", path, selector_string(selector));
        }
        let builder = self.request(Method::GET, &path);
        let resp = self
            .send(builder, &format!("{} list in {}", kind, namespace))
            .await?;
        let list: ObjectList = resp.json().await?;
        Ok(list.items)
    }
}

#[async_trait]
impl VersionSource for ApiClient {
    async fn get_raw(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let resp = self.send(self.request(Method::GET, path), path).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Map a failed upgrade to the same errors a REST call would return.
fn upgrade_error(e: tungstenite::Error, target: &str) -> StoreError {
    match e {
        tungstenite::Error::Http(resp) => {
            let message = resp
                .body()
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_default();
            StoreError::from_status(resp.status().as_u16(), target, message)
        }
        e => StoreError::WebSocket(e),
    }
}

#[async_trait]
impl PodExecutor for ApiClient {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput, StoreError> {
        let url = exec_url(&self.server, namespace, pod, container, command)?;
        debug!("EXEC {}", url);

        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(EXEC_PROTOCOLS),
        );
        if let Some(bearer) = self.bearer() {
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
            headers.insert("Authorization", value);
        }

        let connector = Connector::Rustls(self.tls.clone());
        let (mut socket, _) = connect_async_tls_with_config(request, None, false, Some(connector))
            .await
            .map_err(|e| upgrade_error(e, &target(Kind::Pod, namespace, pod)))?;

        let mut streams = ExecStreams::default();
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Binary(frame)) => streams.push(&frame),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed) => break,
                Err(e) => return Err(e.into()),
            }
        }
        streams.finish(&format!("{}/{}", namespace, pod))
    }
}
