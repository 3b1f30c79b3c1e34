use async_trait::async_trait;
use pkg_types::kind::{Kind, Resource};
use pkg_types::meta::Labels;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::StoreError;

/// The object-store operations the operator issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Get,
    Update,
    UpdateStatus,
    List,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreOp::Create => write!(f, "create"),
            StoreOp::Get => write!(f, "get"),
            StoreOp::Update => write!(f, "update"),
            StoreOp::UpdateStatus => write!(f, "update status of"),
            StoreOp::List => write!(f, "list"),
        }
    }
}

/// Untyped access to the platform's object store.
///
/// `get` on a missing object returns [`StoreError::NotFound`]; callers treat
/// that as an expected answer, every other error as a failure.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create(&self, kind: Kind, namespace: &str, object: Value) -> Result<Value, StoreError>;

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Value, StoreError>;

    async fn update(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, StoreError>;

    /// Write only the `status` sub-object.
    async fn update_status(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, StoreError>;

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<Value>, StoreError>;
}

/// Raw GET access to the server's discovery endpoints.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn get_raw(&self, path: &str) -> Result<Vec<u8>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// Runs a non-interactive command inside a pod's container.
#[async_trait]
pub trait PodExecutor: Send + Sync {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput, StoreError>;
}

/// Typed, namespaced view over an [`ObjectStore`].
pub struct Api<K> {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: Resource> Api<K> {
    pub fn namespaced(store: Arc<dyn ObjectStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self, name: &str) -> Result<K, StoreError> {
        let value = self.store.get(K::KIND, &self.namespace, name).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let value = serde_json::to_value(obj)?;
        let created = self.store.create(K::KIND, &self.namespace, value).await?;
        Ok(serde_json::from_value(created)?)
    }

    pub async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let value = serde_json::to_value(obj)?;
        let updated = self
            .store
            .update(K::KIND, &self.namespace, &obj.metadata().name, value)
            .await?;
        Ok(serde_json::from_value(updated)?)
    }

    pub async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let value = serde_json::to_value(obj)?;
        let updated = self
            .store
            .update_status(K::KIND, &self.namespace, &obj.metadata().name, value)
            .await?;
        Ok(serde_json::from_value(updated)?)
    }

    pub async fn list(&self, selector: &Labels) -> Result<Vec<K>, StoreError> {
        let values = self.store.list(K::KIND, &self.namespace, selector).await?;
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }
}
