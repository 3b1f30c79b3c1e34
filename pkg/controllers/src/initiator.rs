use async_trait::async_trait;
use pkg_constants::mongod::{
    ALREADY_INITIALIZED_CODE, CLUSTER_DOMAIN, MONGO_SHELL, MONGOD_CONTAINER_NAME,
};
use pkg_state::{PodExecutor, StoreError};
use pkg_types::pod::Pod;
use pkg_types::psmdb::{PerconaServerMongoDB, ReplsetSpec};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::builder::replset_object_name;

/// Turns a set of running mongod members into a replica set.
#[async_trait]
pub trait ReplsetInitiator: Send + Sync {
    /// `members` are the replset's pods, sorted by name.
    async fn initiate(
        &self,
        topology: &PerconaServerMongoDB,
        replset: &ReplsetSpec,
        members: &[Pod],
    ) -> Result<(), StoreError>;
}

/// Runs `rs.initiate()` through the mongo shell inside the first member.
pub struct MongoShellInitiator<E> {
    executor: E,
}

impl<E: PodExecutor> MongoShellInitiator<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl<E: PodExecutor> ReplsetInitiator for MongoShellInitiator<E> {
    async fn initiate(
        &self,
        topology: &PerconaServerMongoDB,
        replset: &ReplsetSpec,
        members: &[Pod],
    ) -> Result<(), StoreError> {
        let Some(first) = members.first() else {
            return Ok(());
        };
        let names: Vec<String> = members.iter().map(|p| p.metadata.name.clone()).collect();
        let command = initiate_command(topology, replset, &names);
        let output = self
            .executor
            .exec(
                &topology.metadata.namespace,
                &first.metadata.name,
                MONGOD_CONTAINER_NAME,
                &command,
            )
            .await?;
        debug!(
            "rs.initiate for {}/{}: {}",
            topology.metadata.name,
            replset.name,
            output.stdout.trim()
        );

        let failed = |message: String| StoreError::Exec {
            pod: format!("{}/{}", topology.metadata.namespace, first.metadata.name),
            message,
        };
        let reply = InitiateReply::parse(&output.stdout).ok_or_else(|| {
            failed(format!(
                "no rs.initiate reply in output: {}",
                output.stdout.trim()
            ))
        })?;
        if reply.ok == 1.0 {
            return Ok(());
        }
        if reply.code == Some(ALREADY_INITIALIZED_CODE) {
            info!(
                "Replset {} of {} was already initiated",
                replset.name, topology.metadata.name
            );
            return Ok(());
        }
        Err(failed(format!(
            "rs.initiate returned ok:{} code:{}: {}",
            reply.ok,
            reply.code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            reply.errmsg.unwrap_or_default()
        )))
    }
}

/// The parts of a `replSetInitiate` reply that decide the outcome. The shell
/// exits 0 whatever the reply says, so `ok` is the only success signal.
#[derive(Debug, Deserialize)]
struct InitiateReply {
    ok: f64,
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    errmsg: Option<String>,
}

impl InitiateReply {
    /// The last line of `stdout` holding a reply document.
    fn parse(stdout: &str) -> Option<Self> {
        if let Ok(reply) = serde_json::from_str(stdout.trim()) {
            return Some(reply);
        }
        stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str(line.trim()).ok())
    }
}

/// Stable DNS name and port of a member behind the replset's headless Service.
pub fn member_host(topology: &PerconaServerMongoDB, replset: &ReplsetSpec, pod: &str) -> String {
    format!(
        "{}.{}.{}.{}:{}",
        pod,
        replset_object_name(topology, replset),
        topology.metadata.namespace,
        CLUSTER_DOMAIN,
        topology.spec.mongod_port()
    )
}

/// Shell invocation that initiates `replset` with the given members and
/// prints the reply's `ok`, `code` and `errmsg` as one JSON line.
pub fn initiate_command(
    topology: &PerconaServerMongoDB,
    replset: &ReplsetSpec,
    pods: &[String],
) -> Vec<String> {
    let members: Vec<_> = pods
        .iter()
        .enumerate()
        .map(|(i, pod)| json!({ "_id": i, "host": member_host(topology, replset, pod) }))
        .collect();
    let config = json!({ "_id": replset.name, "members": members });

    vec![
        MONGO_SHELL.to_string(),
        "--quiet".to_string(),
        "--port".to_string(),
        topology.spec.mongod_port().to_string(),
        "--eval".to_string(),
        format!(
            "var r = rs.initiate({}); print(JSON.stringify({{ok: r.ok, code: r.code, errmsg: r.errmsg}}))",
            config
        ),
    ]
}
