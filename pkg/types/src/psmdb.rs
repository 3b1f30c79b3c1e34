use serde::{Deserialize, Serialize};

use pkg_constants::api::{PSMDB_API_VERSION, PSMDB_KIND};
use pkg_constants::mongod::{
    DEFAULT_IMAGE, DEFAULT_KEY_SECRET_SUFFIX, DEFAULT_MONGOD_PORT, DEFAULT_USERS_SECRET_NAME,
    DEFAULT_VERSION,
};

use crate::kind::{Kind, Resource};
use crate::meta::ObjectMeta;
use crate::platform::Platform;
use crate::pod::PodPhase;

// --- Replset spec ---

/// Free-form resource quantity strings for one bound (limits or requests).
/// An empty string leaves the dimension unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpecRequirements {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub storage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplsetSpec {
    pub name: String,
    /// Desired member count.
    pub size: i32,
    #[serde(default)]
    pub limits: ResourceSpecRequirements,
    #[serde(default)]
    pub requests: ResourceSpecRequirements,
}

// --- Topology spec ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsSpec {
    /// Secret holding the replset key file; created by the operator if missing.
    #[serde(default)]
    pub key: String,
    /// Secret holding the system users' credentials; provided by the user.
    #[serde(default)]
    pub users: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongodSpecNet {
    #[serde(default)]
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongodSpec {
    #[serde(default)]
    pub net: MongodSpecNet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDBSpec {
    /// Image tag, e.g. `3.6`.
    #[serde(default)]
    pub version: String,
    /// Full image reference; overrides the image built from `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_uid: Option<i64>,
    /// Explicit platform; takes precedence over detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub secrets: SecretsSpec,
    #[serde(default)]
    pub replsets: Vec<ReplsetSpec>,
    #[serde(default)]
    pub mongod: MongodSpec,
}

impl PerconaServerMongoDBSpec {
    pub fn image(&self) -> String {
        match &self.image {
            Some(image) if !image.is_empty() => image.clone(),
            _ => {
                let version = if self.version.is_empty() {
                    DEFAULT_VERSION
                } else {
                    &self.version
                };
                format!("{}:{}", DEFAULT_IMAGE, version)
            }
        }
    }

    pub fn users_secret_name(&self) -> &str {
        non_empty_or(&self.secrets.users, DEFAULT_USERS_SECRET_NAME)
    }

    pub fn mongod_port(&self) -> i32 {
        if self.mongod.net.port > 0 {
            self.mongod.net.port
        } else {
            DEFAULT_MONGOD_PORT
        }
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

// --- Topology status ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplsetMemberStatus {
    pub name: String,
    pub phase: PodPhase,
    pub ready: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplsetStatus {
    pub name: String,
    #[serde(default)]
    pub initialized: bool,
    /// Observed member count.
    #[serde(default)]
    pub size: i32,
    #[serde(default)]
    pub ready: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ReplsetMemberStatus>,
    /// Last reconciliation error for this replset, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerconaServerMongoDBStatus {
    #[serde(default)]
    pub replsets: Vec<ReplsetStatus>,
}

impl PerconaServerMongoDBStatus {
    pub fn replset(&self, name: &str) -> Option<&ReplsetStatus> {
        self.replsets.iter().find(|r| r.name == name)
    }

    /// Status entry for `name`, inserted if absent.
    pub fn replset_mut(&mut self, name: &str) -> &mut ReplsetStatus {
        let idx = match self.replsets.iter().position(|r| r.name == name) {
            Some(idx) => idx,
            None => {
                self.replsets.push(ReplsetStatus {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.replsets.len() - 1
            }
        };
        &mut self.replsets[idx]
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.replset(name).is_some_and(|r| r.initialized)
    }

    pub fn any_initialized(&self) -> bool {
        self.replsets.iter().any(|r| r.initialized)
    }
}

// --- Topology ---

/// The declarative replica-set topology managed by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDB {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PerconaServerMongoDBSpec,
    #[serde(default)]
    pub status: PerconaServerMongoDBStatus,
}

fn default_api_version() -> String {
    PSMDB_API_VERSION.to_string()
}

fn default_kind() -> String {
    PSMDB_KIND.to_string()
}

impl PerconaServerMongoDB {
    /// `spec.secrets.key`, or `<name>-mongodb-key` when unset.
    pub fn key_secret_name(&self) -> String {
        if self.spec.secrets.key.is_empty() {
            format!("{}-{}", self.metadata.name, DEFAULT_KEY_SECRET_SUFFIX)
        } else {
            self.spec.secrets.key.clone()
        }
    }

    pub fn new(namespace: &str, name: &str, spec: PerconaServerMongoDBSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::named(namespace, name),
            spec,
            status: PerconaServerMongoDBStatus::default(),
        }
    }
}

impl Resource for PerconaServerMongoDB {
    const KIND: Kind = Kind::PerconaServerMongoDB;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_manifest_with_defaults() {
        let yaml = r#"
apiVersion: psmdb.percona.com/v1alpha1
kind: PerconaServerMongoDB
metadata:
  name: my-cluster
  namespace: db
spec:
  replsets:
    - name: rs0
      size: 3
      limits:
        cpu: "1"
        memory: 1G
"#;
        let psmdb: PerconaServerMongoDB = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(psmdb.metadata.name, "my-cluster");
        assert_eq!(psmdb.spec.replsets[0].limits.cpu, "1");
        assert_eq!(psmdb.spec.replsets[0].requests.cpu, "");
        assert_eq!(psmdb.spec.image(), "percona/percona-server-mongodb:3.6");
        assert_eq!(psmdb.key_secret_name(), "my-cluster-mongodb-key");
        assert_eq!(psmdb.spec.mongod_port(), 27017);
        assert_eq!(psmdb.spec.platform, None);
        assert!(!psmdb.status.any_initialized());
    }

    #[test]
    fn image_override_wins() {
        let spec = PerconaServerMongoDBSpec {
            version: "4.0".to_string(),
            image: Some("registry.local/psmdb:custom".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.image(), "registry.local/psmdb:custom");

        let spec = PerconaServerMongoDBSpec {
            version: "4.0".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.image(), "percona/percona-server-mongodb:4.0");
    }

    #[test]
    fn replset_mut_inserts_once() {
        let mut status = PerconaServerMongoDBStatus::default();
        status.replset_mut("rs0").initialized = true;
        status.replset_mut("rs0").ready = 2;
        assert_eq!(status.replsets.len(), 1);
        assert!(status.is_initialized("rs0"));
        assert!(!status.is_initialized("rs1"));
        assert!(status.any_initialized());
    }
}
