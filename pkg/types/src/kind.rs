use serde::Serialize;
use serde::de::DeserializeOwned;

use pkg_constants::api::{
    APPS_API_VERSION, CORE_API_VERSION, PSMDB_API_VERSION, PSMDB_KIND, PSMDB_PLURAL,
};

use crate::meta::{ObjectKey, ObjectMeta};

/// The object kinds the operator reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Secret,
    Service,
    Pod,
    StatefulSet,
    PerconaServerMongoDB,
}

impl Kind {
    pub fn api_version(&self) -> &'static str {
        match self {
            Kind::Secret | Kind::Service | Kind::Pod => CORE_API_VERSION,
            Kind::StatefulSet => APPS_API_VERSION,
            Kind::PerconaServerMongoDB => PSMDB_API_VERSION,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kind::Secret => "Secret",
            Kind::Service => "Service",
            Kind::Pod => "Pod",
            Kind::StatefulSet => "StatefulSet",
            Kind::PerconaServerMongoDB => PSMDB_KIND,
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Kind::Secret => "secrets",
            Kind::Service => "services",
            Kind::Pod => "pods",
            Kind::StatefulSet => "statefulsets",
            Kind::PerconaServerMongoDB => PSMDB_PLURAL,
        }
    }

    /// REST path of the namespaced collection, e.g. `/apis/apps/v1/namespaces/ns/statefulsets`.
    pub fn collection_path(&self, namespace: &str) -> String {
        let prefix = if self.api_version() == CORE_API_VERSION {
            "/api/v1".to_string()
        } else {
            format!("/apis/{}", self.api_version())
        };
        format!("{}/namespaces/{}/{}", prefix, namespace, self.plural())
    }

    pub fn object_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed platform object that can travel through the object store.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn metadata(&self) -> &ObjectMeta;

    fn key(&self) -> ObjectKey {
        ObjectKey::of(self.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_paths() {
        assert_eq!(
            Kind::Secret.object_path("test", "key"),
            "/api/v1/namespaces/test/secrets/key"
        );
        assert_eq!(
            Kind::StatefulSet.collection_path("test"),
            "/apis/apps/v1/namespaces/test/statefulsets"
        );
        assert_eq!(
            Kind::PerconaServerMongoDB.object_path("db", "my-cluster"),
            "/apis/psmdb.percona.com/v1alpha1/namespaces/db/perconaservermongodbs/my-cluster"
        );
    }
}
