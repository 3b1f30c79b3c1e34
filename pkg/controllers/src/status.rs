use pkg_state::{Api, ObjectStore};
use pkg_types::meta::ObjectKey;
use pkg_types::pod::Pod;
use pkg_types::psmdb::{PerconaServerMongoDB, PerconaServerMongoDBStatus, ReplsetMemberStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{Error, Result};

/// Serializes status read-modify-write cycles per topology.
///
/// The reconciler and the topology's watchdog both write status; each write
/// re-reads the latest object under the topology's lock, applies the change
/// and skips the store call when nothing changed.
pub struct StatusWriter {
    store: Arc<dyn ObjectStore>,
    locks: Mutex<HashMap<ObjectKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl StatusWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &ObjectKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Apply `mutate` to the stored status of `key`. Returns whether a write
    /// was issued. A topology that no longer exists is not an error.
    pub async fn update<F>(&self, key: &ObjectKey, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut PerconaServerMongoDBStatus) + Send,
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let failed = |source| Error::StatusUpdateFailed {
            topology: key.clone(),
            source,
        };
        let api: Api<PerconaServerMongoDB> = Api::namespaced(self.store.clone(), &key.namespace);

        let mut topology = match api.get(&key.name).await {
            Ok(topology) => topology,
            Err(e) if e.is_not_found() => {
                debug!("Skipping status update for {}: topology is gone", key);
                return Ok(false);
            }
            Err(e) => return Err(failed(e)),
        };

        let before = topology.status.clone();
        mutate(&mut topology.status);
        if topology.status == before {
            return Ok(false);
        }

        match api.update_status(&topology).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(failed(e)),
        }
    }

    /// Drop the lock entry of a deleted topology.
    pub fn forget(&self, key: &ObjectKey) {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

/// Record the observed members of `replset`.
pub fn apply_membership(status: &mut PerconaServerMongoDBStatus, replset: &str, pods: &[Pod]) {
    let mut members: Vec<ReplsetMemberStatus> = pods
        .iter()
        .map(|pod| ReplsetMemberStatus {
            name: pod.metadata.name.clone(),
            phase: pod.status.phase,
            ready: pod.is_ready(),
        })
        .collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));

    let entry = status.replset_mut(replset);
    entry.size = members.len() as i32;
    entry.ready = members.iter().filter(|m| m.ready).count() as i32;
    entry.members = members;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::{MemoryStore, StoreOp};
    use pkg_types::kind::Kind;
    use pkg_types::meta::ObjectMeta;
    use pkg_types::pod::{PodCondition, PodPhase, PodStatus};
    use pkg_types::psmdb::PerconaServerMongoDBSpec;

    fn pod(name: &str, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta::named("test", name),
            status: PodStatus {
                phase: PodPhase::Running,
                pod_ip: None,
                conditions: vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                }],
            },
            ..Default::default()
        }
    }

    #[test]
    fn membership_is_sorted_and_counted() {
        let mut status = PerconaServerMongoDBStatus::default();
        apply_membership(&mut status, "rs0", &[pod("db-rs0-1", false), pod("db-rs0-0", true)]);
        let rs = status.replset("rs0").unwrap();
        assert_eq!(rs.size, 2);
        assert_eq!(rs.ready, 1);
        assert_eq!(rs.members[0].name, "db-rs0-0");
    }

    #[tokio::test]
    async fn writes_only_on_change() {
        let store = MemoryStore::new();
        store
            .insert(&PerconaServerMongoDB::new(
                "test",
                "db",
                PerconaServerMongoDBSpec::default(),
            ))
            .unwrap();
        let writer = StatusWriter::new(Arc::new(store.clone()));
        let key = ObjectKey::new("test", "db");

        let wrote = writer
            .update(&key, |s| s.replset_mut("rs0").initialized = true)
            .await
            .unwrap();
        assert!(wrote);
        let wrote = writer
            .update(&key, |s| s.replset_mut("rs0").initialized = true)
            .await
            .unwrap();
        assert!(!wrote);
        assert_eq!(store.count(StoreOp::UpdateStatus, Kind::PerconaServerMongoDB), 1);

        let stored: PerconaServerMongoDB = store.object("test", "db").unwrap();
        assert!(stored.status.is_initialized("rs0"));
    }

    #[tokio::test]
    async fn missing_topology_is_skipped() {
        let writer = StatusWriter::new(Arc::new(MemoryStore::new()));
        let wrote = writer
            .update(&ObjectKey::new("test", "gone"), |s| {
                s.replset_mut("rs0").ready = 1
            })
            .await
            .unwrap();
        assert!(!wrote);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = MemoryStore::new();
        store
            .insert(&PerconaServerMongoDB::new(
                "test",
                "db",
                PerconaServerMongoDBSpec::default(),
            ))
            .unwrap();
        store.fail_next(StoreOp::UpdateStatus, Kind::PerconaServerMongoDB);
        let writer = StatusWriter::new(Arc::new(store));
        let err = writer
            .update(&ObjectKey::new("test", "db"), |s| {
                s.replset_mut("rs0").ready = 1
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatusUpdateFailed { .. }));
    }
}
