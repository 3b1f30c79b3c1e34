use pkg_state::{Api, ObjectStore, StoreError};
use pkg_types::meta::ObjectKey;
use pkg_types::pod::Pod;
use pkg_types::psmdb::PerconaServerMongoDB;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::label_selector;
use crate::error::{Error, Result};
use crate::status::{StatusWriter, apply_membership};

/// Background monitor for one initialized topology.
///
/// Every cycle it re-reads the topology, lists the member pods of each
/// replset, records membership in status and asks for a resync when a
/// replset has fewer ready members than its size.
pub struct Watchdog {
    key: ObjectKey,
    store: Arc<dyn ObjectStore>,
    statuses: Arc<StatusWriter>,
    resync_tx: mpsc::Sender<ObjectKey>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(
        key: ObjectKey,
        store: Arc<dyn ObjectStore>,
        statuses: Arc<StatusWriter>,
        resync_tx: mpsc::Sender<ObjectKey>,
        interval: Duration,
    ) -> Self {
        Self {
            key,
            store,
            statuses,
            resync_tx,
            interval,
        }
    }

    pub fn start(self) -> WatchdogHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let key = self.key.clone();
        let task = tokio::spawn(async move {
            info!(
                "Watchdog started for {} (interval={}s)",
                self.key,
                self.interval.as_secs()
            );
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    res = self.poll() => {
                        if let Err(e) = res {
                            warn!("{}", e);
                        }
                    }
                }
            }
            info!("Watchdog stopped for {}", self.key);
        });
        WatchdogHandle { key, stop_tx, task }
    }

    async fn poll(&self) -> Result<()> {
        let transient = |source: StoreError| Error::WatchdogPollTransient {
            topology: self.key.clone(),
            source,
        };

        let topologies: Api<PerconaServerMongoDB> =
            Api::namespaced(self.store.clone(), &self.key.namespace);
        let topology = match topologies.get(&self.key.name).await {
            Ok(topology) => topology,
            Err(e) if e.is_not_found() => {
                debug!("Watchdog for {}: topology is gone", self.key);
                return Ok(());
            }
            Err(e) => return Err(transient(e)),
        };

        let pods: Api<Pod> = Api::namespaced(self.store.clone(), &self.key.namespace);
        let mut observed = Vec::with_capacity(topology.spec.replsets.len());
        let mut diverged = false;
        for replset in &topology.spec.replsets {
            let members = pods
                .list(&label_selector(&topology, replset))
                .await
                .map_err(transient)?;
            let ready = members.iter().filter(|p| p.is_ready()).count();
            if ready != replset.size.max(0) as usize {
                debug!(
                    "Watchdog for {}: replset {} has {}/{} ready members",
                    self.key, replset.name, ready, replset.size
                );
                diverged = true;
            }
            observed.push((replset.name.clone(), members));
        }

        let written = self
            .statuses
            .update(&self.key, |status| {
                for (name, members) in &observed {
                    apply_membership(status, name, members);
                }
            })
            .await;
        match written {
            Ok(_) => {}
            Err(Error::StatusUpdateFailed { source, .. }) => return Err(transient(source)),
            Err(e) => return Err(e),
        }

        if diverged {
            match self.resync_tx.try_send(self.key.clone()) {
                Ok(()) => debug!("Watchdog for {}: resync requested", self.key),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Watchdog for {}: resync queue full", self.key)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Watchdog for {}: resync receiver closed", self.key)
                }
            }
        }
        Ok(())
    }
}

/// Stop signal and task of a running watchdog. Dropping it also stops the task.
pub struct WatchdogHandle {
    key: ObjectKey,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!("Watchdog for {} ended abnormally: {}", self.key, e);
        }
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<WatchdogHandle>>>;

/// At most one watchdog per topology.
#[derive(Default)]
pub struct WatchdogRegistry {
    entries: Mutex<HashMap<ObjectKey, Slot>>,
}

impl WatchdogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &ObjectKey) -> Slot {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.entry(key.clone()).or_default().clone()
    }

    /// Start the watchdog built by `make` unless one is already running for
    /// `key`. Returns whether a new one was started.
    pub async fn start_if_absent<F>(&self, key: &ObjectKey, make: F) -> bool
    where
        F: FnOnce() -> Watchdog,
    {
        let slot = self.slot(key);
        let mut current = slot.lock().await;
        if current.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *current = Some(make().start());
        true
    }

    /// Stop and forget the watchdog of `key`. Returns whether one was running.
    pub async fn stop(&self, key: &ObjectKey) -> bool {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.remove(key)
        };
        let Some(slot) = slot else {
            return false;
        };
        let handle = slot.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, key: &ObjectKey) -> bool {
        let slot = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.get(key).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.as_ref().is_some_and(|h| !h.is_finished()),
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let keys: Vec<ObjectKey> = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.keys().cloned().collect()
        };
        for key in keys {
            self.stop(&key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::{MemoryStore, StoreOp};
    use pkg_types::kind::Kind;
    use pkg_types::meta::ObjectMeta;
    use pkg_types::pod::{PodCondition, PodPhase, PodStatus};
    use pkg_types::psmdb::{PerconaServerMongoDBSpec, ReplsetSpec};

    fn topology() -> PerconaServerMongoDB {
        PerconaServerMongoDB::new(
            "test",
            "db",
            PerconaServerMongoDBSpec {
                replsets: vec![ReplsetSpec {
                    name: "rs0".to_string(),
                    size: 2,
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
    }

    fn member(name: &str) -> Pod {
        let t = topology();
        let mut meta = ObjectMeta::named("test", name);
        meta.labels = label_selector(&t, &t.spec.replsets[0]);
        Pod {
            metadata: meta,
            status: PodStatus {
                phase: PodPhase::Running,
                pod_ip: None,
                conditions: vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                }],
            },
            ..Default::default()
        }
    }

    fn watchdog(store: &MemoryStore, tx: mpsc::Sender<ObjectKey>) -> Watchdog {
        let store: Arc<dyn ObjectStore> = Arc::new(store.clone());
        Watchdog::new(
            ObjectKey::new("test", "db"),
            store.clone(),
            Arc::new(StatusWriter::new(store)),
            tx,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn requests_resync_on_missing_members() {
        let store = MemoryStore::new();
        store.insert(&topology()).unwrap();
        store.insert(&member("db-rs0-0")).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = watchdog(&store, tx).start();
        let key = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, ObjectKey::new("test", "db"));
        handle.stop().await;

        let stored: PerconaServerMongoDB = store.object("test", "db").unwrap();
        let rs = stored.status.replset("rs0").unwrap();
        assert_eq!(rs.size, 1);
        assert_eq!(rs.ready, 1);
    }

    #[tokio::test]
    async fn quiet_when_membership_matches() {
        let store = MemoryStore::new();
        store.insert(&topology()).unwrap();
        store.insert(&member("db-rs0-0")).unwrap();
        store.insert(&member("db-rs0-1")).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = watchdog(&store, tx).start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;
        assert!(rx.try_recv().is_err());
        assert!(store.count(StoreOp::List, Kind::Pod) >= 2);
    }

    #[tokio::test]
    async fn survives_transient_errors() {
        let store = MemoryStore::new();
        store.insert(&topology()).unwrap();
        store.fail_next(StoreOp::Get, Kind::PerconaServerMongoDB);
        store.fail_next(StoreOp::List, Kind::Pod);
        let (tx, mut rx) = mpsc::channel(8);

        let handle = watchdog(&store, tx).start();
        let key = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(key.is_some());
        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_is_prompt() {
        let store = MemoryStore::new();
        store.insert(&topology()).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let store: Arc<dyn ObjectStore> = Arc::new(store);
        let handle = Watchdog::new(
            ObjectKey::new("test", "db"),
            store.clone(),
            Arc::new(StatusWriter::new(store)),
            tx,
            Duration::from_secs(3600),
        )
        .start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn registry_keeps_one_per_topology() {
        let store = MemoryStore::new();
        store.insert(&topology()).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let registry = WatchdogRegistry::new();
        let key = ObjectKey::new("test", "db");

        assert!(!registry.is_running(&key).await);
        assert!(registry.start_if_absent(&key, || watchdog(&store, tx.clone())).await);
        assert!(!registry.start_if_absent(&key, || watchdog(&store, tx.clone())).await);
        assert!(registry.is_running(&key).await);

        assert!(registry.stop(&key).await);
        assert!(!registry.is_running(&key).await);
        assert!(!registry.stop(&key).await);
    }
}
