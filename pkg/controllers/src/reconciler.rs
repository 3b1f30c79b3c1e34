use pkg_constants::mongod::KEY_SECRET_DATA_KEY;
use pkg_state::{Api, ObjectStore, StoreError, StoreOp};
use pkg_types::event::Event;
use pkg_types::kind::{Kind, Resource};
use pkg_types::meta::ObjectKey;
use pkg_types::platform::{Platform, ServerVersion};
use pkg_types::pod::Pod;
use pkg_types::psmdb::{PerconaServerMongoDB, ReplsetSpec};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::builder::{
    ReplsetResources, build_replset_resources, key_secret_update, label_selector,
    replset_object_name, service_update, stateful_set_update,
};
use crate::error::{Error, Result};
use crate::initiator::ReplsetInitiator;
use crate::platform::effective_platform;
use crate::status::{StatusWriter, apply_membership};
use crate::watchdog::{Watchdog, WatchdogRegistry};

/// What one event did to the topology's replsets.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Replsets whose children were brought in line.
    pub reconciled: Vec<String>,
    /// Replsets skipped because their spec could not be turned into objects.
    pub failed: Vec<(String, Error)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum ReplsetOutcome {
    Reconciled {
        name: String,
        members: Vec<Pod>,
        initialized: bool,
    },
    Failed {
        name: String,
        message: String,
    },
}

/// Drives each topology's child objects towards its spec.
///
/// Events are handled one at a time; the only concurrent work is the
/// per-topology watchdogs, which share the status writer.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    platform: ServerVersion,
    initiator: Arc<dyn ReplsetInitiator>,
    statuses: Arc<StatusWriter>,
    watchdogs: WatchdogRegistry,
    resync_tx: mpsc::Sender<ObjectKey>,
    watchdog_interval: Duration,
}

impl Reconciler {
    /// Returns the reconciler and the receiving end of the resync requests
    /// its watchdogs send; hand both to [`run`](Self::run).
    pub fn new(
        store: Arc<dyn ObjectStore>,
        platform: ServerVersion,
        initiator: Arc<dyn ReplsetInitiator>,
        watchdog_interval: Duration,
        channel_capacity: usize,
    ) -> (Self, mpsc::Receiver<ObjectKey>) {
        let (resync_tx, resync_rx) = mpsc::channel(channel_capacity);
        let reconciler = Self {
            statuses: Arc::new(StatusWriter::new(store.clone())),
            store,
            platform,
            initiator,
            watchdogs: WatchdogRegistry::new(),
            resync_tx,
            watchdog_interval,
        };
        (reconciler, resync_rx)
    }

    pub async fn handle(&self, event: Event) -> Result<ReconcileReport> {
        match event {
            Event::Upserted(topology) => self.upsert(&topology).await,
            Event::Deleted(topology) => {
                self.delete(&topology).await;
                Ok(ReconcileReport::default())
            }
        }
    }

    /// Process events and resync requests until the event feed closes.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<Event>,
        mut resync: mpsc::Receiver<ObjectKey>,
    ) {
        info!("Reconciler started (platform={})", self.platform.platform);
        loop {
            let event = tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                Some(key) = resync.recv() => match self.reread(&key).await {
                    Some(event) => event,
                    None => continue,
                },
            };

            let key = event.key();
            match self.handle(event).await {
                Ok(report) => {
                    for (replset, e) in &report.failed {
                        warn!("Reconciler skipped replset {} of {}: {}", replset, key, e);
                    }
                }
                Err(e) => warn!("Reconciler error for {}: {}", key, e),
            }
        }
        self.shutdown().await;
        info!("Reconciler stopped");
    }

    pub async fn watchdog_running(&self, key: &ObjectKey) -> bool {
        self.watchdogs.is_running(key).await
    }

    /// Stop every running watchdog.
    pub async fn shutdown(&self) {
        self.watchdogs.stop_all().await;
    }

    async fn reread(&self, key: &ObjectKey) -> Option<Event> {
        let api: Api<PerconaServerMongoDB> = Api::namespaced(self.store.clone(), &key.namespace);
        match api.get(&key.name).await {
            Ok(topology) => Some(Event::Upserted(topology)),
            Err(e) if e.is_not_found() => {
                debug!("Resync for {} dropped: topology is gone", key);
                None
            }
            Err(e) => {
                warn!("Resync for {} failed: {}", key, e);
                None
            }
        }
    }

    async fn upsert(&self, topology: &PerconaServerMongoDB) -> Result<ReconcileReport> {
        let key = ObjectKey::of(&topology.metadata);
        let platform = effective_platform(topology, &self.platform);
        let mut report = ReconcileReport::default();
        let mut outcomes = Vec::with_capacity(topology.spec.replsets.len());
        let mut key_secret_ensured = false;

        for replset in &topology.spec.replsets {
            let resources = match build_replset_resources(topology, replset, platform) {
                Ok(resources) => resources,
                Err(e) if e.is_replset_local() => {
                    outcomes.push(ReplsetOutcome::Failed {
                        name: replset.name.clone(),
                        message: e.to_string(),
                    });
                    report.failed.push((replset.name.clone(), e));
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !key_secret_ensured {
                self.ensure(&resources.key_secret, add_key_material, key_secret_update)
                    .await?;
                key_secret_ensured = true;
            }
            outcomes.push(
                self.reconcile_replset(topology, replset, resources, platform)
                    .await?,
            );
            report.reconciled.push(replset.name.clone());
        }

        self.statuses
            .update(&key, |status| {
                for outcome in &outcomes {
                    match outcome {
                        ReplsetOutcome::Reconciled {
                            name,
                            members,
                            initialized,
                        } => {
                            apply_membership(status, name, members);
                            let entry = status.replset_mut(name);
                            entry.initialized |= *initialized;
                            entry.message = None;
                        }
                        ReplsetOutcome::Failed { name, message } => {
                            status.replset_mut(name).message = Some(message.clone());
                        }
                    }
                }
            })
            .await?;

        let initialized_now = outcomes.iter().any(|o| {
            matches!(
                o,
                ReplsetOutcome::Reconciled {
                    initialized: true,
                    ..
                }
            )
        });
        if topology.status.any_initialized() || initialized_now {
            let started = self
                .watchdogs
                .start_if_absent(&key, || {
                    Watchdog::new(
                        key.clone(),
                        self.store.clone(),
                        self.statuses.clone(),
                        self.resync_tx.clone(),
                        self.watchdog_interval,
                    )
                })
                .await;
            if started {
                info!("Started watchdog for {}", key);
            }
        }

        Ok(report)
    }

    async fn delete(&self, topology: &PerconaServerMongoDB) {
        let key = ObjectKey::of(&topology.metadata);
        if self.watchdogs.stop(&key).await {
            info!("Stopped watchdog for deleted topology {}", key);
        }
        self.statuses.forget(&key);
    }

    async fn reconcile_replset(
        &self,
        topology: &PerconaServerMongoDB,
        replset: &ReplsetSpec,
        resources: ReplsetResources,
        platform: Platform,
    ) -> Result<ReplsetOutcome> {
        self.ensure(&resources.service, |_| {}, service_update).await?;
        self.ensure(&resources.stateful_set, |_| {}, stateful_set_update)
            .await?;

        let members = self.list_members(topology, replset).await?;
        let mut initialized = topology.status.is_initialized(&replset.name);
        if !initialized && members_ready(&members, replset.size) {
            match self.initiator.initiate(topology, replset, &members).await {
                Ok(()) => {
                    info!(
                        "Initiated replset {} of {} on {}",
                        replset.name,
                        ObjectKey::of(&topology.metadata),
                        platform
                    );
                    initialized = true;
                }
                Err(source) => {
                    let e = Error::InitiateFailed {
                        topology: ObjectKey::of(&topology.metadata),
                        replset: replset.name.clone(),
                        source,
                    };
                    warn!("{}", e);
                }
            }
        }

        Ok(ReplsetOutcome::Reconciled {
            name: replset.name.clone(),
            members,
            initialized,
        })
    }

    async fn list_members(
        &self,
        topology: &PerconaServerMongoDB,
        replset: &ReplsetSpec,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.store.clone(), &topology.metadata.namespace);
        let mut members = api
            .list(&label_selector(topology, replset))
            .await
            .map_err(|e| {
                Error::child_op(
                    StoreOp::List,
                    Kind::Pod,
                    replset_object_name(topology, replset),
                    e,
                )
            })?;
        members.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(members)
    }

    /// Create `desired` if it does not exist; otherwise issue the update
    /// `diff` computes from the observed object, if any.
    async fn ensure<K, C, D>(&self, desired: &K, on_create: C, diff: D) -> Result<()>
    where
        K: Resource,
        C: FnOnce(&mut K) + Send,
        D: FnOnce(&K, &K) -> Option<K> + Send,
    {
        let key = desired.key();
        let api: Api<K> = Api::namespaced(self.store.clone(), &key.namespace);

        match api.get(&key.name).await {
            Ok(observed) => {
                if let Some(updated) = diff(&observed, desired) {
                    api.update(&updated)
                        .await
                        .map_err(|e| Error::child_op(StoreOp::Update, K::KIND, &key.name, e))?;
                    info!("Updated {} {}", K::KIND, key);
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let mut object = desired.clone();
                on_create(&mut object);
                match api.create(&object).await {
                    Ok(_) => info!("Created {} {}", K::KIND, key),
                    Err(StoreError::AlreadyExists(_)) => {
                        debug!("{} {} appeared concurrently", K::KIND, key)
                    }
                    Err(e) => return Err(Error::child_op(StoreOp::Create, K::KIND, &key.name, e)),
                }
                Ok(())
            }
            Err(e) => Err(Error::child_op(StoreOp::Get, K::KIND, &key.name, e)),
        }
    }
}

/// Every one of the `size` members is running and ready.
fn members_ready(members: &[Pod], size: i32) -> bool {
    size > 0 && members.iter().filter(|p| p.is_ready()).count() >= size as usize
}

/// Fill a new key Secret with fresh key material. Only called on create, so
/// the key of an existing replset never changes.
fn add_key_material(secret: &mut pkg_types::secret::Secret) {
    secret
        .string_data
        .insert(KEY_SECRET_DATA_KEY.to_string(), generate_key());
}

/// 96 hex characters: valid replset key-file content.
fn generate_key() -> String {
    (0..3)
        .map(|_| uuid::Uuid::new_v4().simple().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ_and_are_hex() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), 96);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn readiness_requires_full_size() {
        let mut ready = Pod::default();
        ready.status.phase = pkg_types::pod::PodPhase::Running;
        ready.status.conditions.push(pkg_types::pod::PodCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
        });
        assert!(!members_ready(&[ready.clone()], 2));
        assert!(members_ready(&[ready.clone(), ready.clone()], 2));
        assert!(!members_ready(&[Pod::default(), ready], 2));
        assert!(!members_ready(&[], 0));
    }
}
