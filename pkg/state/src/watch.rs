use pkg_types::event::Event;
use pkg_types::meta::{Labels, ObjectKey};
use pkg_types::psmdb::PerconaServerMongoDB;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::Api;

/// Lifecycle event feed for the topologies of one namespace.
///
/// Lists topologies on a fixed interval and diffs against the previous pass:
/// new or changed objects produce `Upserted`, vanished ones `Deleted`. Every
/// `full_resync_every` passes all topologies are re-delivered, changed or not.
pub struct TopologyWatcher {
    api: Api<PerconaServerMongoDB>,
    interval: Duration,
    full_resync_every: u64,
    seen: BTreeMap<ObjectKey, PerconaServerMongoDB>,
    pass: u64,
}

impl TopologyWatcher {
    pub fn new(api: Api<PerconaServerMongoDB>, interval: Duration, full_resync_every: u64) -> Self {
        Self {
            api,
            interval,
            full_resync_every: full_resync_every.max(1),
            seen: BTreeMap::new(),
            pass: 0,
        }
    }

    /// Start the watch loop. It ends once the receiving side is dropped.
    pub fn start(mut self, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "TopologyWatcher started (namespace={}, interval={}s)",
                self.api.namespace(),
                self.interval.as_secs()
            );
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                let listed = match self.api.list(&Labels::new()).await {
                    Ok(listed) => listed,
                    Err(e) => {
                        warn!("TopologyWatcher list error: {}", e);
                        continue;
                    }
                };
                for event in self.observe(listed) {
                    debug!("TopologyWatcher: {}", event);
                    if tx.send(event).await.is_err() {
                        info!("TopologyWatcher stopped: event receiver closed");
                        return;
                    }
                }
            }
        })
    }

    /// Diff one listing against the previous pass.
    pub fn observe(&mut self, listed: Vec<PerconaServerMongoDB>) -> Vec<Event> {
        let full_resync = self.pass % self.full_resync_every == 0;
        self.pass += 1;

        let mut events = Vec::new();
        let mut current = BTreeMap::new();
        for obj in listed {
            let key = ObjectKey::of(&obj.metadata);
            let changed = self.seen.get(&key) != Some(&obj);
            if changed || full_resync {
                events.push(Event::from_notification(obj.clone(), false));
            }
            current.insert(key, obj);
        }
        for (key, obj) in std::mem::take(&mut self.seen) {
            if !current.contains_key(&key) {
                events.push(Event::from_notification(obj, true));
            }
        }
        self.seen = current;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pkg_types::psmdb::PerconaServerMongoDBSpec;
    use std::sync::Arc;

    fn watcher(full_resync_every: u64) -> TopologyWatcher {
        let api = Api::namespaced(Arc::new(MemoryStore::new()), "test");
        TopologyWatcher::new(api, Duration::from_secs(1), full_resync_every)
    }

    fn topology(name: &str) -> PerconaServerMongoDB {
        PerconaServerMongoDB::new("test", name, PerconaServerMongoDBSpec::default())
    }

    #[test]
    fn first_pass_upserts_everything() {
        let mut w = watcher(100);
        let events = w.observe(vec![topology("a"), topology("b")]);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, Event::Upserted(_))));
    }

    #[test]
    fn unchanged_objects_are_quiet_until_full_resync() {
        let mut w = watcher(3);
        w.observe(vec![topology("a")]);
        assert!(w.observe(vec![topology("a")]).is_empty());
        assert!(w.observe(vec![topology("a")]).is_empty());
        let events = w.observe(vec![topology("a")]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn changed_object_is_upserted() {
        let mut w = watcher(100);
        w.observe(vec![topology("a")]);
        let mut changed = topology("a");
        changed.spec.version = "4.0".to_string();
        let events = w.observe(vec![changed.clone()]);
        assert_eq!(events, vec![Event::Upserted(changed)]);
    }

    #[test]
    fn vanished_object_is_deleted() {
        let mut w = watcher(100);
        w.observe(vec![topology("a"), topology("b")]);
        let events = w.observe(vec![topology("a")]);
        assert_eq!(events, vec![Event::Deleted(topology("b"))]);
    }

    #[tokio::test]
    async fn loop_delivers_seeded_topologies() {
        let store = MemoryStore::new();
        store.insert(&topology("a")).unwrap();
        let api = Api::namespaced(Arc::new(store), "test");
        let (tx, mut rx) = mpsc::channel(8);
        let handle = TopologyWatcher::new(api, Duration::from_millis(10), 100).start(tx);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key(), ObjectKey::new("test", "a"));
        assert!(matches!(event, Event::Upserted(_)));

        drop(rx);
        handle.abort();
    }
}
