use async_trait::async_trait;
use pkg_types::kind::{Kind, Resource};
use pkg_types::meta::{Labels, ObjectMeta, matches_selector};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::{ObjectStore, StoreOp};
use crate::error::StoreError;

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: StoreOp,
    pub kind: Kind,
    pub name: String,
}

type ObjectId = (Kind, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectId, Value>,
    calls: Vec<Call>,
    failures: Vec<(StoreOp, Kind)>,
    next_version: u64,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn record(&mut self, op: StoreOp, kind: Kind, name: &str) -> Result<(), StoreError> {
        self.calls.push(Call {
            op,
            kind,
            name: name.to_string(),
        });
        if let Some(pos) = self.failures.iter().position(|f| *f == (op, kind)) {
            self.failures.remove(pos);
            return Err(StoreError::Api {
                status: 503,
                target: format!("{} {}", kind, name),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// In-process object store.
///
/// Behaves like the API server for the calls the operator makes: assigns uids
/// and resource versions, rejects duplicate creates and stale updates, and
/// keeps `status` apart from the rest of the object. Every call is recorded so
/// callers can assert on the exact operations issued.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without recording a call.
    pub fn insert<K: Resource>(&self, obj: &K) -> Result<K, StoreError> {
        let mut value = serde_json::to_value(obj)?;
        let meta = obj.metadata();
        let mut inner = self.lock();
        let version = inner.bump_version();
        stamp(&mut value, meta, &version);
        inner.objects.insert(
            (K::KIND, meta.namespace.clone(), meta.name.clone()),
            value.clone(),
        );
        Ok(serde_json::from_value(value)?)
    }

    /// Current stored copy of an object, without recording a call.
    pub fn object<K: Resource>(&self, namespace: &str, name: &str) -> Option<K> {
        let inner = self.lock();
        let value = inner
            .objects
            .get(&(K::KIND, namespace.to_string(), name.to_string()))?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn remove(&self, kind: Kind, namespace: &str, name: &str) -> bool {
        self.lock()
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: StoreOp, kind: Kind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next `op` on `kind` fail with a 503.
    pub fn fail_next(&self, op: StoreOp, kind: Kind) {
        self.lock().failures.push((op, kind));
    }
}

/// Fill in the server-assigned metadata fields.
fn stamp(value: &mut Value, meta: &ObjectMeta, version: &str) {
    let uid = if meta.uid.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        meta.uid.clone()
    };
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("uid".to_string(), Value::String(uid));
        metadata.insert(
            "resourceVersion".to_string(),
            Value::String(version.to_string()),
        );
    }
}

fn metadata_of(value: &Value) -> Result<ObjectMeta, StoreError> {
    let meta = value.get("metadata").cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(meta)?)
}

fn target(kind: Kind, namespace: &str, name: &str) -> String {
    format!("{} {}/{}", kind, namespace, name)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create(&self, kind: Kind, namespace: &str, object: Value) -> Result<Value, StoreError> {
        let mut meta = metadata_of(&object)?;
        let mut inner = self.lock();
        inner.record(StoreOp::Create, kind, &meta.name)?;

        let id = (kind, namespace.to_string(), meta.name.clone());
        if inner.objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists(target(kind, namespace, &meta.name)));
        }
        meta.uid.clear();
        let mut value = object;
        if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert(
                "namespace".to_string(),
                Value::String(namespace.to_string()),
            );
        }
        let version = inner.bump_version();
        stamp(&mut value, &meta, &version);
        inner.objects.insert(id, value.clone());
        Ok(value)
    }

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Value, StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::Get, kind, name)?;
        inner
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(target(kind, namespace, name)))
    }

    async fn update(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, StoreError> {
        let meta = metadata_of(&object)?;
        let mut inner = self.lock();
        inner.record(StoreOp::Update, kind, name)?;

        let id = (kind, namespace.to_string(), name.to_string());
        let stored = inner
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(target(kind, namespace, name)))?;
        let stored_meta = metadata_of(&stored)?;
        if meta.resource_version.is_some() && meta.resource_version != stored_meta.resource_version
        {
            return Err(StoreError::Conflict(target(kind, namespace, name)));
        }

        let mut value = object;
        // Status only changes through update_status.
        if let Some(obj) = value.as_object_mut() {
            match stored.get("status") {
                Some(status) => {
                    obj.insert("status".to_string(), status.clone());
                }
                None => {
                    obj.remove("status");
                }
            }
        }
        let version = inner.bump_version();
        stamp(&mut value, &stored_meta, &version);
        inner.objects.insert(id, value.clone());
        Ok(value)
    }

    async fn update_status(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, StoreError> {
        let meta = metadata_of(&object)?;
        let mut inner = self.lock();
        inner.record(StoreOp::UpdateStatus, kind, name)?;

        let id = (kind, namespace.to_string(), name.to_string());
        let mut stored = inner
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(target(kind, namespace, name)))?;
        let stored_meta = metadata_of(&stored)?;
        if meta.resource_version.is_some() && meta.resource_version != stored_meta.resource_version
        {
            return Err(StoreError::Conflict(target(kind, namespace, name)));
        }

        if let Some(obj) = stored.as_object_mut() {
            let status = object.get("status").cloned().unwrap_or(Value::Null);
            obj.insert("status".to_string(), status);
        }
        let version = inner.bump_version();
        stamp(&mut stored, &stored_meta, &version);
        inner.objects.insert(id, stored.clone());
        Ok(stored)
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<Value>, StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::List, kind, namespace)?;

        let mut items = Vec::new();
        for ((k, ns, _), value) in inner.objects.iter() {
            if *k != kind || ns != namespace {
                continue;
            }
            if matches_selector(&metadata_of(value)?.labels, selector) {
                items.push(value.clone());
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Api;
    use pkg_types::meta::ObjectMeta;
    use pkg_types::secret::Secret;

    fn secret(name: &str, app: &str) -> Secret {
        let mut meta = ObjectMeta::named("test", name);
        meta.labels.insert("app".to_string(), app.to_string());
        Secret {
            metadata: meta,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_identity_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let api: Api<Secret> = Api::namespaced(Arc::new(store.clone()), "test");

        let created = api.create(&secret("key", "db")).await.unwrap();
        assert!(!created.metadata.uid.is_empty());
        assert!(created.metadata.resource_version.is_some());

        let err = api.create(&secret("key", "db")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.count(StoreOp::Create, Kind::Secret), 2);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let api: Api<Secret> = Api::namespaced(Arc::new(store), "test");
        assert!(api.get("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = MemoryStore::new();
        let api: Api<Secret> = Api::namespaced(Arc::new(store.clone()), "test");
        let first = api.create(&secret("key", "db")).await.unwrap();
        let second = api.update(&first).await.unwrap();
        assert_ne!(first.metadata.resource_version, second.metadata.resource_version);

        let err = api.update(&first).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_filters_by_selector() {
        let store = MemoryStore::new();
        store.insert(&secret("a", "db")).unwrap();
        store.insert(&secret("b", "web")).unwrap();
        let api: Api<Secret> = Api::namespaced(Arc::new(store), "test");

        let mut selector = Labels::new();
        selector.insert("app".to_string(), "db".to_string());
        let found = api.list(&selector).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name, "a");
        assert_eq!(api.list(&Labels::new()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Get, Kind::Secret);
        store.insert(&secret("key", "db")).unwrap();
        let api: Api<Secret> = Api::namespaced(Arc::new(store), "test");

        assert!(matches!(
            api.get("key").await.unwrap_err(),
            StoreError::Api { status: 503, .. }
        ));
        assert!(api.get("key").await.is_ok());
    }
}
