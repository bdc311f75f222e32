//! In-memory [`ResourceStore`] mirroring the API server's finalizer semantics.
//!
//! - Objects get a `uid`, `generation` and `resourceVersion` on insert
//! - Deleting an object that still carries finalizers only sets its
//!   `deletionTimestamp`; it disappears once the last finalizer is removed

use super::{ResourceStore, StoredResource};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

type Key = (String, String);

pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<Key, K>>,
    version: AtomicU64,
    status_writes: AtomicU64,
    read_error: Mutex<Option<String>>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            status_writes: AtomicU64::new(0),
            read_error: Mutex::new(None),
        }
    }
}

fn key_of<K: StoredResource>(resource: &K) -> Key {
    (resource.namespace().unwrap_or_default(), resource.name_any())
}

fn key(namespace: Option<&str>, name: &str) -> Key {
    (namespace.unwrap_or_default().to_string(), name.to_string())
}

impl<K: StoredResource> MemoryStore<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Create or replace an object, bumping its generation when it existed
    pub async fn apply(&self, mut resource: K) -> K {
        let mut objects = self.objects.lock().await;
        let key = key_of(&resource);
        let meta = resource.meta_mut();
        match objects.get(&key) {
            Some(existing) => {
                let existing_meta = existing.meta();
                meta.uid.clone_from(&existing_meta.uid);
                meta.generation = Some(existing_meta.generation.unwrap_or(1) + 1);
            }
            None => {
                meta.uid = Some(format!("uid-{}-{}", key.0, key.1));
                meta.generation = Some(1);
            }
        }
        meta.resource_version = Some(self.next_version());
        objects.insert(key, resource.clone());
        resource
    }

    /// Request deletion; objects with finalizers are only marked
    ///
    /// # Errors
    /// Fails when the marked object cannot be round-tripped through JSON
    pub async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<()> {
        let mut objects = self.objects.lock().await;
        let key = key(namespace, name);
        let Some(existing) = objects.get(&key) else {
            return Ok(());
        };
        if existing.finalizers().is_empty() {
            objects.remove(&key);
            return Ok(());
        }

        let mut value = serde_json::to_value(existing).context("Failed to serialize object")?;
        value["metadata"]["deletionTimestamp"] = Value::String(
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
        let mut marked: K =
            serde_json::from_value(value).context("Failed to deserialize marked object")?;
        marked.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, marked);
        Ok(())
    }

    /// Remove annotations from a stored object, as `kubectl annotate key-` would
    pub async fn remove_annotation(&self, namespace: Option<&str>, name: &str, annotation: &str) {
        let mut objects = self.objects.lock().await;
        if let Some(object) = objects.get_mut(&key(namespace, name)) {
            object.annotations_mut().remove(annotation);
            object.meta_mut().resource_version = Some(self.next_version());
        }
    }

    pub async fn contains(&self, namespace: Option<&str>, name: &str) -> bool {
        self.objects.lock().await.contains_key(&key(namespace, name))
    }

    /// Make `get` fail with `message` until reset with `None`
    pub async fn fail_reads_with(&self, message: Option<&str>) {
        *self.read_error.lock().await = message.map(str::to_string);
    }

    /// Number of `update_status` calls served
    #[must_use]
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<K: StoredResource> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        if let Some(message) = self.read_error.lock().await.as_deref() {
            return Err(anyhow!("{message}"));
        }
        Ok(self.objects.lock().await.get(&key(namespace, name)).cloned())
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let mut objects = self.objects.lock().await;
        let key = key_of(resource);
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| anyhow!("{} {} not found", K::kind(&()), key.1))?;

        if stored.resource_version() != resource.resource_version() {
            return Err(anyhow!(
                "Conflict updating {} {}: resource version changed",
                K::kind(&()),
                key.1
            ));
        }

        stored.meta_mut().finalizers = resource.meta().finalizers.clone();
        stored.meta_mut().resource_version = Some(self.next_version());
        let updated = stored.clone();

        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(updated)
    }

    async fn update_status(&self, resource: &K) -> Result<K> {
        let mut objects = self.objects.lock().await;
        let key = key_of(resource);
        let stored = objects
            .get(&key)
            .ok_or_else(|| anyhow!("{} {} not found", K::kind(&()), key.1))?;

        let mut value = serde_json::to_value(stored).context("Failed to serialize object")?;
        let status = serde_json::to_value(resource)
            .context("Failed to serialize status")?
            .get("status")
            .cloned()
            .unwrap_or(Value::Null);
        value["status"] = status;

        let mut updated: K =
            serde_json::from_value(value).context("Failed to deserialize object")?;
        updated.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, updated.clone());
        self.status_writes.fetch_add(1, Ordering::Relaxed);
        Ok(updated)
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns.as_str()))
            .map(|(_, object)| object.clone())
            .collect())
    }
}
