//! # Resource Store
//!
//! Persistence seam between the reconcilers and the Kubernetes API.
//!
//! - [`KubeStore`] reads through `kube::Api` and writes JSON merge patches
//! - [`MemoryStore`] keeps objects in memory and honours finalizer-gated
//!   deletion; reconciler tests run against it

mod memory;

pub use memory::MemoryStore;

use crate::constants::FIELD_MANAGER;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams};
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Bounds shared by every resource kind the stores handle
pub trait StoredResource:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoredResource for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
pub trait ResourceStore<K: StoredResource>: Send + Sync {
    /// Current object, `None` once it is gone
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>;

    /// Persist metadata changes (finalizers)
    async fn update(&self, resource: &K) -> Result<K>;

    /// Persist the status subresource
    async fn update_status(&self, resource: &K) -> Result<K>;

    /// All objects, optionally restricted to one namespace
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>>;
}

type ApiFor<K> = fn(Client, Option<&str>) -> Api<K>;

/// Store backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    api_for: ApiFor<K>,
}

fn namespaced_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn cluster_api<K>(client: Client, _namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
{
    Api::all(client)
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    pub fn namespaced(client: Client) -> Self {
        Self {
            client,
            api_for: namespaced_api::<K>,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
{
    pub fn cluster(client: Client) -> Self {
        Self {
            client,
            api_for: cluster_api::<K>,
        }
    }
}

impl<K> KubeStore<K> {
    fn api(&self, namespace: Option<&str>) -> Api<K> {
        (self.api_for)(self.client.clone(), namespace)
    }
}

fn patch_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER)
}

#[async_trait]
impl<K: StoredResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        self.api(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get {} {}", K::kind(&()), name))
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let name = resource.name_any();
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": resource.finalizers(),
                "resourceVersion": resource.resource_version(),
            }
        });
        self.api(resource.namespace().as_deref())
            .patch(&name, &patch_params(), &Patch::Merge(patch))
            .await
            .with_context(|| format!("Failed to update finalizers of {} {}", K::kind(&()), name))
    }

    async fn update_status(&self, resource: &K) -> Result<K> {
        let name = resource.name_any();
        let value = serde_json::to_value(resource)
            .with_context(|| format!("Failed to serialize {} {}", K::kind(&()), name))?;
        let patch = serde_json::json!({
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null)
        });
        self.api(resource.namespace().as_deref())
            .patch_status(&name, &patch_params(), &Patch::Merge(patch))
            .await
            .with_context(|| format!("Failed to update status of {} {}", K::kind(&()), name))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        let list = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {}", K::plural(&())))?;
        Ok(list.items)
    }
}
