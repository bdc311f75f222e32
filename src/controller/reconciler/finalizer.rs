//! # Finalizers
//!
//! Add / remove finalizers through a [`ResourceStore`].

use crate::controller::reconciler::ReconcilerError;
use crate::store::{ResourceStore, StoredResource};
use kube::ResourceExt;
use tracing::debug;

pub fn has_finalizer<K: StoredResource>(resource: &K, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}

pub fn is_deleting<K: StoredResource>(resource: &K) -> bool {
    resource.meta().deletion_timestamp.is_some()
}

/// Add the finalizer if missing; returns the persisted object
pub async fn ensure_finalizer<K: StoredResource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
    finalizer: &str,
) -> Result<K, ReconcilerError> {
    if has_finalizer(resource, finalizer) {
        return Ok(resource.clone());
    }

    let mut updated = resource.clone();
    updated.finalizers_mut().push(finalizer.to_string());
    let persisted = store.update(&updated).await.map_err(ReconcilerError::Store)?;
    debug!(
        resource = %resource.name_any(),
        finalizer,
        "Added finalizer"
    );
    Ok(persisted)
}

/// Remove the finalizer if present
pub async fn remove_finalizer<K: StoredResource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
    finalizer: &str,
) -> Result<(), ReconcilerError> {
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let mut updated = resource.clone();
    updated.finalizers_mut().retain(|f| f != finalizer);
    store.update(&updated).await.map_err(ReconcilerError::Store)?;
    debug!(
        resource = %resource.name_any(),
        finalizer,
        "Removed finalizer"
    );
    Ok(())
}
