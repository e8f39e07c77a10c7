//! The instance registry: which user currently owns which instance.
//!
//! # Concurrency note
//!
//! All membership changes go through one `tokio::sync::RwLock`. Reads
//! (`get`, `len`, `snapshot`) share it; `upsert` and `remove` take it
//! exclusively. The lock covers membership only and is never held while
//! calling into the protocol layer: every method returns the affected
//! `Arc<Instance>` so the caller can disconnect it after the guard is gone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::Instance;

/// Maps user ids to their registered [`Instance`].
///
/// At most one instance exists per user id (key invariant).
pub struct InstanceRegistry<H> {
    instances: RwLock<HashMap<String, Arc<Instance<H>>>>,
}

impl<H> InstanceRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up the instance for `user_id`.
    pub async fn get(&self, user_id: &str) -> Option<Arc<Instance<H>>> {
        self.instances.read().await.get(user_id).cloned()
    }

    /// Registers `instance` under `user_id`.
    ///
    /// Returns the instance it displaced, if any. The caller owns the
    /// displaced instance's teardown.
    pub async fn upsert(
        &self,
        user_id: &str,
        instance: Arc<Instance<H>>,
    ) -> Option<Arc<Instance<H>>> {
        self.instances
            .write()
            .await
            .insert(user_id.to_string(), instance)
    }

    /// Unregisters and returns the instance for `user_id`.
    pub async fn remove(&self, user_id: &str) -> Option<Arc<Instance<H>>> {
        self.instances.write().await.remove(user_id)
    }

    /// Unregisters `user_id` only if it still maps to `expected`.
    ///
    /// Used when a caller looked an instance up, decided to replace it,
    /// and must not remove a newer one registered in the meantime.
    /// Returns whether anything was removed.
    pub async fn remove_exact(
        &self,
        user_id: &str,
        expected: &Arc<Instance<H>>,
    ) -> bool {
        let mut instances = self.instances.write().await;
        match instances.get(user_id) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                instances.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Number of registered instances.
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Returns `true` if nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Clones out every registered instance, sorted by user id.
    ///
    /// Lets callers query handles without holding the registry lock.
    pub async fn snapshot(&self) -> Vec<Arc<Instance<H>>> {
        let mut all: Vec<_> =
            self.instances.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.user_id().cmp(b.user_id()));
        all
    }
}

impl<H> Default for InstanceRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(user_id: &str, code: &str) -> Arc<Instance<()>> {
        Arc::new(Instance::pending(user_id, (), code.to_string()))
    }

    #[tokio::test]
    async fn test_get_unknown_returns_none() {
        let registry = InstanceRegistry::<()>::new();

        assert!(registry.get("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_new_key_returns_none() {
        let registry = InstanceRegistry::new();

        let displaced = registry.upsert("alice", instance("alice", "c1")).await;

        assert!(displaced.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_existing_key_returns_displaced() {
        let registry = InstanceRegistry::new();
        let first = instance("alice", "c1");
        registry.upsert("alice", Arc::clone(&first)).await;

        let displaced = registry
            .upsert("alice", instance("alice", "c2"))
            .await
            .expect("first instance should be displaced");

        assert!(Arc::ptr_eq(&displaced, &first));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("alice").await.unwrap().pairing_code(), "c2");
    }

    #[tokio::test]
    async fn test_remove_returns_instance_once() {
        let registry = InstanceRegistry::new();
        registry.upsert("alice", instance("alice", "c1")).await;

        assert!(registry.remove("alice").await.is_some());
        assert!(registry.remove("alice").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_exact_skips_newer_instance() {
        let registry = InstanceRegistry::new();
        let old = instance("alice", "c1");
        registry.upsert("alice", Arc::clone(&old)).await;
        registry.upsert("alice", instance("alice", "c2")).await;

        assert!(!registry.remove_exact("alice", &old).await);
        assert_eq!(registry.get("alice").await.unwrap().pairing_code(), "c2");
    }

    #[tokio::test]
    async fn test_remove_exact_removes_matching_instance() {
        let registry = InstanceRegistry::new();
        let current = instance("alice", "c1");
        registry.upsert("alice", Arc::clone(&current)).await;

        assert!(registry.remove_exact("alice", &current).await);
        assert!(registry.get("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted_by_user_id() {
        let registry = InstanceRegistry::new();
        registry.upsert("carol", instance("carol", "c")).await;
        registry.upsert("alice", instance("alice", "a")).await;
        registry.upsert("bob", instance("bob", "b")).await;

        let ids: Vec<String> = registry
            .snapshot()
            .await
            .iter()
            .map(|i| i.user_id().to_string())
            .collect();

        assert_eq!(ids, ["alice", "bob", "carol"]);
    }
}
