//! Collection UID resolution (`spec.md` §4.D), grounded on
//! `other_examples` `ops_core.rs`'s `get_collection_id` request/response
//! shape for the wire contract, with the single-flight cache pattern
//! following this crate's `config::ConfigurationMonitor` serialization
//! style (a mutex held across the whole resolution, not just the map edit).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCollection {
  pub manifest_uid: u64,
  pub collection_uid: u32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
  scope: String,
  collection: String,
}

enum Slot {
  Resolving(Arc<Notify>),
  Resolved(ResolvedCollection),
}

/// Per-connection `(scope, collection) -> (manifest_uid, collection_uid)`
/// cache with single-flight coalescing and manifest-driven invalidation
/// (`spec.md` §3 invariants: "invalidated whenever a new manifest UID is
/// observed", "or if the server returns unknown_collection for a
/// previously cached entry").
pub struct CollectionResolver {
  entries: Mutex<HashMap<CacheKey, Slot>>,
}

impl CollectionResolver {
  pub fn new() -> Self {
    Self { entries: Mutex::new(HashMap::new()) }
  }

  /// Resolves `scope.collection`, invoking `fetch` at most once per
  /// concurrent set of waiters for the same key.
  pub async fn resolve<F, Fut>(&self, scope: &str, collection: &str, fetch: F) -> ResolvedCollection
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ResolvedCollection>,
  {
    let key = CacheKey { scope: scope.to_string(), collection: collection.to_string() };

    loop {
      let mut entries = self.entries.lock().await;
      match entries.get(&key) {
        Some(Slot::Resolved(resolved)) => return *resolved,
        Some(Slot::Resolving(notify)) => {
          let notify = notify.clone();
          // Register interest in the notification before releasing the
          // lock: `notify_waiters()` only wakes futures that were already
          // polled (or explicitly `enable()`d), so waiting to subscribe
          // until after the unlock would race a `fetch` that finishes in
          // the gap and hang this waiter forever.
          let notified = notify.notified();
          tokio::pin!(notified);
          notified.as_mut().enable();
          drop(entries);
          notified.await;
        }
        None => {
          let notify = Arc::new(Notify::new());
          entries.insert(key.clone(), Slot::Resolving(notify.clone()));
          drop(entries);
          let resolved = fetch().await;
          let mut entries = self.entries.lock().await;
          entries.insert(key.clone(), Slot::Resolved(resolved));
          notify.notify_waiters();
          return resolved;
        }
      }
    }
  }

  /// Drops every cached entry whose `manifest_uid` is now stale
  /// (`spec.md` §3: "invalidated whenever a new manifest UID is observed").
  pub async fn invalidate_stale(&self, current_manifest_uid: u64) {
    let mut entries = self.entries.lock().await;
    entries.retain(|_, slot| !matches!(slot, Slot::Resolved(r) if r.manifest_uid != current_manifest_uid));
  }

  /// Drops a single entry after the server reports `unknown_collection`
  /// for a previously cached resolution.
  pub async fn invalidate(&self, scope: &str, collection: &str) {
    let key = CacheKey { scope: scope.to_string(), collection: collection.to_string() };
    self.entries.lock().await.remove(&key);
  }
}

impl Default for CollectionResolver {
  fn default() -> Self {
    Self::new()
  }
}

/// Assembles the `scope.collection` path sent as the request value for
/// opcode `get_collection_id`.
pub fn collection_path(scope: &str, collection: &str) -> Vec<u8> {
  format!("{scope}.{collection}").into_bytes()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test]
  async fn concurrent_resolutions_for_the_same_key_coalesce_into_one_fetch() {
    let resolver = Arc::new(CollectionResolver::new());
    let fetch_count = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
      let resolver = resolver.clone();
      let fetch_count = fetch_count.clone();
      handles.push(tokio::spawn(async move {
        resolver
          .resolve("inventory", "airline", || async move {
            fetch_count.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            ResolvedCollection { manifest_uid: 1, collection_uid: 9 }
          })
          .await
      }));
    }

    for handle in handles {
      let resolved = handle.await.unwrap();
      assert_eq!(resolved.collection_uid, 9);
    }

    assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn stale_manifest_uid_evicts_the_entry() {
    let resolver = CollectionResolver::new();
    resolver
      .resolve("inventory", "airline", || async { ResolvedCollection { manifest_uid: 1, collection_uid: 9 } })
      .await;

    resolver.invalidate_stale(2).await;

    let mut refetched = false;
    resolver
      .resolve("inventory", "airline", || async {
        refetched = true;
        ResolvedCollection { manifest_uid: 2, collection_uid: 9 }
      })
      .await;
    assert!(refetched);
  }

  #[test]
  fn collection_path_joins_scope_and_collection_with_a_dot() {
    assert_eq!(collection_path("inventory", "airline"), b"inventory.airline");
  }
}
