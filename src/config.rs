//! Cluster configuration data model and monitor (`spec.md` §3 "Cluster
//! configuration"/"Collections manifest", §4.F), grounded on
//! `original_source/ext/couchbase/configuration_monitor.hxx`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// Per-service TCP port a node exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PortMap {
  pub kv: Option<u16>,
  pub kv_ssl: Option<u16>,
  pub mgmt: Option<u16>,
  pub mgmt_ssl: Option<u16>,
  pub views: Option<u16>,
  pub query: Option<u16>,
  pub search: Option<u16>,
  pub analytics: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Node {
  pub hostname: String,
  pub ports: PortMap,
  #[serde(default)]
  pub this_node: bool,
}

/// Array of length N (typically 1024); entry `i` is `[active, replica1, ...]`
/// node indices into `ClusterConfig::nodes`, `-1` meaning "no owner yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct VbucketMap {
  pub map: Vec<Vec<i32>>,
}

impl VbucketMap {
  pub fn active_node_index(&self, vbucket: usize) -> Option<i32> {
    self.map.get(vbucket).and_then(|owners| owners.first()).copied()
  }

  pub fn replica_node_indices(&self, vbucket: usize) -> &[i32] {
    self.map.get(vbucket).map(|owners| &owners[1.min(owners.len())..]).unwrap_or(&[])
  }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CollectionDescriptor {
  pub uid: u32,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ScopeDescriptor {
  pub uid: u32,
  pub name: String,
  pub collections: Vec<CollectionDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CollectionsManifest {
  pub uid: u64,
  pub scopes: Vec<ScopeDescriptor>,
}

/// A cluster or bucket-scoped topology snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ClusterConfig {
  pub rev_epoch: u64,
  pub rev: u64,
  pub bucket: Option<String>,
  pub nodes: Vec<Node>,
  pub vbucket_map: VbucketMap,
}

impl ClusterConfig {
  /// Configuration replacement happens only when `(rev_epoch, rev)` is
  /// strictly greater than the currently stored value (`spec.md` §3 invariants).
  pub fn supersedes(&self, current: &ClusterConfig) -> bool {
    (self.rev_epoch, self.rev) > (current.rev_epoch, current.rev)
  }
}

pub type Listener = Arc<dyn Fn(Arc<ClusterConfig>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Inner {
  next_token: u64,
  global_listeners: HashMap<u64, Listener>,
  bucket_listeners: HashMap<String, HashMap<u64, Listener>>,
  global_config: Option<Arc<ClusterConfig>>,
  bucket_configs: HashMap<String, Arc<ClusterConfig>>,
}

impl Inner {
  fn new() -> Self {
    Self {
      next_token: 0,
      global_listeners: HashMap::new(),
      bucket_listeners: HashMap::new(),
      global_config: None,
      bucket_configs: HashMap::new(),
    }
  }

  fn allocate_token(&mut self) -> u64 {
    let token = self.next_token;
    self.next_token += 1;
    token
  }
}

/// Fans topology updates out to subscribers, one callback at a time
/// (`spec.md` §4.F). The original asio::strand serialization is reproduced
/// here by holding the single mutex across the whole dispatch loop of a
/// `post`, rather than only around the map mutation.
pub struct ConfigurationMonitor {
  inner: Mutex<Inner>,
}

impl ConfigurationMonitor {
  pub fn new() -> Self {
    Self { inner: Mutex::new(Inner::new()) }
  }

  pub async fn subscribe(&self, listener: Listener) -> SubscriptionToken {
    let mut inner = self.inner.lock().await;
    let token = inner.allocate_token();
    inner.global_listeners.insert(token, listener);
    SubscriptionToken(token)
  }

  pub async fn subscribe_bucket(&self, bucket: impl Into<String>, listener: Listener) -> SubscriptionToken {
    let mut inner = self.inner.lock().await;
    let token = inner.allocate_token();
    inner.bucket_listeners.entry(bucket.into()).or_default().insert(token, listener);
    SubscriptionToken(token)
  }

  /// Unsubscribing an absent token is a no-op (`spec.md` §4.F).
  pub async fn unsubscribe(&self, token: SubscriptionToken) {
    let mut inner = self.inner.lock().await;
    inner.global_listeners.remove(&token.0);
  }

  pub async fn unsubscribe_bucket(&self, bucket: &str, token: SubscriptionToken) {
    let mut inner = self.inner.lock().await;
    if let Some(listeners) = inner.bucket_listeners.get_mut(bucket) {
      listeners.remove(&token.0);
    }
  }

  /// Accepts `conf` as the new global configuration if it strictly
  /// supersedes the current one, then dispatches to every global listener
  /// in subscription order.
  pub async fn post(&self, conf: ClusterConfig) {
    let mut inner = self.inner.lock().await;
    let accepted = match &inner.global_config {
      Some(current) if !conf.supersedes(current) => return,
      _ => Arc::new(conf),
    };
    inner.global_config = Some(accepted.clone());

    let mut tokens: Vec<u64> = inner.global_listeners.keys().copied().collect();
    tokens.sort_unstable();
    for token in tokens {
      if let Some(listener) = inner.global_listeners.get(&token) {
        listener(accepted.clone());
      }
    }
  }

  /// Bucket-scoped configurations are still configuration pushes, so global
  /// listeners ("receive every configuration push, regardless of bucket",
  /// `spec.md` §4.F) fire here too, interleaved with the bucket-scoped
  /// listeners in subscription order (tokens are drawn from one shared
  /// counter across both namespaces).
  pub async fn post_bucket(&self, bucket: impl Into<String>, conf: ClusterConfig) {
    let bucket = bucket.into();
    let mut inner = self.inner.lock().await;
    let accepted = match inner.bucket_configs.get(&bucket) {
      Some(current) if !conf.supersedes(current) => return,
      _ => Arc::new(conf),
    };
    inner.bucket_configs.insert(bucket.clone(), accepted.clone());

    let mut tokens: Vec<u64> = inner.global_listeners.keys().copied().collect();
    tokens.extend(inner.bucket_listeners.get(&bucket).into_iter().flat_map(|l| l.keys().copied()));
    tokens.sort_unstable();
    for token in tokens {
      if let Some(listener) = inner.global_listeners.get(&token) {
        listener(accepted.clone());
      } else if let Some(listener) = inner.bucket_listeners.get(&bucket).and_then(|l| l.get(&token)) {
        listener(accepted.clone());
      }
    }
  }
}

impl Default for ConfigurationMonitor {
  fn default() -> Self {
    Self::new()
  }
}

/// Drives the poll side of topology discovery (`spec.md` §4.F source ii):
/// issues `get_cluster_config` on `poll_interval`, never more often than
/// `poll_floor` apart, via whatever transport `fetch` performs.
pub async fn run_poll_loop<F, Fut>(monitor: Arc<ConfigurationMonitor>, poll_interval: Duration, poll_floor: Duration, mut fetch: F)
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = Option<ClusterConfig>>,
{
  let interval = poll_interval.max(poll_floor);
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    ticker.tick().await;
    if let Some(conf) = fetch().await {
      monitor.post(conf).await;
    }
  }
}
