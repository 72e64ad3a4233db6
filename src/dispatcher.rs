//! Request routing (`spec.md` §4.H): which node a KV operation or an HTTP
//! call should land on. KV routing is a pure function of a key and the
//! current `ClusterConfig` snapshot; HTTP routing is a minimal round-robin
//! `NodeSelector`, since HTTP request bodies themselves are out of scope
//! (`spec.md` §1).

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{ClusterConfig, Node};
use crate::crc32::vbucket_for_key;
use crate::error::{ErrorKind, KvError};

/// Target vbucket for `key` given the bucket's vbucket count
/// (`spec.md` §4.H: `(crc32_ieee(key) >> 16) & 0x7fff % vbucket_count`).
pub fn vbucket_for(key: &[u8], vbucket_count: usize) -> usize {
  vbucket_for_key(key, vbucket_count)
}

/// Resolves the active node that owns `vbucket` in `config`.
pub fn active_node_for_vbucket(config: &ClusterConfig, vbucket: usize) -> Result<&Node, KvError> {
  let index = config
    .vbucket_map
    .active_node_index(vbucket)
    .filter(|i| *i >= 0)
    .ok_or_else(|| KvError::new(ErrorKind::ServiceNotAvailable))?;
  config.nodes.get(index as usize).ok_or_else(|| KvError::new(ErrorKind::ServiceNotAvailable))
}

/// Resolves the node a key should be dispatched to, combining vbucket
/// hashing with the active-node lookup in one call.
pub fn node_for_key<'a>(config: &'a ClusterConfig, key: &[u8]) -> Result<(&'a Node, usize), KvError> {
  let vbucket_count = config.vbucket_map.map.len();
  if vbucket_count == 0 {
    return Err(KvError::new(ErrorKind::ServiceNotAvailable));
  }
  let vbucket = vbucket_for(key, vbucket_count);
  let node = active_node_for_vbucket(config, vbucket)?;
  Ok((node, vbucket))
}

/// Chooses among a cluster's nodes for HTTP-style (management/query/search/
/// analytics) requests, which have no vbucket concept of their own
/// (`spec.md` §4.H). `use_any_session` (`ClientOptions`) governs whether a
/// fresh round-robin pick is taken on every call, or the same node is kept
/// sticky for the session's lifetime.
pub trait NodeSelector {
  fn select<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node>;
}

/// Plain round-robin over whichever node list is handed in; stateless aside
/// from the rotating counter, so callers can share one instance across
/// many requests.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
  next: AtomicUsize,
}

impl RoundRobinSelector {
  pub fn new() -> Self {
    Self { next: AtomicUsize::new(0) }
  }
}

impl NodeSelector for RoundRobinSelector {
  fn select<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
    if nodes.is_empty() {
      return None;
    }
    let index = self.next.fetch_add(1, Ordering::Relaxed) % nodes.len();
    nodes.get(index)
  }
}

/// Always returns the same node (index 0), used when `use_any_session` is
/// `false` and a session must stick to one node for its lifetime.
#[derive(Debug, Default)]
pub struct StickySelector {
  pinned: std::sync::Mutex<Option<usize>>,
}

impl StickySelector {
  pub fn new() -> Self {
    Self::default()
  }
}

impl NodeSelector for StickySelector {
  fn select<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
    if nodes.is_empty() {
      return None;
    }
    let mut pinned = self.pinned.lock().unwrap();
    let index = *pinned.get_or_insert(0) % nodes.len();
    nodes.get(index)
  }
}

/// Picks a [`NodeSelector`] per `ClientOptions::use_any_session`
/// (`spec.md` §4.H).
pub fn selector_for(use_any_session: bool) -> Box<dyn NodeSelector + Send + Sync> {
  if use_any_session {
    Box::new(RoundRobinSelector::new())
  } else {
    Box::new(StickySelector::new())
  }
}
