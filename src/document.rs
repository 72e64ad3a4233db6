//! Document addressing and mutation tracking (`spec.md` §3 "Data Model").

use std::fmt;

use crate::error::{ErrorKind, KvError};

/// Keys are opaque byte strings up to this many bytes (`spec.md` §3
/// "Document identity").
pub const MAX_KEY_LEN: usize = 250;

/// Fully qualified address of a document: bucket, scope, collection, key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
  pub bucket: String,
  pub scope: String,
  pub collection: String,
  pub key: Vec<u8>,
}

impl DocumentId {
  pub fn new(bucket: impl Into<String>, scope: impl Into<String>, collection: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
    Self {
      bucket: bucket.into(),
      scope: scope.into(),
      collection: collection.into(),
      key: key.into(),
    }
  }

  /// Shorthand for a document in the default scope and collection.
  pub fn in_default_collection(bucket: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
    Self::new(bucket, "_default", "_default", key)
  }

  pub fn is_default_collection(&self) -> bool {
    self.scope == "_default" && self.collection == "_default"
  }

  /// Rejects keys over `MAX_KEY_LEN` bytes before any request is built for
  /// them (`spec.md` §8 "Key at 250 bytes: accepted; 251 bytes: rejected
  /// pre-send").
  pub fn validate(&self) -> Result<(), KvError> {
    if self.key.len() > MAX_KEY_LEN {
      return Err(KvError::new(ErrorKind::InvalidArgument(format!(
        "key is {} bytes, exceeds the {MAX_KEY_LEN} byte limit",
        self.key.len()
      ))));
    }
    Ok(())
  }
}

impl fmt::Display for DocumentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}/{}", self.bucket, self.scope, self.collection, String::from_utf8_lossy(&self.key))
  }
}

/// Durability/replication position returned by a mutating KV operation, used
/// to build observe-based consistency tokens (`spec.md` §3 "Mutation token").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationToken {
  pub vbucket_id: u16,
  pub vbucket_uuid: u64,
  pub sequence_number: u64,
}

impl MutationToken {
  pub fn new(vbucket_id: u16, vbucket_uuid: u64, sequence_number: u64) -> Self {
    Self { vbucket_id, vbucket_uuid, sequence_number }
  }

  /// A token is only meaningfully ordered against another token from the
  /// same vbucket incarnation; a differing `vbucket_uuid` means the vbucket
  /// failed over in between and sequence numbers are not comparable.
  pub fn happens_before(&self, other: &MutationToken) -> Option<bool> {
    if self.vbucket_id != other.vbucket_id || self.vbucket_uuid != other.vbucket_uuid {
      return None;
    }
    Some(self.sequence_number < other.sequence_number)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_collection_shorthand_uses_the_default_names() {
    let id = DocumentId::in_default_collection("travel-sample", b"airline_10".to_vec());
    assert!(id.is_default_collection());
    assert_eq!(id.scope, "_default");
  }

  #[test]
  fn happens_before_is_none_across_a_vbucket_failover() {
    let a = MutationToken::new(12, 1, 100);
    let b = MutationToken::new(12, 2, 50);
    assert_eq!(a.happens_before(&b), None);
  }

  #[test]
  fn happens_before_orders_tokens_within_the_same_incarnation() {
    let a = MutationToken::new(12, 1, 50);
    let b = MutationToken::new(12, 1, 100);
    assert_eq!(a.happens_before(&b), Some(true));
    assert_eq!(b.happens_before(&a), Some(false));
  }

  #[test]
  fn a_key_at_the_250_byte_limit_is_accepted() {
    let id = DocumentId::in_default_collection("travel-sample", vec![b'k'; 250]);
    assert!(id.validate().is_ok());
  }

  #[test]
  fn a_key_over_the_250_byte_limit_is_rejected() {
    let id = DocumentId::in_default_collection("travel-sample", vec![b'k'; 251]);
    let err = id.validate().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument(_)));
  }
}
