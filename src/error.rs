//! Logical error kinds surfaced to callers, independent of wire status codes.
//!
//! A [`ServerError`] carries the wire-level detail (status, opaque, enhanced
//! error info); it converts into a [`KvError`] that callers match on without
//! caring which opcode or transport produced it.

use std::collections::HashSet;
use std::fmt;

use crate::opcode::{OpCode, Status};
use crate::retry::RetryReason;

/// Error kinds common to every service (`spec.md` §7, "Common").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
  #[error("request cancelled")]
  RequestCancelled,
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
  #[error("service not available")]
  ServiceNotAvailable,
  #[error("internal server failure")]
  InternalServerFailure,
  #[error("authentication failure")]
  AuthenticationFailure,
  #[error("temporary failure")]
  TemporaryFailure,
  #[error("parsing failure")]
  ParsingFailure,
  #[error("cas mismatch")]
  CasMismatch,
  #[error("bucket not found")]
  BucketNotFound,
  #[error("collection not found")]
  CollectionNotFound,
  #[error("scope not found")]
  ScopeNotFound,
  #[error("unsupported operation")]
  UnsupportedOperation,
  #[error("ambiguous timeout")]
  AmbiguousTimeout,
  #[error("unambiguous timeout")]
  UnambiguousTimeout,
  #[error("feature not available")]
  FeatureNotAvailable,
  #[error("index not found")]
  IndexNotFound,
  #[error("index exists")]
  IndexExists,
  #[error("rate limited")]
  RateLimited,
  #[error("quota limited")]
  QuotaLimited,

  // Key-value
  #[error("document not found")]
  DocumentNotFound,
  #[error("document exists")]
  DocumentExists,
  #[error("document locked")]
  DocumentLocked,
  #[error("value too large")]
  ValueTooLarge,
  #[error("durability level not available")]
  DurabilityLevelNotAvailable,
  #[error("durability impossible")]
  DurabilityImpossible,
  #[error("durable write in progress, write is ambiguous")]
  DurabilityAmbiguous,
  #[error("durable write already in progress")]
  DurableWriteInProgress,
  #[error("durable write re-commit in progress")]
  DurableWriteReCommitInProgress,
  #[error("subdoc path not found")]
  PathNotFound,
  #[error("subdoc path mismatch")]
  PathMismatch,
  #[error("subdoc path exists")]
  PathExists,
  #[error("subdoc path invalid")]
  PathInvalid,
  #[error("subdoc number too big")]
  NumberTooBig,
  #[error("subdoc value invalid")]
  ValueInvalid,

  // Network
  #[error("end of stream")]
  EndOfStream,
  #[error("socket closed while request in flight")]
  SocketClosedWhileInFlight,
  #[error("handshake failure")]
  HandshakeFailure,

  // SASL-specific, not part of the common taxonomy but convenient to carry
  #[error("no matching SASL mechanism")]
  NoMechanism,
  #[error("protocol violation: {0}")]
  ProtocolViolation(String),

  #[error("server returned status {status:?} for opcode {opcode:?}")]
  UnmappedStatus { opcode: OpCode, status: Status },
}

/// Enhanced error info the server attaches to some KV error responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnhancedErrorInfo {
  pub context: Option<String>,
  pub reference: Option<String>,
}

/// Everything needed to explain a failed KV operation (`spec.md` §3 "Error context").
#[derive(Debug, Clone)]
pub struct ErrorContext {
  pub kind: ErrorKind,
  pub last_dispatched_to: Option<String>,
  pub last_dispatched_from: Option<String>,
  pub retry_attempts: u32,
  pub retry_reasons: HashSet<RetryReason>,
  pub opaque: Option<u32>,
  pub status: Option<Status>,
  pub enhanced: Option<EnhancedErrorInfo>,
}

impl ErrorContext {
  pub fn new(kind: ErrorKind) -> Self {
    Self {
      kind,
      last_dispatched_to: None,
      last_dispatched_from: None,
      retry_attempts: 0,
      retry_reasons: HashSet::new(),
      opaque: None,
      status: None,
      enhanced: None,
    }
  }
}

impl fmt::Display for ErrorContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (retries={}", self.kind, self.retry_attempts)?;
    if !self.retry_reasons.is_empty() {
      write!(f, ", reasons={:?}", self.retry_reasons)?;
    }
    write!(f, ")")
  }
}

/// The error type returned by public operations on this crate.
#[derive(Debug, thiserror::Error)]
#[error("{context}")]
pub struct KvError {
  pub context: ErrorContext,
}

impl KvError {
  pub fn new(kind: ErrorKind) -> Self {
    Self {
      context: ErrorContext::new(kind),
    }
  }

  pub fn kind(&self) -> &ErrorKind {
    &self.context.kind
  }
}

impl From<ErrorKind> for KvError {
  fn from(kind: ErrorKind) -> Self {
    KvError::new(kind)
  }
}

/// Maps a wire [`Status`] to a logical [`ErrorKind`] for the common
/// status codes shared across most opcodes (`spec.md` §4.B — "data, not
/// code" in spirit, expressed here as a match so it stays exhaustively
/// checkable against every `Status` variant in a unit test).
pub fn status_to_kind(status: Status) -> Option<ErrorKind> {
  match status {
    Status::Success => None,
    Status::KeyNotFound => Some(ErrorKind::DocumentNotFound),
    Status::KeyExists => Some(ErrorKind::DocumentExists),
    Status::ValueTooLarge => Some(ErrorKind::ValueTooLarge),
    Status::InvalidArguments => Some(ErrorKind::InvalidArgument("server rejected arguments".into())),
    Status::ItemNotStored => Some(ErrorKind::InternalServerFailure),
    Status::NotMyVbucket => Some(ErrorKind::InternalServerFailure), // handled by caller before mapping
    Status::NoBucket => Some(ErrorKind::BucketNotFound),
    Status::Locked => Some(ErrorKind::DocumentLocked),
    Status::AuthContinue => None,
    Status::AuthError => Some(ErrorKind::AuthenticationFailure),
    Status::AuthStale => Some(ErrorKind::AuthenticationFailure),
    Status::UnknownCommand => Some(ErrorKind::UnsupportedOperation),
    Status::TemporaryFailure => Some(ErrorKind::TemporaryFailure),
    Status::UnknownCollection => Some(ErrorKind::CollectionNotFound),
    Status::SyncWriteInProgress => Some(ErrorKind::DurableWriteInProgress),
    Status::SyncWriteReCommitInProgress => Some(ErrorKind::DurableWriteReCommitInProgress),
    Status::SyncWriteAmbiguous => Some(ErrorKind::DurabilityAmbiguous),
    Status::SubdocPathNotFound => Some(ErrorKind::PathNotFound),
    Status::SubdocPathMismatch => Some(ErrorKind::PathMismatch),
    Status::SubdocPathExists => Some(ErrorKind::PathExists),
    Status::SubdocPathInvalid | Status::SubdocPathTooBig => Some(ErrorKind::PathInvalid),
    Status::SubdocNumberTooBig => Some(ErrorKind::NumberTooBig),
    Status::SubdocDocTooDeep | Status::SubdocValueCantInsert | Status::SubdocDocNotJson | Status::SubdocValueTooDeep => {
      Some(ErrorKind::ValueInvalid)
    }
    Status::SubdocDeltaInvalid => Some(ErrorKind::InvalidArgument("delta invalid".into())),
    Status::SubdocInvalidCombo => Some(ErrorKind::InvalidArgument("invalid combination of subdoc flags".into())),
    Status::SubdocXattrInvalidFlagCombo => Some(ErrorKind::InvalidArgument("invalid combination of xattr flags".into())),
    Status::SubdocXattrInvalidKeyCombo => Some(ErrorKind::InvalidArgument("invalid combination of xattr keys".into())),
    // Caller must inspect the per-path results rather than treat this as one failure.
    Status::SubdocMultiPathFailure => Some(ErrorKind::InternalServerFailure),
    Status::SubdocSuccessDeleted => None,
    // A code we don't recognize says nothing about which failure occurred;
    // let the opcode-specific mapping in `registry` raise `UnmappedStatus`.
    Status::Unknown(_) => None,
  }
}
