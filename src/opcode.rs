//! KV opcodes and status codes (`spec.md` §4.B, §6).

/// Subset of opcodes this core speaks, per `spec.md` §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OpCode {
  Get,
  GetAndLock,
  GetAndTouch,
  GetReplica,
  ObserveSeqno,
  Insert,
  Upsert,
  Replace,
  Remove,
  Append,
  Prepend,
  Increment,
  Decrement,
  Touch,
  Unlock,
  Noop,
  SubdocLookupIn,
  SubdocMutateIn,
  SaslListMechs,
  SaslAuth,
  SaslStep,
  Hello,
  SelectBucket,
  GetClusterConfig,
  GetCollectionsManifest,
  GetCollectionId,
  ClusterMapChangeNotification,
}

impl OpCode {
  /// Wire byte for the opcode, per the memcached binary protocol.
  pub const fn as_u8(self) -> u8 {
    match self {
      OpCode::Get => 0x00,
      OpCode::Upsert => 0x01,
      OpCode::Insert => 0x02,
      OpCode::Replace => 0x03,
      OpCode::Remove => 0x04,
      OpCode::Increment => 0x05,
      OpCode::Decrement => 0x06,
      OpCode::Noop => 0x0a,
      OpCode::Append => 0x0e,
      OpCode::Prepend => 0x0f,
      OpCode::Touch => 0x1c,
      OpCode::GetAndTouch => 0x1d,
      OpCode::GetAndLock => 0x94,
      OpCode::Unlock => 0x95,
      OpCode::GetReplica => 0x83,
      OpCode::ObserveSeqno => 0x91,
      OpCode::SubdocLookupIn => 0xd0,
      OpCode::SubdocMutateIn => 0xd1,
      OpCode::SaslListMechs => 0x20,
      OpCode::SaslAuth => 0x21,
      OpCode::SaslStep => 0x22,
      OpCode::Hello => 0x1f,
      OpCode::SelectBucket => 0x89,
      OpCode::GetClusterConfig => 0xb5,
      OpCode::GetCollectionsManifest => 0xba,
      OpCode::GetCollectionId => 0xbb,
      OpCode::ClusterMapChangeNotification => 0x01, // server-request, disambiguated by Magic
    }
  }
}

/// Status codes, 16-bit BE on the wire (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
  Success,
  KeyNotFound,
  KeyExists,
  ValueTooLarge,
  InvalidArguments,
  ItemNotStored,
  NotMyVbucket,
  NoBucket,
  Locked,
  AuthContinue,
  AuthError,
  AuthStale,
  UnknownCommand,
  TemporaryFailure,
  UnknownCollection,
  SyncWriteInProgress,
  SyncWriteReCommitInProgress,
  SyncWriteAmbiguous,
  /// 0x00c0: path does not exist in the document.
  SubdocPathNotFound,
  /// 0x00c1: path exists but its type doesn't match the operation.
  SubdocPathMismatch,
  /// 0x00c2: path syntax is invalid.
  SubdocPathInvalid,
  /// 0x00c3: path is too long or has too many components.
  SubdocPathTooBig,
  /// 0x00c4: document is too deep to parse for the operation.
  SubdocDocTooDeep,
  /// 0x00c5: value cannot be inserted at the given path.
  SubdocValueCantInsert,
  /// 0x00c6: existing document is not valid JSON.
  SubdocDocNotJson,
  /// 0x00c7: existing number is out of range for a counter operation.
  SubdocNumberTooBig,
  /// 0x00c8: delta given for a counter operation is invalid.
  SubdocDeltaInvalid,
  /// 0x00c9: path already exists (e.g. for an add-only mutation).
  SubdocPathExists,
  /// 0x00ca: resulting value would be too deep.
  SubdocValueTooDeep,
  /// 0x00cb: combination of subdoc flags given is invalid.
  SubdocInvalidCombo,
  /// 0x00cc: one or more specs in a multi-path op failed; inspect each result.
  SubdocMultiPathFailure,
  /// 0x00cd: multi-path op succeeded and deleted the document.
  SubdocSuccessDeleted,
  /// 0x00ce: invalid combination of xattr flags.
  SubdocXattrInvalidFlagCombo,
  /// 0x00cf: invalid combination of xattr key(s).
  SubdocXattrInvalidKeyCombo,
  /// Any code not named above, including the rest of the subdoc range.
  /// Never conflated with a named subdoc status: an unrecognized code
  /// says nothing about which failure occurred.
  Unknown(u16),
}

impl Status {
  pub const fn from_u16(code: u16) -> Self {
    match code {
      0x0000 => Status::Success,
      0x0001 => Status::KeyNotFound,
      0x0002 => Status::KeyExists,
      0x0003 => Status::ValueTooLarge,
      0x0004 => Status::InvalidArguments,
      0x0005 => Status::ItemNotStored,
      0x0007 => Status::NotMyVbucket,
      0x0008 => Status::NoBucket,
      0x0009 => Status::Locked,
      0x001f => Status::AuthContinue,
      0x0020 => Status::AuthError,
      0x0021 => Status::AuthStale,
      0x0081 => Status::UnknownCommand,
      0x0086 => Status::TemporaryFailure,
      0x008d => Status::UnknownCollection,
      0x00a0 => Status::SyncWriteInProgress,
      0x00a2 => Status::SyncWriteReCommitInProgress,
      0x00a3 => Status::SyncWriteAmbiguous,
      0x00c0 => Status::SubdocPathNotFound,
      0x00c1 => Status::SubdocPathMismatch,
      0x00c2 => Status::SubdocPathInvalid,
      0x00c3 => Status::SubdocPathTooBig,
      0x00c4 => Status::SubdocDocTooDeep,
      0x00c5 => Status::SubdocValueCantInsert,
      0x00c6 => Status::SubdocDocNotJson,
      0x00c7 => Status::SubdocNumberTooBig,
      0x00c8 => Status::SubdocDeltaInvalid,
      0x00c9 => Status::SubdocPathExists,
      0x00ca => Status::SubdocValueTooDeep,
      0x00cb => Status::SubdocInvalidCombo,
      0x00cc => Status::SubdocMultiPathFailure,
      0x00cd => Status::SubdocSuccessDeleted,
      0x00ce => Status::SubdocXattrInvalidFlagCombo,
      0x00cf => Status::SubdocXattrInvalidKeyCombo,
      other => Status::Unknown(other),
    }
  }

  pub const fn as_u16(self) -> u16 {
    match self {
      Status::Success => 0x0000,
      Status::KeyNotFound => 0x0001,
      Status::KeyExists => 0x0002,
      Status::ValueTooLarge => 0x0003,
      Status::InvalidArguments => 0x0004,
      Status::ItemNotStored => 0x0005,
      Status::NotMyVbucket => 0x0007,
      Status::NoBucket => 0x0008,
      Status::Locked => 0x0009,
      Status::AuthContinue => 0x001f,
      Status::AuthError => 0x0020,
      Status::AuthStale => 0x0021,
      Status::UnknownCommand => 0x0081,
      Status::TemporaryFailure => 0x0086,
      Status::UnknownCollection => 0x008d,
      Status::SyncWriteInProgress => 0x00a0,
      Status::SyncWriteReCommitInProgress => 0x00a2,
      Status::SyncWriteAmbiguous => 0x00a3,
      Status::SubdocPathNotFound => 0x00c0,
      Status::SubdocPathMismatch => 0x00c1,
      Status::SubdocPathInvalid => 0x00c2,
      Status::SubdocPathTooBig => 0x00c3,
      Status::SubdocDocTooDeep => 0x00c4,
      Status::SubdocValueCantInsert => 0x00c5,
      Status::SubdocDocNotJson => 0x00c6,
      Status::SubdocNumberTooBig => 0x00c7,
      Status::SubdocDeltaInvalid => 0x00c8,
      Status::SubdocPathExists => 0x00c9,
      Status::SubdocValueTooDeep => 0x00ca,
      Status::SubdocInvalidCombo => 0x00cb,
      Status::SubdocMultiPathFailure => 0x00cc,
      Status::SubdocSuccessDeleted => 0x00cd,
      Status::SubdocXattrInvalidFlagCombo => 0x00ce,
      Status::SubdocXattrInvalidKeyCombo => 0x00cf,
      Status::Unknown(code) => code,
    }
  }

  pub const fn is_success(self) -> bool {
    matches!(self, Status::Success | Status::SubdocSuccessDeleted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_round_trips_through_the_wire_code() {
    let codes = [
      0x0000, 0x0001, 0x0002, 0x0003, 0x0004, 0x0005, 0x0007, 0x0008, 0x0009, 0x001f, 0x0020, 0x0021, 0x0081, 0x0086,
      0x008d, 0x00a0, 0x00a2, 0x00a3,
    ];
    for code in codes {
      assert_eq!(Status::from_u16(code).as_u16(), code);
    }
  }

  #[test]
  fn subdoc_codes_round_trip_as_distinct_named_variants() {
    for code in 0x00c0..=0x00cfu16 {
      let status = Status::from_u16(code);
      assert_eq!(status.as_u16(), code);
      assert!(!matches!(status, Status::Unknown(_)), "{code:#06x} should not be Unknown");
    }
    assert_eq!(Status::from_u16(0x00c0), Status::SubdocPathNotFound);
    assert_eq!(Status::from_u16(0x00c1), Status::SubdocPathMismatch);
    assert_eq!(Status::from_u16(0x00c9), Status::SubdocPathExists);
    assert_eq!(Status::from_u16(0x00c2), Status::SubdocPathInvalid);
    assert_eq!(Status::from_u16(0x00c7), Status::SubdocNumberTooBig);
  }

  #[test]
  fn unrecognized_codes_are_never_mistaken_for_a_subdoc_status() {
    for code in [0x0006u16, 0x000a, 0x0050, 0x00d0, 0xffff] {
      assert_eq!(Status::from_u16(code), Status::Unknown(code));
      assert_eq!(Status::from_u16(code).as_u16(), code);
    }
  }
}
