//! PLAIN mechanism, grounded on
//! `original_source/ext/couchbase/cbsasl/plain/plain.{cc,h}`.
//!
//! The original's `ClientBackend::step()` throws `std::logic_error` because
//! PLAIN never expects a server challenge; here that becomes a
//! `KvError::ProtocolViolation` (`spec.md` §9 design note).

use super::{SaslMechanism, StepOutcome};
use crate::error::{ErrorKind, KvError};

pub struct Plain {
  authzid: String,
  username: String,
  password: String,
  started: bool,
}

impl Plain {
  pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      authzid: String::new(),
      username: username.into(),
      password: password.into(),
      started: false,
    }
  }
}

impl SaslMechanism for Plain {
  fn name(&self) -> &'static str {
    "PLAIN"
  }

  fn start(&mut self) -> Result<Vec<u8>, KvError> {
    self.started = true;
    let mut payload = Vec::with_capacity(self.authzid.len() + self.username.len() + self.password.len() + 2);
    payload.extend_from_slice(self.authzid.as_bytes());
    payload.push(0);
    payload.extend_from_slice(self.username.as_bytes());
    payload.push(0);
    payload.extend_from_slice(self.password.as_bytes());
    Ok(payload)
  }

  fn step(&mut self, _challenge: &[u8]) -> Result<StepOutcome, KvError> {
    Err(KvError::new(ErrorKind::ProtocolViolation(
      "PLAIN does not support a server challenge".into(),
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn start_produces_the_authzid_user_pass_triple() {
    let mut mech = Plain::new("user", "pencil");
    let payload = mech.start().unwrap();
    assert_eq!(payload, b"\0user\0pencil");
  }

  #[test]
  fn step_is_always_a_protocol_violation() {
    let mut mech = Plain::new("user", "pencil");
    mech.start().unwrap();
    let err = mech.step(b"anything").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ProtocolViolation(_)));
  }
}
