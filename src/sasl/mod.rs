//! Client-side SASL state machine (`spec.md` §4.C), grounded on
//! `original_source/ext/couchbase/cbsasl/{mechanism.cc,plain/plain.cc}`:
//! mechanism selection picks the strongest mechanism the server advertises,
//! and each mechanism exposes a `start()`/`step()` pair. The original's
//! thrown `unknown_mechanism`/`std::logic_error` become explicit `Err`
//! returns here (`spec.md` §9 design note).

mod plain;
mod scram;

pub use plain::Plain;
pub use scram::{Scram, ScramDigestKind};

use crate::error::{ErrorKind, KvError};

/// Result of feeding a server challenge to a mechanism's `step`.
#[derive(Debug)]
pub enum StepOutcome {
  /// The server expects another round trip; send this payload.
  Continue(Vec<u8>),
  /// Authentication is complete; no further bytes need to be sent.
  Complete,
}

/// Common shape for every mechanism's client-side state machine.
pub trait SaslMechanism {
  fn name(&self) -> &'static str;

  /// Produces the first payload to send as the `sasl_auth` request body.
  fn start(&mut self) -> Result<Vec<u8>, KvError>;

  /// Feeds a server challenge (from `auth_continue`) and produces the next
  /// payload, or signals completion.
  fn step(&mut self, challenge: &[u8]) -> Result<StepOutcome, KvError>;
}

/// A selected, not-yet-started mechanism.
pub enum Mechanism {
  Plain(Plain),
  Scram(Scram),
}

impl SaslMechanism for Mechanism {
  fn name(&self) -> &'static str {
    match self {
      Mechanism::Plain(m) => m.name(),
      Mechanism::Scram(m) => m.name(),
    }
  }

  fn start(&mut self) -> Result<Vec<u8>, KvError> {
    match self {
      Mechanism::Plain(m) => m.start(),
      Mechanism::Scram(m) => m.start(),
    }
  }

  fn step(&mut self, challenge: &[u8]) -> Result<StepOutcome, KvError> {
    match self {
      Mechanism::Plain(m) => m.step(challenge),
      Mechanism::Scram(m) => m.step(challenge),
    }
  }
}

/// Picks the strongest available mechanism, in order
/// SCRAM-SHA512 > SCRAM-SHA256 > SCRAM-SHA1 > PLAIN (`spec.md` §4.C).
pub fn select_mechanism(available: &str, username: impl Into<String>, password: impl Into<String>) -> Result<Mechanism, KvError> {
  let username = username.into();
  let password = password.into();
  let offered: Vec<&str> = available.split_whitespace().collect();

  let ranked = [
    ("SCRAM-SHA512", ScramDigestKind::Sha512),
    ("SCRAM-SHA256", ScramDigestKind::Sha256),
    ("SCRAM-SHA1", ScramDigestKind::Sha1),
  ];

  for (name, kind) in ranked {
    if offered.contains(&name) {
      return Ok(Mechanism::Scram(Scram::new(kind, username, password)));
    }
  }

  if offered.contains(&"PLAIN") {
    return Ok(Mechanism::Plain(Plain::new(username, password)));
  }

  Err(KvError::new(ErrorKind::NoMechanism))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefers_scram_over_plain_when_both_are_offered() {
    let mech = select_mechanism("PLAIN SCRAM-SHA1", "user", "pass").unwrap();
    assert_eq!(mech.name(), "SCRAM-SHA1");
  }

  #[test]
  fn prefers_the_strongest_scram_variant() {
    let mech = select_mechanism("SCRAM-SHA1 SCRAM-SHA256 SCRAM-SHA512", "user", "pass").unwrap();
    assert_eq!(mech.name(), "SCRAM-SHA512");
  }

  #[test]
  fn falls_back_to_plain_when_thats_all_that_is_offered() {
    let mech = select_mechanism("PLAIN", "user", "pass").unwrap();
    assert_eq!(mech.name(), "PLAIN");
  }

  #[test]
  fn fails_with_no_mechanism_when_nothing_matches() {
    let err = select_mechanism("CRAM-MD5", "user", "pass").unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::NoMechanism);
  }
}
