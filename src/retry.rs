//! Retry orchestrator (`spec.md` §4.E), grounded on
//! `original_source/ext/couchbase/io/retry_orchestrator.hxx`: the decision
//! policy is expressed as free functions over a small `RetryContext`/
//! `RetryableRequest` pair rather than methods on a god object, mirroring
//! the C++ `maybe_retry`/`controlled_backoff`/`cap_duration` trio almost
//! directly, since that shape already fits an async-Rust port with no
//! changes needed.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;

/// Why a request is being considered for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryReason {
  SocketNotAvailable,
  ServiceNotAvailable,
  NodeNotAvailable,
  KvNotMyVbucket,
  KvCollectionOutdated,
  KvErrorMapRetryIndicated,
  KvLocked,
  KvTemporaryFailure,
  KvSyncWriteInProgress,
  KvSyncWriteReCommitInProgress,
  ServiceResponseCodeIndicated,
  CircuitBreakerOpen,
  QueryPreparedStatementFailure,
  QueryIndexNotFound,
  AnalyticsTemporaryFailure,
  SearchTooManyRequests,
  /// Anything not in the always-retry set; best-effort/fail-fast policy applies.
  Other,
}

/// Whether a reason is retried unconditionally, regardless of request strategy
/// (`spec.md` §4.E, decision policy step 1).
pub fn always_retry(reason: RetryReason) -> bool {
  !matches!(reason, RetryReason::Other)
}

/// Per-request retry policy (`spec.md` §3 "Retry context").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
  BestEffort,
  FailFast,
}

impl RetryStrategy {
  /// Step 2 of the decision policy: for best-effort, retry when the
  /// operation is idempotent or the failure is unambiguously
  /// pre-transmission (never reached the server).
  pub fn should_retry(self, idempotent: bool, written_at_least_once: bool) -> bool {
    match self {
      RetryStrategy::FailFast => false,
      RetryStrategy::BestEffort => idempotent || !written_at_least_once,
    }
  }
}

/// Mutable per-request retry bookkeeping (`spec.md` §3 "Retry context").
#[derive(Debug, Clone)]
pub struct RetryContext {
  pub retry_attempts: u32,
  pub reasons: HashSet<RetryReason>,
  pub last_duration: Duration,
  pub strategy: RetryStrategy,
  pub idempotent: bool,
  pub written_at_least_once: bool,
  pub deadline: Instant,
}

impl RetryContext {
  pub fn new(strategy: RetryStrategy, idempotent: bool, deadline: Instant) -> Self {
    Self {
      retry_attempts: 0,
      reasons: HashSet::new(),
      last_duration: Duration::ZERO,
      strategy,
      idempotent,
      written_at_least_once: false,
      deadline,
    }
  }

  fn record(&mut self, reason: RetryReason, duration: Duration) {
    self.retry_attempts += 1;
    self.reasons.insert(reason);
    self.last_duration = duration;
  }
}

/// Controlled backoff table, ms by attempt count (`spec.md` §4.E).
pub fn controlled_backoff(retry_attempts: u32) -> Duration {
  let ms = match retry_attempts {
    0 => 1,
    1 => 10,
    2 => 50,
    3 => 100,
    4 => 500,
    _ => 1000,
  };
  Duration::from_millis(ms)
}

/// Caps `uncapped` at the time remaining until `deadline`. If capping would
/// produce a negative delay (deadline already effectively passed), the
/// uncapped value is returned instead so the deadline timer — not this
/// function — is what fires first (`spec.md` §4.E "Cap").
pub fn cap_duration(uncapped: Duration, deadline: Instant, now: Instant) -> Duration {
  let theoretical_fire = now + uncapped;
  if theoretical_fire <= deadline {
    return uncapped;
  }
  let overrun = theoretical_fire - deadline;
  match uncapped.checked_sub(overrun) {
    Some(capped) => capped,
    None => uncapped,
  }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
  RetryAfter(Duration),
  Surface,
}

/// The decision policy itself (`spec.md` §4.E).
pub fn maybe_retry(ctx: &mut RetryContext, reason: RetryReason, now: Instant) -> RetryDecision {
  if always_retry(reason) {
    let uncapped = controlled_backoff(ctx.retry_attempts);
    let capped = cap_duration(uncapped, ctx.deadline, now);
    ctx.record(reason, capped);
    return RetryDecision::RetryAfter(capped);
  }

  if ctx.strategy.should_retry(ctx.idempotent, ctx.written_at_least_once) {
    let uncapped = controlled_backoff(ctx.retry_attempts);
    let capped = cap_duration(uncapped, ctx.deadline, now);
    ctx.record(reason, capped);
    return RetryDecision::RetryAfter(capped);
  }

  RetryDecision::Surface
}

/// Maps an ambiguous/unambiguous timeout decision for a deadline firing
/// while a request is queued or in flight (`spec.md` §5 "Cancellation").
pub fn timeout_kind(written_at_least_once: bool) -> ErrorKind {
  if written_at_least_once {
    ErrorKind::AmbiguousTimeout
  } else {
    ErrorKind::UnambiguousTimeout
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn controlled_backoff_matches_the_table() {
    assert_eq!(controlled_backoff(0), Duration::from_millis(1));
    assert_eq!(controlled_backoff(1), Duration::from_millis(10));
    assert_eq!(controlled_backoff(2), Duration::from_millis(50));
    assert_eq!(controlled_backoff(3), Duration::from_millis(100));
    assert_eq!(controlled_backoff(4), Duration::from_millis(500));
    assert_eq!(controlled_backoff(5), Duration::from_millis(1000));
    assert_eq!(controlled_backoff(99), Duration::from_millis(1000));
  }

  #[test]
  fn cap_clips_to_the_deadline() {
    let now = Instant::now();
    let deadline = now + Duration::from_millis(25);
    let capped = cap_duration(Duration::from_millis(500), deadline, now);
    assert_eq!(capped, Duration::from_millis(25));
  }

  #[test]
  fn cap_falls_back_to_uncapped_when_already_past_deadline() {
    let now = Instant::now();
    let deadline = now - Duration::from_millis(5);
    let capped = cap_duration(Duration::from_millis(500), deadline, now);
    assert_eq!(capped, Duration::from_millis(500));
  }

  #[test]
  fn always_retry_reasons_bypass_the_strategy() {
    let mut ctx = RetryContext::new(RetryStrategy::FailFast, false, Instant::now() + Duration::from_secs(5));
    let decision = maybe_retry(&mut ctx, RetryReason::KvNotMyVbucket, Instant::now());
    assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_millis(1)));
    assert_eq!(ctx.retry_attempts, 1);
    assert!(ctx.reasons.contains(&RetryReason::KvNotMyVbucket));
  }

  #[test]
  fn fail_fast_surfaces_non_always_retry_reasons() {
    let mut ctx = RetryContext::new(RetryStrategy::FailFast, true, Instant::now() + Duration::from_secs(5));
    let decision = maybe_retry(&mut ctx, RetryReason::Other, Instant::now());
    assert_eq!(decision, RetryDecision::Surface);
    assert_eq!(ctx.retry_attempts, 0);
  }

  #[test]
  fn best_effort_retries_idempotent_ops_on_other_reasons() {
    let mut ctx = RetryContext::new(RetryStrategy::BestEffort, true, Instant::now() + Duration::from_secs(5));
    let decision = maybe_retry(&mut ctx, RetryReason::Other, Instant::now());
    assert!(matches!(decision, RetryDecision::RetryAfter(_)));
  }

  #[test]
  fn always_retry_delay_is_capped_to_a_near_deadline() {
    let now = Instant::now();
    let mut ctx = RetryContext::new(RetryStrategy::FailFast, false, now + Duration::from_millis(20));
    ctx.retry_attempts = 5; // nominal backoff at this attempt is 1000ms
    let decision = maybe_retry(&mut ctx, RetryReason::KvTemporaryFailure, now);
    assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_millis(20)));
  }

  #[test]
  fn retry_attempts_is_monotonic_across_a_retry_cycle() {
    let mut ctx = RetryContext::new(RetryStrategy::FailFast, false, Instant::now() + Duration::from_secs(5));
    let mut last = 0;
    for _ in 0..5 {
      maybe_retry(&mut ctx, RetryReason::KvTemporaryFailure, Instant::now());
      assert!(ctx.retry_attempts > last);
      last = ctx.retry_attempts;
    }
  }
}
