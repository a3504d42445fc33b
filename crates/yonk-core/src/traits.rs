//! Trait interfaces for the Yonk protocol.
//!
//! These traits define the contracts between crates:
//! - [`DecayCalculator`] — decay math engine (yonk-decay implements)
//! - [`Clock`] — source of the current Unix time for the world executor

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DecayError;
use crate::types::{Amount, ClaimSplit, DecayParams};

/// Pure computation of a transfer's value over its lifetime.
///
/// All decay math uses integer arithmetic. Implemented by the decay engine
/// (yonk-decay).
pub trait DecayCalculator: Send + Sync {
    /// Value of a transfer at Unix time `now`.
    ///
    /// Equals `start_value` at or before `start_timestamp` and `end_value`
    /// from expiry onward; non-increasing in between.
    fn value_at(&self, params: &DecayParams, now: u64) -> Result<Amount, DecayError>;

    /// Split of the start value when the transfer is claimed at `now`.
    ///
    /// Default implementation: the claimant receives the decayed value and
    /// the remainder is returned to the residual pool.
    fn claim_split(&self, params: &DecayParams, now: u64) -> Result<ClaimSplit, DecayError> {
        let claimed = self.value_at(params, now)?;
        let returned = params
            .start_value
            .checked_sub(claimed)
            .ok_or(DecayError::ArithmeticOverflow)?;
        Ok(ClaimSplit { claimed, returned })
    }

    /// Value frozen at expiry, recovered by a reclaim.
    fn residual(&self, params: &DecayParams) -> Result<Amount, DecayError> {
        self.value_at(params, params.expires_at()?)
    }
}

/// Source of the current time in Unix seconds.
///
/// Read at call time, never awaited. Implementations must be monotonic.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually driven clock for tests and offline tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Move the clock forward by `secs`. The clock never moves backwards.
    pub fn advance(&self, secs: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(secs)));
    }

    /// Set the clock to `now` if that is not earlier than the current time.
    pub fn set(&self, now: u64) {
        self.now.fetch_max(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
