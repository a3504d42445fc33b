//! Decay engine implementing the [`DecayCalculator`] trait.
//!
//! All arithmetic is integer-only. The span/elapsed product is formed over
//! 512 bits, so every 256-bit range and 64-bit lifetime is exact.

use yonk_core::error::DecayError;
use yonk_core::traits::DecayCalculator;
use yonk_core::types::{Amount, DecayParams};

/// The production decay calculator: linear interpolation clamped to the lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearDecay;

impl LinearDecay {
    pub fn new() -> Self {
        Self
    }
}

/// Reject parameters no transfer can be created with.
fn check_params(params: &DecayParams) -> Result<(), DecayError> {
    if params.life_seconds == 0 {
        return Err(DecayError::ZeroLifetime);
    }
    if params.start_value < params.end_value {
        return Err(DecayError::InvalidRange {
            start: params.start_value,
            end: params.end_value,
        });
    }
    Ok(())
}

impl DecayCalculator for LinearDecay {
    fn value_at(&self, params: &DecayParams, now: u64) -> Result<Amount, DecayError> {
        check_params(params)?;

        // Clock skew before creation counts as zero elapsed.
        let elapsed = now
            .saturating_sub(params.start_timestamp)
            .min(params.life_seconds);
        let span = params
            .start_value
            .checked_sub(params.end_value)
            .ok_or(DecayError::ArithmeticOverflow)?;

        // decrement <= span because elapsed <= life.
        let decrement = span
            .mul_div_floor(elapsed, params.life_seconds)
            .ok_or(DecayError::ArithmeticOverflow)?;
        params
            .start_value
            .checked_sub(decrement)
            .ok_or(DecayError::ArithmeticOverflow)
    }
}
