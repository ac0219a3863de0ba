//! Multiplier clock: maps elapsed round time to the current multiplier.
//!
//! The curve is exp(rate(t) * t) where the rate itself grows with elapsed
//! time up to a cap, so the multiplier starts slow and accelerates. Early
//! cashouts feel safe, late cashouts feel risky.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All multiplier and crash-point values are compared and stored at this
/// precision to avoid floating-point flapping at the crash boundary.
pub const PRECISION_DIGITS: u32 = 4;

/// Round a value to 4 decimal digits.
pub fn round4(value: f64) -> f64 {
    let scale = 10f64.powi(PRECISION_DIGITS as i32);
    (value * scale).round() / scale
}

/// Growth parameters for the multiplier curve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MultiplierCurve {
    /// Exponential rate at t = 0.
    pub base_rate: f64,
    /// Rate increase per elapsed second.
    pub rate_growth: f64,
    /// Ceiling the rate never exceeds.
    pub rate_cap: f64,
}

impl Default for MultiplierCurve {
    fn default() -> Self {
        Self {
            base_rate: 0.05,
            rate_growth: 0.005,
            rate_cap: 0.20,
        }
    }
}

impl MultiplierCurve {
    /// Effective exponential rate after `elapsed_secs`.
    pub fn rate_at(&self, elapsed_secs: f64) -> f64 {
        (self.base_rate + self.rate_growth * elapsed_secs).min(self.rate_cap)
    }

    /// Current multiplier after `elapsed_secs`, rounded to 4 decimals.
    ///
    /// Monotonically increasing in elapsed time, with `multiplier_at(0) == 1.0`.
    pub fn multiplier_at(&self, elapsed_secs: f64) -> f64 {
        round4((self.rate_at(elapsed_secs) * elapsed_secs).exp())
    }

    /// Convenience wrapper taking a [`Duration`] since round start.
    pub fn multiplier_after(&self, elapsed: Duration) -> f64 {
        self.multiplier_at(elapsed.as_secs_f64())
    }
}
