//! Time values held as integer ticks.
//!
//! Every simulation time is an integer multiple of `10^-precision`, so
//! repeated `t += dt` never drifts and `t >= final_t` is an exact comparison.

use serde::{Deserialize, Serialize};

/// Maximum supported number of decimal digits.
pub const MAX_PRECISION: u32 = 15;

/// A fixed-precision grid on which all simulation times live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGrid {
    precision: u32,
}

/// A point or span of time, in ticks of a [`TimeGrid`].
pub type Ticks = i64;

impl TimeGrid {
    /// Creates a grid rounding to `precision` decimal digits.
    ///
    /// Precision is clamped to `1..=MAX_PRECISION`.
    #[must_use]
    pub fn new(precision: u32) -> Self {
        Self {
            precision: precision.clamp(1, MAX_PRECISION),
        }
    }

    #[must_use]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    fn ticks_per_unit(self) -> f64 {
        10f64.powi(i32::try_from(self.precision).unwrap_or(15))
    }

    /// Converts a time value to the nearest tick.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_ticks(&self, t: f64) -> Ticks {
        (t * self.ticks_per_unit()).round() as Ticks
    }

    /// Converts ticks back into a time value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_time(&self, ticks: Ticks) -> f64 {
        ticks as f64 / self.ticks_per_unit()
    }

    /// Rounds a time value onto the grid.
    #[must_use]
    pub fn round(&self, t: f64) -> f64 {
        self.to_time(self.to_ticks(t))
    }
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_steps_do_not_drift() {
        let grid = TimeGrid::new(6);
        let dt = grid.to_ticks(0.1);
        let mut t = 0;
        for _ in 0..10 {
            t += dt;
        }
        assert_eq!(t, grid.to_ticks(1.0));
        assert_eq!(grid.to_time(t), 1.0);

        let mut drifting = 0.0;
        for _ in 0..10 {
            drifting += 0.1;
        }
        assert_ne!(drifting, 1.0);
        assert_eq!(grid.round(drifting), 1.0);
    }

    #[test]
    fn precision_is_clamped() {
        assert_eq!(TimeGrid::new(0).precision(), 1);
        assert_eq!(TimeGrid::new(40).precision(), MAX_PRECISION);
    }
}
