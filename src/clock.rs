//! Simulation clock.
//!
//! Every recorded state carries a clock: a totally ordered progress marker.
//! Clocks are floating point so simpacks can advance by fractional amounts,
//! and ordered with `f64::total_cmp` so they can be compared, hashed and
//! used as targets without special-casing NaN. `-0.0` is stored as `0.0`, so
//! the two zeros compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A totally ordered simulation clock value.
///
/// # Examples
///
/// ```
/// use forkline::Clock;
///
/// let start = Clock::ZERO;
/// let later = start.advanced_by(1.5);
/// assert!(later > start);
/// assert_eq!(later.value(), 1.5);
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Clock(f64);

impl Clock {
    /// The clock of a freshly created root state.
    pub const ZERO: Self = Self(0.0);

    /// Creates a clock from a raw value.
    #[must_use]
    pub fn new(value: f64) -> Self {
        // IEEE addition maps -0.0 to +0.0 and leaves every other value alone.
        Self(value + 0.0)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns this clock moved forward by `delta`.
    #[must_use]
    pub fn advanced_by(self, delta: f64) -> Self {
        Self::new(self.0 + delta)
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Clock {}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Clock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // total_cmp equality is bitwise equality
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for Clock {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<u32> for Clock {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

impl From<Clock> for f64 {
    fn from(clock: Clock) -> Self {
        clock.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_orders_totally() {
        let mut clocks = vec![Clock::new(2.0), Clock::new(-1.0), Clock::ZERO, Clock::new(0.5)];
        clocks.sort();
        let values: Vec<f64> = clocks.into_iter().map(Clock::value).collect();
        assert_eq!(values, vec![-1.0, 0.0, 0.5, 2.0]);
    }

    #[test]
    fn nan_is_comparable() {
        let nan = Clock::new(f64::NAN);
        assert_eq!(nan, nan);
        assert!(nan > Clock::new(f64::INFINITY));
    }

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(Clock::new(-0.0), Clock::ZERO);
        assert_eq!(Clock::from(-0.0), Clock::ZERO);
        assert!(Clock::new(-0.0).value().is_sign_positive());
        assert!(Clock::new(-0.0) >= Clock::ZERO);
        let back: Clock = serde_json::from_str("-0.0").unwrap();
        assert_eq!(back, Clock::ZERO);
        assert!(Clock::new(-1e-300) < Clock::ZERO);
    }

    #[test]
    fn clock_serializes_transparently() {
        let json = serde_json::to_string(&Clock::from(3u32)).unwrap();
        assert_eq!(json, "3.0");
        let back: Clock = serde_json::from_str("4.25").unwrap();
        assert_eq!(back, Clock::new(4.25));
    }
}
