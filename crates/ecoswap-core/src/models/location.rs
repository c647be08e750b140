//! Device location fix

use serde::{Deserialize, Serialize};

/// A device location sample from the platform's location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub lat: f64,
    pub lon: f64,
    /// Reported horizontal accuracy in meters
    pub accuracy_m: f64,
    /// When the fix was captured (Unix ms)
    pub captured_at: i64,
}

impl LocationFix {
    #[must_use]
    pub const fn new(lat: f64, lon: f64, accuracy_m: f64, captured_at: i64) -> Self {
        Self {
            lat,
            lon,
            accuracy_m,
            captured_at,
        }
    }

    /// Age of this fix relative to `now` (Unix ms). Clock skew clamps to zero.
    #[must_use]
    pub const fn age_ms(&self, now: i64) -> i64 {
        let age = now - self.captured_at;
        if age < 0 {
            0
        } else {
            age
        }
    }

    /// Whether this fix is recent enough to rank listings with.
    #[must_use]
    pub const fn is_fresh(&self, max_age_ms: i64, now: i64) -> bool {
        self.age_ms(now) <= max_age_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_is_clamped_to_zero() {
        let fix = LocationFix::new(0.0, 0.0, 10.0, 2_000);
        assert_eq!(fix.age_ms(1_000), 0);
        assert_eq!(fix.age_ms(5_000), 3_000);
    }

    #[test]
    fn freshness_threshold_is_inclusive() {
        let fix = LocationFix::new(0.0, 0.0, 10.0, 0);
        assert!(fix.is_fresh(1_000, 1_000));
        assert!(!fix.is_fresh(1_000, 1_001));
    }
}
