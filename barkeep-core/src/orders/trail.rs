//! Trailing-stop percentage.
//!
//! Internally a trail is a decimal fraction (0.05 = 5%). The broker API speaks
//! whole percent (5.0 = 5%). Conversion goes through `Decimal` so a value
//! survives the trip out and back.

use super::OrderError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TrailPercent(f64);

impl TrailPercent {
    /// From a decimal fraction in `(0, 1]`.
    pub fn new(fraction: f64) -> Result<Self, OrderError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(OrderError::InvalidTrailPercent(fraction));
        }
        Ok(Self(fraction))
    }

    /// From the broker's whole-percent form (5.0 = 5%).
    pub fn from_broker_percent(percent: f64) -> Result<Self, OrderError> {
        let fraction = Decimal::from_f64(percent)
            .and_then(|d| d.checked_div(Decimal::ONE_HUNDRED))
            .and_then(|d| d.to_f64())
            .ok_or(OrderError::InvalidTrailPercent(percent))?;
        Self::new(fraction)
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    /// Whole-percent form for the broker.
    pub fn to_broker_percent(self) -> f64 {
        Decimal::from_f64(self.0)
            .and_then(|d| d.checked_mul(Decimal::ONE_HUNDRED))
            .and_then(|d| d.to_f64())
            .unwrap_or(self.0 * 100.0)
    }

    /// Stop level below a long position's high-water mark.
    pub fn stop_below(self, high: f64) -> f64 {
        high * (1.0 - self.0)
    }

    /// Stop level above a short position's low-water mark.
    pub fn stop_above(self, low: f64) -> f64 {
        low * (1.0 + self.0)
    }
}

impl TryFrom<f64> for TrailPercent {
    type Error = OrderError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrailPercent> for f64 {
    fn from(value: TrailPercent) -> Self {
        value.0
    }
}

impl fmt::Display for TrailPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.to_broker_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn converts_to_and_from_broker_form() {
        let trail = TrailPercent::new(0.05).unwrap();
        assert_eq!(trail.to_broker_percent(), 5.0);
        assert_eq!(TrailPercent::from_broker_percent(5.0).unwrap(), trail);
        assert_eq!(TrailPercent::new(0.001).unwrap().to_broker_percent(), 0.1);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(TrailPercent::new(0.0).is_err());
        assert!(TrailPercent::new(-0.01).is_err());
        assert!(TrailPercent::new(1.5).is_err());
        assert!(TrailPercent::new(f64::NAN).is_err());
        assert!(TrailPercent::from_broker_percent(150.0).is_err());
    }

    #[test]
    fn stop_levels() {
        let trail = TrailPercent::new(0.1).unwrap();
        assert!((trail.stop_below(200.0) - 180.0).abs() < 1e-9);
        assert!((trail.stop_above(100.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn serde_rejects_invalid_fraction() {
        assert!(serde_json::from_str::<TrailPercent>("0.02").is_ok());
        assert!(serde_json::from_str::<TrailPercent>("2.0").is_err());
    }

    proptest! {
        #[test]
        fn broker_round_trip_preserves_value(fraction in 0.0001f64..=1.0) {
            let trail = TrailPercent::new(fraction).unwrap();
            let back = TrailPercent::from_broker_percent(trail.to_broker_percent()).unwrap();
            prop_assert!((back.fraction() - fraction).abs() <= fraction * 1e-12);
        }
    }
}
