//! Pending-order and trailing-stop bookkeeping shared by strategies.
//!
//! For longs: stop = highest price since entry * (1 - trail).
//! For shorts: stop = lowest price since entry * (1 + trail).
//! The stop only ever tightens.

use crate::orders::{Fill, OrderSide, TrailPercent};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStop {
    trail: TrailPercent,
    /// Side of the position being protected.
    side: OrderSide,
    /// Highest price since entry for longs, lowest for shorts.
    extreme: f64,
}

impl TrailingStop {
    pub fn long(trail: TrailPercent, entry_price: f64) -> Self {
        Self {
            trail,
            side: OrderSide::Buy,
            extreme: entry_price,
        }
    }

    pub fn short(trail: TrailPercent, entry_price: f64) -> Self {
        Self {
            trail,
            side: OrderSide::Sell,
            extreme: entry_price,
        }
    }

    pub fn trail(&self) -> TrailPercent {
        self.trail
    }

    /// Highest (long) or lowest (short) price seen since entry.
    pub fn extreme(&self) -> f64 {
        self.extreme
    }

    pub fn stop_level(&self) -> f64 {
        match self.side {
            OrderSide::Buy => self.trail.stop_below(self.extreme),
            OrderSide::Sell => self.trail.stop_above(self.extreme),
        }
    }

    /// Side of the order that closes the position when the stop is hit.
    pub fn exit_side(&self) -> OrderSide {
        self.side.opposite()
    }

    /// Move the watermark with a new price; returns the resulting stop level.
    pub fn update(&mut self, price: f64) -> f64 {
        if price.is_finite() {
            self.extreme = match self.side {
                OrderSide::Buy => self.extreme.max(price),
                OrderSide::Sell => self.extreme.min(price),
            };
        }
        self.stop_level()
    }

    pub fn is_triggered(&self, price: f64) -> bool {
        match self.side {
            OrderSide::Buy => price <= self.stop_level(),
            OrderSide::Sell => price >= self.stop_level(),
        }
    }
}

/// Tracks at most one pending order, the net position, and an optional trailing stop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderTracker {
    pending: Option<String>,
    /// Net shares: positive long, negative short.
    position: i64,
    entry_price: Option<f64>,
    trailing_stop: Option<TrailingStop>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Record a submitted order. Refused while another order is pending.
    pub fn submit(&mut self, order_id: impl Into<String>) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(order_id.into());
        true
    }

    /// Forget a pending order that was canceled or rejected.
    pub fn cancel(&mut self, order_id: &str) {
        if self.pending.as_deref() == Some(order_id) {
            self.pending = None;
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn is_flat(&self) -> bool {
        self.position == 0
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.entry_price
    }

    pub fn trailing_stop(&self) -> Option<&TrailingStop> {
        self.trailing_stop.as_ref()
    }

    /// Apply a fill to the position. Going flat clears the entry price and any trailing stop.
    pub fn record_fill(&mut self, fill: &Fill) {
        if self.pending.as_deref() == Some(fill.order_id.as_str()) {
            self.pending = None;
        }

        let was_flat = self.is_flat();
        let qty = i64::try_from(fill.qty).unwrap_or(i64::MAX);
        self.position = match fill.side {
            OrderSide::Buy => self.position.saturating_add(qty),
            OrderSide::Sell => self.position.saturating_sub(qty),
        };

        if self.is_flat() {
            self.entry_price = None;
            self.trailing_stop = None;
        } else if was_flat {
            self.entry_price = Some(fill.price);
        }
        debug!(symbol = %fill.symbol, side = %fill.side, qty = fill.qty, price = fill.price, position = self.position, "fill recorded");
    }

    /// Arm a trailing stop from the entry price. No-op when flat.
    pub fn arm_trailing_stop(&mut self, trail: TrailPercent) -> Option<f64> {
        let entry = self.entry_price?;
        let stop = if self.position > 0 {
            TrailingStop::long(trail, entry)
        } else {
            TrailingStop::short(trail, entry)
        };
        let level = stop.stop_level();
        self.trailing_stop = Some(stop);
        Some(level)
    }

    /// Feed the latest price to the trailing stop; true when it has been hit.
    pub fn update_trailing_stop(&mut self, price: f64) -> bool {
        match self.trailing_stop.as_mut() {
            Some(stop) => {
                stop.update(price);
                stop.is_triggered(price)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fill(id: &str, side: OrderSide, qty: u64, price: f64) -> Fill {
        Fill {
            order_id: id.into(),
            symbol: "SPY".into(),
            side,
            qty,
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        }
    }

    #[test]
    fn long_stop_trails_high_and_never_loosens() {
        let mut stop = TrailingStop::long(TrailPercent::new(0.10).unwrap(), 100.0);
        assert!((stop.stop_level() - 90.0).abs() < 1e-9);

        stop.update(120.0);
        assert!((stop.stop_level() - 108.0).abs() < 1e-9);

        stop.update(110.0);
        assert_eq!(stop.extreme(), 120.0);
        assert!(stop.is_triggered(107.0));
        assert!(!stop.is_triggered(109.0));
        assert_eq!(stop.exit_side(), OrderSide::Sell);
    }

    #[test]
    fn short_stop_trails_low() {
        let mut stop = TrailingStop::short(TrailPercent::new(0.10).unwrap(), 100.0);
        stop.update(80.0);
        assert!((stop.stop_level() - 88.0).abs() < 1e-9);
        assert!(stop.is_triggered(89.0));
        assert_eq!(stop.exit_side(), OrderSide::Buy);
    }

    #[test]
    fn only_one_pending_order() {
        let mut tracker = OrderTracker::new();
        assert!(tracker.submit("a"));
        assert!(!tracker.submit("b"));
        assert_eq!(tracker.pending(), Some("a"));

        tracker.cancel("b");
        assert!(tracker.has_pending());
        tracker.cancel("a");
        assert!(!tracker.has_pending());
    }

    #[test]
    fn fills_track_position_and_clear_on_flat() {
        let mut tracker = OrderTracker::new();
        tracker.submit("buy-1");
        tracker.record_fill(&fill("buy-1", OrderSide::Buy, 10, 100.0));
        assert!(!tracker.has_pending());
        assert_eq!(tracker.position(), 10);
        assert_eq!(tracker.entry_price(), Some(100.0));

        let level = tracker
            .arm_trailing_stop(TrailPercent::new(0.05).unwrap())
            .unwrap();
        assert!((level - 95.0).abs() < 1e-9);
        assert!(!tracker.update_trailing_stop(104.0));
        assert!(tracker.update_trailing_stop(98.0));

        tracker.record_fill(&fill("sell-1", OrderSide::Sell, 10, 98.0));
        assert!(tracker.is_flat());
        assert_eq!(tracker.entry_price(), None);
        assert!(tracker.trailing_stop().is_none());
    }

    #[test]
    fn arming_while_flat_is_a_no_op() {
        let mut tracker = OrderTracker::new();
        assert_eq!(tracker.arm_trailing_stop(TrailPercent::new(0.05).unwrap()), None);
        assert!(!tracker.update_trailing_stop(1.0));
    }
}
