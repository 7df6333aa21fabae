//! Order requests, order lifecycle status, and fills.

use super::trail::TrailPercent;
use super::OrderError;
use crate::domain::validate_ticker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    #[default]
    Day,
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
}

/// How far a trailing stop trails the market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trail {
    Percent(TrailPercent),
    Price(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit { limit_price: f64 },
    Stop { stop_price: f64 },
    StopLimit { stop_price: f64, limit_price: f64 },
    TrailingStop { trail: Trail },
}

impl OrderKind {
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderKind::Limit { limit_price } | OrderKind::StopLimit { limit_price, .. } => {
                Some(*limit_price)
            }
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        match self {
            OrderKind::Stop { stop_price } | OrderKind::StopLimit { stop_price, .. } => {
                Some(*stop_price)
            }
            _ => None,
        }
    }

    pub fn is_trailing_stop(&self) -> bool {
        matches!(self, OrderKind::TrailingStop { .. })
    }
}

/// Order lifecycle as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Parse a broker status string; unknown values are treated as `New`.
    pub fn from_broker(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "partially_filled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "canceled" | "cancelled" => OrderStatus::Canceled,
            "pending_cancel" => OrderStatus::PendingCancel,
            "rejected" => OrderStatus::Rejected,
            "expired" => OrderStatus::Expired,
            _ => OrderStatus::New,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// A validated order to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: u64,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    /// Build and validate an order with day time-in-force.
    pub fn new(symbol: &str, qty: u64, side: OrderSide, kind: OrderKind) -> Result<Self, OrderError> {
        let request = Self {
            symbol: validate_ticker(symbol)?,
            qty,
            side,
            kind,
            time_in_force: TimeInForce::Day,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn market(symbol: &str, qty: u64, side: OrderSide) -> Result<Self, OrderError> {
        Self::new(symbol, qty, side, OrderKind::Market)
    }

    /// Trailing stop; exactly one of `percent` (decimal fraction) or `price` must be given.
    pub fn trailing_stop(
        symbol: &str,
        qty: u64,
        side: OrderSide,
        percent: Option<f64>,
        price: Option<f64>,
    ) -> Result<Self, OrderError> {
        let trail = match (percent, price) {
            (Some(p), None) => Trail::Percent(TrailPercent::new(p)?),
            (None, Some(p)) => Trail::Price(p),
            (None, None) => return Err(OrderError::TrailUnspecified),
            (Some(_), Some(_)) => return Err(OrderError::TrailAmbiguous),
        };
        Self::new(symbol, qty, side, OrderKind::TrailingStop { trail })
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        if self.qty == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        let prices = [
            ("limit", self.kind.limit_price()),
            ("stop", self.kind.stop_price()),
            (
                "trail",
                match self.kind {
                    OrderKind::TrailingStop {
                        trail: Trail::Price(p),
                    } => Some(p),
                    _ => None,
                },
            ),
        ];
        for (field, price) in prices {
            if let Some(p) = price {
                if !p.is_finite() || p <= 0.0 {
                    return Err(OrderError::InvalidPrice { field, value: p });
                }
            }
        }
        Ok(())
    }
}

/// An execution reported back to the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: u64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}
