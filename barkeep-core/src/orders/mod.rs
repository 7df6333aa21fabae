//! Order model: requests, lifecycle status, fills, and trailing-stop percentages.

pub mod order;
pub mod trail;

pub use order::{Fill, OrderKind, OrderRequest, OrderSide, OrderStatus, TimeInForce, Trail};
pub use trail::TrailPercent;

use crate::domain::RequestError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("invalid symbol: {0}")]
    Symbol(#[from] RequestError),

    #[error("order quantity must be positive")]
    ZeroQuantity,

    #[error("{field} price must be positive and finite, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("trail percent must be a fraction in (0, 1], got {0}")]
    InvalidTrailPercent(f64),

    #[error("trailing stop needs a trail percent or a trail price")]
    TrailUnspecified,

    #[error("trailing stop takes a trail percent or a trail price, not both")]
    TrailAmbiguous,
}
