//! Data layer: remote provider, local Parquet store, and the cache orchestrator between them.

pub mod alpaca;
pub mod canonicalize;
pub mod circuit_breaker;
pub mod coverage;
pub mod frame;
pub mod manager;
pub mod provider;
pub mod store;

pub use alpaca::AlpacaProvider;
pub use canonicalize::{canonicalize, is_canonical, CanonicalReport};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use coverage::{has_coverage, Coverage, MissReason};
pub use manager::{CacheStatus, DataError, DataManager, Retrieval, RetrievalOutcome};
pub use provider::{DataProvider, FetchError, FetchRequest};
pub use store::{BarStore, ParquetStore, StoreError};
