//! Strategy registry: stable string key → constructor.

use super::sma::{self, SmaCrossover};
use super::{Strategy, StrategyError, StrategyProfile};
use std::collections::BTreeMap;

/// Live retrieval never asks for fewer daily bars than this.
pub const MIN_LOOKBACK_DAYS: u32 = 30;

type Constructor = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

#[derive(Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<String, Constructor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.entries.insert(
            sma::KEY.to_string(),
            Box::new(|| Box::new(SmaCrossover::default()) as Box<dyn Strategy>),
        );
        registry
    }

    pub fn register<F, S>(&mut self, key: &str, constructor: F) -> Result<(), StrategyError>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Strategy + 'static,
    {
        if self.entries.contains_key(key) {
            return Err(StrategyError::Duplicate(key.to_string()));
        }
        self.entries.insert(
            key.to_string(),
            Box::new(move || Box::new(constructor()) as Box<dyn Strategy>),
        );
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn create(&self, key: &str) -> Result<Box<dyn Strategy>, StrategyError> {
        self.entries
            .get(key)
            .map(|construct| construct())
            .ok_or_else(|| StrategyError::Unknown {
                key: key.to_string(),
                available: self.keys().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn profile(&self, key: &str) -> Result<StrategyProfile, StrategyError> {
        Ok(self.create(key)?.profile().clone())
    }

    /// Largest lookback among the selected strategies (all registered when
    /// `selected` is empty), never below [`MIN_LOOKBACK_DAYS`].
    pub fn max_lookback_days(&self, selected: &[String]) -> Result<u32, StrategyError> {
        let mut max = MIN_LOOKBACK_DAYS;
        if selected.is_empty() {
            for construct in self.entries.values() {
                max = max.max(construct().profile().lookback_days);
            }
        } else {
            for key in selected {
                max = max.max(self.profile(key)?.lookback_days);
            }
        }
        Ok(max)
    }
}
