//! End to end: cached bars → registered strategy → signals and fills.

use barkeep_core::data::{BarStore, DataManager, ParquetStore};
use barkeep_core::domain::{Bar, BarSeries, Granularity};
use barkeep_core::orders::{Fill, OrderSide};
use barkeep_core::strategy::{Signal, StrategyRegistry};
use chrono::{Duration, NaiveDate};

/// 40 days down, 20 days up, 20 days down.
fn v_shaped() -> BarSeries {
    let t0 = NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(21, 0, 0)
        .unwrap()
        .and_utc();
    (0..80)
        .map(|i: i64| {
            let close = match i {
                0..=39 => 100.0 - i as f64,
                40..=59 => 61.0 + (i - 39) as f64,
                _ => 81.0 - (i - 59) as f64,
            };
            Bar {
                timestamp: t0 + Duration::days(i),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 10_000,
            }
        })
        .collect()
}

#[test]
fn sma_crossover_enters_on_rise_and_trails_out_on_reversal() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetStore::under(dir.path());
    let history = v_shaped();
    store.write("SPY", Granularity::Daily, &history).unwrap();

    // no provider: everything must come from the store
    let manager = DataManager::new(store);
    let span = history.span().unwrap();
    let bars = manager
        .retrieve_for_range("SPY", Granularity::Daily, span.start, span.end)
        .unwrap();
    assert_eq!(bars, history);

    let registry = StrategyRegistry::with_defaults();
    let mut strategy = registry.create("sma_crossover").unwrap();
    let mut signals = Vec::new();
    let mut held = 0;

    for end in 1..=bars.len() {
        let seen = BarSeries::from_bars(bars.bars()[..end].to_vec());
        let last = &bars.bars()[end - 1];
        let (side, qty) = match strategy.produce_signal(&seen) {
            Signal::Hold => continue,
            Signal::Buy => (OrderSide::Buy, strategy.size_position(10_000.0, last.close)),
            Signal::Sell => (OrderSide::Sell, held),
        };
        assert!(qty > 0);
        held = if side == OrderSide::Buy { qty } else { 0 };
        signals.push((side, last.close));
        strategy.on_fill(&Fill {
            order_id: format!("order-{end}"),
            symbol: "SPY".into(),
            side,
            qty,
            price: last.close,
            timestamp: last.timestamp,
        });
    }

    assert_eq!(signals.len(), 2, "signals: {signals:?}");
    assert_eq!(signals[0].0, OrderSide::Buy);
    assert_eq!(signals[1].0, OrderSide::Sell);
    // trailing stop fires on the first down day after the peak
    assert_eq!(signals[1].1, 80.0);
}
