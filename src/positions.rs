// ===============================
// src/positions.rs
// ===============================
use ahash::AHashMap as HashMap;

use crate::domain::{InstrumentKind, Position};
use crate::metrics::POSITION_BUCKETS;

/// Position snapshots keyed by (currency, kind). Each `positions_update`
/// replaces exactly one bucket; every other bucket keeps its last-known
/// contents. Queries are pure projections.
#[derive(Default)]
pub struct PositionsStore {
    // first-seen order, drives the "any" aggregation order
    currencies: Vec<String>,
    buckets: HashMap<(String, InstrumentKind), Vec<Position>>,
}

/// Currency wildcard accepted by `query`.
pub const ANY_CURRENCY: &str = "any";

impl PositionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_update(&mut self, currency: &str, kind: InstrumentKind, positions: Vec<Position>) {
        if !self.currencies.iter().any(|c| c == currency) {
            self.currencies.push(currency.to_string());
        }
        self.buckets.insert((currency.to_string(), kind), positions);
        POSITION_BUCKETS.set(self.buckets.len() as i64);
    }

    /// Bucket lookup. `"any"` concatenates each currency's bucket for `kind`
    /// in currency insertion order, keeping position order within buckets; a
    /// never-populated bucket is an empty sequence.
    pub fn query(&self, currency: &str, kind: InstrumentKind) -> Vec<Position> {
        if currency == ANY_CURRENCY {
            self.currencies
                .iter()
                .flat_map(|c| {
                    self.buckets
                        .get(&(c.clone(), kind))
                        .into_iter()
                        .flatten()
                        .cloned()
                })
                .collect()
        } else {
            self.buckets
                .get(&(currency.to_string(), kind))
                .cloned()
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(name: &str, size: f64) -> Position {
        Position {
            instrument_name: name.to_string(),
            size,
            average_price: 100.0,
            mark_price: 101.0,
            floating_profit_loss: 0.5,
        }
    }

    fn names(positions: &[Position]) -> Vec<&str> {
        positions.iter().map(|p| p.instrument_name.as_str()).collect()
    }

    #[test]
    fn updating_one_bucket_leaves_the_rest_alone() {
        let mut store = PositionsStore::new();
        store.apply_update("BTC", InstrumentKind::Future, vec![pos("BTC-PERPETUAL", 10.0)]);
        store.apply_update("ETH", InstrumentKind::Future, vec![pos("ETH-PERPETUAL", -5.0)]);

        assert_eq!(names(&store.query("BTC", InstrumentKind::Future)), vec!["BTC-PERPETUAL"]);
        assert_eq!(names(&store.query("ETH", InstrumentKind::Future)), vec!["ETH-PERPETUAL"]);
    }

    #[test]
    fn kinds_are_independent_buckets_within_a_currency() {
        let mut store = PositionsStore::new();
        store.apply_update("BTC", InstrumentKind::Future, vec![pos("BTC-PERPETUAL", 10.0)]);
        store.apply_update("BTC", InstrumentKind::Option, vec![pos("BTC-30AUG26-70000-C", 1.0)]);

        store.apply_update("BTC", InstrumentKind::Future, vec![pos("BTC-26SEP26", 2.0)]);
        assert_eq!(
            names(&store.query("BTC", InstrumentKind::Option)),
            vec!["BTC-30AUG26-70000-C"]
        );
    }

    #[test]
    fn any_concatenates_in_currency_insertion_order() {
        let mut store = PositionsStore::new();
        store.apply_update("ETH", InstrumentKind::Future, vec![pos("ETH-PERPETUAL", -5.0)]);
        store.apply_update("BTC", InstrumentKind::Future, vec![pos("BTC-PERPETUAL", 10.0), pos("BTC-26SEP26", 2.0)]);
        store.apply_update("USDC", InstrumentKind::Spot, vec![pos("USDC_USD", 1000.0)]);

        // ETH first: it was seen first, spot bucket does not leak into futures
        assert_eq!(
            names(&store.query(ANY_CURRENCY, InstrumentKind::Future)),
            vec!["ETH-PERPETUAL", "BTC-PERPETUAL", "BTC-26SEP26"]
        );
    }

    #[test]
    fn any_equals_per_currency_concatenation() {
        let mut store = PositionsStore::new();
        store.apply_update("BTC", InstrumentKind::Future, vec![pos("BTC-PERPETUAL", 10.0)]);
        store.apply_update("ETH", InstrumentKind::Future, vec![pos("ETH-PERPETUAL", -5.0)]);

        let mut concat = store.query("BTC", InstrumentKind::Future);
        concat.extend(store.query("ETH", InstrumentKind::Future));
        assert_eq!(names(&store.query(ANY_CURRENCY, InstrumentKind::Future)), names(&concat));
    }

    #[test]
    fn unknown_bucket_is_empty_not_an_error() {
        let store = PositionsStore::new();
        assert!(store.query("BTC", InstrumentKind::Future).is_empty());
        assert!(store.query(ANY_CURRENCY, InstrumentKind::OptionCombo).is_empty());
    }

    #[test]
    fn query_does_not_mutate() {
        let mut store = PositionsStore::new();
        store.apply_update("BTC", InstrumentKind::Future, vec![pos("BTC-PERPETUAL", 10.0)]);

        let _ = store.query(ANY_CURRENCY, InstrumentKind::Future);
        let _ = store.query("ETH", InstrumentKind::Future);
        assert_eq!(names(&store.query("BTC", InstrumentKind::Future)), vec!["BTC-PERPETUAL"]);
    }
}
