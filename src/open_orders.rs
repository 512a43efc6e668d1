// ===============================
// src/open_orders.rs
// ===============================
use crate::domain::Order;
use crate::metrics::OPEN_ORDERS;

/// The trader's resting orders, always the most recent full snapshot the
/// venue sent. Cancels and modifies are deliberately not applied locally:
/// the venue broadcasts a fresh `open_orders_update` after every accepted
/// command, and that snapshot is the only thing this store reflects.
#[derive(Default)]
pub struct OpenOrdersStore {
    orders: Vec<Order>,
}

impl OpenOrdersStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire set.
    pub fn apply_snapshot(&mut self, orders: Vec<Order>) {
        OPEN_ORDERS.set(orders.len() as i64);
        self.orders = orders;
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, OrderType};

    fn order(id: &str, amount: f64) -> Order {
        Order {
            order_id: id.to_string(),
            instrument_name: "BTC-PERPETUAL".to_string(),
            amount,
            price: Some(64000.0),
            direction: Direction::Buy,
            order_type: OrderType::Limit,
        }
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let mut store = OpenOrdersStore::new();
        store.apply_snapshot(vec![order("1", 10.0), order("2", 20.0)]);
        assert_eq!(store.len(), 2);

        // the next snapshot is authoritative, not a diff
        store.apply_snapshot(vec![order("3", 5.0)]);
        assert_eq!(store.len(), 1);
        assert!(store.orders().iter().all(|o| o.order_id != "1"));
        assert_eq!(store.orders()[0].amount, 5.0);
    }

    #[test]
    fn empty_snapshot_clears_the_set() {
        let mut store = OpenOrdersStore::new();
        store.apply_snapshot(vec![order("1", 10.0)]);
        store.apply_snapshot(Vec::new());
        assert!(store.is_empty());
    }
}
