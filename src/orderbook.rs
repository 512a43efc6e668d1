// ===============================
// src/orderbook.rs
// ===============================
use ahash::AHashMap as HashMap;
use chrono::Utc;

use crate::domain::{BookLevel, OrderBookSnapshot};
use crate::metrics::BOOK_UPDATES;

/// Latest full book per instrument. New snapshots replace the old one
/// wholesale; there is no history and no delta merging.
#[derive(Default)]
pub struct OrderBookStore {
    books: HashMap<String, OrderBookSnapshot>,
}

/// Depth-bounded projection for display: always exactly `depth` rows per
/// side, padded with `BookLevel::PAD` at the worse end so the best prices sit
/// next to the spread. Asks come back worst-to-best for stacked rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct BookView {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot for one instrument; other instruments are
    /// untouched.
    pub fn apply_snapshot(&mut self, instrument: &str, bids: Vec<BookLevel>, asks: Vec<BookLevel>) {
        BOOK_UPDATES.with_label_values(&[instrument]).inc();
        self.books.insert(
            instrument.to_string(),
            OrderBookSnapshot {
                instrument: instrument.to_string(),
                bids,
                asks,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn snapshot(&self, instrument: &str) -> Option<&OrderBookSnapshot> {
        self.books.get(instrument)
    }

    /// Fixed-depth view. An instrument we have never seen yields an all-pad
    /// view; callers never branch on row count.
    pub fn view(&self, instrument: &str, depth: usize) -> BookView {
        let (bids, asks) = match self.books.get(instrument) {
            Some(snap) => (snap.bids.as_slice(), snap.asks.as_slice()),
            None => (&[][..], &[][..]),
        };

        let mut asks = pad_side(asks, depth);
        asks.reverse();
        BookView {
            bids: pad_side(bids, depth),
            asks,
        }
    }
}

/// Best-first levels, truncated or padded to exactly `depth` entries with the
/// synthetic zero level at the far end.
fn pad_side(levels: &[BookLevel], depth: usize) -> Vec<BookLevel> {
    let mut side: Vec<BookLevel> = levels.iter().take(depth).copied().collect();
    side.resize(depth, BookLevel::PAD);
    side
}
