// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instrument class as Deribit names them. Combo kinds only ever show up in
/// positions queries, never in the instrument selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Future,
    Option,
    Spot,
    FutureCombo,
    OptionCombo,
}

impl InstrumentKind {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "future" => Some(InstrumentKind::Future),
            "option" => Some(InstrumentKind::Option),
            "spot" => Some(InstrumentKind::Spot),
            "future_combo" => Some(InstrumentKind::FutureCombo),
            "option_combo" => Some(InstrumentKind::OptionCombo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Future => "future",
            InstrumentKind::Option => "option",
            InstrumentKind::Spot => "spot",
            InstrumentKind::FutureCombo => "future_combo",
            InstrumentKind::OptionCombo => "option_combo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Tradable instrument as delivered by the `instruments` frame.
/// `expiration_timestamp` is absent for spot, strike/option_type only for options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_name: String,
    pub kind: InstrumentKind,
    #[serde(default)]
    pub expiration_timestamp: Option<i64>,
    #[serde(default)]
    pub strike: Option<f64>,
    #[serde(default)]
    pub option_type: Option<OptionType>,
}

/// One price level: `[price, size]` on the wire. `(0, 0)` is the synthetic
/// padding entry, never a real quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel(pub f64, pub f64);

impl BookLevel {
    pub const PAD: BookLevel = BookLevel(0.0, 0.0);

    pub fn price(&self) -> f64 {
        self.0
    }

    pub fn size(&self) -> f64 {
        self.1
    }

    /// True for the synthetic "no level" entry a renderer should suppress.
    pub fn is_pad(&self) -> bool {
        self.0 == 0.0 && self.1 == 0.0
    }
}

/// Latest full book for one instrument. Replaced wholesale on each
/// `orderbook_update`; the venue sends snapshots, not deltas.
#[derive(Debug, Clone)]
pub struct OrderBookSnapshot {
    pub instrument: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument_name: String,
    pub size: f64,
    pub average_price: f64,
    pub mark_price: f64,
    #[serde(default)]
    pub floating_profit_loss: f64,
}

/// Resting order as delivered inside `open_orders_update`. `price` is absent
/// for market orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub instrument_name: String,
    pub amount: f64,
    #[serde(default)]
    pub price: Option<f64>,
    pub direction: Direction,
    pub order_type: OrderType,
}
