// ===============================
// src/wire.rs
// ===============================
//
// Frame protocol for the venue WebSocket. Every frame is one newline-free JSON
// object with a `type` discriminator; serde's internal tagging maps that 1:1
// onto the enums below. Anything that fails to decode is dropped by the router
// with a diagnostic, never bubbled up to callers.

use serde::{Deserialize, Serialize};

use crate::domain::{BookLevel, Direction, Instrument, InstrumentKind, Order, OrderType, Position};

/// Outbound command frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    GetInstruments {
        currency: String,
        kind: InstrumentKind,
    },
    GetOrderbook {
        instrument: String,
    },
    GetOpenOrders,
    GetPositions {
        currency: String,
        kind: InstrumentKind,
    },
    PlaceOrder {
        data: PlaceOrder,
    },
    ModifyOrder {
        data: ModifyOrder,
    },
    CancelOrder {
        data: CancelOrder,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceOrder {
    pub instrument_name: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub direction: Direction,
    /// Required iff `order_type` is limit; omitted for market orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifyOrder {
    pub order_id: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelOrder {
    pub order_id: String,
}

/// Inbound frames. Unknown `type` values fail the decode and are dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Instruments {
        #[serde(default)]
        result: Vec<Instrument>,
        #[serde(default)]
        error: Option<String>,
    },
    OrderbookUpdate {
        instrument: String,
        data: BookData,
    },
    OpenOrdersUpdate {
        data: OpenOrdersData,
    },
    PositionsUpdate {
        currency: String,
        kind: InstrumentKind,
        data: Vec<Position>,
    },
    OrderResponse {
        #[serde(default)]
        result: Option<OrderResult>,
        #[serde(default)]
        error: Option<String>,
    },
    ModifyResponse {
        #[serde(default)]
        error: Option<String>,
    },
    CancelResponse {
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookData {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

/// `data` of an `open_orders_update`. The venue puts an `error` object here
/// when its upstream fetch failed, in which case `result` is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrdersData {
    #[serde(default)]
    pub result: Vec<Order>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResult {
    #[serde(default)]
    pub order: Option<PlacedOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
}

/// Routing key derived from the `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Instruments,
    OrderbookUpdate,
    OpenOrdersUpdate,
    PositionsUpdate,
    OrderResponse,
    ModifyResponse,
    CancelResponse,
}

impl FrameKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Instruments => "instruments",
            FrameKind::OrderbookUpdate => "orderbook_update",
            FrameKind::OpenOrdersUpdate => "open_orders_update",
            FrameKind::PositionsUpdate => "positions_update",
            FrameKind::OrderResponse => "order_response",
            FrameKind::ModifyResponse => "modify_response",
            FrameKind::CancelResponse => "cancel_response",
        }
    }
}

impl Inbound {
    pub fn kind(&self) -> FrameKind {
        match self {
            Inbound::Instruments { .. } => FrameKind::Instruments,
            Inbound::OrderbookUpdate { .. } => FrameKind::OrderbookUpdate,
            Inbound::OpenOrdersUpdate { .. } => FrameKind::OpenOrdersUpdate,
            Inbound::PositionsUpdate { .. } => FrameKind::PositionsUpdate,
            Inbound::OrderResponse { .. } => FrameKind::OrderResponse,
            Inbound::ModifyResponse { .. } => FrameKind::ModifyResponse,
            Inbound::CancelResponse { .. } => FrameKind::CancelResponse,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one raw text frame. Callers must branch on the result; a failure is
/// a droppable frame, not an exception.
pub fn decode_frame(raw: &str) -> Result<Inbound, DecodeError> {
    Ok(serde_json::from_str::<Inbound>(raw)?)
}

pub fn encode_frame(frame: &Outbound) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}
