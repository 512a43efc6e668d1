// ===============================
// src/config.rs
// ===============================
use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::domain::InstrumentKind;

#[derive(Clone, Debug)]
pub struct Args {
    /// Venue WebSocket endpoint, e.g. ws://localhost:9002
    pub ws_url: String,

    /// Account currency and instrument class for the initial
    /// instruments/positions requests.
    pub currency: String,
    pub kind: InstrumentKind,

    /// Instruments to watch order books for. Empty = take the first
    /// instrument the venue lists for (currency, kind).
    pub instruments: Vec<String>,

    /// Rows per side in the book view.
    pub book_depth: usize,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,

    /// Deadline for a command with no response; None disables expiry.
    pub command_timeout: Option<Duration>,
}

pub fn load() -> Args {
    // Read .env first so WS_URL, INSTRUMENTS etc. are picked up
    let _ = dotenv();

    let ws_url = env::var("WS_URL").unwrap_or_else(|_| "ws://localhost:9002".to_string());

    let currency = env::var("CURRENCY")
        .map(|c| c.trim().to_ascii_uppercase())
        .unwrap_or_else(|_| "BTC".to_string());

    let kind = env::var("KIND")
        .ok()
        .and_then(|s| InstrumentKind::parse_one(&s))
        .unwrap_or(InstrumentKind::Future);

    // INSTRUMENTS=BTC-PERPETUAL,ETH-PERPETUAL
    let instruments: Vec<String> = env::var("INSTRUMENTS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(|x| x.to_ascii_uppercase())
                .collect()
        })
        .unwrap_or_default();

    let book_depth = env::var("BOOK_DEPTH")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let record_file = env::var("RECORD_FILE").ok();
    let metrics_port = env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);

    // COMMAND_TIMEOUT_MS=0 disables expiry
    let command_timeout = match env::var("COMMAND_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5000)
    {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    Args {
        ws_url,
        currency,
        kind,
        instruments,
        book_depth,
        record_file,
        metrics_port,
        command_timeout,
    }
}
