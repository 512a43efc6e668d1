// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Frame pipeline --------
pub static FRAMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("frames_total", "decoded inbound frames per type"),
        &["type"],
    )
    .unwrap()
});

pub static DECODE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("decode_failures_total", "inbound frames dropped as undecodable").unwrap()
});

pub static HANDLER_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "handler_errors_total",
            "subscriber handlers that returned an error during dispatch",
        ),
        &["type"],
    )
    .unwrap()
});

pub static UNROUTED_FRAMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "unrouted_frames_total",
            "well-formed frames with no registered subscriber",
        ),
        &["type"],
    )
    .unwrap()
});

// -------- Commands --------
// outcome: sent | succeeded | failed | expired | unmatched
pub static COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("commands_total", "order commands by kind and outcome"),
        &["kind", "outcome"],
    )
    .unwrap()
});

// -------- Connection --------
pub static WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ws_connected", "1 while the venue connection is in the connected state")
        .unwrap()
});

// -------- Store sizes --------
pub static BOOK_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("book_updates_total", "order book snapshots applied per instrument"),
        &["instrument"],
    )
    .unwrap()
});

pub static OPEN_ORDERS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("open_orders", "resting orders in the latest snapshot").unwrap());

pub static POSITION_BUCKETS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("position_buckets", "(currency, kind) buckets held by the positions store")
        .unwrap()
});

// ---- Config visibility (currency / kind / instruments) ----
pub static CONFIG_CURRENCY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_currency", "configured currency (label: currency)"),
        &["currency"],
    )
    .unwrap()
});

pub static CONFIG_KIND: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_kind", "configured instrument kind (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static CONFIG_INSTRUMENT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_instrument", "watched instruments (label: instrument)"),
        &["instrument"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(FRAMES.clone())),
        REGISTRY.register(Box::new(DECODE_FAILURES.clone())),
        REGISTRY.register(Box::new(HANDLER_ERRORS.clone())),
        REGISTRY.register(Box::new(UNROUTED_FRAMES.clone())),
        REGISTRY.register(Box::new(COMMANDS.clone())),
        REGISTRY.register(Box::new(WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(BOOK_UPDATES.clone())),
        REGISTRY.register(Box::new(OPEN_ORDERS.clone())),
        REGISTRY.register(Box::new(POSITION_BUCKETS.clone())),
        REGISTRY.register(Box::new(CONFIG_CURRENCY.clone())),
        REGISTRY.register(Box::new(CONFIG_KIND.clone())),
        REGISTRY.register(Box::new(CONFIG_INSTRUMENT.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Consume request headers without a full parse
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps the Tokio runtime clean)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}
