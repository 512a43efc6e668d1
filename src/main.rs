// ===============================
// src/main.rs
// ===============================
/*
=============================================================================
Project : deribit_client_rust - realtime trading client over one WebSocket

Summary : Maintains a live view of market and account state (order books,
          open orders, positions) from a Deribit-style venue over a single
          persistent connection, fans inbound frames out to per-type
          subscribers, and correlates place/modify/cancel commands with
          their eventual responses. Prometheus metrics and an optional
          JSONL frame recorder included.
=============================================================================
*/
mod commands;
mod config;
mod console;
mod domain;
mod metrics;
mod open_orders;
mod orderbook;
mod positions;
mod recorder;
mod router;
mod session;
mod wire;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::{select, sync::mpsc};
use tracing::{error, info, warn};

use crate::commands::{Command, CommandCoordinator, CommandState};
use crate::console::ConsoleCmd;
use crate::open_orders::OpenOrdersStore;
use crate::orderbook::OrderBookStore;
use crate::positions::PositionsStore;
use crate::router::MessageRouter;
use crate::session::ConnectionSession;
use crate::wire::{FrameKind, Inbound, Outbound};

type Shared<T> = Arc<Mutex<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    // ---- Load config ----
    let args = config::load();

    // ---- Metrics ----
    metrics::init();
    metrics::serve_metrics(args.metrics_port);

    info!(
        ws = %args.ws_url,
        currency = %args.currency,
        kind = args.kind.as_str(),
        instruments = ?args.instruments,
        depth = args.book_depth,
        "startup config"
    );
    metrics::CONFIG_CURRENCY.with_label_values(&[&args.currency]).set(1);
    metrics::CONFIG_KIND.with_label_values(&[args.kind.as_str()]).set(1);
    for inst in &args.instruments {
        metrics::CONFIG_INSTRUMENT.with_label_values(&[inst]).set(1);
    }

    // ---- Venue session (no retry: a failure here is surfaced and we exit) ----
    let mut session = ConnectionSession::new(args.ws_url.clone());
    if let Err(e) = session.open().await {
        error!(%e, "could not reach venue, exiting");
        return;
    }
    let (Some(handle), Some(mut frames)) = (session.handle(), session.take_frames()) else {
        error!("session opened without handle/frames, exiting");
        return;
    };
    let mut state_rx = session.watch_state();

    // ---- Recorder (optional) ----
    let rec_tx = args.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<recorder::FrameRecord>(8192);
        tokio::spawn(recorder::run(rx, path));
        tx
    });

    // ---- Stores & coordinator ----
    let books = shared(OrderBookStore::new());
    let positions = shared(PositionsStore::new());
    let open_orders = shared(OpenOrdersStore::new());
    let coordinator = shared(CommandCoordinator::new(handle.clone(), args.command_timeout));

    // Instruments whose books we watch; filled from the instruments response
    // when none are configured.
    let watched = shared(args.instruments.clone());

    // ---- Router wiring (one subscriber slice per concern) ----
    let mut router = MessageRouter::new();

    {
        // instruments: informational, plus the book fallback when nothing is
        // configured (the original panel watches the first listed instrument)
        let handle = handle.clone();
        let watched = watched.clone();
        router.subscribe(
            FrameKind::Instruments,
            Box::new(move |frame| {
                let Inbound::Instruments { result, error } = frame else {
                    return Ok(());
                };
                if let Some(e) = error {
                    warn!(%e, "instruments request failed");
                    return Ok(());
                }
                info!(count = result.len(), "instruments received");
                let mut watched = watched.lock().map_err(|_| "watched list poisoned")?;
                if watched.is_empty() {
                    if let Some(first) = result.first() {
                        info!(instrument = %first.instrument_name, "no INSTRUMENTS configured, watching first listed");
                        watched.push(first.instrument_name.clone());
                        handle.send(&Outbound::GetOrderbook {
                            instrument: first.instrument_name.clone(),
                        })?;
                    }
                }
                Ok(())
            }),
        );
    }

    {
        let books = books.clone();
        router.subscribe(
            FrameKind::OrderbookUpdate,
            Box::new(move |frame| {
                let Inbound::OrderbookUpdate { instrument, data } = frame else {
                    return Ok(());
                };
                books
                    .lock()
                    .map_err(|_| "book store poisoned")?
                    .apply_snapshot(instrument, data.bids.clone(), data.asks.clone());
                Ok(())
            }),
        );
    }

    {
        let open_orders = open_orders.clone();
        router.subscribe(
            FrameKind::OpenOrdersUpdate,
            Box::new(move |frame| {
                let Inbound::OpenOrdersUpdate { data } = frame else {
                    return Ok(());
                };
                if let Some(e) = &data.error {
                    // keep the last good snapshot instead of clobbering it
                    warn!(%e, "open orders fetch failed upstream");
                    return Ok(());
                }
                open_orders
                    .lock()
                    .map_err(|_| "open orders store poisoned")?
                    .apply_snapshot(data.result.clone());
                Ok(())
            }),
        );
    }

    {
        let positions = positions.clone();
        router.subscribe(
            FrameKind::PositionsUpdate,
            Box::new(move |frame| {
                let Inbound::PositionsUpdate { currency, kind, data } = frame else {
                    return Ok(());
                };
                positions
                    .lock()
                    .map_err(|_| "positions store poisoned")?
                    .apply_update(currency, *kind, data.clone());
                Ok(())
            }),
        );
    }

    for kind in [FrameKind::OrderResponse, FrameKind::ModifyResponse, FrameKind::CancelResponse] {
        let coordinator = coordinator.clone();
        router.subscribe(
            kind,
            Box::new(move |frame| {
                coordinator
                    .lock()
                    .map_err(|_| "coordinator poisoned")?
                    .on_response(frame);
                Ok(())
            }),
        );
    }

    // ---- Initial subscriptions ----
    let mut initial = vec![
        Outbound::GetInstruments {
            currency: args.currency.clone(),
            kind: args.kind,
        },
        Outbound::GetOpenOrders,
        Outbound::GetPositions {
            currency: args.currency.clone(),
            kind: args.kind,
        },
    ];
    for inst in &args.instruments {
        initial.push(Outbound::GetOrderbook { instrument: inst.clone() });
    }
    for frame in &initial {
        if let Err(e) = handle.send(frame) {
            error!(%e, "initial request dropped");
        }
    }

    // ---- Console ----
    let (con_tx, mut con_rx) = mpsc::channel::<ConsoleCmd>(32);
    tokio::spawn(console::run(con_tx));

    // ---- Event loop: one frame at a time, in arrival order ----
    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
    loop {
        select! {
            maybe_frame = frames.recv() => {
                match maybe_frame {
                    Some(raw) => {
                        if let Some(tx) = &rec_tx {
                            let _ = tx.try_send(recorder::FrameRecord::now(raw.clone()));
                        }
                        router.dispatch_text(&raw);
                    }
                    None => {
                        info!("frame stream ended");
                        break;
                    }
                }
            }

            Some(cmd) = con_rx.recv() => {
                handle_console(cmd, &args, &coordinator, &books, &positions, &open_orders);
            }

            _ = state_rx.changed() => {
                let state = *state_rx.borrow();
                if state.is_terminal() {
                    warn!(?state, "venue connection is gone; restart the client to reconnect");
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if let Ok(mut coord) = coordinator.lock() {
                    coord.expire(Instant::now());
                }
                log_top_of_book(&watched, &books);
            }
        }
    }
}

fn log_top_of_book(watched: &Shared<Vec<String>>, books: &Shared<OrderBookStore>) {
    let (Ok(watched), Ok(books)) = (watched.lock(), books.lock()) else {
        return;
    };
    for inst in watched.iter() {
        let view = books.view(inst, 1);
        let (bid, ask) = (&view.bids[0], &view.asks[0]);
        if bid.is_pad() && ask.is_pad() {
            continue; // nothing received yet
        }
        info!(
            instrument = %inst,
            bid = bid.price(),
            bid_size = bid.size(),
            ask = ask.price(),
            ask_size = ask.size(),
            "top of book"
        );
    }
}

fn handle_console(
    cmd: ConsoleCmd,
    args: &config::Args,
    coordinator: &Shared<CommandCoordinator>,
    books: &Shared<OrderBookStore>,
    positions: &Shared<PositionsStore>,
    open_orders: &Shared<OpenOrdersStore>,
) {
    match cmd {
        ConsoleCmd::Place(data) => submit(coordinator, Command::Place(data)),
        ConsoleCmd::Modify(data) => submit(coordinator, Command::Modify(data)),
        ConsoleCmd::Cancel(data) => submit(coordinator, Command::Cancel(data)),

        ConsoleCmd::ShowBook { instrument } => {
            let Ok(books) = books.lock() else { return };
            match books.snapshot(&instrument) {
                Some(snap) => println!("--- {} (last update {}) ---", snap.instrument, snap.updated_at),
                None => println!("--- {instrument} (no snapshot yet) ---"),
            }
            let view = books.view(&instrument, args.book_depth);
            for level in view.asks.iter().chain(view.bids.iter()) {
                if level.is_pad() {
                    println!("          -");
                } else {
                    println!("  {:>12.2}  x {:>10.4}", level.price(), level.size());
                }
            }
        }

        ConsoleCmd::ShowOrders => {
            let Ok(store) = open_orders.lock() else { return };
            if store.is_empty() {
                println!("no open orders");
                return;
            }
            for o in store.orders() {
                println!(
                    "  {}  {}  {:?} {:?}  amount {}  price {}",
                    o.order_id,
                    o.instrument_name,
                    o.direction,
                    o.order_type,
                    o.amount,
                    o.price.map_or_else(|| "-".to_string(), |p| p.to_string()),
                );
            }
        }

        ConsoleCmd::ShowPositions { currency, kind } => {
            let Ok(store) = positions.lock() else { return };
            let currency = currency.unwrap_or_else(|| args.currency.clone());
            let kind = kind.unwrap_or(args.kind);
            let rows = store.query(&currency, kind);
            if rows.is_empty() {
                println!("no positions for {currency}/{}", kind.as_str());
                return;
            }
            for p in rows {
                println!(
                    "  {}  size {}  avg {}  mark {}  upl {}",
                    p.instrument_name, p.size, p.average_price, p.mark_price, p.floating_profit_loss,
                );
            }
        }

        ConsoleCmd::Help => println!("{}", console::HELP),
    }
}

/// Submit one command and log its settled outcome without blocking the loop.
fn submit(coordinator: &Shared<CommandCoordinator>, command: Command) {
    let Ok(mut coord) = coordinator.lock() else { return };
    match coord.submit(command) {
        Ok(handle) => {
            tokio::spawn(async move {
                match handle.settled().await {
                    CommandState::Succeeded { order_id: Some(id) } => {
                        info!(order_id = %id, "order accepted")
                    }
                    CommandState::Succeeded { order_id: None } => info!("command accepted"),
                    CommandState::Failed { reason } => warn!(%reason, "command rejected"),
                    CommandState::InFlight => warn!("command abandoned while in flight"),
                }
            });
        }
        Err(e) => warn!(%e, "command not sent"),
    }
}
