// ===============================
// src/session.rs
// ===============================
//
// Single persistent venue connection with an explicit lifecycle:
//
//   Idle -> Connecting -> Connected -> { Closed, Errored }
//
// Closed/Errored are terminal for this instance; reconnecting means building a
// new session. There is deliberately no retry or backoff here: a connect
// failure is surfaced, not retried.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use url::Url;

use crate::metrics::WS_CONNECTED;
use crate::wire::{self, Outbound};

const OUTBOUND_QUEUE: usize = 256;
const INBOUND_QUEUE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

/// Advance the published state. Terminal states are absorbing; every other
/// transition is taken as requested.
fn transition(tx: &watch::Sender<SessionState>, next: SessionState) {
    tx.send_if_modified(|state| {
        if state.is_terminal() || *state == next {
            return false;
        }
        *state = next;
        WS_CONNECTED.set(if next == SessionState::Connected { 1 } else { 0 });
        true
    });
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("bad ws url: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("not connected, frame dropped")]
    NotConnected,
    #[error("session already opened; build a new instance to reconnect")]
    AlreadyOpen,
    #[error("outbound queue full, frame dropped")]
    QueueFull,
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct ConnectionSession {
    url: String,
    state_tx: watch::Sender<SessionState>,
    out_tx: Option<mpsc::Sender<String>>,
    frame_rx: Option<mpsc::Receiver<String>>,
}

/// Cloneable send-side of the session, handed to the command coordinator and
/// anything else that writes to the venue. The session task keeps exclusive
/// ownership of the socket itself.
#[derive(Clone)]
pub struct SessionHandle {
    state_rx: watch::Receiver<SessionState>,
    out_tx: mpsc::Sender<String>,
}

impl SessionHandle {
    pub(crate) fn new(state_rx: watch::Receiver<SessionState>, out_tx: mpsc::Sender<String>) -> Self {
        Self { state_rx, out_tx }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Serialize and transmit iff connected. Anything else drops the frame and
    /// reports it; commands are never queued for later (no offline queueing).
    pub fn send(&self, frame: &Outbound) -> Result<(), SessionError> {
        if self.state() != SessionState::Connected {
            warn!(state = ?self.state(), "send while not connected, dropping frame");
            return Err(SessionError::NotConnected);
        }
        let text = wire::encode_frame(frame)?;
        self.out_tx.try_send(text).map_err(|_| SessionError::QueueFull)
    }
}

impl ConnectionSession {
    pub fn new(url: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            url: url.into(),
            state_tx,
            out_tx: None,
            frame_rx: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        let out_tx = self.out_tx.clone()?;
        Some(SessionHandle::new(self.state_tx.subscribe(), out_tx))
    }

    /// Take the inbound frame stream. There is exactly one downstream consumer
    /// (the router loop), so this yields once.
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<String>> {
        self.frame_rx.take()
    }

    /// Open the transport, spawn the reader/writer tasks, and transition to
    /// `Connected`. A failure transitions to `Errored` and is returned; the
    /// caller decides whether a fresh session is worth building.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::AlreadyOpen);
        }
        transition(&self.state_tx, SessionState::Connecting);

        if let Err(e) = Url::parse(&self.url) {
            error!(url = %self.url, ?e, "bad ws url");
            transition(&self.state_tx, SessionState::Errored);
            return Err(e.into());
        }

        info!(url = %self.url, "connecting to venue");
        let ws = match connect_async(self.url.as_str()).await {
            Ok((ws, _resp)) => ws,
            Err(e) => {
                error!(?e, "connect failed");
                transition(&self.state_tx, SessionState::Errored);
                return Err(SessionError::Connect(e.to_string()));
            }
        };
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let (frame_tx, frame_rx) = mpsc::channel::<String>(INBOUND_QUEUE);

        // Writer: the only place that touches the socket's send half.
        let state_tx_w = self.state_tx.clone();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(text)).await {
                    error!(?e, "ws write error");
                    transition(&state_tx_w, SessionState::Errored);
                    return;
                }
            }
            // Sender side dropped: close() was called.
            let _ = ws_tx.close().await;
        });

        // Reader: text frames flow to the single downstream consumer in
        // arrival order; everything else is ignored.
        let state_tx_r = self.state_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(m) if m.is_text() => {
                        let text = match m.into_text() {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(?e, "failed to read text frame");
                                continue;
                            }
                        };
                        if frame_tx.send(text).await.is_err() {
                            // Downstream gone; nothing left to feed.
                            break;
                        }
                    }
                    Ok(m) if m.is_close() => {
                        info!("venue closed the connection");
                        transition(&state_tx_r, SessionState::Closed);
                        return;
                    }
                    Ok(_) => {
                        // ignore ping/pong/binary frames
                    }
                    Err(e) => {
                        error!(?e, "ws read error");
                        transition(&state_tx_r, SessionState::Errored);
                        return;
                    }
                }
            }
            transition(&state_tx_r, SessionState::Closed);
        });

        self.out_tx = Some(out_tx);
        self.frame_rx = Some(frame_rx);
        transition(&self.state_tx, SessionState::Connected);
        info!("venue connection established");
        Ok(())
    }

    /// Release the transport. Idempotent; calling it on a terminal session is
    /// a no-op.
    pub fn close(&mut self) {
        // Dropping the outbound sender lets the writer task close the socket.
        self.out_tx = None;
        transition(&self.state_tx, SessionState::Closed);
    }
}
