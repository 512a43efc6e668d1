// ===============================
// src/commands.rs
// ===============================
//
// Fire-and-forget command submission with response correlation. The wire
// protocol carries no per-command request id, so a response can only be
// matched by its type: the next `order_response` settles the most recently
// submitted place command, and so on. That makes overlapping same-kind
// commands indistinguishable; we keep the at-most-one-in-flight-per-kind
// assumption, warn when a caller breaks it, and add the one hardening the
// protocol allows: a deadline after which a silent command fails.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::metrics::COMMANDS;
use crate::session::{SessionError, SessionHandle};
use crate::wire::{CancelOrder, Inbound, ModifyOrder, Outbound, PlaceOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Place,
    Modify,
    Cancel,
}

impl CommandKind {
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Place => "place",
            CommandKind::Modify => "modify",
            CommandKind::Cancel => "cancel",
        }
    }

    fn slot(&self) -> usize {
        match self {
            CommandKind::Place => 0,
            CommandKind::Modify => 1,
            CommandKind::Cancel => 2,
        }
    }
}

/// One order command with its outbound payload.
#[derive(Debug, Clone)]
pub enum Command {
    Place(PlaceOrder),
    Modify(ModifyOrder),
    Cancel(CancelOrder),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Place(_) => CommandKind::Place,
            Command::Modify(_) => CommandKind::Modify,
            Command::Cancel(_) => CommandKind::Cancel,
        }
    }

    fn into_frame(self) -> Outbound {
        match self {
            Command::Place(data) => Outbound::PlaceOrder { data },
            Command::Modify(data) => Outbound::ModifyOrder { data },
            Command::Cancel(data) => Outbound::CancelOrder { data },
        }
    }
}

/// Lifecycle of a submitted command. `Succeeded` and `Failed` are terminal
/// and never re-entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandState {
    InFlight,
    Succeeded { order_id: Option<String> },
    Failed { reason: String },
}

impl CommandState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, CommandState::InFlight)
    }
}

/// Read-only view of one pending command's lifecycle.
pub struct CommandHandle {
    rx: watch::Receiver<CommandState>,
}

impl CommandHandle {
    pub fn state(&self) -> CommandState {
        self.rx.borrow().clone()
    }

    /// Wait for the terminal state. Resolves immediately if already settled.
    pub async fn settled(mut self) -> CommandState {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if state.is_settled() {
                return state;
            }
            if self.rx.changed().await.is_err() {
                // Coordinator dropped with the command still in flight.
                return self.rx.borrow().clone();
            }
        }
    }
}

struct Pending {
    seq: u64,
    kind: CommandKind,
    sent_at: Instant,
    tx: watch::Sender<CommandState>,
}

pub struct CommandCoordinator {
    session: SessionHandle,
    // one lane per command kind, oldest first
    pending: [Vec<Pending>; 3],
    next_seq: u64,
    timeout: Option<Duration>,
}

impl CommandCoordinator {
    pub fn new(session: SessionHandle, timeout: Option<Duration>) -> Self {
        Self {
            session,
            pending: [Vec::new(), Vec::new(), Vec::new()],
            next_seq: 0,
            timeout,
        }
    }

    /// Send a command and track it until its response type comes back. The
    /// returned handle is observation-only; the pending command itself stays
    /// owned here.
    pub fn submit(&mut self, command: Command) -> Result<CommandHandle, SessionError> {
        let kind = command.kind();
        let in_flight = self.in_flight(kind);
        if in_flight > 0 {
            // Correlation is by response type only; overlapping same-kind
            // commands cannot be told apart when the responses arrive.
            warn!(
                kind = kind.label(),
                in_flight,
                "submitting with same-kind command already in flight"
            );
        }

        self.session.send(&command.clone().into_frame())?;

        let seq = self.next_seq;
        self.next_seq += 1;
        let (tx, rx) = watch::channel(CommandState::InFlight);
        self.pending[kind.slot()].push(Pending {
            seq,
            kind,
            sent_at: Instant::now(),
            tx,
        });
        COMMANDS.with_label_values(&[kind.label(), "sent"]).inc();
        info!(kind = kind.label(), seq, "command sent");
        Ok(CommandHandle { rx })
    }

    /// Feed one inbound frame. Response frames settle the most recently
    /// submitted in-flight command of the matching kind; anything else is
    /// ignored. A response with no pending counterpart (coordinator restart,
    /// duplicate response) is counted and dropped, never an error.
    pub fn on_response(&mut self, frame: &Inbound) {
        let (kind, error, order_id) = match frame {
            Inbound::OrderResponse { result, error } => (
                CommandKind::Place,
                error.clone(),
                result
                    .as_ref()
                    .and_then(|r| r.order.as_ref())
                    .map(|o| o.order_id.clone()),
            ),
            Inbound::ModifyResponse { error } => (CommandKind::Modify, error.clone(), None),
            Inbound::CancelResponse { error } => (CommandKind::Cancel, error.clone(), None),
            _ => return,
        };

        let Some(pending) = self.pending[kind.slot()].pop() else {
            COMMANDS.with_label_values(&[kind.label(), "unmatched"]).inc();
            debug!(kind = kind.label(), "response with no pending command, ignoring");
            return;
        };

        let state = match error {
            Some(reason) => {
                warn!(kind = kind.label(), seq = pending.seq, %reason, "command failed");
                COMMANDS.with_label_values(&[kind.label(), "failed"]).inc();
                CommandState::Failed { reason }
            }
            None => {
                info!(kind = kind.label(), seq = pending.seq, ?order_id, "command succeeded");
                COMMANDS.with_label_values(&[kind.label(), "succeeded"]).inc();
                CommandState::Succeeded { order_id }
            }
        };
        let _ = pending.tx.send(state);
    }

    /// Fail every pending command older than the configured deadline. Driven
    /// from the heartbeat tick; a no-op when no timeout is configured.
    pub fn expire(&mut self, now: Instant) {
        let Some(timeout) = self.timeout else { return };
        for lane in self.pending.iter_mut() {
            let mut kept = Vec::with_capacity(lane.len());
            for pending in lane.drain(..) {
                if now.duration_since(pending.sent_at) >= timeout {
                    warn!(kind = pending.kind.label(), seq = pending.seq, "command timed out");
                    COMMANDS
                        .with_label_values(&[pending.kind.label(), "expired"])
                        .inc();
                    let _ = pending.tx.send(CommandState::Failed {
                        reason: "no response from venue".to_string(),
                    });
                } else {
                    kept.push(pending);
                }
            }
            *lane = kept;
        }
    }

    pub fn in_flight(&self, kind: CommandKind) -> usize {
        self.pending[kind.slot()].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, OrderType};
    use crate::session::SessionState;
    use crate::wire;
    use tokio::sync::mpsc;

    fn connected_handle() -> (SessionHandle, mpsc::Receiver<String>) {
        // a watch receiver keeps serving the last value after the sender drops
        let (_, state_rx) = watch::channel(SessionState::Connected);
        let (out_tx, out_rx) = mpsc::channel(16);
        (SessionHandle::new(state_rx, out_tx), out_rx)
    }

    fn place() -> Command {
        Command::Place(PlaceOrder {
            instrument_name: "BTC-PERPETUAL".into(),
            amount: 10.0,
            order_type: OrderType::Limit,
            direction: Direction::Buy,
            price: Some(64000.0),
        })
    }

    fn order_response(raw: &str) -> Inbound {
        wire::decode_frame(raw).unwrap()
    }

    #[tokio::test]
    async fn place_settles_once_on_success() {
        let (session, mut out) = connected_handle();
        let mut coord = CommandCoordinator::new(session, None);

        let handle = coord.submit(place()).unwrap();
        assert_eq!(handle.state(), CommandState::InFlight);
        assert!(out.recv().await.unwrap().contains(r#""type":"place_order""#));

        coord.on_response(&order_response(
            r#"{"type":"order_response","result":{"order":{"order_id":"42"}}}"#,
        ));
        assert_eq!(
            handle.state(),
            CommandState::Succeeded { order_id: Some("42".into()) }
        );

        // a second response of the same type after settlement must not
        // re-transition the handle
        coord.on_response(&order_response(
            r#"{"type":"order_response","error":"too late"}"#,
        ));
        assert_eq!(
            handle.settled().await,
            CommandState::Succeeded { order_id: Some("42".into()) }
        );
    }

    #[tokio::test]
    async fn error_response_fails_with_verbatim_message() {
        let (session, _out) = connected_handle();
        let mut coord = CommandCoordinator::new(session, None);

        let handle = coord
            .submit(Command::Cancel(CancelOrder { order_id: "42".into() }))
            .unwrap();
        coord.on_response(&order_response(
            r#"{"type":"cancel_response","error":"order not found"}"#,
        ));
        assert_eq!(
            handle.settled().await,
            CommandState::Failed { reason: "order not found".into() }
        );
    }

    #[tokio::test]
    async fn responses_only_match_their_own_kind() {
        let (session, _out) = connected_handle();
        let mut coord = CommandCoordinator::new(session, None);

        let handle = coord
            .submit(Command::Modify(ModifyOrder {
                order_id: "42".into(),
                amount: 20.0,
                price: None,
            }))
            .unwrap();

        coord.on_response(&order_response(r#"{"type":"cancel_response"}"#));
        assert_eq!(handle.state(), CommandState::InFlight);
        assert_eq!(coord.in_flight(CommandKind::Modify), 1);

        coord.on_response(&order_response(r#"{"type":"modify_response"}"#));
        assert_eq!(handle.state(), CommandState::Succeeded { order_id: None });
    }

    #[tokio::test]
    async fn unmatched_response_is_ignored() {
        let (session, _out) = connected_handle();
        let mut coord = CommandCoordinator::new(session, None);
        // must not panic or grow any lane
        coord.on_response(&order_response(r#"{"type":"order_response"}"#));
        assert_eq!(coord.in_flight(CommandKind::Place), 0);
    }

    #[tokio::test]
    async fn overlapping_same_kind_settles_most_recent_first() {
        let (session, _out) = connected_handle();
        let mut coord = CommandCoordinator::new(session, None);

        let first = coord.submit(place()).unwrap();
        let second = coord.submit(place()).unwrap();

        coord.on_response(&order_response(
            r#"{"type":"order_response","result":{"order":{"order_id":"B"}}}"#,
        ));
        assert_eq!(first.state(), CommandState::InFlight);
        assert_eq!(
            second.state(),
            CommandState::Succeeded { order_id: Some("B".into()) }
        );
    }

    #[tokio::test]
    async fn silent_commands_expire_after_deadline() {
        let (session, _out) = connected_handle();
        let mut coord = CommandCoordinator::new(session, Some(Duration::from_secs(5)));

        let handle = coord.submit(place()).unwrap();
        coord.expire(Instant::now() + Duration::from_secs(1));
        assert_eq!(handle.state(), CommandState::InFlight);

        coord.expire(Instant::now() + Duration::from_secs(6));
        assert_eq!(
            handle.settled().await,
            CommandState::Failed { reason: "no response from venue".into() }
        );
        assert_eq!(coord.in_flight(CommandKind::Place), 0);

        // late response after expiry is unmatched, not a re-transition
        coord.on_response(&order_response(r#"{"type":"order_response"}"#));
    }

    #[tokio::test]
    async fn submit_fails_when_session_is_down() {
        let (state_tx, state_rx) = watch::channel(SessionState::Errored);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let session = SessionHandle::new(state_rx, out_tx);
        drop(state_tx);

        let mut coord = CommandCoordinator::new(session, None);
        assert!(coord.submit(place()).is_err());
        assert_eq!(coord.in_flight(CommandKind::Place), 0);
    }
}
