// ===============================
// src/router.rs
// ===============================
//
// Fan-out point of the client: one decoded frame in, every subscriber of that
// frame's type invoked once, in registration order. A failing handler is
// logged and counted but never blocks the handlers after it, and a frame that
// fails to decode is dropped here rather than surfaced to the session loop.

use ahash::AHashMap as HashMap;
use tracing::{debug, warn};

use crate::metrics::{DECODE_FAILURES, FRAMES, HANDLER_ERRORS, UNROUTED_FRAMES};
use crate::wire::{self, FrameKind, Inbound};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type Handler = Box<dyn FnMut(&Inbound) -> Result<(), HandlerError> + Send>;

/// Disposer token returned by `subscribe`. Unsubscribing takes effect no later
/// than the next dispatched frame.
#[derive(Debug)]
pub struct Subscription {
    kind: FrameKind,
    id: u64,
}

#[derive(Default)]
pub struct MessageRouter {
    subs: HashMap<FrameKind, Vec<(u64, Handler)>>,
    next_id: u64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: FrameKind, handler: Handler) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.subs.entry(kind).or_default().push((id, handler));
        Subscription { kind, id }
    }

    pub fn unsubscribe(&mut self, sub: Subscription) {
        if let Some(handlers) = self.subs.get_mut(&sub.kind) {
            handlers.retain(|(id, _)| *id != sub.id);
        }
    }

    pub fn subscriber_count(&self, kind: FrameKind) -> usize {
        self.subs.get(&kind).map_or(0, Vec::len)
    }

    /// Decode one raw text frame and dispatch it. Malformed input is dropped
    /// with a diagnostic; this never returns an error to the session loop.
    pub fn dispatch_text(&mut self, raw: &str) {
        let frame = match wire::decode_frame(raw) {
            Ok(f) => f,
            Err(e) => {
                DECODE_FAILURES.inc();
                warn!(%e, raw = %truncate(raw, 256), "dropping undecodable frame");
                return;
            }
        };
        self.dispatch(&frame);
    }

    pub fn dispatch(&mut self, frame: &Inbound) {
        let kind = frame.kind();
        FRAMES.with_label_values(&[kind.name()]).inc();

        let Some(handlers) = self.subs.get_mut(&kind) else {
            UNROUTED_FRAMES.with_label_values(&[kind.name()]).inc();
            debug!(kind = kind.name(), "frame has no subscribers");
            return;
        };
        for (id, handler) in handlers.iter_mut() {
            if let Err(e) = handler(frame) {
                HANDLER_ERRORS.with_label_values(&[kind.name()]).inc();
                warn!(kind = kind.name(), subscriber = *id, %e, "subscriber failed, continuing");
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cancel_frame(err: Option<&str>) -> String {
        match err {
            Some(e) => format!(r#"{{"type":"cancel_response","error":"{e}"}}"#),
            None => r#"{"type":"cancel_response"}"#.to_string(),
        }
    }

    #[test]
    fn dispatches_in_registration_order() {
        let mut router = MessageRouter::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            router.subscribe(
                FrameKind::CancelResponse,
                Box::new(move |_| {
                    seen.lock().unwrap().push(tag);
                    Ok(())
                }),
            );
        }

        router.dispatch_text(&cancel_frame(None));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_handler_does_not_skip_the_rest() {
        let mut router = MessageRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        router.subscribe(FrameKind::CancelResponse, Box::new(|_| Err("boom".into())));
        let hits2 = hits.clone();
        router.subscribe(
            FrameKind::CancelResponse,
            Box::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        router.dispatch_text(&cancel_frame(None));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decode_failure_does_not_poison_the_pipeline() {
        let mut router = MessageRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        router.subscribe(
            FrameKind::CancelResponse,
            Box::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        router.dispatch_text("{{{ definitely not json");
        router.dispatch_text(&cancel_frame(None));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut router = MessageRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let sub = router.subscribe(
            FrameKind::CancelResponse,
            Box::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        router.dispatch_text(&cancel_frame(None));
        router.unsubscribe(sub);
        router.dispatch_text(&cancel_frame(None));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(router.subscriber_count(FrameKind::CancelResponse), 0);
    }

    #[test]
    fn subscribers_only_see_their_type() {
        let mut router = MessageRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        router.subscribe(
            FrameKind::OrderbookUpdate,
            Box::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        router.dispatch_text(&cancel_frame(Some("nope")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
