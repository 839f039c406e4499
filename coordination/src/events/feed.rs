//! Ordered event feed for one review run
//!
//! Every task of a run holds a clone of the same [`EventFeed`]. Emission is
//! a synchronous append, so emission order is delivery order. The terminal
//! event seals the feed: the sender is taken out, the receiver sees
//! end-of-stream right after the terminal event, and later emissions are
//! discarded.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::types::ReviewEvent;

/// Receiving side of a run's event feed.
pub type EventStream = mpsc::UnboundedReceiver<ReviewEvent>;

/// Producing side, shared by every task of a run.
#[derive(Debug, Clone)]
pub struct EventFeed {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<ReviewEvent>>>>,
}

/// Create a feed and its stream.
pub fn event_feed() -> (EventFeed, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventFeed {
            sender: Arc::new(Mutex::new(Some(tx))),
        },
        rx,
    )
}

impl EventFeed {
    /// Append an event. Returns `false` if the feed is sealed or the
    /// receiver is gone.
    pub fn emit(&self, event: ReviewEvent) -> bool {
        let event_type = event.event_type();
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                let delivered = tx.send(event).is_ok();
                debug!(event_type, delivered, "Event emitted");
                delivered
            }
            None => {
                debug!(event_type, "Event dropped after terminal event");
                false
            }
        }
    }

    /// Append the terminal event and seal the feed. Only the first terminal
    /// event is delivered.
    pub fn finish(&self, event: ReviewEvent) -> bool {
        let event_type = event.event_type();
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let delivered = tx.send(event).is_ok();
                debug!(event_type, delivered, "Terminal event emitted");
                delivered
            }
            None => {
                debug!(event_type, "Feed already sealed");
                false
            }
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
