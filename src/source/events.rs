//! Cross-component notifications.
//!
//! Upload and project editors publish events here; the gallery drains them and
//! patches its item list in place without a full reload.

use flume::{Receiver, Sender, TryRecvError};
use tracing::{debug, trace};

use crate::models::{ProjectRecord, RawRecord};

/// Maximum number of undrained events kept per subscriber.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A project was created elsewhere; inserted at the front if absent.
    ProjectCreated(ProjectRecord),
    /// A project's metadata changed; patched by id.
    ProjectUpdated(ProjectRecord),
    /// A stored image changed (visibility, prompt, url).
    RecordUpdated(RawRecord),
    /// A new image was stored; inserted at the front of a personal library
    /// right away, or merged into the group sharing its `group_id`.
    RecordUploaded(RawRecord),
}

/// Fan-out publisher. Each subscriber gets its own bounded channel; a full or
/// disconnected subscriber is skipped.
#[derive(Default)]
pub struct EventBus {
    subscribers: parking_lot::Mutex<Vec<Sender<SourceEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = flume::bounded(EVENT_CAPACITY);
        self.subscribers.lock().push(tx);
        EventReceiver { rx }
    }

    /// Publishes to every live subscriber. Returns how many received it.
    pub fn publish(&self, event: SourceEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_disconnected());

        let mut delivered = 0;
        for tx in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Dropping event for slow subscriber: {}", e),
            }
        }
        trace!("Published event to {} subscribers", delivered);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Receiving half handed to the gallery.
pub struct EventReceiver {
    rx: Receiver<SourceEvent>,
}

impl EventReceiver {
    /// Takes every event currently queued without waiting.
    pub fn drain(&self) -> Vec<SourceEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Waits for the next event; `None` once every publisher is gone.
    pub async fn next(&self) -> Option<SourceEvent> {
        self.rx.recv_async().await.ok()
    }
}
