//! Out-of-band notifications for consumers of the file system.

use std::sync::mpsc::{self, Receiver, Sender};

/// Something the consuming layer may want to surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsEvent {
    /// The store refused to persist the entry at `path`.
    CapacityExceeded { path: String },
    /// An interrupted multi-key operation was finished on startup.
    Recovered { operation: String, path: String },
    /// Finishing an interrupted operation failed while opening; the file system opened
    /// anyway and may still hold part of that operation.
    RecoveryFailed { reason: String },
}

/// Events kept for a later subscriber while nobody listens.
const BACKLOG_LIMIT: usize = 64;

/// Fan-out of events to every live subscriber.
///
/// Events emitted while there is no subscriber (e.g. during startup, before the caller
/// had a chance to subscribe) are held, up to [`BACKLOG_LIMIT`], and handed to the next
/// subscriber.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<VfsEvent>>,
    backlog: Vec<VfsEvent>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<VfsEvent> {
        let (tx, rx) = mpsc::channel();
        for event in self.backlog.drain(..) {
            // `rx` is alive here, so this cannot fail
            let _ = tx.send(event);
        }
        self.subscribers.push(tx);
        rx
    }

    /// Sends `event` to every subscriber, dropping those whose receiver is gone.
    pub fn emit(&mut self, event: VfsEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if self.subscribers.is_empty() && self.backlog.len() < BACKLOG_LIMIT {
            self.backlog.push(event);
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
