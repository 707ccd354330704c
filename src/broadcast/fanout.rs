//! Subscriber set and lossy fan-out.
//!
//! Each subscriber owns an unbounded queue plus a byte counter of what is
//! queued but not yet written to its socket. `broadcast` serializes a
//! message once and offers the same `Arc<str>` to everyone; a subscriber
//! whose counter is over the ceiling is skipped for that message and a
//! subscriber whose queue is closed is removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::BroadcastMessage;

struct SubscriberSlot {
    tx: mpsc::UnboundedSender<Arc<str>>,
    buffered: Arc<AtomicUsize>,
}

/// Outcome of one `broadcast` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Over the buffered-bytes ceiling, message dropped for them.
    pub skipped: usize,
    /// Gone subscribers removed from the set.
    pub removed: usize,
}

pub struct FanoutHub {
    subscribers: Mutex<HashMap<String, SubscriberSlot>>,
    max_buffered_bytes: usize,
}

impl FanoutHub {
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            max_buffered_bytes,
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubscriberSlot>> {
        self.subscribers.lock().unwrap_or_else(|e| {
            warn!("[Fanout] subscriber lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Join the set. The `connected` message is already queued on the
    /// returned subscription.
    pub fn subscribe(&self) -> Subscription {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));

        let hello = BroadcastMessage::Connected {
            subscriber_id: id.clone(),
            server_time: Utc::now(),
        };
        if let Ok(text) = serde_json::to_string(&hello) {
            let text: Arc<str> = Arc::from(text);
            buffered.fetch_add(text.len(), Ordering::Relaxed);
            let _ = tx.send(text);
        }

        let count = {
            let mut slots = self.slots();
            slots.insert(
                id.clone(),
                SubscriberSlot {
                    tx,
                    buffered: Arc::clone(&buffered),
                },
            );
            slots.len()
        };
        info!(subscriber_id = %id, subscribers = count, "Subscriber connected");

        Subscription { id, rx, buffered }
    }

    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let removed = self.slots().remove(subscriber_id).is_some();
        if removed {
            info!(subscriber_id = %subscriber_id, "Subscriber disconnected");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots().len()
    }

    pub fn max_buffered_bytes(&self) -> usize {
        self.max_buffered_bytes
    }

    /// Offer one message to every subscriber. Never fails; a message that
    /// cannot be serialized is logged and delivered to nobody.
    pub fn broadcast(&self, message: &BroadcastMessage) -> BroadcastReport {
        let text: Arc<str> = match serde_json::to_string(message) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "Failed to serialize broadcast message");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let mut slots = self.slots();
        slots.retain(|id, slot| {
            if slot.buffered.load(Ordering::Relaxed) > self.max_buffered_bytes {
                report.skipped += 1;
                return true;
            }
            slot.buffered.fetch_add(text.len(), Ordering::Relaxed);
            if slot.tx.send(Arc::clone(&text)).is_err() {
                debug!(subscriber_id = %id, "Dropping closed subscriber");
                report.removed += 1;
                return false;
            }
            report.delivered += 1;
            true
        });
        drop(slots);

        if report.skipped > 0 {
            debug!(kind = message.kind(), skipped = report.skipped, "Shed slow subscribers");
        }
        report
    }
}

/// Receiving end held by one connection.
pub struct Subscription {
    id: String,
    rx: mpsc::UnboundedReceiver<Arc<str>>,
    buffered: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next serialized message. Taking it off the queue releases its bytes
    /// from the subscriber's buffered total.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        let text = self.rx.recv().await?;
        self.buffered.fetch_sub(text.len(), Ordering::Relaxed);
        Some(text)
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }
}
