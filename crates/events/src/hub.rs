//! In-process pub/sub hub with bounded per-subscriber mailboxes.
//!
//! Broadcasting is pure message passing: the publisher serializes the
//! envelope once and `try_send`s it into each mailbox. A full mailbox
//! drops that subscriber's copy; nothing ever blocks the publisher and
//! one slow consumer cannot disturb the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, SyncSender, TryRecvError, sync_channel};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Mailbox depth per subscriber. Messages beyond this are dropped for
/// that subscriber until it drains.
pub const MAILBOX_CAPACITY: usize = 16;

/// Receiving half of a mailbox, handed out by [`EventHub::subscribe`].
///
/// Each subscriber sees broadcasts in publish order, minus whatever its
/// full mailbox dropped. Designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    receiver: Receiver<String>,
}

impl Subscriber {
    /// Identifier to pass back to [`EventHub::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the next serialized envelope is available.
    pub fn recv(&self) -> Result<String, RecvError> {
        self.receiver.recv()
    }

    /// Receive without blocking.
    pub fn try_recv(&self) -> Result<String, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for an envelope.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

// Serialized inline so each broadcast allocates exactly one JSON string.
#[derive(Serialize)]
struct WireEnvelope<'a, P: Serialize> {
    #[serde(rename = "type")]
    event_type: &'a str,
    payload: &'a P,
    timestamp: DateTime<Utc>,
}

/// Registry of live mailboxes.
///
/// Broadcasts take the read lock, so they run concurrently with each
/// other; subscribe/unsubscribe take the write lock and wait for
/// in-flight broadcasts to finish.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: RwLock<HashMap<u64, SyncSender<String>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new mailbox and hand back its receiving half.
    pub fn subscribe(&self) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = sync_channel(MAILBOX_CAPACITY);
        if let Ok(mut subs) = self.subscribers.write() {
            subs.insert(id, tx);
        }
        Subscriber { id, receiver: rx }
    }

    /// Remove a mailbox, closing it for its receiver. Unknown or
    /// already-removed ids are a no-op.
    pub fn unsubscribe(&self, id: u64) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|subs| subs.len()).unwrap_or(0)
    }

    /// Wrap `payload` in an envelope stamped with the current time and
    /// fan it out to every live mailbox.
    ///
    /// With zero subscribers this returns before serializing anything.
    /// Mailboxes that are full (or whose receiver is gone) are skipped
    /// without disturbing the rest.
    pub fn broadcast<P: Serialize>(&self, event_type: &str, payload: &P) {
        let Ok(subs) = self.subscribers.read() else {
            return;
        };
        if subs.is_empty() {
            return;
        }

        let wire = WireEnvelope { event_type, payload, timestamp: Utc::now() };
        let data = match serde_json::to_string(&wire) {
            Ok(data) => data,
            Err(error) => {
                tracing::error!(event_type, %error, "failed to serialize event");
                return;
            }
        };

        for tx in subs.values() {
            let _ = tx.try_send(data.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventEnvelope;

    fn decode(raw: &str) -> EventEnvelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn broadcast_without_subscribers_is_a_noop() {
        let hub = EventHub::new();
        assert_eq!(hub.subscriber_count(), 0);
        hub.broadcast("transmutation.updated", &serde_json::json!({"id": 1}));
    }

    #[test]
    fn subscriber_receives_enveloped_payload() {
        let hub = EventHub::new();
        let sub = hub.subscribe();

        hub.broadcast("audit.created", &serde_json::json!({"action": "user_login"}));

        let envelope = decode(&sub.recv_timeout(Duration::from_secs(1)).unwrap());
        assert_eq!(envelope.event_type, "audit.created");
        assert_eq!(envelope.payload["action"], "user_login");
    }

    #[test]
    fn delivery_follows_broadcast_order() {
        let hub = EventHub::new();
        let sub = hub.subscribe();

        for i in 0..5 {
            hub.broadcast("transmutation.updated", &serde_json::json!({"seq": i}));
        }
        for i in 0..5 {
            let envelope = decode(&sub.try_recv().unwrap());
            assert_eq!(envelope.payload["seq"], i);
        }
    }

    #[test]
    fn full_mailbox_drops_for_slow_subscriber_only() {
        let hub = EventHub::new();
        let slow = hub.subscribe();
        let fast = hub.subscribe();

        for i in 0..MAILBOX_CAPACITY {
            hub.broadcast("transmutation.updated", &serde_json::json!({"seq": i}));
        }
        // Fast consumer drains; the slow one sits on a full mailbox.
        for _ in 0..MAILBOX_CAPACITY {
            fast.try_recv().unwrap();
        }
        for i in MAILBOX_CAPACITY..MAILBOX_CAPACITY + 4 {
            hub.broadcast("transmutation.updated", &serde_json::json!({"seq": i}));
        }

        let mut fast_seen = 0;
        while fast.try_recv().is_ok() {
            fast_seen += 1;
        }
        let mut slow_seen = 0;
        while slow.try_recv().is_ok() {
            slow_seen += 1;
        }

        assert_eq!(fast_seen, 4);
        assert_eq!(slow_seen, MAILBOX_CAPACITY);
    }

    #[test]
    fn unsubscribe_closes_the_mailbox_and_is_idempotent() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        hub.unsubscribe(sub.id());
        hub.unsubscribe(sub.id());
        assert_eq!(hub.subscriber_count(), 0);

        hub.broadcast("audit.created", &serde_json::json!({}));
        assert!(matches!(sub.recv(), Err(RecvError)));
    }

    #[test]
    fn dropped_receiver_does_not_disturb_others() {
        let hub = EventHub::new();
        let kept = hub.subscribe();
        let dropped = hub.subscribe();
        drop(dropped);

        hub.broadcast("transmutation.updated", &serde_json::json!({"id": 3}));

        let envelope = decode(&kept.recv_timeout(Duration::from_secs(1)).unwrap());
        assert_eq!(envelope.payload["id"], 3);
    }

    #[test]
    fn concurrent_broadcasts_all_arrive() {
        let hub = std::sync::Arc::new(EventHub::new());
        let sub = hub.subscribe();

        let handles: Vec<_> = (0..2)
            .map(|worker| {
                let hub = hub.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        hub.broadcast("audit.created", &serde_json::json!({"w": worker, "i": i}));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = 0;
        while sub.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 10);
    }
}
