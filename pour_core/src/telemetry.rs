//! Live telemetry: one producer, many subscribers, no replay.
//!
//! Each subscriber gets its own bounded channel. Publishing never blocks:
//! a full subscriber misses the sample, a dropped receiver is pruned on the
//! next publish.
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel as xch;
use serde::Serialize;

use crate::monitor::DeviceStatus;
use crate::session::PourProgress;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSample {
    pub grams: f32,
    /// Milliseconds since the machine started.
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    Weight(WeightSample),
    Status(DeviceStatus),
    Progress(PourProgress),
}

#[derive(Debug)]
pub struct Broadcast<T> {
    subscribers: Mutex<Vec<xch::Sender<T>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T: Clone> Broadcast<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// New receiver; it sees only values published after this call.
    pub fn subscribe(&self) -> xch::Receiver<T> {
        let (tx, rx) = xch::bounded(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Offer `value` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, value: T) -> usize {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        subs.retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(xch::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(xch::TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Samples dropped because a subscriber was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Hub carrying every event kind.
pub type Telemetry = Broadcast<Event>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_is_tagged() {
        let e = Event::Weight(WeightSample {
            grams: 12.5,
            at_ms: 42,
        });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "weight");
        assert_eq!(json["data"]["grams"], 12.5);
        assert_eq!(json["data"]["atMs"], 42);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub: Broadcast<u32> = Broadcast::new(4);
        assert_eq!(hub.publish(1), 0);
        assert_eq!(hub.dropped(), 0);
    }
}
