//! Pub/sub transport seam.
//!
//! The realtime service is an external collaborator; the core only needs
//! subscribe/unsubscribe/publish. [`InMemoryBus`] is a synchronous in-process
//! implementation used by tests and embedders that want loopback delivery.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::ChannelName;
use crate::error::TransportError;
use crate::events::EventEnvelope;

/// Handle for one live channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked for every event delivered on a subscribed channel.
pub type EventSink = Arc<dyn Fn(EventEnvelope) + Send + Sync>;

pub trait PubSubTransport: Send + Sync {
    fn subscribe(
        &self,
        channel: &ChannelName,
        sink: EventSink,
    ) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe(&self, id: SubscriptionId);

    /// Publish an envelope to a channel. Mutation handlers call this only
    /// after the persistence write succeeded (write-then-publish), so any
    /// subscriber that re-queries the source of truth sees consistent data.
    fn publish(&self, channel: &ChannelName, envelope: &EventEnvelope)
        -> Result<(), TransportError>;
}

/// In-process transport with synchronous fan-out.
#[derive(Default)]
pub struct InMemoryBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<ChannelName, Vec<(SubscriptionId, EventSink)>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        self.subscribers
            .lock()
            .get(channel)
            .map_or(0, |sinks| sinks.len())
    }
}

impl PubSubTransport for InMemoryBus {
    fn subscribe(
        &self,
        channel: &ChannelName,
        sink: EventSink,
    ) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .entry(channel.clone())
            .or_default()
            .push((id, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.lock();
        for sinks in subscribers.values_mut() {
            sinks.retain(|(sub_id, _)| *sub_id != id);
        }
        subscribers.retain(|_, sinks| !sinks.is_empty());
    }

    fn publish(
        &self,
        channel: &ChannelName,
        envelope: &EventEnvelope,
    ) -> Result<(), TransportError> {
        // Deliver outside the lock: sinks may resubscribe reentrantly.
        let sinks: Vec<EventSink> = self
            .subscribers
            .lock()
            .get(channel)
            .map(|sinks| sinks.iter().map(|(_, sink)| sink.clone()).collect())
            .unwrap_or_default();

        for sink in sinks {
            sink(envelope.clone());
        }
        Ok(())
    }
}
