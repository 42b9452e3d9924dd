//! Subscription multiplexer.
//!
//! Maintains exactly one live subscription per channel derived from the
//! viewer's conversation roster. Roster changes are diffed against the live
//! set: new channels subscribe, removed channels unsubscribe, unchanged
//! channels are never touched, so membership churn cannot drop or duplicate
//! delivery on unrelated conversations.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::channel::ChannelName;
use crate::error::TransportError;
use crate::pubsub::{EventSink, PubSubTransport, SubscriptionId};

pub struct SubscriptionMultiplexer {
    transport: Arc<dyn PubSubTransport>,
    /// Single sink shared by every subscription. Created once so resyncs
    /// never re-register a new handler identity.
    sink: EventSink,
    live: Mutex<HashMap<ChannelName, SubscriptionId>>,
}

impl SubscriptionMultiplexer {
    pub fn new(transport: Arc<dyn PubSubTransport>, sink: EventSink) -> Self {
        Self {
            transport,
            sink,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile live subscriptions against the desired roster.
    ///
    /// `None` means the roster is not yet known (conversation list query
    /// unresolved, or unauthenticated): everything is torn down and nothing
    /// subscribes until the full list arrives. Duplicate channel names in
    /// the roster collapse to one subscription.
    ///
    /// A failed subscribe leaves that channel out of the live set (a later
    /// `sync` retries it) and is reported after the rest of the diff applied.
    pub fn sync(&self, roster: Option<&[ChannelName]>) -> Result<(), TransportError> {
        let desired: HashSet<ChannelName> = match roster {
            Some(channels) => channels.iter().cloned().collect(),
            None => HashSet::new(),
        };

        let mut live = self.live.lock();

        let stale: Vec<ChannelName> = live
            .keys()
            .filter(|channel| !desired.contains(*channel))
            .cloned()
            .collect();
        for channel in stale {
            if let Some(id) = live.remove(&channel) {
                tracing::debug!(channel = %channel, "unsubscribing");
                self.transport.unsubscribe(id);
            }
        }

        let mut first_failure = None;
        for channel in desired {
            if live.contains_key(&channel) {
                continue;
            }
            match self.transport.subscribe(&channel, self.sink.clone()) {
                Ok(id) => {
                    tracing::debug!(channel = %channel, "subscribed");
                    live.insert(channel, id);
                }
                Err(err) => {
                    tracing::warn!(channel = %channel, error = %err, "subscribe failed");
                    first_failure.get_or_insert(err);
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn live_channels(&self) -> Vec<ChannelName> {
        self.live.lock().keys().cloned().collect()
    }

    pub fn is_subscribed(&self, channel: &ChannelName) -> bool {
        self.live.lock().contains_key(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{direct_channel, group_channel};
    use crate::events::{EventEnvelope, GroupPayload, ServerEvent};
    use crate::pubsub::InMemoryBus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport wrapper that counts subscribe/unsubscribe calls.
    struct CountingTransport {
        inner: InMemoryBus,
        subscribes: AtomicUsize,
        unsubscribes: AtomicUsize,
    }

    impl CountingTransport {
        fn new() -> Self {
            Self {
                inner: InMemoryBus::new(),
                subscribes: AtomicUsize::new(0),
                unsubscribes: AtomicUsize::new(0),
            }
        }
    }

    impl PubSubTransport for CountingTransport {
        fn subscribe(
            &self,
            channel: &ChannelName,
            sink: EventSink,
        ) -> Result<SubscriptionId, TransportError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            self.inner.subscribe(channel, sink)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            self.inner.unsubscribe(id)
        }

        fn publish(
            &self,
            channel: &ChannelName,
            envelope: &EventEnvelope,
        ) -> Result<(), TransportError> {
            self.inner.publish(channel, envelope)
        }
    }

    fn noop_sink() -> EventSink {
        Arc::new(|_| {})
    }

    fn counting_sink() -> (EventSink, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink_hits = hits.clone();
        (
            Arc::new(move |_| {
                sink_hits.fetch_add(1, Ordering::SeqCst);
            }),
            hits,
        )
    }

    fn event() -> EventEnvelope {
        EventEnvelope::new(
            ServerEvent::GroupUpdated(GroupPayload {
                group_id: 1,
                name: "g".into(),
            }),
            None,
        )
    }

    #[test]
    fn sync_subscribes_the_full_roster() {
        let transport = Arc::new(CountingTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), noop_sink());

        mux.sync(Some(&[group_channel(1), direct_channel("a", "b")]))
            .unwrap();
        assert!(mux.is_subscribed(&group_channel(1)));
        assert!(mux.is_subscribed(&direct_channel("a", "b")));
        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn identical_roster_causes_no_transport_calls() {
        let transport = Arc::new(CountingTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), noop_sink());

        let roster = [group_channel(1), group_channel(2)];
        mux.sync(Some(&roster)).unwrap();
        mux.sync(Some(&roster)).unwrap();
        mux.sync(Some(&roster)).unwrap();

        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 2);
        assert_eq!(transport.unsubscribes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn diff_touches_only_the_delta() {
        let transport = Arc::new(CountingTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), noop_sink());

        mux.sync(Some(&[group_channel(1), group_channel(2)])).unwrap();
        mux.sync(Some(&[group_channel(2), group_channel(3)])).unwrap();

        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 3); // 1, 2, 3
        assert_eq!(transport.unsubscribes.load(Ordering::SeqCst), 1); // 1
        assert!(!mux.is_subscribed(&group_channel(1)));
        assert!(mux.is_subscribed(&group_channel(2)));
        assert!(mux.is_subscribed(&group_channel(3)));
    }

    #[test]
    fn none_roster_tears_everything_down() {
        let transport = Arc::new(CountingTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), noop_sink());

        mux.sync(Some(&[group_channel(1), group_channel(2)])).unwrap();
        mux.sync(None).unwrap();

        assert_eq!(transport.unsubscribes.load(Ordering::SeqCst), 2);
        assert!(mux.live_channels().is_empty());
    }

    #[test]
    fn duplicate_roster_entries_collapse_to_one_subscription() {
        let transport = Arc::new(CountingTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), noop_sink());

        mux.sync(Some(&[group_channel(1), group_channel(1), group_channel(1)]))
            .unwrap();
        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.inner.subscriber_count(&group_channel(1)), 1);
    }

    #[test]
    fn resync_does_not_duplicate_delivery() {
        let transport = Arc::new(CountingTransport::new());
        let (sink, hits) = counting_sink();
        let mux = SubscriptionMultiplexer::new(transport.clone(), sink);

        mux.sync(Some(&[group_channel(1)])).unwrap();
        // Unrelated roster growth; channel 1 must keep its single subscription.
        mux.sync(Some(&[group_channel(1), group_channel(2)])).unwrap();

        transport.publish(&group_channel(1), &event()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
