//! Event reconciler.
//!
//! Turns at-least-once, unordered realtime deliveries into idempotent cache
//! mutations. For each event: resolve the conversation identity from the
//! payload, check whether that conversation is the active view, then merge
//! into the projection — advancing read state when active, accumulating
//! unread when not. Everything slow (read-receipt RPCs, roster refetches)
//! leaves through a side-effect queue instead of blocking the delivery path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::events::{EventEnvelope, SentPayload, ServerEvent};
use crate::models::{ConversationId, MessageId};
use crate::pubsub::EventSink;
use crate::store::{SharedActiveView, SharedProjection};

/// Work the reconciler defers off the delivery path.
#[derive(Debug)]
pub enum SideEffect {
    /// Advance the server-side last-read marker (a message arrived while its
    /// conversation was the active view).
    AcknowledgeRead {
        conversation: ConversationId,
        timestamp: u64,
    },
    /// Group membership changed; the embedder should refetch the roster and
    /// resync subscriptions.
    RosterChanged,
}

/// Optimistic sends awaiting their authoritative echo, keyed by nonce.
pub type PendingSends = Arc<Mutex<HashMap<Uuid, ConversationId>>>;

pub struct Reconciler {
    viewer_id: String,
    connection_id: String,
    store: SharedProjection,
    active: SharedActiveView,
    pending_sends: PendingSends,
    effects: mpsc::UnboundedSender<SideEffect>,
}

impl Reconciler {
    pub fn new(
        config: &CoreConfig,
        store: SharedProjection,
        active: SharedActiveView,
        pending_sends: PendingSends,
        effects: mpsc::UnboundedSender<SideEffect>,
    ) -> Self {
        Self {
            viewer_id: config.viewer_id.clone(),
            connection_id: config.connection_id.clone(),
            store,
            active,
            pending_sends,
            effects,
        }
    }

    /// Decode and reconcile a raw delivery. Malformed payloads are logged and
    /// skipped; the loop never dies on bad input.
    pub fn handle_raw(&self, raw: &str) {
        match EventEnvelope::decode(raw) {
            Ok(envelope) => self.handle(envelope),
            Err(err) => tracing::warn!(error = %err, "dropping undecodable event"),
        }
    }

    pub fn handle(&self, envelope: EventEnvelope) {
        let own_echo = envelope.connection_id.as_deref() == Some(self.connection_id.as_str());

        match envelope.event {
            ServerEvent::MessageSent(payload) => self.on_message_sent(payload, own_echo),
            ServerEvent::MessageUpdated(payload) => {
                let conversation = payload.scope.resolve(&payload.author_id);
                self.store.write().apply_update(
                    &conversation,
                    MessageId::Server(payload.id),
                    &payload.content,
                );
            }
            ServerEvent::MessageDeleted(payload) => {
                let conversation = payload.scope.resolve(&payload.author_id);
                self.store
                    .write()
                    .apply_delete(&conversation, MessageId::Server(payload.id));
            }
            ServerEvent::GroupCreated(payload) | ServerEvent::GroupUpdated(payload) => {
                tracing::debug!(group_id = payload.group_id, "group roster event");
                let _ = self.effects.send(SideEffect::RosterChanged);
            }
        }
    }

    fn on_message_sent(&self, payload: SentPayload, own_echo: bool) {
        let conversation = payload.conversation();
        let active = self.active.read().is_active(&conversation);
        let from_viewer = payload.author_id == self.viewer_id;
        let timestamp = payload.timestamp;

        // Self-echo of an optimistic send resolves the provisional entry in
        // place; a plain insert would show the message twice.
        let resolved_nonce = own_echo
            .then_some(payload.nonce)
            .flatten()
            .filter(|nonce| self.pending_sends.lock().remove(nonce).is_some());

        let fresh = {
            let mut store = self.store.write();
            match resolved_nonce {
                Some(nonce) => {
                    store.replace_provisional(&conversation, nonce, payload.into_message())
                }
                None => store.apply_insert(payload.into_message()).is_fresh(),
            }
        };

        if active {
            self.store.write().mark_read(&conversation, timestamp);
            if !from_viewer {
                let _ = self.effects.send(SideEffect::AcknowledgeRead {
                    conversation,
                    timestamp,
                });
            }
        } else if fresh {
            self.store.write().increment_unread(&conversation);
        }
    }

    /// Sink for the subscription multiplexer. One stable closure; resyncs
    /// reuse it instead of registering new handler identities.
    pub fn sink(self: &Arc<Self>) -> EventSink {
        let this = Arc::clone(self);
        Arc::new(move |envelope| this.handle(envelope))
    }
}
