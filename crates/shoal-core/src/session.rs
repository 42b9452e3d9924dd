//! UI-facing session.
//!
//! Owns the projection cache, the active-view marker, and the optimistic-send
//! table; exposes the imperative triggers (open/close, load older, send,
//! update, delete) and snapshot reads the UI layer binds to. All network
//! interaction is non-blocking: each method awaits exactly its own RPC, and
//! read-receipt acknowledgements run through the side-effect pump instead of
//! the caller's await.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::PersistenceClient;
use crate::config::CoreConfig;
use crate::error::RpcError;
use crate::models::{ConversationId, Message, MessageId};
use crate::pubsub::EventSink;
use crate::reconciler::{PendingSends, Reconciler, SideEffect};
use crate::store::{ActiveView, LoadState, ProjectionStore, SharedActiveView, SharedProjection};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct ChatSession {
    config: CoreConfig,
    persistence: Arc<dyn PersistenceClient>,
    store: SharedProjection,
    active: SharedActiveView,
    pending_sends: PendingSends,
    reconciler: Arc<Reconciler>,
    effects_tx: mpsc::UnboundedSender<SideEffect>,
    effects_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SideEffect>>,
}

impl ChatSession {
    pub fn new(config: CoreConfig, persistence: Arc<dyn PersistenceClient>) -> Self {
        let store = ProjectionStore::shared();
        let active = ActiveView::shared();
        let pending_sends: PendingSends = Arc::new(Mutex::new(HashMap::new()));
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();

        let reconciler = Arc::new(Reconciler::new(
            &config,
            store.clone(),
            active.clone(),
            pending_sends.clone(),
            effects_tx.clone(),
        ));

        Self {
            config,
            persistence,
            store,
            active,
            pending_sends,
            reconciler,
            effects_tx,
            effects_rx: tokio::sync::Mutex::new(effects_rx),
        }
    }

    /// Sink to hand to the subscription multiplexer. Stable identity: the
    /// same closure for the session's whole lifetime.
    pub fn event_sink(&self) -> EventSink {
        self.reconciler.sink()
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    /// Navigate into a conversation: mark it active and (re)fetch the newest
    /// page. Reopening an already-loaded conversation refetches too — that
    /// masks any realtime deltas missed while subscriptions were down.
    pub async fn open(&self, conversation: &ConversationId) -> Result<(), RpcError> {
        self.active.write().enter(conversation.clone());

        let already_loaded = {
            let mut store = self.store.write();
            match store.load_state(conversation) {
                LoadState::Unopened | LoadState::Failed => {
                    store.set_load_state(conversation, LoadState::LoadingInitial);
                    false
                }
                LoadState::LoadingInitial => false,
                LoadState::Loaded | LoadState::LoadingMore => true,
            }
        };

        let page = match self
            .persistence
            .fetch_messages(conversation, None, self.config.page_size)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                if !already_loaded {
                    self.store
                        .write()
                        .set_load_state(conversation, LoadState::Failed);
                }
                return Err(err);
            }
        };

        let messages: Vec<Message> = page
            .into_iter()
            .map(|record| record.into_message(conversation.clone()))
            .collect();

        {
            let mut store = self.store.write();
            if already_loaded {
                // Refresh: position each message individually; known ids
                // drop out, genuinely missed ones land where they belong.
                for message in messages {
                    store.apply_insert(message);
                }
            } else {
                store.merge_backfill_page(conversation, messages, self.config.page_size);
            }
        }

        self.acknowledge_active(conversation);
        Ok(())
    }

    /// Navigate away. In-flight backfills are not cancelled; their completion
    /// merges idempotently. Subscriptions are roster-scoped and unaffected.
    pub fn close(&self, conversation: &ConversationId) {
        self.active.write().leave(conversation);
    }

    /// Mark the newest loaded message read locally and queue the server-side
    /// acknowledgement.
    pub fn acknowledge_active(&self, conversation: &ConversationId) {
        let newest = {
            let mut store = self.store.write();
            let newest = store
                .messages(conversation)
                .first()
                .map(|message| message.timestamp);
            if let Some(timestamp) = newest {
                store.mark_read(conversation, timestamp);
            }
            newest
        };

        if let Some(timestamp) = newest {
            let _ = self.effects_tx.send(SideEffect::AcknowledgeRead {
                conversation: conversation.clone(),
                timestamp,
            });
        }
    }

    /// Fetch the next older page. At most one outstanding load-older request
    /// per conversation: concurrent callers coalesce on the in-flight fetch.
    /// Returns whether more history remains after the merge.
    pub async fn load_older(&self, conversation: &ConversationId) -> Result<bool, RpcError> {
        let cursor = {
            let mut store = self.store.write();
            match store.load_state(conversation) {
                // Coalesce with the request already in flight.
                LoadState::LoadingMore => return Ok(store.has_more_older(conversation)),
                // Nothing loaded yet; backfill starts after the initial page.
                LoadState::Unopened | LoadState::LoadingInitial => return Ok(false),
                // Retry re-issues the same cursor (it derives from the
                // unchanged oldest loaded message).
                LoadState::Failed => {}
                LoadState::Loaded => {
                    if !store.has_more_older(conversation) {
                        return Ok(false);
                    }
                }
            }
            store.set_load_state(conversation, LoadState::LoadingMore);
            store.oldest_timestamp(conversation)
        };

        match self
            .persistence
            .fetch_messages(conversation, cursor, self.config.page_size)
            .await
        {
            Ok(page) => {
                let messages: Vec<Message> = page
                    .into_iter()
                    .map(|record| record.into_message(conversation.clone()))
                    .collect();
                let mut store = self.store.write();
                store.merge_backfill_page(conversation, messages, self.config.page_size);
                Ok(store.has_more_older(conversation))
            }
            Err(err) => {
                self.store
                    .write()
                    .set_load_state(conversation, LoadState::Failed);
                Err(err)
            }
        }
    }

    /// Re-issue a failed backfill with the same cursor.
    pub async fn retry_load(&self, conversation: &ConversationId) -> Result<bool, RpcError> {
        self.load_older(conversation).await
    }

    /// Optimistic send: the message appears in the window immediately under a
    /// provisional id, then is swapped for the authoritative record when the
    /// RPC responds — or when the self-echo event beats the response to it.
    /// On failure the provisional entry is rolled back.
    pub async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageId, RpcError> {
        let nonce = Uuid::new_v4();
        self.pending_sends.lock().insert(nonce, conversation.clone());
        self.store.write().apply_insert(Message::provisional(
            conversation.clone(),
            self.config.viewer_id.clone(),
            content,
            now_millis(),
            nonce,
        ));

        match self
            .persistence
            .send_message(conversation, content, nonce)
            .await
        {
            Ok(record) => {
                self.pending_sends.lock().remove(&nonce);
                let authoritative = record.into_message(conversation.clone());
                let id = authoritative.id;
                self.store
                    .write()
                    .replace_provisional(conversation, nonce, authoritative);
                Ok(id)
            }
            Err(err) => {
                self.pending_sends.lock().remove(&nonce);
                self.store
                    .write()
                    .apply_delete(conversation, MessageId::Local(nonce));
                tracing::warn!(%conversation, error = %err, "send failed, rolled back optimistic insert");
                Err(err)
            }
        }
    }

    /// Edit a message (author-only; authorization errors surface here and
    /// nowhere else). Applied locally only after the write succeeds.
    pub async fn update_message(
        &self,
        conversation: &ConversationId,
        id: i64,
        content: &str,
    ) -> Result<(), RpcError> {
        self.persistence
            .update_message(conversation, id, content)
            .await?;
        self.store
            .write()
            .apply_update(conversation, MessageId::Server(id), content);
        Ok(())
    }

    /// Delete a message (author-only). Applied locally after the write.
    pub async fn delete_message(
        &self,
        conversation: &ConversationId,
        id: i64,
    ) -> Result<(), RpcError> {
        self.persistence.delete_message(conversation, id).await?;
        self.store
            .write()
            .apply_delete(conversation, MessageId::Server(id));
        Ok(())
    }

    // ===== Snapshot reads =====

    pub fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.store.read().messages(conversation)
    }

    pub fn unread_count(&self, conversation: &ConversationId) -> u32 {
        self.store.read().unread_count(conversation)
    }

    pub fn last_read(&self, conversation: &ConversationId) -> Option<u64> {
        self.store.read().last_read(conversation)
    }

    pub fn load_state(&self, conversation: &ConversationId) -> LoadState {
        self.store.read().load_state(conversation)
    }

    pub fn has_more_older(&self, conversation: &ConversationId) -> bool {
        self.store.read().has_more_older(conversation)
    }

    pub fn store(&self) -> SharedProjection {
        self.store.clone()
    }

    // ===== Side-effect pump =====

    /// Run the side-effect pump until the session is dropped. Read-receipt
    /// failures are logged, never propagated — a missed ack is masked by the
    /// next one or by reopening the conversation.
    pub async fn run_effects<F>(&self, mut on_roster_changed: F)
    where
        F: FnMut() + Send,
    {
        let mut rx = self.effects_rx.lock().await;
        while let Some(effect) = rx.recv().await {
            self.handle_effect(effect, &mut on_roster_changed).await;
        }
    }

    /// Process the effects queued so far, then return. Lets embedders (and
    /// tests) pump deterministically instead of spawning the long-running
    /// loop.
    pub async fn drain_effects<F>(&self, mut on_roster_changed: F)
    where
        F: FnMut() + Send,
    {
        let mut rx = self.effects_rx.lock().await;
        while let Ok(effect) = rx.try_recv() {
            self.handle_effect(effect, &mut on_roster_changed).await;
        }
    }

    async fn handle_effect<F>(&self, effect: SideEffect, on_roster_changed: &mut F)
    where
        F: FnMut() + Send,
    {
        match effect {
            SideEffect::AcknowledgeRead {
                conversation,
                timestamp,
            } => {
                if let Err(err) = self
                    .persistence
                    .acknowledge_read(&conversation, timestamp)
                    .await
                {
                    tracing::warn!(%conversation, error = %err, "read acknowledgement failed");
                }
            }
            SideEffect::RosterChanged => on_roster_changed(),
        }
    }
}
