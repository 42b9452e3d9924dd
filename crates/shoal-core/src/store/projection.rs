//! Local projection cache.
//!
//! An in-memory, paginated view of server-side conversation state: loaded
//! message pages (newest-first), unread counters and last-read markers, keyed
//! by conversation identity. The cache is mutated from two directions —
//! backfill fetch completions and realtime event deliveries — in arbitrary
//! order, so every mutation is gated on per-conversation id ledgers rather
//! than blind appends:
//!
//! - `seen_ids`: every id delivered as a realtime insert, including for
//!   conversations whose pages were never loaded. Makes insert (and its
//!   unread increment) exactly-once per message id.
//! - `loaded_ids`: ids currently in the window. Backfill merges drop these,
//!   which resolves the insert-before-page-arrives race without losing
//!   messages that were delivered while the conversation was unopened.
//! - `tombstones`: deleted ids. A late redelivery of `message_sent`, or the
//!   message resurfacing in a fetched page, stays dead.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ConversationId, Message, MessageId};

/// Per-conversation view state. Realtime events mutate `Loaded` and
/// `LoadingMore` entries without a transition; `Failed` keeps the cursor
/// retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unopened,
    LoadingInitial,
    Loaded,
    LoadingMore,
    Failed,
}

/// Result of [`ProjectionStore::apply_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Fresh message, stored in the loaded window.
    Inserted,
    /// Already delivered (or already deleted); nothing changed.
    Duplicate,
    /// Fresh id recorded, but the conversation was never opened so there is
    /// no page storage to mutate. Still counts for unread accounting; the
    /// message itself arrives later with its backfill page.
    Unloaded,
}

impl InsertOutcome {
    /// Whether this delivery was the first for its message id.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, InsertOutcome::Duplicate)
    }
}

#[derive(Debug, Default)]
pub struct ProjectionEntry {
    /// Loaded pages, newest window first; concatenation is strictly
    /// descending by timestamp with unique ids.
    pages: Vec<Vec<Message>>,
    pub load_state: LoadState,
    pub has_more_older: bool,
    /// Newest timestamp acknowledged as read, unix milliseconds.
    pub last_read: Option<u64>,
    /// Only meaningful while the conversation is not the active view.
    pub unread_count: u32,
    seen_ids: HashSet<MessageId>,
    loaded_ids: HashSet<MessageId>,
    tombstones: HashSet<MessageId>,
}

impl ProjectionEntry {
    fn iter(&self) -> impl Iterator<Item = &Message> {
        self.pages.iter().flatten()
    }

    fn find_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.pages.iter_mut().flatten().find(|m| m.id == id)
    }

    /// Insert preserving the strict-descending timestamp order. The target
    /// page is the newest one whose oldest message is not newer than `msg`;
    /// anything older than the whole window lands at the far (oldest) end.
    fn insert_positioned(&mut self, msg: Message) {
        self.loaded_ids.insert(msg.id);

        if self.pages.is_empty() {
            self.pages.push(vec![msg]);
            return;
        }

        for page in self.pages.iter_mut() {
            let page_oldest = page.last().map(|m| m.timestamp);
            if page_oldest.map_or(true, |oldest| oldest <= msg.timestamp) {
                let pos = page.partition_point(|m| m.timestamp > msg.timestamp);
                page.insert(pos, msg);
                return;
            }
        }

        if let Some(last) = self.pages.last_mut() {
            last.push(msg);
        }
    }

    fn remove(&mut self, id: MessageId) -> bool {
        self.loaded_ids.remove(&id);
        for page in self.pages.iter_mut() {
            if let Some(pos) = page.iter().position(|m| m.id == id) {
                page.remove(pos);
                return true;
            }
        }
        false
    }
}

/// The shared cache. Owned behind a lock by the session and the reconciler;
/// mutation safety under interleaving comes from the id ledgers, not from
/// holding the lock across awaits (no method suspends).
#[derive(Debug, Default)]
pub struct ProjectionStore {
    entries: HashMap<ConversationId, ProjectionEntry>,
}

pub type SharedProjection = Arc<RwLock<ProjectionStore>>;

impl ProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedProjection {
        Arc::new(RwLock::new(Self::new()))
    }

    fn entry_mut(&mut self, conversation: &ConversationId) -> &mut ProjectionEntry {
        self.entries.entry(conversation.clone()).or_default()
    }

    pub fn entry(&self, conversation: &ConversationId) -> Option<&ProjectionEntry> {
        self.entries.get(conversation)
    }

    pub fn load_state(&self, conversation: &ConversationId) -> LoadState {
        self.entries
            .get(conversation)
            .map_or(LoadState::Unopened, |e| e.load_state)
    }

    pub fn set_load_state(&mut self, conversation: &ConversationId, state: LoadState) {
        self.entry_mut(conversation).load_state = state;
    }

    /// Merge a freshly-fetched backfill page into the window.
    ///
    /// Messages already in the window (typically delivered by a realtime
    /// event before their page was fetched) and deleted messages are dropped.
    /// Survivors are inserted positionally, not appended: a fetched page can
    /// contain a message newer than something already in the window (an event
    /// published before the client subscribed, then a realtime insert landing
    /// while the fetch is in flight). `has_more_older` is computed from the
    /// returned length before dedup, matching what the query service saw.
    pub fn merge_backfill_page(
        &mut self,
        conversation: &ConversationId,
        page: Vec<Message>,
        requested: usize,
    ) {
        let returned = page.len();
        let entry = self.entry_mut(conversation);

        let mut fresh: Vec<Message> = Vec::with_capacity(returned);
        for msg in page {
            // The insert doubles as in-page dedup.
            if entry.tombstones.contains(&msg.id) || !entry.loaded_ids.insert(msg.id) {
                continue;
            }
            fresh.push(msg);
        }
        fresh.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        for msg in fresh {
            entry.insert_positioned(msg);
        }
        entry.has_more_older = requested > 0 && returned == requested;
        entry.load_state = LoadState::Loaded;
    }

    /// Apply a newly-arrived message at the newest end.
    pub fn apply_insert(&mut self, msg: Message) -> InsertOutcome {
        let entry = self.entry_mut(&msg.conversation);

        if entry.tombstones.contains(&msg.id)
            || entry.loaded_ids.contains(&msg.id)
            || !entry.seen_ids.insert(msg.id)
        {
            return InsertOutcome::Duplicate;
        }

        if entry.load_state == LoadState::Unopened {
            return InsertOutcome::Unloaded;
        }

        entry.insert_positioned(msg);
        InsertOutcome::Inserted
    }

    /// Replace a message's content by id. No-op when the message is not
    /// loaded; a later fetch already reflects the new content.
    pub fn apply_update(
        &mut self,
        conversation: &ConversationId,
        id: MessageId,
        content: &str,
    ) -> bool {
        let entry = self.entry_mut(conversation);
        match entry.find_mut(id) {
            Some(msg) => {
                msg.content = content.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove a message by id. The id is tombstoned, so redelivered inserts
    /// and refetched pages cannot resurrect it.
    pub fn apply_delete(&mut self, conversation: &ConversationId, id: MessageId) -> bool {
        let entry = self.entry_mut(conversation);
        entry.tombstones.insert(id);
        entry.remove(id)
    }

    /// Advance the last-read marker (monotonically) and clear unread.
    pub fn mark_read(&mut self, conversation: &ConversationId, timestamp: u64) {
        let entry = self.entry_mut(conversation);
        entry.last_read = Some(entry.last_read.map_or(timestamp, |t| t.max(timestamp)));
        entry.unread_count = 0;
    }

    pub fn increment_unread(&mut self, conversation: &ConversationId) {
        let entry = self.entry_mut(conversation);
        entry.unread_count = entry.unread_count.saturating_add(1);
    }

    /// Swap an optimistic message for its authoritative, server-assigned
    /// form. Registers the server id so the realtime echo (or a duplicate
    /// RPC response) becomes a no-op. Returns whether anything changed.
    pub fn replace_provisional(
        &mut self,
        conversation: &ConversationId,
        local: Uuid,
        authoritative: Message,
    ) -> bool {
        let entry = self.entry_mut(conversation);
        let local_id = MessageId::Local(local);

        if !entry.seen_ids.insert(authoritative.id) {
            // Already resolved by the other path; drop the leftover
            // provisional if it is somehow still present.
            entry.remove(local_id);
            entry.seen_ids.remove(&local_id);
            return false;
        }

        // Timestamp may differ from the optimistic guess, so re-position
        // rather than editing in place.
        entry.remove(local_id);
        entry.seen_ids.remove(&local_id);
        if entry.load_state != LoadState::Unopened {
            entry.insert_positioned(authoritative);
        }
        true
    }

    /// Snapshot of the loaded window, newest first.
    pub fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.entries
            .get(conversation)
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Cursor for the next load-older fetch: the oldest loaded timestamp.
    pub fn oldest_timestamp(&self, conversation: &ConversationId) -> Option<u64> {
        self.entries
            .get(conversation)
            .and_then(|e| e.iter().map(|m| m.timestamp).min())
    }

    pub fn unread_count(&self, conversation: &ConversationId) -> u32 {
        self.entries.get(conversation).map_or(0, |e| e.unread_count)
    }

    pub fn last_read(&self, conversation: &ConversationId) -> Option<u64> {
        self.entries.get(conversation).and_then(|e| e.last_read)
    }

    pub fn has_more_older(&self, conversation: &ConversationId) -> bool {
        self.entries
            .get(conversation)
            .is_some_and(|e| e.has_more_older)
    }
}
