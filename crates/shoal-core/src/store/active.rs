//! Explicit active-conversation state.
//!
//! Set on navigation into a conversation view, cleared on navigation away,
//! read synchronously by the reconciler to decide live-merge vs. unread
//! increment. Active-ness is never inferred from routes or render timing.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::models::ConversationId;

#[derive(Debug, Default)]
pub struct ActiveView {
    current: Option<ConversationId>,
}

pub type SharedActiveView = Arc<RwLock<ActiveView>>;

impl ActiveView {
    pub fn shared() -> SharedActiveView {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Navigation into a conversation view.
    pub fn enter(&mut self, conversation: ConversationId) {
        self.current = Some(conversation);
    }

    /// Navigation away. Only clears if `conversation` is still the one shown,
    /// so a late `leave` cannot clobber a newer `enter`.
    pub fn leave(&mut self, conversation: &ConversationId) {
        if self.current.as_ref() == Some(conversation) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<&ConversationId> {
        self.current.as_ref()
    }

    pub fn is_active(&self, conversation: &ConversationId) -> bool {
        self.current.as_ref() == Some(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_leave_track_the_current_view() {
        let mut active = ActiveView::default();
        assert!(!active.is_active(&ConversationId::group(1)));

        active.enter(ConversationId::group(1));
        assert!(active.is_active(&ConversationId::group(1)));

        active.leave(&ConversationId::group(1));
        assert_eq!(active.current(), None);
    }

    #[test]
    fn stale_leave_does_not_clear_a_newer_view() {
        let mut active = ActiveView::default();
        active.enter(ConversationId::group(1));
        active.enter(ConversationId::group(2));

        active.leave(&ConversationId::group(1));
        assert!(active.is_active(&ConversationId::group(2)));
    }
}
