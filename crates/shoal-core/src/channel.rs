//! Deterministic channel addressing.
//!
//! Both the publish and subscribe sides derive channel names from the same
//! conversation identity, so they never have to exchange them. Direct-message
//! channels sort the participant pair, meaning either participant computes
//! the identical name.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ConversationId, DirectPair};

/// A pub/sub channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel for a group conversation.
pub fn group_channel(group_id: u64) -> ChannelName {
    ChannelName(format!("chat:{group_id}"))
}

/// Channel for a direct-message pair, in any participant order.
pub fn direct_channel(a: &str, b: &str) -> ChannelName {
    let pair = DirectPair::new(a, b);
    ChannelName(format!("dm:{}:{}", pair.lo(), pair.hi()))
}

/// Private per-user channel for account-level broadcasts (e.g. "a group that
/// includes you was created"). Exactly one subscriber.
pub fn private_channel(user_id: &str) -> ChannelName {
    ChannelName(format!("user:{user_id}"))
}

/// Channel for an already-canonical conversation identity.
pub fn conversation_channel(conversation: &ConversationId) -> ChannelName {
    match conversation {
        ConversationId::Group(id) => group_channel(*id),
        ConversationId::Direct(pair) => ChannelName(format!("dm:{}:{}", pair.lo(), pair.hi())),
    }
}

/// Full subscription roster for a viewer: one channel per group, one per DM
/// peer, plus the viewer's private channel for account-level broadcasts.
pub fn roster_channels<'a>(
    viewer_id: &str,
    group_ids: impl IntoIterator<Item = u64>,
    dm_peers: impl IntoIterator<Item = &'a str>,
) -> Vec<ChannelName> {
    let mut channels = vec![private_channel(viewer_id)];
    channels.extend(group_ids.into_iter().map(group_channel));
    channels.extend(
        dm_peers
            .into_iter()
            .map(|peer| direct_channel(viewer_id, peer)),
    );
    channels
}
