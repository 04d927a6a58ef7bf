//! Notifications emitted to the external announcement sink.

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, MemberId};
use crate::reward::RewardGrant;

/// An outcome worth announcing. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A member reached a new level.
    LevelUp {
        /// Who leveled up.
        member_id: MemberId,
        /// The level reached.
        new_level: u32,
    },
    /// A member claimed one or more level rewards.
    RewardsGranted {
        /// Who claimed.
        member_id: MemberId,
        /// What was granted.
        granted: Vec<RewardGrant>,
    },
}

impl Notification {
    /// The member the notification is about.
    pub const fn member_id(&self) -> MemberId {
        match self {
            Self::LevelUp { member_id, .. } | Self::RewardsGranted { member_id, .. } => *member_id,
        }
    }
}

/// A notification addressed to the announcement channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Channel the gateway should post in.
    pub channel_id: ChannelId,
    /// What to post.
    pub notification: Notification,
}
