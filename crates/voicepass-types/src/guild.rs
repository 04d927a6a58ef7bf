//! Side effects performed on the chat platform by the gateway.
//!
//! The engine never talks to the platform directly. It asks the gateway to
//! perform a [`GuildEffect`] and receives an [`ActionReply`].

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, MemberId, RoleId};

/// An effect the gateway applies on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum GuildEffect {
    /// Grant a role to a member.
    GrantRole {
        /// Recipient.
        member_id: MemberId,
        /// Role to add.
        role_id: RoleId,
    },
    /// Move a member into a voice channel.
    MoveMember {
        /// Member to move.
        member_id: MemberId,
        /// Destination channel.
        channel_id: ChannelId,
    },
    /// Disconnect a member from voice.
    Disconnect {
        /// Member to disconnect.
        member_id: MemberId,
    },
    /// Set or clear a server-side mute.
    SetServerMute {
        /// Member to (un)mute.
        member_id: MemberId,
        /// `true` to mute.
        muted: bool,
    },
    /// Change a member's nickname.
    Rename {
        /// Member to rename.
        member_id: MemberId,
        /// New nickname.
        nickname: String,
    },
}

impl GuildEffect {
    /// The member the effect applies to.
    pub const fn member_id(&self) -> MemberId {
        match self {
            Self::GrantRole { member_id, .. }
            | Self::MoveMember { member_id, .. }
            | Self::Disconnect { member_id }
            | Self::SetServerMute { member_id, .. }
            | Self::Rename { member_id, .. } => *member_id,
        }
    }
}

/// Why the gateway could not perform an effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ActionFailure {
    /// The bot lacks the permission (e.g. role above its own).
    PermissionDenied,
    /// The member, role or channel no longer exists.
    UnknownTarget,
    /// The request never got an answer or the reply was malformed.
    Transport(String),
}

impl core::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::UnknownTarget => f.write_str("target no longer exists"),
            Self::Transport(detail) => write!(f, "transport failure: {detail}"),
        }
    }
}

impl std::error::Error for ActionFailure {}

/// The gateway's answer to a [`GuildEffect`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReply {
    /// `None` on success.
    #[serde(default)]
    pub failure: Option<ActionFailure>,
}

impl ActionReply {
    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<(), ActionFailure> {
        self.failure.map_or(Ok(()), Err)
    }
}
