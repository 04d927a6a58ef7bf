//! Voice presence states and the transitions the gateway reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ChannelId;
use crate::profile::MemberRef;

/// A member's voice state at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    /// The voice channel the member is in, if any.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// Muted by the member.
    #[serde(default)]
    pub self_mute: bool,
    /// Deafened by the member.
    #[serde(default)]
    pub self_deaf: bool,
    /// Muted by a moderator.
    #[serde(default)]
    pub server_mute: bool,
    /// Deafened by a moderator.
    #[serde(default)]
    pub server_deaf: bool,
}

impl PresenceState {
    /// Not in any voice channel.
    pub const ABSENT: Self = Self {
        channel_id: None,
        self_mute: false,
        self_deaf: false,
        server_mute: false,
        server_deaf: false,
    };

    /// In `channel`, unmuted and undeafened.
    pub const fn in_channel(channel: ChannelId) -> Self {
        Self {
            channel_id: Some(channel),
            ..Self::ABSENT
        }
    }

    /// Copy of `self` with the self-mute flag set.
    #[must_use]
    pub const fn self_muted(self) -> Self {
        Self {
            self_mute: true,
            ..self
        }
    }

    /// Whether the member is in a voice channel.
    pub const fn is_present(&self) -> bool {
        self.channel_id.is_some()
    }

    /// Whether any mute or deafen flag is set.
    pub const fn is_silenced(&self) -> bool {
        self.self_mute || self.self_deaf || self.server_mute || self.server_deaf
    }

    /// Present and not silenced: the state in which time accrues.
    pub const fn is_active(&self) -> bool {
        self.is_present() && !self.is_silenced()
    }
}

/// A presence change reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceTransition {
    /// Who changed.
    pub member: MemberRef,
    /// State before the change.
    pub before: PresenceState,
    /// State after the change.
    pub after: PresenceState,
    /// When the gateway observed the change.
    pub at: DateTime<Utc>,
}

/// One member found in a voice channel during a roster scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// The member.
    pub member: MemberRef,
    /// Their current voice state.
    pub state: PresenceState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_requires_presence_and_no_silence() {
        let channel = ChannelId(10);
        assert!(PresenceState::in_channel(channel).is_active());
        assert!(!PresenceState::in_channel(channel).self_muted().is_active());
        assert!(!PresenceState::ABSENT.is_active());

        let deafened = PresenceState {
            server_deaf: true,
            ..PresenceState::in_channel(channel)
        };
        assert!(deafened.is_present());
        assert!(deafened.is_silenced());
    }
}
