//! Presence transition classification.
//!
//! Maps a `(before, after)` voice state pair onto what the ledger should do.
//! A member accrues while *active*: in a channel and not muted or deafened
//! by themselves or a moderator.

use voicepass_types::{PresenceState, PresenceTransition};

/// What a presence transition means for the member's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    /// Start accruing.
    Open,
    /// Stop accruing and settle. A no-op if no session is open.
    Close,
    /// Nothing changes.
    Ignore,
}

/// Classify a transition reported by the gateway. Bots are always ignored.
pub const fn classify(transition: &PresenceTransition) -> PresenceAction {
    if transition.member.is_bot {
        return PresenceAction::Ignore;
    }
    classify_states(&transition.before, &transition.after)
}

/// Classify a raw state pair.
///
/// Leaving voice always closes, even if `before` claims the member was
/// silenced, so a session opened from a stale roster cannot outlive its
/// member. A channel switch with no silence change keeps the session.
pub const fn classify_states(before: &PresenceState, after: &PresenceState) -> PresenceAction {
    if !after.is_present() {
        return if before.is_present() {
            PresenceAction::Close
        } else {
            PresenceAction::Ignore
        };
    }
    match (before.is_active(), after.is_active()) {
        (false, true) => PresenceAction::Open,
        (true, false) => PresenceAction::Close,
        (true, true) | (false, false) => PresenceAction::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use voicepass_types::{ChannelId, MemberId, MemberRef};

    use super::*;

    const A: ChannelId = ChannelId(1);
    const B: ChannelId = ChannelId(2);

    fn deafened(channel: ChannelId) -> PresenceState {
        PresenceState {
            self_deaf: true,
            ..PresenceState::in_channel(channel)
        }
    }

    #[test]
    fn join_and_leave() {
        let absent = PresenceState::ABSENT;
        assert_eq!(classify_states(&absent, &PresenceState::in_channel(A)), PresenceAction::Open);
        assert_eq!(
            classify_states(&absent, &PresenceState::in_channel(A).self_muted()),
            PresenceAction::Ignore
        );
        assert_eq!(classify_states(&PresenceState::in_channel(A), &absent), PresenceAction::Close);
        // Leaving while muted: close is issued, and is a no-op on the ledger.
        assert_eq!(
            classify_states(&PresenceState::in_channel(A).self_muted(), &absent),
            PresenceAction::Close
        );
    }

    #[test]
    fn mute_toggles_inside_a_channel() {
        let open = PresenceState::in_channel(A);
        assert_eq!(classify_states(&open, &open.self_muted()), PresenceAction::Close);
        assert_eq!(classify_states(&open.self_muted(), &open), PresenceAction::Open);
        assert_eq!(classify_states(&open, &deafened(A)), PresenceAction::Close);
        let server_muted = PresenceState {
            server_mute: true,
            ..open
        };
        assert_eq!(classify_states(&server_muted, &open), PresenceAction::Open);
    }

    #[test]
    fn channel_switch_keeps_the_session() {
        assert_eq!(
            classify_states(&PresenceState::in_channel(A), &PresenceState::in_channel(B)),
            PresenceAction::Ignore
        );
        assert_eq!(
            classify_states(&PresenceState::in_channel(A).self_muted(), &PresenceState::in_channel(B)),
            PresenceAction::Open
        );
    }

    #[test]
    fn bots_are_ignored() {
        let transition = PresenceTransition {
            member: MemberRef {
                id: MemberId(1),
                name: "bot".to_owned(),
                is_bot: true,
            },
            before: PresenceState::ABSENT,
            after: PresenceState::in_channel(A),
            at: Utc::now(),
        };
        assert_eq!(classify(&transition), PresenceAction::Ignore);
    }
}
