//! NATS subject layout.
//!
//! Every subject hangs off `messaging.subject_prefix`:
//!
//! | Subject | Direction | Payload |
//! |---------|-----------|---------|
//! | `<p>.presence` | subscribe | `PresenceTransition` |
//! | `<p>.gateway.ready` | subscribe | ignored; triggers reconciliation |
//! | `<p>.roster` | request | reply `Vec<RosterEntry>` |
//! | `<p>.commands` | subscribe, reply | `CommandRequest` to `CommandReply` |
//! | `<p>.actions` | request | `GuildEffect` to `ActionReply` |
//! | `<p>.announce` | publish | `Announcement` |

use voicepass_core::config::MessagingConfig;

/// Resolved subject names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    /// Presence transitions from the gateway.
    pub presence: String,
    /// Gateway readiness signal.
    pub ready: String,
    /// Voice roster requests.
    pub roster: String,
    /// Front-end commands.
    pub commands: String,
    /// Guild action requests.
    pub actions: String,
    /// Outgoing announcements.
    pub announce: String,
}

impl Subjects {
    /// Build the subject set for `config`.
    pub fn new(config: &MessagingConfig) -> Self {
        Self {
            presence: config.subject("presence"),
            ready: config.subject("gateway.ready"),
            roster: config.subject("roster"),
            commands: config.subject("commands"),
            actions: config.subject("actions"),
            announce: config.subject("announce"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_use_the_prefix() {
        let config = MessagingConfig {
            subject_prefix: "vp-test".to_owned(),
            ..MessagingConfig::default()
        };
        let subjects = Subjects::new(&config);
        assert_eq!(subjects.presence, "vp-test.presence");
        assert_eq!(subjects.ready, "vp-test.gateway.ready");
        assert_eq!(subjects.announce, "vp-test.announce");
    }
}
