//! Shared type definitions for the Voicepass presence accrual engine.
//!
//! This crate is the single source of truth for the documents, events and
//! wire payloads exchanged between the store, the core engines and the
//! gateway transport.
//!
//! # Modules
//!
//! - [`ids`] -- Snowflake newtypes for members, roles and channels, plus item ids
//! - [`profile`] -- The persisted [`Profile`] and its partial [`ProfileUpdate`]
//! - [`presence`] -- Voice presence states, transitions and roster entries
//! - [`reward`] -- Level rewards and claim reports
//! - [`guild`] -- Platform-side effects requested from the gateway
//! - [`notification`] -- Announcements for level-ups and reward claims
//! - [`command`] -- Front-end command requests and engine replies

pub mod command;
pub mod guild;
pub mod ids;
pub mod notification;
pub mod presence;
pub mod profile;
pub mod reward;

// Re-export all public types at crate root for convenience.
pub use command::{CommandReply, CommandRequest, ItemUse, ItemUseOutcome};
pub use guild::{ActionFailure, ActionReply, GuildEffect};
pub use ids::{ChannelId, ItemId, MemberId, RoleId};
pub use notification::{Announcement, Notification};
pub use presence::{PresenceState, PresenceTransition, RosterEntry};
pub use profile::{MemberRef, Profile, ProfileUpdate, ProgressView};
pub use reward::{ClaimReport, RewardFailure, RewardGrant, RewardSpec};
