//! Command requests from the front-end and the engine's replies.
//!
//! The front-end (slash commands, buttons, modals) is not part of this
//! workspace. It sends a [`CommandRequest`] and renders the
//! [`CommandReply`] however it likes.

use serde::{Deserialize, Serialize};

use crate::guild::GuildEffect;
use crate::ids::{ChannelId, ItemId, MemberId};
use crate::profile::{MemberRef, Profile, ProgressView};
use crate::reward::ClaimReport;

/// An item use as requested by a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUse {
    /// Who uses the item.
    pub actor: MemberRef,
    /// Which item.
    pub item_id: ItemId,
    /// Optional target member.
    #[serde(default)]
    pub target: Option<MemberRef>,
    /// The actor's current voice channel.
    #[serde(default)]
    pub actor_channel: Option<ChannelId>,
    /// The target's current voice channel.
    #[serde(default)]
    pub target_channel: Option<ChannelId>,
}

/// What an item use did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemUseOutcome {
    /// The target's shield absorbed the item.
    Shielded {
        /// Whose shield was spent.
        target: MemberId,
    },
    /// The actor gained XP.
    XpBoosted {
        /// XP credited.
        amount: u64,
        /// XP total afterwards.
        xp: u64,
    },
    /// XP was taken from the target and given to the actor.
    Stole {
        /// Victim.
        target: MemberId,
        /// XP moved.
        amount: u64,
    },
    /// The theft failed and the actor paid a fine.
    CaughtStealing {
        /// XP actually deducted from the actor.
        fine: u64,
    },
    /// A platform-side effect was performed.
    Performed {
        /// The effect applied.
        effect: GuildEffect,
    },
}

/// A command addressed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandRequest {
    /// Create the member's profile if missing.
    Register {
        /// The member.
        member: MemberRef,
    },
    /// Read level/XP progress.
    Progress {
        /// The member.
        member: MemberRef,
    },
    /// Claim all unclaimed level rewards.
    Claim {
        /// The member.
        member: MemberRef,
    },
    /// Use an inventory item.
    UseItem(ItemUse),
    /// Flip a boolean preference.
    ToggleSetting {
        /// The member.
        member: MemberRef,
        /// Setting key.
        key: String,
    },
    /// Admin: add (positive) or remove (negative) XP.
    AdjustXp {
        /// The member.
        member: MemberRef,
        /// Signed XP change.
        delta: i64,
    },
    /// Admin: place the member at a level's threshold.
    SetLevel {
        /// The member.
        member: MemberRef,
        /// Target level.
        level: u32,
    },
    /// Admin: add (positive) or remove (negative) items.
    GrantItem {
        /// The member.
        member: MemberRef,
        /// Item to adjust.
        item_id: ItemId,
        /// Signed count change.
        delta: i64,
    },
    /// Admin: reload the level and item catalogs from disk.
    ReloadCatalog,
    /// Admin: create a profile for every non-bot member on the roster.
    SyncProfiles,
}

/// The engine's answer to a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    /// The member's profile after the command.
    Profile {
        /// The profile.
        profile: Profile,
    },
    /// Progress summary.
    Progress {
        /// The summary.
        progress: ProgressView,
    },
    /// Claim result.
    Claimed {
        /// The report.
        report: ClaimReport,
    },
    /// Item use result.
    ItemUsed {
        /// The outcome.
        outcome: ItemUseOutcome,
    },
    /// New value of a toggled setting.
    Setting {
        /// Setting key.
        key: String,
        /// Value after the toggle.
        value: bool,
    },
    /// Catalog sizes after a reload.
    CatalogReloaded {
        /// Number of level entries.
        levels: usize,
        /// Number of items.
        items: usize,
    },
    /// Roster registration result.
    ProfilesSynced {
        /// Non-bot members on the roster.
        scanned: usize,
        /// Profiles created by this sync.
        created: usize,
    },
    /// The command failed.
    Error {
        /// Human-readable reason.
        message: String,
    },
}
