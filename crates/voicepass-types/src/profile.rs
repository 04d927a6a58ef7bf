//! Member profile documents and the partial updates applied to them.
//!
//! A [`Profile`] is owned by the profile store. The accrual engine, the
//! reward claim engine and the admin/item paths mutate it exclusively through
//! [`ProfileUpdate`] partial merges and atomic inventory increments, never by
//! overwriting the whole document.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, MemberId};

/// The persisted per-member progress document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable external identifier. Immutable.
    pub id: MemberId,
    /// Display name captured at creation (updatable).
    pub username: String,
    /// Accumulated experience. Never negative.
    pub xp: u64,
    /// Current level; an index into the level table.
    pub level: u32,
    /// Item counts keyed by item id.
    #[serde(default)]
    pub inventory: BTreeMap<ItemId, u32>,
    /// Levels whose rewards have already been granted.
    ///
    /// Always a subset of `1..=level`.
    #[serde(default)]
    pub rewards_claimed: BTreeSet<u32>,
    /// Per-member boolean preferences. Absent keys read as `true`.
    #[serde(default)]
    pub settings: BTreeMap<String, bool>,
    /// Creation timestamp. Immutable.
    pub registered_at: DateTime<Utc>,
}

impl Profile {
    /// Build the default profile for a member seen for the first time.
    pub fn new(id: MemberId, username: impl Into<String>, registered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username: username.into(),
            xp: 0,
            level: 0,
            inventory: BTreeMap::new(),
            rewards_claimed: BTreeSet::new(),
            settings: BTreeMap::new(),
            registered_at,
        }
    }

    /// Number of units of `item` held.
    pub fn item_count(&self, item: &ItemId) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    /// Read a boolean setting, defaulting to `true` when unset.
    pub fn setting(&self, key: &str) -> bool {
        self.settings.get(key).copied().unwrap_or(true)
    }

    /// Apply a partial update in place.
    ///
    /// Stores that keep whole documents use this to implement the
    /// partial-merge contract of `update`.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(username) = &update.username {
            self.username.clone_from(username);
        }
        if let Some(xp) = update.xp {
            self.xp = xp;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(claimed) = &update.rewards_claimed {
            self.rewards_claimed.clone_from(claimed);
        }
        for (key, value) in &update.settings {
            self.settings.insert(key.clone(), *value);
        }
    }
}

/// A partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New XP total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<u64>,
    /// New level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Replacement claimed-levels set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards_claimed: Option<BTreeSet<u32>>,
    /// Settings merged key by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, bool>,
}

impl ProfileUpdate {
    /// An update that sets only the XP total.
    pub fn xp(xp: u64) -> Self {
        Self {
            xp: Some(xp),
            ..Self::default()
        }
    }

    /// An update that sets XP and level together.
    pub fn xp_and_level(xp: u64, level: u32) -> Self {
        Self {
            xp: Some(xp),
            level: Some(level),
            ..Self::default()
        }
    }

    /// An update that replaces the claimed-levels set.
    pub fn rewards_claimed(claimed: BTreeSet<u32>) -> Self {
        Self {
            rewards_claimed: Some(claimed),
            ..Self::default()
        }
    }

    /// Whether this update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.xp.is_none()
            && self.level.is_none()
            && self.rewards_claimed.is_none()
            && self.settings.is_empty()
    }
}

/// A member as seen by the presence gateway: id, display name, bot flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    /// The member's identifier.
    pub id: MemberId,
    /// The member's display name.
    pub name: String,
    /// Whether the account is a bot. Bots never accrue.
    #[serde(default)]
    pub is_bot: bool,
}

impl MemberRef {
    /// A human member reference.
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_bot: false,
        }
    }
}

/// Read-only progress summary for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    /// The member.
    pub member_id: MemberId,
    /// Current level.
    pub level: u32,
    /// Current XP.
    pub xp: u64,
    /// Threshold of the next level, `None` when the member is at the cap.
    pub next_threshold: Option<u64>,
    /// Progress toward `next_threshold` in whole percent (100 at the cap).
    pub percent: u8,
    /// Levels reached but not yet claimed.
    pub unclaimed_levels: Vec<u32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_only_present_fields() {
        let mut profile = Profile::new(MemberId(1), "alice", Utc::now());
        profile.xp = 40;
        profile.settings.insert("lang".to_owned(), false);

        let mut update = ProfileUpdate::xp_and_level(90, 1);
        update.settings.insert("ephemeral".to_owned(), false);
        profile.apply(&update);

        assert_eq!(profile.xp, 90);
        assert_eq!(profile.level, 1);
        assert_eq!(profile.username, "alice");
        assert!(!profile.setting("lang"));
        assert!(!profile.setting("ephemeral"));
        assert!(profile.setting("unset"));
    }

    #[test]
    fn empty_update_serializes_to_empty_object() {
        let update = ProfileUpdate::default();
        assert!(update.is_empty());
        assert_eq!(serde_json::to_string(&update).unwrap(), "{}");
    }

    #[test]
    fn profile_without_optional_maps_deserializes() {
        let json = r#"{"id":7,"username":"bob","xp":5,"level":0,"registered_at":"2026-01-01T00:00:00Z"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, MemberId(7));
        assert!(profile.inventory.is_empty());
        assert!(profile.rewards_claimed.is_empty());
    }
}
