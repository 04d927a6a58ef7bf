//! Level rewards and the report produced when they are claimed.

use serde::{Deserialize, Serialize};

use crate::guild::ActionFailure;
use crate::ids::{ItemId, RoleId};

/// What a level grants when claimed.
///
/// A closed set of variants: every reward in the level table resolves to
/// exactly one of these, so there is no "unknown reward type" branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardSpec {
    /// Nothing to grant. The level stays unclaimed.
    #[default]
    None,
    /// Credit `count` units of an item to the inventory.
    Item {
        /// The item to credit.
        id: ItemId,
        /// How many units.
        #[serde(default = "default_item_count", alias = "amount")]
        count: u32,
    },
    /// Grant a role on the guild.
    Role {
        /// The role to grant.
        id: RoleId,
    },
    /// A reward an operator delivers by hand.
    Special {
        /// Human-readable description of the reward.
        description: String,
    },
}

const fn default_item_count() -> u32 {
    1
}

/// One level whose reward was granted by a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardGrant {
    /// Items were credited to the inventory.
    Item {
        /// The level claimed.
        level: u32,
        /// The item credited.
        item: ItemId,
        /// Units credited.
        count: u32,
    },
    /// A role was granted.
    Role {
        /// The level claimed.
        level: u32,
        /// The role granted.
        role: RoleId,
    },
    /// The reward needs manual delivery by an operator.
    ManualFollowUp {
        /// The level claimed.
        level: u32,
        /// What to deliver.
        description: String,
    },
}

impl RewardGrant {
    /// The level this grant belongs to.
    pub const fn level(&self) -> u32 {
        match self {
            Self::Item { level, .. } | Self::Role { level, .. } | Self::ManualFollowUp { level, .. } => {
                *level
            }
        }
    }
}

/// A level whose reward could not be granted. The level stays claimable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFailure {
    /// The level that failed.
    pub level: u32,
    /// The role that could not be granted.
    pub role: RoleId,
    /// Why the grant failed.
    pub reason: ActionFailure,
}

/// Result of one claim call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReport {
    /// Levels granted by this call, ascending.
    pub granted: Vec<RewardGrant>,
    /// Role grants that failed and remain claimable.
    pub failures: Vec<RewardFailure>,
}

impl ClaimReport {
    /// Whether nothing was granted and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.failures.is_empty()
    }

    /// The levels granted by this call.
    pub fn granted_levels(&self) -> Vec<u32> {
        self.granted.iter().map(RewardGrant::level).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reward_spec_parses_tagged_variants() {
        let item: RewardSpec = serde_json::from_str(r#"{"type":"item","id":"shield","amount":2}"#).unwrap();
        assert_eq!(
            item,
            RewardSpec::Item {
                id: ItemId::new("shield"),
                count: 2
            }
        );

        let role: RewardSpec = serde_json::from_str(r#"{"type":"role","id":99}"#).unwrap();
        assert_eq!(role, RewardSpec::Role { id: RoleId(99) });

        let none: RewardSpec = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert_eq!(none, RewardSpec::None);
    }

    #[test]
    fn item_count_defaults_to_one() {
        let item: RewardSpec = serde_json::from_str(r#"{"type":"item","id":"kick"}"#).unwrap();
        assert_eq!(
            item,
            RewardSpec::Item {
                id: ItemId::new("kick"),
                count: 1
            }
        );
    }

    #[test]
    fn unknown_reward_type_is_rejected() {
        let parsed = serde_json::from_str::<RewardSpec>(r#"{"type":"car"}"#);
        assert!(parsed.is_err());
    }
}
