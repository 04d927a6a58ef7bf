//! The item catalog: what each inventory item does when used.
//!
//! Effects are a closed set of variants resolved by exhaustive matching in
//! [`crate::effects::ItemService`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use voicepass_types::ItemId;

use crate::error::CatalogError;

/// What using an item does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Pull the target into the actor's voice channel.
    Summon,
    /// Disconnect the target from voice.
    Disconnect,
    /// Server-mute the target, lifted after `duration_secs`.
    Mute {
        /// How long the mute lasts.
        #[serde(default = "default_mute_secs")]
        duration_secs: u64,
    },
    /// Change the target's nickname.
    Rename {
        /// The nickname to set.
        nickname: String,
    },
    /// Coin flip: take up to `max_amount` XP from the target, or pay `fine`.
    StealXp {
        /// Cap on XP taken.
        #[serde(default = "default_steal_max")]
        max_amount: u64,
        /// XP the actor loses when caught.
        #[serde(default = "default_steal_fine")]
        fine: u64,
    },
    /// Credit XP to the actor.
    XpBoost {
        /// XP credited.
        #[serde(default = "default_boost")]
        amount: u64,
    },
    /// Absorbs one targeted item used against the holder.
    Shield,
    /// Held for an operator to redeem; no active use.
    Passive,
}

impl ItemEffect {
    /// Whether the effect acts on another member.
    pub const fn is_targeted(&self) -> bool {
        matches!(
            self,
            Self::Summon | Self::Disconnect | Self::Mute { .. } | Self::Rename { .. } | Self::StealXp { .. }
        )
    }

    /// Whether the item can be used at all.
    pub const fn is_usable(&self) -> bool {
        !matches!(self, Self::Shield | Self::Passive)
    }
}

const fn default_mute_secs() -> u64 {
    300
}

const fn default_steal_max() -> u64 {
    500
}

const fn default_steal_fine() -> u64 {
    300
}

const fn default_boost() -> u64 {
    1000
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDef {
    /// Inventory key.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Display emoji.
    #[serde(default)]
    pub emoji: String,
    /// Longer description for menus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What using it does.
    pub effect: ItemEffect,
}

impl ItemDef {
    /// A definition with no emoji or description.
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, effect: ItemEffect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: String::new(),
            description: None,
            effect,
        }
    }
}

#[derive(Deserialize)]
struct ItemFile {
    #[serde(default)]
    items: Vec<ItemDef>,
}

/// Validated set of item definitions keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemCatalog {
    items: BTreeMap<ItemId, ItemDef>,
}

impl ItemCatalog {
    /// A catalog with no items.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a catalog, rejecting duplicate ids.
    pub fn from_items(items: Vec<ItemDef>) -> Result<Self, CatalogError> {
        let mut by_id = BTreeMap::new();
        for item in items {
            if by_id.contains_key(&item.id) {
                return Err(CatalogError::DuplicateItem(item.id));
            }
            by_id.insert(item.id.clone(), item);
        }
        Ok(Self { items: by_id })
    }

    /// Parse and validate a catalog from YAML (or JSON).
    pub fn parse(yaml: &str) -> Result<Self, CatalogError> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty());
        }
        let file: ItemFile = serde_yml::from_str(yaml)?;
        Self::from_items(file.items)
    }

    /// Read, parse and validate a catalog file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Look up one item.
    pub fn get(&self, id: &ItemId) -> Option<&ItemDef> {
        self.items.get(id)
    }

    /// Whether `id` is in the catalog.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    /// Ids of every item with the shield effect.
    pub fn shields(&self) -> impl Iterator<Item = &ItemId> {
        self.items
            .values()
            .filter(|item| item.effect == ItemEffect::Shield)
            .map(|item| &item.id)
    }

    /// Items in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemDef> {
        self.items.values()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
items:
  - { id: hook, name: Hook, emoji: "🪝", effect: { type: summon } }
  - { id: mute, name: Mute, effect: { type: mute, duration_secs: 60 } }
  - { id: steal_xp, name: Knife, effect: { type: steal_xp } }
  - { id: shield, name: Shield, effect: { type: shield } }
  - { id: ticket_nitro, name: Nitro ticket, effect: { type: passive } }
"#;

    #[test]
    fn parses_effects_with_defaults() {
        let catalog = ItemCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(
            catalog.get(&ItemId::new("mute")).unwrap().effect,
            ItemEffect::Mute { duration_secs: 60 }
        );
        assert_eq!(
            catalog.get(&ItemId::new("steal_xp")).unwrap().effect,
            ItemEffect::StealXp {
                max_amount: 500,
                fine: 300
            }
        );
        assert_eq!(catalog.get(&ItemId::new("hook")).unwrap().emoji, "🪝");
    }

    #[test]
    fn duplicate_item_is_rejected() {
        let result = ItemCatalog::from_items(vec![
            ItemDef::new("shield", "Shield", ItemEffect::Shield),
            ItemDef::new("shield", "Shield 2", ItemEffect::Shield),
        ]);
        assert!(matches!(result, Err(CatalogError::DuplicateItem(id)) if id.as_str() == "shield"));
    }

    #[test]
    fn unknown_effect_type_is_rejected() {
        let result = ItemCatalog::parse("items:\n  - { id: car, name: Car, effect: { type: drive } }\n");
        assert!(matches!(result, Err(CatalogError::Yaml { .. })));
    }

    #[test]
    fn targeting_and_usability() {
        assert!(ItemEffect::Summon.is_targeted());
        assert!(ItemEffect::Rename { nickname: "x".to_owned() }.is_targeted());
        assert!(!ItemEffect::XpBoost { amount: 1 }.is_targeted());
        assert!(!ItemEffect::Shield.is_usable());
        assert!(!ItemEffect::Passive.is_usable());
    }

    #[test]
    fn shields_lists_shield_items() {
        let catalog = ItemCatalog::parse(SAMPLE).unwrap();
        let shields: Vec<&str> = catalog.shields().map(ItemId::as_str).collect();
        assert_eq!(shields, vec!["shield"]);
    }
}
