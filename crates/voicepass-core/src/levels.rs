//! The level table: level number to XP threshold and reward.
//!
//! A table is immutable once built. Hot reload replaces the whole table
//! through [`crate::catalog::Catalog`]; nothing mutates one in place.
//!
//! # File format
//!
//! ```yaml
//! levels:
//!   - level: 1
//!     exp_threshold: 100
//!     reward: { type: item, id: xp_boost, count: 1 }
//!   - level: 2
//!     exp_threshold: 200
//!     reward: { type: role, id: 123456789 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use voicepass_types::RewardSpec;

use crate::error::CatalogError;

/// One row of the level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelEntry {
    /// The level number.
    pub level: u32,
    /// XP required to reach this level.
    pub exp_threshold: u64,
    /// Free-form text shown next to the reward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What claiming this level grants.
    #[serde(default)]
    pub reward: RewardSpec,
}

impl LevelEntry {
    /// An entry with no reward.
    pub const fn new(level: u32, exp_threshold: u64) -> Self {
        Self {
            level,
            exp_threshold,
            description: None,
            reward: RewardSpec::None,
        }
    }

    /// Copy of `self` with `reward` attached.
    #[must_use]
    pub fn with_reward(self, reward: RewardSpec) -> Self {
        Self { reward, ..self }
    }
}

#[derive(Deserialize)]
struct LevelFile {
    #[serde(default)]
    levels: Vec<LevelEntry>,
}

/// Validated mapping from level number to [`LevelEntry`].
///
/// Thresholds strictly increase with level. A level without an entry has no
/// threshold, which caps progression below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelTable {
    entries: BTreeMap<u32, LevelEntry>,
}

impl LevelTable {
    /// A table with no levels. Every member is at the cap.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and validate a table from its entries, in any order.
    ///
    /// # Errors
    ///
    /// [`CatalogError::DuplicateLevel`] if two entries share a level,
    /// [`CatalogError::ThresholdNotIncreasing`] if thresholds do not
    /// strictly increase in level order.
    pub fn from_entries(entries: Vec<LevelEntry>) -> Result<Self, CatalogError> {
        let mut by_level = BTreeMap::new();
        for entry in entries {
            let level = entry.level;
            if by_level.insert(level, entry).is_some() {
                return Err(CatalogError::DuplicateLevel(level));
            }
        }

        let mut previous: Option<u64> = None;
        for entry in by_level.values() {
            if let Some(prev) = previous
                && entry.exp_threshold <= prev
            {
                return Err(CatalogError::ThresholdNotIncreasing {
                    level: entry.level,
                    threshold: entry.exp_threshold,
                    previous: prev,
                });
            }
            previous = Some(entry.exp_threshold);
        }

        Ok(Self { entries: by_level })
    }

    /// Parse and validate a table from YAML (or JSON).
    pub fn parse(yaml: &str) -> Result<Self, CatalogError> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty());
        }
        let file: LevelFile = serde_yml::from_str(yaml)?;
        Self::from_entries(file.levels)
    }

    /// Read, parse and validate a table file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// The entry for exactly `level`.
    pub fn get(&self, level: u32) -> Option<&LevelEntry> {
        self.entries.get(&level)
    }

    /// Threshold of exactly `level`, if the level exists.
    pub fn threshold(&self, level: u32) -> Option<u64> {
        self.get(level).map(|entry| entry.exp_threshold)
    }

    /// The level reached from `level` with `xp`, checking one step ahead.
    ///
    /// Returns `Some(level + 1)` when that level exists and `xp` meets its
    /// threshold. Never skips more than one level.
    pub fn next_level_for(&self, level: u32, xp: u64) -> Option<u32> {
        let next = level.checked_add(1)?;
        let threshold = self.threshold(next)?;
        (xp >= threshold).then_some(next)
    }

    /// Levels in `1..=level` that carry a reward.
    pub fn rewarding_levels_up_to(&self, level: u32) -> impl Iterator<Item = &LevelEntry> {
        self.entries
            .range(1..)
            .take_while(move |(number, _)| **number <= level)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.reward != RewardSpec::None)
    }

    /// Whether `level` has an entry.
    pub fn contains(&self, level: u32) -> bool {
        self.entries.contains_key(&level)
    }

    /// Entries in ascending level order.
    pub fn iter(&self) -> impl Iterator<Item = &LevelEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use voicepass_types::{ItemId, RoleId};

    use super::*;

    const SAMPLE: &str = r#"
levels:
  - level: 1
    exp_threshold: 100
    description: "first reward"
    reward: { type: item, id: xp_boost, count: 1 }
  - level: 2
    exp_threshold: 200
    reward: { type: role, id: 123456789 }
  - level: 3
    exp_threshold: 300
    reward: { type: special, description: "Nitro" }
  - level: 4
    exp_threshold: 400
    reward: { type: none }
"#;

    #[test]
    fn parses_every_reward_variant() {
        let table = LevelTable::parse(SAMPLE).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.get(1).unwrap().reward,
            RewardSpec::Item {
                id: ItemId::new("xp_boost"),
                count: 1
            }
        );
        assert_eq!(
            table.get(2).unwrap().reward,
            RewardSpec::Role {
                id: RoleId(123_456_789)
            }
        );
        assert_eq!(table.get(4).unwrap().reward, RewardSpec::None);
    }

    #[test]
    fn json_is_accepted() {
        let json = r#"{"levels":[{"level":1,"exp_threshold":50}]}"#;
        let table = LevelTable::parse(json).unwrap();
        assert_eq!(table.threshold(1), Some(50));
        assert_eq!(table.get(1).unwrap().reward, RewardSpec::None);
    }

    #[test]
    fn duplicate_level_is_rejected() {
        let result = LevelTable::from_entries(vec![LevelEntry::new(1, 100), LevelEntry::new(1, 150)]);
        assert!(matches!(result, Err(CatalogError::DuplicateLevel(1))));
    }

    #[test]
    fn non_increasing_threshold_is_rejected() {
        let result = LevelTable::from_entries(vec![
            LevelEntry::new(2, 200),
            LevelEntry::new(1, 100),
            LevelEntry::new(3, 200),
        ]);
        assert!(matches!(
            result,
            Err(CatalogError::ThresholdNotIncreasing {
                level: 3,
                threshold: 200,
                previous: 200
            })
        ));
    }

    #[test]
    fn next_level_checks_only_one_step() {
        let table =
            LevelTable::from_entries(vec![LevelEntry::new(1, 100), LevelEntry::new(2, 200)]).unwrap();
        assert_eq!(table.next_level_for(0, 90), None);
        assert_eq!(table.next_level_for(0, 105), Some(1));
        assert_eq!(table.next_level_for(0, 1000), Some(1));
        assert_eq!(table.next_level_for(1, 250), Some(2));
        // No entry for level 3: capped.
        assert_eq!(table.next_level_for(2, 10_000), None);
    }

    #[test]
    fn rewarding_levels_skip_none() {
        let table = LevelTable::parse(SAMPLE).unwrap();
        let levels: Vec<u32> = table.rewarding_levels_up_to(4).map(|e| e.level).collect();
        assert_eq!(levels, vec![1, 2, 3]);
        assert_eq!(table.rewarding_levels_up_to(0).count(), 0);
        assert_eq!(table.rewarding_levels_up_to(2).count(), 2);
    }

    #[test]
    fn empty_file_is_an_empty_table() {
        assert!(LevelTable::parse("").unwrap().is_empty());
        assert!(LevelTable::parse("levels: []").unwrap().is_empty());
    }
}
