//! The configuration files at the repository root must load and validate.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use voicepass_core::Catalog;
use voicepass_core::config::{CatalogConfig, VoicepassConfig};
use voicepass_types::{ItemId, RewardSpec};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn shipped_config_is_valid() {
    let config = VoicepassConfig::from_file(&repo_root().join("voicepass.yaml")).unwrap();
    assert_eq!(config.accrual.xp_per_minute, 10);
    assert_eq!(config.messaging.subject("commands"), "voicepass.commands");
}

#[test]
fn shipped_catalog_rewards_reference_known_items() {
    let root = repo_root();
    let catalog = Catalog::load(&CatalogConfig {
        levels_path: root.join("levels.yaml"),
        items_path: root.join("items.yaml"),
    })
    .unwrap();
    let snapshot = catalog.snapshot();

    assert_eq!(snapshot.levels.len(), 10);
    assert_eq!(snapshot.items.len(), 8);
    for entry in snapshot.levels.iter() {
        if let RewardSpec::Item { id, .. } = &entry.reward {
            assert!(snapshot.items.contains(id), "level {} rewards unknown item {id}", entry.level);
        }
    }
    assert!(snapshot.items.shields().any(|id| *id == ItemId::new("shield")));
    assert_eq!(catalog.reload().unwrap().levels, 10);
}
