//! Integration tests for the `voicepass-db` Dragonfly backend.
//!
//! These tests require a live Dragonfly instance. Run with:
//!
//! ```bash
//! docker compose up -d
//! cargo test -p voicepass-db -- --ignored
//! docker compose down
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use voicepass_db::{DbError, DragonflyProfileStore, ProfileStore};
use voicepass_types::{ItemId, MemberId, ProfileUpdate};

/// Dragonfly connection URL for the local Docker instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

async fn setup_dragonfly(id: MemberId) -> DragonflyProfileStore {
    let store = DragonflyProfileStore::connect(DRAGONFLY_URL, Duration::from_secs(5))
        .await
        .expect("Failed to connect to Dragonfly -- is Docker running?");
    store.delete(id).await.expect("cleanup failed");
    store
}

// =============================================================================
// Profile lifecycle
// =============================================================================

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn create_then_find_round_trips() {
    let id = MemberId(900_001);
    let store = setup_dragonfly(id).await;

    let created = store.create(id, "alice").await.unwrap();
    let found = store.find(id).await.unwrap().expect("profile missing");
    assert_eq!(found.username, "alice");
    assert_eq!(found.xp, 0);
    assert_eq!(found.level, 0);
    assert_eq!(
        found.registered_at.timestamp(),
        created.registered_at.timestamp()
    );

    let again = store.create(id, "alice").await;
    assert!(matches!(again, Err(DbError::AlreadyExists(_))));

    store.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn update_merges_fields() {
    let id = MemberId(900_002);
    let store = setup_dragonfly(id).await;
    store.create(id, "bob").await.unwrap();

    store
        .update(id, &ProfileUpdate::xp_and_level(250, 2))
        .await
        .unwrap();
    let mut settings = ProfileUpdate::default();
    settings.settings.insert("ephemeral".to_owned(), false);
    store.update(id, &settings).await.unwrap();

    let profile = store.find(id).await.unwrap().unwrap();
    assert_eq!(profile.xp, 250);
    assert_eq!(profile.level, 2);
    assert!(!profile.setting("ephemeral"));

    store.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn missing_profile_is_none_and_update_fails() {
    let id = MemberId(900_003);
    let store = setup_dragonfly(id).await;

    assert!(store.find(id).await.unwrap().is_none());
    let result = store.update(id, &ProfileUpdate::xp(1)).await;
    assert!(matches!(result, Err(DbError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn inventory_increments_clamp_at_zero() {
    let id = MemberId(900_004);
    let store = setup_dragonfly(id).await;
    store.create(id, "carol").await.unwrap();
    let shield = ItemId::new("shield");

    assert_eq!(store.increment_inventory(id, &shield, 3).await.unwrap(), 3);
    assert_eq!(store.increment_inventory(id, &shield, -1).await.unwrap(), 2);
    assert_eq!(store.increment_inventory(id, &shield, -9).await.unwrap(), 0);

    let profile = store.find(id).await.unwrap().unwrap();
    assert_eq!(profile.item_count(&shield), 0);

    store.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn racing_create_never_resets_written_xp() {
    let store = std::sync::Arc::new(setup_dragonfly(MemberId(900_005)).await);

    for round in 0..50_u64 {
        let id = MemberId(900_100_u64.saturating_add(round));
        store.delete(id).await.unwrap();

        let creator = std::sync::Arc::clone(&store);
        let create = tokio::spawn(async move { creator.create(id, "erin").await });
        // Write as soon as any profile is visible, like a concurrent credit.
        let writer = std::sync::Arc::clone(&store);
        let credit = tokio::spawn(async move {
            loop {
                if writer.find(id).await.unwrap().is_some() {
                    writer.update(id, &ProfileUpdate::xp(20)).await.unwrap();
                    return;
                }
                tokio::task::yield_now().await;
            }
        });
        create.await.unwrap().unwrap();
        credit.await.unwrap();

        let profile = store.find(id).await.unwrap().unwrap();
        assert_eq!(profile.xp, 20, "round {round}: credit overwritten by create");
        assert_eq!(profile.username, "erin");
        store.delete(id).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn inventory_increment_needs_a_profile() {
    let id = MemberId(900_006);
    let store = setup_dragonfly(id).await;

    let result = store.increment_inventory(id, &ItemId::new("shield"), 1).await;
    assert!(matches!(result, Err(DbError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance (docker compose up -d)"]
async fn concurrent_increments_are_all_counted() {
    let id = MemberId(900_007);
    let store = std::sync::Arc::new(setup_dragonfly(id).await);
    store.create(id, "fay").await.unwrap();
    let kick = ItemId::new("kick");

    let mut handles = Vec::new();
    for _ in 0..40 {
        let store = std::sync::Arc::clone(&store);
        let kick = kick.clone();
        handles.push(tokio::spawn(async move {
            store.increment_inventory(id, &kick, 1).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.increment_inventory(id, &kick, -100).await.unwrap(), 0);
    assert_eq!(store.increment_inventory(id, &kick, 1).await.unwrap(), 1);
    store.delete(id).await.unwrap();
}
