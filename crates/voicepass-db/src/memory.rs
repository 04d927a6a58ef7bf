//! In-process profile store.
//!
//! Holds every profile in a map behind an async `RwLock`. Used for local
//! runs without Dragonfly and as the store behind the core engine tests.
//! An outage switch lets callers simulate an unavailable backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use voicepass_types::{ItemId, MemberId, Profile, ProfileUpdate};

use crate::error::DbError;
use crate::store::ProfileStore;

/// A [`ProfileStore`] that keeps all profiles in memory.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<MemberId, Profile>>,
    unavailable: AtomicBool,
    writes: AtomicU64,
}

impl MemoryProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`DbError::Unavailable`]
    /// (`true`) or succeed again (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Number of successful mutating calls (`create`, `update`,
    /// `increment_inventory`) since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Insert or replace a profile directly, bypassing the write counter.
    pub async fn seed(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.id, profile);
    }

    /// Number of stored profiles.
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Whether no profiles are stored.
    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(DbError::Unavailable("memory store outage".to_owned()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::AcqRel);
    }
}

impl ProfileStore for MemoryProfileStore {
    async fn find(&self, id: MemberId) -> Result<Option<Profile>, DbError> {
        self.check_available()?;
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn create(&self, id: MemberId, username: &str) -> Result<Profile, DbError> {
        self.check_available()?;
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&id) {
            return Err(DbError::AlreadyExists(id));
        }
        let profile = Profile::new(id, username, Utc::now());
        profiles.insert(id, profile.clone());
        drop(profiles);
        self.record_write();
        Ok(profile)
    }

    async fn update(&self, id: MemberId, update: &ProfileUpdate) -> Result<(), DbError> {
        self.check_available()?;
        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(&id).ok_or(DbError::NotFound(id))?;
        profile.apply(update);
        drop(profiles);
        self.record_write();
        Ok(())
    }

    async fn increment_inventory(
        &self,
        id: MemberId,
        item: &ItemId,
        delta: i64,
    ) -> Result<i64, DbError> {
        self.check_available()?;
        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(&id).ok_or(DbError::NotFound(id))?;

        // Counts never go below zero; a decrement past zero stops at zero.
        let current = i64::from(profile.item_count(item));
        let next = current.saturating_add(delta).clamp(0, i64::from(u32::MAX));
        let stored = u32::try_from(next).unwrap_or(u32::MAX);
        if stored == 0 {
            profile.inventory.remove(item);
        } else {
            profile.inventory.insert(item.clone(), stored);
        }
        drop(profiles);
        self.record_write();
        Ok(next)
    }
}
