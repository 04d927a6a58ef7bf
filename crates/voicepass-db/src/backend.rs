//! Runtime selection between the store backends.

use voicepass_types::{ItemId, MemberId, Profile, ProfileUpdate};

use crate::dragonfly::DragonflyProfileStore;
use crate::error::DbError;
use crate::memory::MemoryProfileStore;
use crate::store::ProfileStore;

/// The profile store chosen at startup.
///
/// The engine is generic over [`ProfileStore`]; this enum lets the binary
/// pick the backend from configuration without boxing.
#[derive(Debug)]
pub enum ProfileBackend {
    /// Profiles kept in process memory. Lost on restart.
    Memory(MemoryProfileStore),
    /// Profiles kept in `Dragonfly`.
    Dragonfly(DragonflyProfileStore),
}

impl ProfileBackend {
    /// Short backend name for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Dragonfly(_) => "dragonfly",
        }
    }
}

impl ProfileStore for ProfileBackend {
    async fn find(&self, id: MemberId) -> Result<Option<Profile>, DbError> {
        match self {
            Self::Memory(store) => store.find(id).await,
            Self::Dragonfly(store) => store.find(id).await,
        }
    }

    async fn create(&self, id: MemberId, username: &str) -> Result<Profile, DbError> {
        match self {
            Self::Memory(store) => store.create(id, username).await,
            Self::Dragonfly(store) => store.create(id, username).await,
        }
    }

    async fn update(&self, id: MemberId, update: &ProfileUpdate) -> Result<(), DbError> {
        match self {
            Self::Memory(store) => store.update(id, update).await,
            Self::Dragonfly(store) => store.update(id, update).await,
        }
    }

    async fn increment_inventory(
        &self,
        id: MemberId,
        item: &ItemId,
        delta: i64,
    ) -> Result<i64, DbError> {
        match self {
            Self::Memory(store) => store.increment_inventory(id, item, delta).await,
            Self::Dragonfly(store) => store.increment_inventory(id, item, delta).await,
        }
    }
}
