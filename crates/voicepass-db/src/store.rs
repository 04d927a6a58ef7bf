//! The [`ProfileStore`] trait: async CRUD over member profiles.
//!
//! Every call is assumed atomic on its own. `update` is a partial merge:
//! only the fields present in the [`ProfileUpdate`] are written, so two
//! writers touching disjoint fields never clobber each other.

use std::future::Future;

use voicepass_types::{ItemId, MemberId, Profile, ProfileUpdate};

use crate::error::DbError;

/// Async document store for member profiles.
///
/// Implementations must be shareable across tasks; the core engines hold
/// them behind an `Arc` and call them concurrently for different members.
pub trait ProfileStore: Send + Sync + 'static {
    /// Load a profile. Returns `Ok(None)` when the member has none yet.
    fn find(&self, id: MemberId) -> impl Future<Output = Result<Option<Profile>, DbError>> + Send;

    /// Create the default profile for `id`.
    ///
    /// Fails with [`DbError::AlreadyExists`] if one is already stored.
    fn create(
        &self,
        id: MemberId,
        username: &str,
    ) -> impl Future<Output = Result<Profile, DbError>> + Send;

    /// Merge `update` into the stored profile.
    ///
    /// Fails with [`DbError::NotFound`] if the profile does not exist.
    fn update(
        &self,
        id: MemberId,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Atomically add `delta` (possibly negative) to one inventory count.
    ///
    /// Returns the count after the increment. Fails with
    /// [`DbError::NotFound`] if the profile does not exist.
    fn increment_inventory(
        &self,
        id: MemberId,
        item: &ItemId,
        delta: i64,
    ) -> impl Future<Output = Result<i64, DbError>> + Send;
}
