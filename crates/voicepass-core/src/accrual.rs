//! Converts elapsed active time into XP and drives level-ups.
//!
//! Every profile read-modify-write runs under the member's profile lock,
//! so settles, credits and debits for one member never interleave while
//! different members proceed in parallel.
//!
//! # Level policy
//!
//! A single call advances at most one level: only `level + 1` is checked
//! against the new XP total. A large grant that crosses several thresholds
//! is caught up one level per subsequent settle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use voicepass_db::{DbError, ProfileStore};
use voicepass_types::{MemberId, Notification, Profile, ProfileUpdate};

use crate::catalog::Catalog;
use crate::error::AccrualError;
use crate::locks::KeyedLocks;
use crate::notify::Announcer;

const MILLIS_PER_MINUTE: u128 = 60_000;

/// XP earned by `elapsed` at `xp_per_minute`, rounded down.
pub fn xp_for(elapsed: Duration, xp_per_minute: u64) -> u64 {
    let scaled = elapsed.as_millis().saturating_mul(u128::from(xp_per_minute));
    u64::try_from(scaled.checked_div(MILLIS_PER_MINUTE).unwrap_or(0)).unwrap_or(u64::MAX)
}

/// The shortest whole-millisecond span worth `xp` at `xp_per_minute`.
///
/// Never longer than the span that produced `xp` through [`xp_for`], so
/// moving a session start forward by it keeps the sub-unit remainder.
pub fn consumed_for(xp: u64, xp_per_minute: u64) -> Duration {
    let rate = u128::from(xp_per_minute);
    let numerator = u128::from(xp).saturating_mul(MILLIS_PER_MINUTE);
    let Some(floor) = numerator.checked_div(rate) else {
        return Duration::ZERO;
    };
    let ceil = if numerator.checked_rem(rate).unwrap_or(0) == 0 {
        floor
    } else {
        floor.saturating_add(1)
    };
    Duration::from_millis(u64::try_from(ceil).unwrap_or(u64::MAX))
}

/// A profile's XP and level after a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpCredit {
    /// XP total after the write.
    pub xp: u64,
    /// Level after the write.
    pub level: u32,
    /// Whether this write raised the level.
    pub leveled_up: bool,
}

/// What a debit removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpDebit {
    /// XP actually removed (at most the requested maximum).
    pub removed: u64,
    /// XP total after the write.
    pub xp: u64,
}

/// Result of one settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleOutcome {
    /// XP credited.
    pub xp_gained: u64,
    /// The part of the elapsed time those XP represent.
    pub consumed: Duration,
    /// The resulting profile state. `None` when nothing was written.
    pub credit: Option<XpCredit>,
}

impl SettleOutcome {
    /// Whether the settle raised the level.
    pub fn leveled_up(&self) -> bool {
        self.credit.is_some_and(|credit| credit.leveled_up)
    }
}

/// Load a profile, creating the default one if the member has none.
///
/// A concurrent creator winning the race is not an error; the stored
/// profile is re-read.
pub async fn find_or_create<S: ProfileStore>(
    store: &S,
    id: MemberId,
    display_name: &str,
) -> Result<Profile, DbError> {
    if let Some(profile) = store.find(id).await? {
        return Ok(profile);
    }
    match store.create(id, display_name).await {
        Ok(profile) => {
            info!(member_id = %id, username = display_name, "Profile created");
            Ok(profile)
        }
        Err(DbError::AlreadyExists(_)) => store.find(id).await?.ok_or(DbError::NotFound(id)),
        Err(e) => Err(e),
    }
}

/// Settles elapsed time and explicit XP grants into profiles.
#[derive(Debug)]
pub struct AccrualEngine<S> {
    store: Arc<S>,
    catalog: Arc<Catalog>,
    profile_locks: Arc<KeyedLocks<MemberId>>,
    announcer: Announcer,
    xp_per_minute: u64,
}

impl<S: ProfileStore> AccrualEngine<S> {
    /// Create an engine crediting `xp_per_minute`.
    pub const fn new(
        store: Arc<S>,
        catalog: Arc<Catalog>,
        profile_locks: Arc<KeyedLocks<MemberId>>,
        announcer: Announcer,
        xp_per_minute: u64,
    ) -> Self {
        Self {
            store,
            catalog,
            profile_locks,
            announcer,
            xp_per_minute,
        }
    }

    /// Convert `elapsed` into XP and apply it.
    ///
    /// Durations worth less than one XP write nothing. On error the caller
    /// still owns the elapsed time.
    pub async fn settle(
        &self,
        member_id: MemberId,
        display_name: &str,
        elapsed: Duration,
    ) -> Result<SettleOutcome, AccrualError> {
        let xp_gained = xp_for(elapsed, self.xp_per_minute);
        if xp_gained == 0 {
            debug!(member_id = %member_id, elapsed_ms = elapsed.as_millis(), "Settle below one XP, skipped");
            return Ok(SettleOutcome {
                xp_gained: 0,
                consumed: Duration::ZERO,
                credit: None,
            });
        }

        let credit = self.credit_xp(member_id, display_name, xp_gained).await?;
        debug!(
            member_id = %member_id,
            elapsed_ms = elapsed.as_millis(),
            xp_gained,
            xp = credit.xp,
            level = credit.level,
            "Session time settled"
        );
        Ok(SettleOutcome {
            xp_gained,
            consumed: consumed_for(xp_gained, self.xp_per_minute),
            credit: Some(credit),
        })
    }

    /// Add `amount` XP, checking one level ahead.
    ///
    /// XP and level are written in one update. A level-up is announced
    /// after the write; announcement failure does not undo it.
    pub async fn credit_xp(
        &self,
        member_id: MemberId,
        display_name: &str,
        amount: u64,
    ) -> Result<XpCredit, AccrualError> {
        let _guard = self.profile_locks.lock(member_id).await;
        let profile = find_or_create(self.store.as_ref(), member_id, display_name).await?;
        let snapshot = self.catalog.snapshot();

        let xp = profile.xp.saturating_add(amount);
        let next = snapshot.levels.next_level_for(profile.level, xp);
        let update = next.map_or_else(|| ProfileUpdate::xp(xp), |level| ProfileUpdate::xp_and_level(xp, level));
        self.store.update(member_id, &update).await?;

        let credit = XpCredit {
            xp,
            level: next.unwrap_or(profile.level),
            leveled_up: next.is_some(),
        };
        if credit.leveled_up {
            info!(member_id = %member_id, new_level = credit.level, xp, "Level up");
            self.announcer.announce(Notification::LevelUp {
                member_id,
                new_level: credit.level,
            });
        }
        Ok(credit)
    }

    /// Remove up to `max` XP, never below zero. The level is unchanged.
    pub async fn debit_xp(
        &self,
        member_id: MemberId,
        display_name: &str,
        max: u64,
    ) -> Result<XpDebit, AccrualError> {
        let _guard = self.profile_locks.lock(member_id).await;
        let profile = find_or_create(self.store.as_ref(), member_id, display_name).await?;

        let removed = max.min(profile.xp);
        let xp = profile.xp.saturating_sub(removed);
        if removed > 0 {
            self.store.update(member_id, &ProfileUpdate::xp(xp)).await?;
            debug!(member_id = %member_id, removed, xp, "XP debited");
        }
        Ok(XpDebit { removed, xp })
    }
}
