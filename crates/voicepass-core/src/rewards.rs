//! Exactly-once level reward claims.
//!
//! A claim walks every level from 1 to the member's current level in
//! ascending order and grants each unclaimed reward. It runs under the
//! member's profile lock, so two concurrent claims cannot both grant the
//! same level. Pending levels are recorded before their rewards are handed
//! out, so a store failure can lose a grant but never repeat one.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};
use voicepass_db::ProfileStore;
use voicepass_types::{
    ClaimReport, GuildEffect, MemberId, MemberRef, Notification, ProfileUpdate, RewardFailure,
    RewardGrant, RewardSpec,
};

use crate::accrual::find_or_create;
use crate::catalog::Catalog;
use crate::error::ClaimError;
use crate::guild::GuildActions;
use crate::locks::KeyedLocks;
use crate::notify::Announcer;

/// Grants unclaimed level rewards.
#[derive(Debug)]
pub struct RewardClaimEngine<S, G> {
    store: Arc<S>,
    guild: Arc<G>,
    catalog: Arc<Catalog>,
    profile_locks: Arc<KeyedLocks<MemberId>>,
    announcer: Announcer,
}

impl<S: ProfileStore, G: GuildActions> RewardClaimEngine<S, G> {
    /// Create a claim engine.
    pub const fn new(
        store: Arc<S>,
        guild: Arc<G>,
        catalog: Arc<Catalog>,
        profile_locks: Arc<KeyedLocks<MemberId>>,
        announcer: Announcer,
    ) -> Self {
        Self {
            store,
            guild,
            catalog,
            profile_locks,
            announcer,
        }
    }

    /// Grant every unclaimed reward up to the member's level.
    ///
    /// * `Item` credits the inventory.
    /// * `Role` asks the gateway; a failure is listed in the report and the
    ///   level stays claimable.
    /// * `Special` is reported for manual follow-up and marked claimed.
    /// * `None` and levels missing from the table are skipped and stay
    ///   unclaimed.
    ///
    /// Every pending level is written to `rewards_claimed` before any
    /// reward is handed out, and levels whose grant did not go through are
    /// released afterwards. A store failure therefore never leaves a reward
    /// granted but unrecorded. If the release itself fails, those levels
    /// stay claimed without their reward (at most once, never twice).
    ///
    /// A second call with no level change returns an empty report.
    ///
    /// # Errors
    ///
    /// [`ClaimError::Store`] if the profile cannot be loaded, the levels
    /// cannot be reserved, or an inventory credit fails. Levels granted
    /// before the failure stay recorded.
    pub async fn claim(&self, member: &MemberRef) -> Result<ClaimReport, ClaimError> {
        let _guard = self.profile_locks.lock(member.id).await;
        let profile = find_or_create(self.store.as_ref(), member.id, &member.name).await?;
        let snapshot = self.catalog.snapshot();

        let mut report = ClaimReport::default();
        let mut claimed = profile.rewards_claimed.clone();
        // Anything above the current level is stale (e.g. after an admin
        // level reset) and must not stay in the set.
        claimed.retain(|level| *level <= profile.level);
        let pruned = claimed.len() != profile.rewards_claimed.len();

        let pending: Vec<(u32, &RewardSpec)> = (1..=profile.level)
            .filter(|level| !claimed.contains(level))
            .filter_map(|level| snapshot.levels.get(level).map(|entry| (level, &entry.reward)))
            .filter(|(_, reward)| **reward != RewardSpec::None)
            .collect();
        if pending.is_empty() {
            if pruned {
                self.write_claimed(member.id, claimed).await?;
            }
            return Ok(report);
        }

        let mut reserved = claimed.clone();
        reserved.extend(pending.iter().map(|(level, _)| *level));
        self.write_claimed(member.id, reserved.clone()).await?;

        let mut failed_store = None;
        for (level, reward) in pending {
            match reward {
                RewardSpec::None => {}
                RewardSpec::Item { id, count } => {
                    match self
                        .store
                        .increment_inventory(member.id, id, i64::from(*count))
                        .await
                    {
                        Ok(_) => {
                            claimed.insert(level);
                            report.granted.push(RewardGrant::Item {
                                level,
                                item: id.clone(),
                                count: *count,
                            });
                        }
                        Err(e) => {
                            failed_store = Some(e);
                            break;
                        }
                    }
                }
                RewardSpec::Role { id } => {
                    let effect = GuildEffect::GrantRole {
                        member_id: member.id,
                        role_id: *id,
                    };
                    match self.guild.perform(&effect).await {
                        Ok(()) => {
                            claimed.insert(level);
                            report.granted.push(RewardGrant::Role { level, role: *id });
                        }
                        Err(reason) => {
                            warn!(member_id = %member.id, level, role_id = %id, %reason, "Role reward not granted");
                            report.failures.push(RewardFailure {
                                level,
                                role: *id,
                                reason,
                            });
                        }
                    }
                }
                RewardSpec::Special { description } => {
                    claimed.insert(level);
                    report.granted.push(RewardGrant::ManualFollowUp {
                        level,
                        description: description.clone(),
                    });
                }
            }
        }

        if claimed != reserved {
            let released: Vec<u32> = reserved.difference(&claimed).copied().collect();
            if let Err(e) = self.write_claimed(member.id, claimed).await {
                warn!(member_id = %member.id, levels = ?released, error = %e, "Could not release reserved levels");
            }
        }
        if !report.granted.is_empty() {
            info!(
                member_id = %member.id,
                levels = ?report.granted_levels(),
                failures = report.failures.len(),
                "Rewards claimed"
            );
            self.announcer.announce(Notification::RewardsGranted {
                member_id: member.id,
                granted: report.granted.clone(),
            });
        }

        match failed_store {
            Some(e) => Err(ClaimError::Store(e)),
            None => Ok(report),
        }
    }

    async fn write_claimed(&self, member_id: MemberId, claimed: BTreeSet<u32>) -> Result<(), ClaimError> {
        self.store
            .update(member_id, &ProfileUpdate::rewards_claimed(claimed))
            .await?;
        Ok(())
    }
}
