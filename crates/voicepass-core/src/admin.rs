//! Member self-service reads and moderator operations.

use std::sync::Arc;

use tracing::info;
use voicepass_db::{DbError, ProfileStore};
use voicepass_types::{ItemId, MemberId, MemberRef, Profile, ProfileUpdate, ProgressView};

use crate::accrual::{AccrualEngine, find_or_create};
use crate::catalog::{Catalog, CatalogSizes};
use crate::error::AdminError;
use crate::guild::RosterSource;
use crate::locks::KeyedLocks;

/// Totals of one roster registration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterSync {
    /// Non-bot members on the roster.
    pub scanned: usize,
    /// Profiles that did not exist before.
    pub created: usize,
}

/// Registration, progress reads and admin adjustments.
#[derive(Debug)]
pub struct AdminService<S> {
    store: Arc<S>,
    accrual: Arc<AccrualEngine<S>>,
    catalog: Arc<Catalog>,
    profile_locks: Arc<KeyedLocks<MemberId>>,
}

impl<S: ProfileStore> AdminService<S> {
    /// Create the service. `profile_locks` must be the set the accrual
    /// engine uses.
    pub const fn new(
        store: Arc<S>,
        accrual: Arc<AccrualEngine<S>>,
        catalog: Arc<Catalog>,
        profile_locks: Arc<KeyedLocks<MemberId>>,
    ) -> Self {
        Self {
            store,
            accrual,
            catalog,
            profile_locks,
        }
    }

    /// Load the member's profile, creating it on first contact.
    pub async fn register(&self, member: &MemberRef) -> Result<Profile, AdminError> {
        Ok(find_or_create(self.store.as_ref(), member.id, &member.name).await?)
    }

    /// Create a profile for every non-bot member the roster lists.
    ///
    /// Existing profiles are left untouched, so running it twice creates
    /// nothing the second time.
    pub async fn register_roster<R: RosterSource>(&self, roster: &R) -> Result<RosterSync, AdminError> {
        let entries = roster.roster().await?;
        let mut sync = RosterSync::default();
        for member in entries.iter().map(|entry| &entry.member).filter(|member| !member.is_bot) {
            sync.scanned = sync.scanned.saturating_add(1);
            if self.store.find(member.id).await?.is_some() {
                continue;
            }
            match self.store.create(member.id, &member.name).await {
                Ok(_) => sync.created = sync.created.saturating_add(1),
                Err(DbError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(scanned = sync.scanned, created = sync.created, "Roster registered");
        Ok(sync)
    }

    /// Level, XP and distance to the next threshold.
    pub async fn progress(&self, member: &MemberRef) -> Result<ProgressView, AdminError> {
        let profile = self.register(member).await?;
        let snapshot = self.catalog.snapshot();
        let next_threshold = profile
            .level
            .checked_add(1)
            .and_then(|next| snapshot.levels.threshold(next));
        let unclaimed_levels = snapshot
            .levels
            .rewarding_levels_up_to(profile.level)
            .map(|entry| entry.level)
            .filter(|level| !profile.rewards_claimed.contains(level))
            .collect();

        Ok(ProgressView {
            member_id: profile.id,
            level: profile.level,
            xp: profile.xp,
            next_threshold,
            percent: percent_of(profile.xp, next_threshold),
            unclaimed_levels,
        })
    }

    /// Add (`delta > 0`) or remove (`delta < 0`) XP. Removal clamps at zero.
    pub async fn adjust_xp(&self, member: &MemberRef, delta: i64) -> Result<Profile, AdminError> {
        let amount = delta.unsigned_abs();
        if delta >= 0 {
            self.accrual.credit_xp(member.id, &member.name, amount).await?;
        } else {
            self.accrual.debit_xp(member.id, &member.name, amount).await?;
        }
        info!(member_id = %member.id, delta, "XP adjusted by admin");
        self.register(member).await
    }

    /// Force a level. XP becomes that level's threshold (0 for level 0) and
    /// claimed rewards above it are forgotten.
    pub async fn set_level(&self, member: &MemberRef, level: u32) -> Result<Profile, AdminError> {
        let snapshot = self.catalog.snapshot();
        let xp = if level == 0 {
            0
        } else {
            snapshot
                .levels
                .threshold(level)
                .ok_or(AdminError::UnknownLevel(level))?
        };

        let _guard = self.profile_locks.lock(member.id).await;
        let mut profile = find_or_create(self.store.as_ref(), member.id, &member.name).await?;
        let mut update = ProfileUpdate::xp_and_level(xp, level);
        let mut claimed = profile.rewards_claimed.clone();
        claimed.retain(|claimed_level| *claimed_level <= level);
        if claimed != profile.rewards_claimed {
            update.rewards_claimed = Some(claimed);
        }
        self.store.update(member.id, &update).await?;
        profile.apply(&update);

        info!(member_id = %member.id, level, xp, "Level set by admin");
        Ok(profile)
    }

    /// Change an inventory count. The count never drops below zero.
    ///
    /// Returns the count after the change.
    pub async fn grant_item(&self, member: &MemberRef, item_id: &ItemId, delta: i64) -> Result<i64, AdminError> {
        if !self.catalog.snapshot().items.contains(item_id) {
            return Err(AdminError::UnknownItem(item_id.clone()));
        }
        find_or_create(self.store.as_ref(), member.id, &member.name).await?;
        let count = self.store.increment_inventory(member.id, item_id, delta).await?;
        info!(member_id = %member.id, item = %item_id, delta, count, "Inventory adjusted by admin");
        Ok(count)
    }

    /// Flip a boolean preference. Returns the new value.
    pub async fn toggle_setting(&self, member: &MemberRef, key: &str) -> Result<bool, AdminError> {
        let _guard = self.profile_locks.lock(member.id).await;
        let profile = find_or_create(self.store.as_ref(), member.id, &member.name).await?;
        let value = !profile.setting(key);
        let mut update = ProfileUpdate::default();
        update.settings.insert(key.to_owned(), value);
        self.store.update(member.id, &update).await?;
        Ok(value)
    }

    /// Re-read the level table and item catalog.
    pub fn reload_catalog(&self) -> Result<CatalogSizes, AdminError> {
        Ok(self.catalog.reload()?)
    }
}

/// Whole percent of `xp` toward `next`, 100 at the cap.
fn percent_of(xp: u64, next: Option<u64>) -> u8 {
    let Some(next) = next.filter(|threshold| *threshold > 0) else {
        return 100;
    };
    let percent = u128::from(xp)
        .saturating_mul(100)
        .checked_div(u128::from(next))
        .unwrap_or(100)
        .min(100);
    u8::try_from(percent).unwrap_or(100)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use voicepass_db::MemoryProfileStore;
    use voicepass_types::{ActionFailure, ChannelId, PresenceState, RewardSpec, RosterEntry};

    use super::*;
    use crate::guild::StaticRoster;
    use crate::items::{ItemCatalog, ItemDef, ItemEffect};
    use crate::levels::{LevelEntry, LevelTable};
    use crate::notify::Announcer;

    fn service() -> (Arc<MemoryProfileStore>, AdminService<MemoryProfileStore>) {
        let levels = LevelTable::from_entries(vec![
            LevelEntry::new(1, 100).with_reward(RewardSpec::Item {
                id: ItemId::new("shield"),
                count: 1,
            }),
            LevelEntry::new(2, 200),
            LevelEntry::new(3, 300).with_reward(RewardSpec::Special {
                description: "Nitro".to_owned(),
            }),
        ])
        .unwrap();
        let items = ItemCatalog::from_items(vec![ItemDef::new("shield", "Shield", ItemEffect::Shield)]).unwrap();
        let catalog = Arc::new(Catalog::new(levels, items));
        let store = Arc::new(MemoryProfileStore::new());
        let locks = Arc::new(KeyedLocks::new());
        let accrual = Arc::new(AccrualEngine::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&locks),
            Announcer::disabled(),
            10,
        ));
        let service = AdminService::new(Arc::clone(&store), accrual, catalog, locks);
        (store, service)
    }

    fn alice() -> MemberRef {
        MemberRef::new(MemberId(1), "alice")
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (store, service) = service();
        let first = service.register(&alice()).await.unwrap();
        let second = service.register(&alice()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn progress_reports_percent_and_unclaimed() {
        let (store, service) = service();
        let mut profile = Profile::new(MemberId(1), "alice", Utc::now());
        profile.xp = 150;
        profile.level = 1;
        store.seed(profile).await;

        let view = service.progress(&alice()).await.unwrap();
        assert_eq!(view.next_threshold, Some(200));
        assert_eq!(view.percent, 75);
        assert_eq!(view.unclaimed_levels, vec![1]);
    }

    #[test]
    fn percent_caps_at_100() {
        assert_eq!(percent_of(500, None), 100);
        assert_eq!(percent_of(500, Some(200)), 100);
        assert_eq!(percent_of(0, Some(100)), 0);
        assert_eq!(percent_of(7, Some(0)), 100);
    }

    #[tokio::test]
    async fn set_level_rebases_xp_and_prunes_claims() {
        let (store, service) = service();
        let mut profile = Profile::new(MemberId(1), "alice", Utc::now());
        profile.xp = 350;
        profile.level = 3;
        profile.rewards_claimed = BTreeSet::from([1, 3]);
        store.seed(profile).await;

        let profile = service.set_level(&alice(), 1).await.unwrap();
        assert_eq!((profile.level, profile.xp), (1, 100));
        assert_eq!(profile.rewards_claimed, BTreeSet::from([1]));
        assert_eq!(store.find(MemberId(1)).await.unwrap().unwrap(), profile);

        let reset = service.set_level(&alice(), 0).await.unwrap();
        assert_eq!((reset.level, reset.xp), (0, 0));
        assert!(reset.rewards_claimed.is_empty());

        assert!(matches!(
            service.set_level(&alice(), 9).await,
            Err(AdminError::UnknownLevel(9))
        ));
    }

    #[tokio::test]
    async fn adjust_xp_both_directions() {
        let (_store, service) = service();
        let up = service.adjust_xp(&alice(), 120).await.unwrap();
        assert_eq!((up.xp, up.level), (120, 1));
        let down = service.adjust_xp(&alice(), -500).await.unwrap();
        assert_eq!((down.xp, down.level), (0, 1));
    }

    #[tokio::test]
    async fn grant_item_clamps_and_rejects_unknown() {
        let (_store, service) = service();
        let shield = ItemId::new("shield");
        assert_eq!(service.grant_item(&alice(), &shield, 2).await.unwrap(), 2);
        assert_eq!(service.grant_item(&alice(), &shield, -5).await.unwrap(), 0);
        assert!(matches!(
            service.grant_item(&alice(), &ItemId::new("car"), 1).await,
            Err(AdminError::UnknownItem(_))
        ));
    }

    #[tokio::test]
    async fn toggle_flips_from_default_true() {
        let (_store, service) = service();
        assert!(!service.toggle_setting(&alice(), "ephemeral").await.unwrap());
        assert!(service.toggle_setting(&alice(), "ephemeral").await.unwrap());
    }

    #[test]
    fn reload_without_sources_is_rejected() {
        let (_store, service) = service();
        assert!(matches!(
            service.reload_catalog(),
            Err(AdminError::Catalog(crate::error::CatalogError::NoSource))
        ));
    }

    struct DownRoster;

    impl RosterSource for DownRoster {
        async fn roster(&self) -> Result<Vec<RosterEntry>, ActionFailure> {
            Err(ActionFailure::Transport("gateway offline".to_owned()))
        }
    }

    #[tokio::test]
    async fn register_roster_creates_missing_profiles_once() {
        let (store, service) = service();
        service.register(&alice()).await.unwrap();
        let roster = StaticRoster(vec![
            RosterEntry {
                member: alice(),
                state: PresenceState::in_channel(ChannelId(5)),
            },
            RosterEntry {
                member: MemberRef::new(MemberId(2), "bob"),
                state: PresenceState::in_channel(ChannelId(5)).self_muted(),
            },
            RosterEntry {
                member: MemberRef {
                    id: MemberId(3),
                    name: "bot".to_owned(),
                    is_bot: true,
                },
                state: PresenceState::in_channel(ChannelId(5)),
            },
        ]);

        let first = service.register_roster(&roster).await.unwrap();
        assert_eq!(first, RosterSync { scanned: 2, created: 1 });
        assert!(store.find(MemberId(2)).await.unwrap().is_some());
        assert!(store.find(MemberId(3)).await.unwrap().is_none());

        let again = service.register_roster(&roster).await.unwrap();
        assert_eq!(again, RosterSync { scanned: 2, created: 0 });
    }

    #[tokio::test]
    async fn register_roster_reports_gateway_failure() {
        let (_, service) = service();
        let result = service.register_roster(&DownRoster).await;
        assert!(matches!(result, Err(AdminError::Roster(ActionFailure::Transport(_)))));
    }
}
