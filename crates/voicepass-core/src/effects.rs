//! Item use: validation, shields, effects and inventory accounting.
//!
//! An item unit is consumed only after its effect succeeded (a caught thief
//! still loses the knife). Uses by the same actor are serialized so two
//! concurrent uses cannot spend one unit twice. XP moves go through the
//! [`AccrualEngine`], one profile lock at a time, so a steal never holds the
//! locks of both members at once.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{info, warn};
use voicepass_db::ProfileStore;
use voicepass_types::{GuildEffect, ItemId, ItemUse, ItemUseOutcome, MemberId, MemberRef};

use crate::accrual::{AccrualEngine, find_or_create};
use crate::catalog::Catalog;
use crate::deferred::DeferredActions;
use crate::error::ItemError;
use crate::guild::GuildActions;
use crate::items::ItemEffect;
use crate::locks::KeyedLocks;

/// Decides whether a steal attempt succeeds.
pub type StealRoll = fn() -> bool;

fn coin_flip() -> bool {
    rand::random_bool(0.5)
}

/// Applies item effects on behalf of members.
#[derive(Debug)]
pub struct ItemService<S, G> {
    store: Arc<S>,
    accrual: Arc<AccrualEngine<S>>,
    guild: Arc<G>,
    deferred: Arc<DeferredActions<G>>,
    catalog: Arc<Catalog>,
    use_locks: KeyedLocks<MemberId>,
    steal_roll: StealRoll,
}

impl<S: ProfileStore, G: GuildActions> ItemService<S, G> {
    /// Create a service using a fair coin for steals.
    pub fn new(
        store: Arc<S>,
        accrual: Arc<AccrualEngine<S>>,
        guild: Arc<G>,
        deferred: Arc<DeferredActions<G>>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            store,
            accrual,
            guild,
            deferred,
            catalog,
            use_locks: KeyedLocks::new(),
            steal_roll: coin_flip,
        }
    }

    /// Replace the steal roll (deterministic tests).
    #[must_use]
    pub const fn with_steal_roll(mut self, steal_roll: StealRoll) -> Self {
        self.steal_roll = steal_roll;
        self
    }

    /// Use one unit of an item.
    ///
    /// # Errors
    ///
    /// A validation variant of [`ItemError`] (nothing consumed), a gateway
    /// failure (nothing consumed) or a store failure.
    pub async fn use_item(&self, request: &ItemUse) -> Result<ItemUseOutcome, ItemError> {
        let snapshot = self.catalog.snapshot();
        let item_id = &request.item_id;
        let def = snapshot
            .items
            .get(item_id)
            .ok_or_else(|| ItemError::UnknownItem(item_id.clone()))?;
        if !def.effect.is_usable() {
            return Err(ItemError::PassiveItem(item_id.clone()));
        }

        let actor = &request.actor;
        let _guard = self.use_locks.lock(actor.id).await;
        let profile = find_or_create(self.store.as_ref(), actor.id, &actor.name).await?;
        if profile.item_count(item_id) == 0 {
            return Err(ItemError::OutOfStock(item_id.clone()));
        }

        let target = if def.effect.is_targeted() {
            let target = request
                .target
                .as_ref()
                .ok_or_else(|| ItemError::TargetRequired(item_id.clone()))?;
            if target.is_bot {
                return Err(ItemError::BotTarget);
            }
            let shields: Vec<ItemId> = snapshot.items.shields().cloned().collect();
            if let Some(shield) = self.held_shield(target, &shields).await? {
                self.store.increment_inventory(target.id, &shield, -1).await?;
                self.consume(actor.id, item_id).await?;
                info!(actor = %actor.id, target = %target.id, item = %item_id, "Item blocked by shield");
                return Ok(ItemUseOutcome::Shielded { target: target.id });
            }
            Some(target)
        } else {
            None
        };

        let outcome = match (&def.effect, target) {
            (ItemEffect::XpBoost { amount }, _) => {
                let credit = self.accrual.credit_xp(actor.id, &actor.name, *amount).await?;
                ItemUseOutcome::XpBoosted {
                    amount: *amount,
                    xp: credit.xp,
                }
            }
            (ItemEffect::StealXp { max_amount, fine }, Some(target)) => {
                self.steal(actor, target, *max_amount, *fine).await?
            }
            (ItemEffect::Summon, Some(target)) => {
                let destination = request.actor_channel.ok_or(ItemError::NotInVoice(actor.id))?;
                let current = request.target_channel.ok_or(ItemError::NotInVoice(target.id))?;
                if current == destination {
                    return Err(ItemError::SameChannel);
                }
                self.perform(GuildEffect::MoveMember {
                    member_id: target.id,
                    channel_id: destination,
                })
                .await?
            }
            (ItemEffect::Disconnect, Some(target)) => {
                request.target_channel.ok_or(ItemError::NotInVoice(target.id))?;
                self.perform(GuildEffect::Disconnect { member_id: target.id }).await?
            }
            (ItemEffect::Mute { duration_secs }, Some(target)) => {
                request.target_channel.ok_or(ItemError::NotInVoice(target.id))?;
                let outcome = self
                    .perform(GuildEffect::SetServerMute {
                        member_id: target.id,
                        muted: true,
                    })
                    .await?;
                let lift_at = i64::try_from(*duration_secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|delay| Utc::now().checked_add_signed(delay))
                    .unwrap_or_else(Utc::now);
                self.deferred
                    .schedule(
                        GuildEffect::SetServerMute {
                            member_id: target.id,
                            muted: false,
                        },
                        lift_at,
                    )
                    .await;
                outcome
            }
            (ItemEffect::Rename { nickname }, Some(target)) => {
                self.perform(GuildEffect::Rename {
                    member_id: target.id,
                    nickname: nickname.clone(),
                })
                .await?
            }
            // Targeted effects always resolve a target above; passive ones
            // were rejected before the lock.
            (ItemEffect::Summon
            | ItemEffect::Disconnect
            | ItemEffect::Mute { .. }
            | ItemEffect::Rename { .. }
            | ItemEffect::StealXp { .. }, None)
            | (ItemEffect::Shield | ItemEffect::Passive, _) => {
                return Err(ItemError::TargetRequired(item_id.clone()));
            }
        };

        self.consume(actor.id, item_id).await?;
        info!(actor = %actor.id, item = %item_id, outcome = ?outcome, "Item used");
        Ok(outcome)
    }

    async fn steal(
        &self,
        actor: &MemberRef,
        target: &MemberRef,
        max_amount: u64,
        fine: u64,
    ) -> Result<ItemUseOutcome, ItemError> {
        if !(self.steal_roll)() {
            let debit = self.accrual.debit_xp(actor.id, &actor.name, fine).await?;
            return Ok(ItemUseOutcome::CaughtStealing { fine: debit.removed });
        }

        let debit = self.accrual.debit_xp(target.id, &target.name, max_amount).await?;
        if debit.removed == 0 {
            return Err(ItemError::NothingToSteal(target.id));
        }
        if let Err(e) = self.accrual.credit_xp(actor.id, &actor.name, debit.removed).await {
            // Put the XP back rather than let it vanish.
            if let Err(refund) = self.accrual.credit_xp(target.id, &target.name, debit.removed).await {
                warn!(target = %target.id, amount = debit.removed, error = %refund, "Steal refund failed");
            }
            return Err(e.into());
        }
        Ok(ItemUseOutcome::Stole {
            target: target.id,
            amount: debit.removed,
        })
    }

    /// The first shield item the target holds, if any.
    async fn held_shield(&self, target: &MemberRef, shields: &[ItemId]) -> Result<Option<ItemId>, ItemError> {
        if shields.is_empty() {
            return Ok(None);
        }
        let Some(profile) = self.store.find(target.id).await? else {
            return Ok(None);
        };
        Ok(shields.iter().find(|id| profile.item_count(id) > 0).cloned())
    }

    async fn perform(&self, effect: GuildEffect) -> Result<ItemUseOutcome, ItemError> {
        self.guild.perform(&effect).await?;
        Ok(ItemUseOutcome::Performed { effect })
    }

    async fn consume(&self, member_id: MemberId, item_id: &ItemId) -> Result<(), ItemError> {
        self.store.increment_inventory(member_id, item_id, -1).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use voicepass_db::MemoryProfileStore;
    use voicepass_types::{ActionFailure, ChannelId, Profile};

    use super::*;
    use crate::guild::RecordingGuild;
    use crate::items::{ItemCatalog, ItemDef};
    use crate::levels::LevelTable;
    use crate::notify::Announcer;

    const ACTOR: MemberId = MemberId(1);
    const TARGET: MemberId = MemberId(2);

    struct Fixture {
        store: Arc<MemoryProfileStore>,
        guild: Arc<RecordingGuild>,
        deferred: Arc<DeferredActions<RecordingGuild>>,
        service: ItemService<MemoryProfileStore, RecordingGuild>,
    }

    fn fixture(steal_roll: StealRoll) -> Fixture {
        let items = ItemCatalog::from_items(vec![
            ItemDef::new("hook", "Hook", ItemEffect::Summon),
            ItemDef::new("kick", "Kick", ItemEffect::Disconnect),
            ItemDef::new("mute", "Mute", ItemEffect::Mute { duration_secs: 300 }),
            ItemDef::new("rename", "Rename", ItemEffect::Rename { nickname: "Shaggy".to_owned() }),
            ItemDef::new("steal_xp", "Knife", ItemEffect::StealXp { max_amount: 500, fine: 300 }),
            ItemDef::new("xp_boost", "Boost", ItemEffect::XpBoost { amount: 1000 }),
            ItemDef::new("shield", "Shield", ItemEffect::Shield),
            ItemDef::new("ticket", "Ticket", ItemEffect::Passive),
        ])
        .unwrap();
        let catalog = Arc::new(Catalog::new(LevelTable::empty(), items));
        let store = Arc::new(MemoryProfileStore::new());
        let guild = Arc::new(RecordingGuild::new());
        let accrual = Arc::new(AccrualEngine::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::new(KeyedLocks::new()),
            Announcer::disabled(),
            10,
        ));
        let deferred = Arc::new(DeferredActions::new(Arc::clone(&guild)));
        let service = ItemService::new(
            Arc::clone(&store),
            accrual,
            Arc::clone(&guild),
            Arc::clone(&deferred),
            catalog,
        )
        .with_steal_roll(steal_roll);
        Fixture {
            store,
            guild,
            deferred,
            service,
        }
    }

    async fn seed(store: &MemoryProfileStore, id: MemberId, xp: u64, items: &[(&str, u32)]) {
        let mut profile = Profile::new(id, format!("m{id}"), Utc::now());
        profile.xp = xp;
        for (item, count) in items {
            profile.inventory.insert(ItemId::new(*item), *count);
        }
        store.seed(profile).await;
    }

    fn request(item: &str, target: bool) -> ItemUse {
        ItemUse {
            actor: MemberRef::new(ACTOR, "m1"),
            item_id: ItemId::new(item),
            target: target.then(|| MemberRef::new(TARGET, "m2")),
            actor_channel: Some(ChannelId(10)),
            target_channel: Some(ChannelId(20)),
        }
    }

    async fn count(store: &MemoryProfileStore, id: MemberId, item: &str) -> u32 {
        store.find(id).await.unwrap().unwrap().item_count(&ItemId::new(item))
    }

    #[tokio::test]
    async fn boost_credits_and_consumes() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 5, &[("xp_boost", 2)]).await;

        let outcome = f.service.use_item(&request("xp_boost", false)).await.unwrap();
        assert_eq!(outcome, ItemUseOutcome::XpBoosted { amount: 1000, xp: 1005 });
        assert_eq!(count(&f.store, ACTOR, "xp_boost").await, 1);
    }

    #[tokio::test]
    async fn validation_errors_consume_nothing() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 0, &[("kick", 1), ("ticket", 1)]).await;

        assert!(matches!(
            f.service.use_item(&request("car", true)).await,
            Err(ItemError::UnknownItem(_))
        ));
        assert!(matches!(
            f.service.use_item(&request("ticket", false)).await,
            Err(ItemError::PassiveItem(_))
        ));
        assert!(matches!(
            f.service.use_item(&request("hook", true)).await,
            Err(ItemError::OutOfStock(_))
        ));
        assert!(matches!(
            f.service.use_item(&request("kick", false)).await,
            Err(ItemError::TargetRequired(_))
        ));

        let mut bot = request("kick", true);
        bot.target = Some(MemberRef {
            id: TARGET,
            name: "bot".to_owned(),
            is_bot: true,
        });
        assert!(matches!(f.service.use_item(&bot).await, Err(ItemError::BotTarget)));

        let mut absent = request("kick", true);
        absent.target_channel = None;
        assert!(matches!(
            f.service.use_item(&absent).await,
            Err(ItemError::NotInVoice(TARGET))
        ));
        assert_eq!(count(&f.store, ACTOR, "kick").await, 1);
    }

    #[tokio::test]
    async fn shield_absorbs_and_both_units_are_spent() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 0, &[("kick", 1)]).await;
        seed(&f.store, TARGET, 0, &[("shield", 1)]).await;

        let outcome = f.service.use_item(&request("kick", true)).await.unwrap();
        assert_eq!(outcome, ItemUseOutcome::Shielded { target: TARGET });
        assert_eq!(count(&f.store, ACTOR, "kick").await, 0);
        assert_eq!(count(&f.store, TARGET, "shield").await, 0);
        assert!(f.guild.performed().is_empty());
    }

    #[tokio::test]
    async fn successful_steal_moves_xp() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 10, &[("steal_xp", 1)]).await;
        seed(&f.store, TARGET, 320, &[]).await;

        let outcome = f.service.use_item(&request("steal_xp", true)).await.unwrap();
        assert_eq!(outcome, ItemUseOutcome::Stole { target: TARGET, amount: 320 });
        assert_eq!(f.store.find(ACTOR).await.unwrap().unwrap().xp, 330);
        assert_eq!(f.store.find(TARGET).await.unwrap().unwrap().xp, 0);
        assert_eq!(count(&f.store, ACTOR, "steal_xp").await, 0);
    }

    #[tokio::test]
    async fn steal_from_empty_target_keeps_the_item() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 10, &[("steal_xp", 1)]).await;
        seed(&f.store, TARGET, 0, &[]).await;

        let result = f.service.use_item(&request("steal_xp", true)).await;
        assert!(matches!(result, Err(ItemError::NothingToSteal(TARGET))));
        assert_eq!(count(&f.store, ACTOR, "steal_xp").await, 1);
    }

    #[tokio::test]
    async fn caught_thief_pays_a_clamped_fine() {
        let f = fixture(|| false);
        seed(&f.store, ACTOR, 120, &[("steal_xp", 1)]).await;
        seed(&f.store, TARGET, 900, &[]).await;

        let outcome = f.service.use_item(&request("steal_xp", true)).await.unwrap();
        assert_eq!(outcome, ItemUseOutcome::CaughtStealing { fine: 120 });
        assert_eq!(f.store.find(ACTOR).await.unwrap().unwrap().xp, 0);
        assert_eq!(f.store.find(TARGET).await.unwrap().unwrap().xp, 900);
        assert_eq!(count(&f.store, ACTOR, "steal_xp").await, 0);
    }

    #[tokio::test]
    async fn summon_moves_target_to_actor_channel() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 0, &[("hook", 1)]).await;

        f.service.use_item(&request("hook", true)).await.unwrap();
        assert_eq!(
            f.guild.performed(),
            vec![GuildEffect::MoveMember {
                member_id: TARGET,
                channel_id: ChannelId(10)
            }]
        );

        seed(&f.store, ACTOR, 0, &[("hook", 1)]).await;
        let mut same = request("hook", true);
        same.target_channel = Some(ChannelId(10));
        assert!(matches!(f.service.use_item(&same).await, Err(ItemError::SameChannel)));
    }

    #[tokio::test]
    async fn mute_schedules_an_unmute() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 0, &[("mute", 1)]).await;

        f.service.use_item(&request("mute", true)).await.unwrap();
        assert_eq!(f.deferred.pending().await, 1);
        f.deferred.run_all().await;
        assert_eq!(
            f.guild.performed().last(),
            Some(&GuildEffect::SetServerMute {
                member_id: TARGET,
                muted: false
            })
        );
    }

    #[tokio::test]
    async fn gateway_failure_keeps_the_item() {
        let f = fixture(|| true);
        seed(&f.store, ACTOR, 0, &[("rename", 1)]).await;
        f.guild.fail_member(TARGET, ActionFailure::PermissionDenied);

        let result = f.service.use_item(&request("rename", true)).await;
        assert!(matches!(result, Err(ItemError::Guild(ActionFailure::PermissionDenied))));
        assert_eq!(count(&f.store, ACTOR, "rename").await, 1);
    }
}
