//! The assembled engine and command dispatch.
//!
//! [`Voicepass`] owns one instance of every engine, wired to a shared
//! store, catalog and lock set. Transports call [`Voicepass::handle`] for
//! commands and drive the [`Scheduler`] for presence.

use std::sync::Arc;

use tracing::warn;
use voicepass_db::ProfileStore;
use voicepass_types::{CommandReply, CommandRequest, MemberId};

use crate::accrual::AccrualEngine;
use crate::admin::AdminService;
use crate::catalog::Catalog;
use crate::config::AccrualConfig;
use crate::deferred::DeferredActions;
use crate::effects::ItemService;
use crate::guild::{GuildActions, RosterSource};
use crate::locks::KeyedLocks;
use crate::notify::Announcer;
use crate::rewards::RewardClaimEngine;
use crate::scheduler::Scheduler;
use crate::session::SessionLedger;

/// Every engine, sharing one store, catalog and set of profile locks.
#[derive(Debug)]
pub struct Voicepass<S, G> {
    guild: Arc<G>,
    catalog: Arc<Catalog>,
    scheduler: Arc<Scheduler<S>>,
    rewards: RewardClaimEngine<S, G>,
    items: ItemService<S, G>,
    admin: AdminService<S>,
    deferred: Arc<DeferredActions<G>>,
}

impl<S: ProfileStore, G: GuildActions + RosterSource> Voicepass<S, G> {
    /// Wire the engines together.
    pub fn new(
        store: Arc<S>,
        guild: Arc<G>,
        catalog: Arc<Catalog>,
        announcer: Announcer,
        config: &AccrualConfig,
    ) -> Self {
        let profile_locks: Arc<KeyedLocks<MemberId>> = Arc::new(KeyedLocks::new());
        let accrual = Arc::new(AccrualEngine::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&profile_locks),
            announcer.clone(),
            config.xp_per_minute,
        ));
        let deferred = Arc::new(DeferredActions::new(Arc::clone(&guild)));
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(SessionLedger::new()),
            Arc::clone(&accrual),
            config.clone(),
        ));
        let rewards = RewardClaimEngine::new(
            Arc::clone(&store),
            Arc::clone(&guild),
            Arc::clone(&catalog),
            Arc::clone(&profile_locks),
            announcer,
        );
        let items = ItemService::new(
            Arc::clone(&store),
            Arc::clone(&accrual),
            Arc::clone(&guild),
            Arc::clone(&deferred),
            Arc::clone(&catalog),
        );
        let admin = AdminService::new(store, accrual, Arc::clone(&catalog), profile_locks);

        Self {
            guild,
            catalog,
            scheduler,
            rewards,
            items,
            admin,
            deferred,
        }
    }

    /// The presence scheduler.
    pub const fn scheduler(&self) -> &Arc<Scheduler<S>> {
        &self.scheduler
    }

    /// The deferred-action queue.
    pub const fn deferred(&self) -> &Arc<DeferredActions<G>> {
        &self.deferred
    }

    /// The hot-swappable catalog.
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The reward claim engine.
    pub const fn rewards(&self) -> &RewardClaimEngine<S, G> {
        &self.rewards
    }

    /// The item service.
    pub const fn items(&self) -> &ItemService<S, G> {
        &self.items
    }

    /// The admin service.
    pub const fn admin(&self) -> &AdminService<S> {
        &self.admin
    }

    /// Execute one command. Failures become [`CommandReply::Error`].
    pub async fn handle(&self, request: CommandRequest) -> CommandReply {
        let result = match request {
            CommandRequest::Register { member } => self
                .admin
                .register(&member)
                .await
                .map(|profile| CommandReply::Profile { profile })
                .map_err(|e| e.to_string()),
            CommandRequest::Progress { member } => self
                .admin
                .progress(&member)
                .await
                .map(|progress| CommandReply::Progress { progress })
                .map_err(|e| e.to_string()),
            CommandRequest::Claim { member } => self
                .rewards
                .claim(&member)
                .await
                .map(|report| CommandReply::Claimed { report })
                .map_err(|e| e.to_string()),
            CommandRequest::UseItem(item_use) => self
                .items
                .use_item(&item_use)
                .await
                .map(|outcome| CommandReply::ItemUsed { outcome })
                .map_err(|e| e.to_string()),
            CommandRequest::ToggleSetting { member, key } => self
                .admin
                .toggle_setting(&member, &key)
                .await
                .map(|value| CommandReply::Setting { key, value })
                .map_err(|e| e.to_string()),
            CommandRequest::AdjustXp { member, delta } => self
                .admin
                .adjust_xp(&member, delta)
                .await
                .map(|profile| CommandReply::Profile { profile })
                .map_err(|e| e.to_string()),
            CommandRequest::SetLevel { member, level } => self
                .admin
                .set_level(&member, level)
                .await
                .map(|profile| CommandReply::Profile { profile })
                .map_err(|e| e.to_string()),
            CommandRequest::GrantItem {
                member,
                item_id,
                delta,
            } => match self.admin.grant_item(&member, &item_id, delta).await {
                Ok(_) => self
                    .admin
                    .register(&member)
                    .await
                    .map(|profile| CommandReply::Profile { profile })
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            },
            CommandRequest::ReloadCatalog => self
                .admin
                .reload_catalog()
                .map(|sizes| CommandReply::CatalogReloaded {
                    levels: sizes.levels,
                    items: sizes.items,
                })
                .map_err(|e| e.to_string()),
            CommandRequest::SyncProfiles => self
                .admin
                .register_roster(self.guild.as_ref())
                .await
                .map(|sync| CommandReply::ProfilesSynced {
                    scanned: sync.scanned,
                    created: sync.created,
                })
                .map_err(|e| e.to_string()),
        };

        result.unwrap_or_else(|message| {
            warn!(%message, "Command failed");
            CommandReply::Error { message }
        })
    }
}
