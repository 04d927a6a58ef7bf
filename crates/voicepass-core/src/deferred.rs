//! Deferred platform actions (e.g. lifting a timed mute).
//!
//! Actions are queued with a fire time and run by a background loop.
//! Execution is best-effort: a failed action is logged and dropped. On
//! shutdown every pending action runs immediately, so a member is never
//! left muted because the process stopped first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voicepass_types::GuildEffect;

use crate::guild::GuildActions;

/// Queue of effects to perform at a later time.
#[derive(Debug)]
pub struct DeferredActions<G> {
    guild: Arc<G>,
    pending: Mutex<BTreeMap<(DateTime<Utc>, u64), GuildEffect>>,
    seq: AtomicU64,
}

impl<G: GuildActions> DeferredActions<G> {
    /// An empty queue performing through `guild`.
    pub fn new(guild: Arc<G>) -> Self {
        Self {
            guild,
            pending: Mutex::new(BTreeMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Queue `effect` to run at or after `fire_at`.
    pub async fn schedule(&self, effect: GuildEffect, fire_at: DateTime<Utc>) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        debug!(member_id = %effect.member_id(), %fire_at, "Deferred action scheduled");
        self.pending.lock().await.insert((fire_at, seq), effect);
    }

    /// Number of queued actions.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Run every action due at `now`. Returns how many were attempted.
    pub async fn run_due(&self, now: DateTime<Utc>) -> usize {
        let due = {
            let mut pending = self.pending.lock().await;
            // `split_off` keeps keys >= the bound in the returned map.
            let later = pending.split_off(&(now, u64::MAX));
            std::mem::replace(&mut *pending, later)
        };
        self.perform_all(due.into_values()).await
    }

    /// Run every queued action regardless of fire time.
    pub async fn run_all(&self) -> usize {
        let all = std::mem::take(&mut *self.pending.lock().await);
        self.perform_all(all.into_values()).await
    }

    async fn perform_all(&self, effects: impl Iterator<Item = GuildEffect>) -> usize {
        let mut attempted = 0_usize;
        for effect in effects {
            attempted = attempted.saturating_add(1);
            if let Err(reason) = self.guild.perform(&effect).await {
                warn!(
                    member_id = %effect.member_id(),
                    effect = ?effect,
                    %reason,
                    "Deferred action failed"
                );
            }
        }
        attempted
    }

    /// Poll the queue every `tick` until `shutdown` flips to `true`.
    ///
    /// The loop does not flush on exit; call [`run_all`](Self::run_all)
    /// after joining it.
    pub fn spawn(self: Arc<Self>, tick: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_due(Utc::now()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Deferred action loop stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeDelta;
    use voicepass_types::{ActionFailure, MemberId};

    use super::*;
    use crate::guild::RecordingGuild;

    fn unmute(id: u64) -> GuildEffect {
        GuildEffect::SetServerMute {
            member_id: MemberId(id),
            muted: false,
        }
    }

    #[tokio::test]
    async fn runs_only_due_actions_in_time_order() {
        let guild = Arc::new(RecordingGuild::new());
        let deferred = DeferredActions::new(Arc::clone(&guild));
        let now = Utc::now();

        deferred.schedule(unmute(2), now + TimeDelta::seconds(10)).await;
        deferred.schedule(unmute(1), now).await;
        deferred.schedule(unmute(3), now + TimeDelta::seconds(600)).await;

        assert_eq!(deferred.run_due(now + TimeDelta::seconds(10)).await, 2);
        assert_eq!(guild.performed(), vec![unmute(1), unmute(2)]);
        assert_eq!(deferred.pending().await, 1);
    }

    #[tokio::test]
    async fn run_all_flushes_and_tolerates_failures() {
        let guild = Arc::new(RecordingGuild::new());
        guild.fail_member(MemberId(1), ActionFailure::UnknownTarget);
        let deferred = DeferredActions::new(Arc::clone(&guild));
        let far = Utc::now() + TimeDelta::days(1);

        deferred.schedule(unmute(1), far).await;
        deferred.schedule(unmute(2), far).await;

        assert_eq!(deferred.run_all().await, 2);
        assert_eq!(guild.performed(), vec![unmute(2)]);
        assert_eq!(deferred.pending().await, 0);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let guild = Arc::new(RecordingGuild::new());
        let deferred = Arc::new(DeferredActions::new(Arc::clone(&guild)));
        deferred.schedule(unmute(1), Utc::now()).await;

        let (tx, rx) = watch::channel(false);
        let handle = Arc::clone(&deferred).spawn(Duration::from_millis(5), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(guild.performed(), vec![unmute(1)]);
    }
}
