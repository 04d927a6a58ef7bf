//! Presence intake, periodic flush, startup reconciliation and drain.
//!
//! The scheduler is the only writer of the [`SessionLedger`]. Every
//! sequence that measures a member's session and then moves its start
//! (close then settle, peek then settle then advance) runs under that
//! member's session lock, so a flush and a close can never both credit
//! the same time span.
//!
//! The periodic flush settles open sessions without closing them and moves
//! each start forward by exactly the span that was credited. The sub-minute
//! remainder stays in the session, so flushing twice over `T` credits the
//! same XP as settling `2T` once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use voicepass_db::ProfileStore;
use voicepass_types::{ActionFailure, MemberId, PresenceTransition};

use crate::accrual::{AccrualEngine, SettleOutcome};
use crate::config::AccrualConfig;
use crate::error::AccrualError;
use crate::guild::RosterSource;
use crate::locks::KeyedLocks;
use crate::presence::{PresenceAction, classify};
use crate::session::SessionLedger;

/// Totals of one periodic flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Members with an open session or owed time.
    pub members: usize,
    /// XP credited across all members.
    pub xp_credited: u64,
    /// Settles that raised a level.
    pub level_ups: usize,
    /// Settles that failed; the time stays in the ledger.
    pub failures: usize,
}

/// Totals of the shutdown drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Members whose time was drained.
    pub members: usize,
    /// XP credited across all members.
    pub xp_credited: u64,
    /// Members whose time could not be settled after every retry.
    pub unsettled: Vec<MemberId>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MemberFlush {
    xp: u64,
    leveled_up: bool,
    failed: bool,
}

impl MemberFlush {
    fn absorb(&mut self, outcome: &SettleOutcome) {
        self.xp = self.xp.saturating_add(outcome.xp_gained);
        self.leveled_up |= outcome.leveled_up();
    }
}

/// Drives the session ledger from presence events and timers.
#[derive(Debug)]
pub struct Scheduler<S> {
    ledger: Arc<SessionLedger>,
    accrual: Arc<AccrualEngine<S>>,
    session_locks: KeyedLocks<MemberId>,
    config: AccrualConfig,
    reconciled: AtomicBool,
}

impl<S: ProfileStore> Scheduler<S> {
    /// Create a scheduler over `ledger`.
    pub fn new(ledger: Arc<SessionLedger>, accrual: Arc<AccrualEngine<S>>, config: AccrualConfig) -> Self {
        Self {
            ledger,
            accrual,
            session_locks: KeyedLocks::new(),
            config,
            reconciled: AtomicBool::new(false),
        }
    }

    /// The ledger this scheduler drives.
    pub const fn ledger(&self) -> &Arc<SessionLedger> {
        &self.ledger
    }

    /// Apply one presence transition at its own timestamp.
    ///
    /// A close settles immediately. If that settle fails the elapsed time
    /// is parked as owed and retried by the next flush.
    pub async fn on_transition(&self, transition: &PresenceTransition) -> PresenceAction {
        let action = classify(transition);
        let member = &transition.member;
        match action {
            PresenceAction::Open => {
                let _guard = self.session_locks.lock(member.id).await;
                if self.ledger.open(member.id, &member.name, transition.at) {
                    debug!(member_id = %member.id, at = %transition.at, "Session opened");
                }
            }
            PresenceAction::Close => {
                let _guard = self.session_locks.lock(member.id).await;
                let Ok(closed) = self.ledger.close(member.id, transition.at) else {
                    return action;
                };
                match self
                    .accrual
                    .settle(member.id, &closed.display_name, closed.elapsed)
                    .await
                {
                    Ok(outcome) => debug!(
                        member_id = %member.id,
                        elapsed_secs = closed.elapsed.as_secs(),
                        xp_gained = outcome.xp_gained,
                        "Session closed"
                    ),
                    Err(e) => {
                        warn!(member_id = %member.id, error = %e, "Settle on close failed, time kept as owed");
                        self.ledger
                            .add_owed(member.id, &closed.display_name, closed.elapsed);
                    }
                }
            }
            PresenceAction::Ignore => {}
        }
        action
    }

    /// Settle every open session and all owed time, without closing.
    pub async fn flush(&self, now: DateTime<Utc>) -> FlushReport {
        let mut members: Vec<MemberId> = self
            .ledger
            .peek_all(now)
            .into_iter()
            .map(|session| session.member_id)
            .collect();
        members.extend(self.ledger.owed_members());
        members.sort_unstable();
        members.dedup();

        let results: Vec<MemberFlush> = stream::iter(members)
            .map(|member_id| self.flush_member(member_id, now))
            .buffer_unordered(self.config.flush_concurrency.max(1))
            .collect()
            .await;

        let report = results.iter().fold(
            FlushReport {
                members: results.len(),
                ..FlushReport::default()
            },
            |mut report, member| {
                report.xp_credited = report.xp_credited.saturating_add(member.xp);
                if member.leveled_up {
                    report.level_ups = report.level_ups.saturating_add(1);
                }
                if member.failed {
                    report.failures = report.failures.saturating_add(1);
                }
                report
            },
        );
        info!(
            members = report.members,
            xp_credited = report.xp_credited,
            level_ups = report.level_ups,
            failures = report.failures,
            "Flush complete"
        );
        report
    }

    async fn flush_member(&self, member_id: MemberId, now: DateTime<Utc>) -> MemberFlush {
        let _guard = self.session_locks.lock(member_id).await;
        let mut result = MemberFlush::default();

        if let Some(owed) = self.ledger.take_owed(member_id) {
            match self
                .accrual
                .settle(member_id, &owed.display_name, owed.elapsed)
                .await
            {
                Ok(outcome) => result.absorb(&outcome),
                Err(e) => {
                    warn!(member_id = %member_id, error = %e, "Owed time settle failed");
                    self.ledger
                        .add_owed(member_id, &owed.display_name, owed.elapsed);
                    result.failed = true;
                }
            }
        }

        // Re-measure under the lock; the session may have closed meanwhile.
        let Some(session) = self.ledger.peek(member_id, now) else {
            return result;
        };
        match self
            .accrual
            .settle(member_id, &session.display_name, session.elapsed)
            .await
        {
            Ok(outcome) => {
                if outcome.xp_gained > 0 {
                    self.ledger
                        .advance_start(member_id, session.started_at, outcome.consumed);
                }
                result.absorb(&outcome);
            }
            Err(e) => {
                warn!(member_id = %member_id, error = %e, "Flush settle failed, session kept");
                result.failed = true;
            }
        }
        result
    }

    /// Open sessions for members already active in voice at startup.
    ///
    /// Runs at most once. Returns `Ok(None)` if it already ran and the
    /// number of sessions opened otherwise. A failed roster fetch leaves
    /// the guard unset so the next gateway-ready signal retries.
    pub async fn reconcile<R: RosterSource>(
        &self,
        roster: &R,
        now: DateTime<Utc>,
    ) -> Result<Option<usize>, ActionFailure> {
        if self
            .reconciled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconciliation already done, skipping");
            return Ok(None);
        }

        let entries = match roster.roster().await {
            Ok(entries) => entries,
            Err(e) => {
                self.reconciled.store(false, Ordering::Release);
                warn!(error = %e, "Roster fetch failed, reconciliation will retry");
                return Err(e);
            }
        };

        let mut opened = 0_usize;
        for entry in entries
            .iter()
            .filter(|entry| !entry.member.is_bot && entry.state.is_active())
        {
            let _guard = self.session_locks.lock(entry.member.id).await;
            if self.ledger.open(entry.member.id, &entry.member.name, now) {
                opened = opened.saturating_add(1);
            }
        }
        info!(roster = entries.len(), opened, "Startup reconciliation complete");
        Ok(Some(opened))
    }

    /// Remove every session and owed entry and settle them, retrying
    /// transient store failures.
    pub async fn drain(&self, now: DateTime<Utc>) -> DrainReport {
        let mut pending: BTreeMap<MemberId, (String, Duration)> = BTreeMap::new();
        for session in self.ledger.drain_all(now) {
            pending.insert(session.member_id, (session.display_name, session.elapsed));
        }
        for owed in self.ledger.take_all_owed() {
            let slot = pending
                .entry(owed.member_id)
                .or_insert_with(|| (owed.display_name, Duration::ZERO));
            slot.1 = slot.1.saturating_add(owed.elapsed);
        }

        let members = pending.len();
        let results: Vec<(MemberId, Result<SettleOutcome, AccrualError>)> = stream::iter(pending)
            .map(|(member_id, (name, elapsed))| async move {
                (member_id, self.settle_with_retry(member_id, &name, elapsed).await)
            })
            .buffer_unordered(self.config.flush_concurrency.max(1))
            .collect()
            .await;

        let mut report = DrainReport {
            members,
            ..DrainReport::default()
        };
        for (member_id, result) in results {
            match result {
                Ok(outcome) => report.xp_credited = report.xp_credited.saturating_add(outcome.xp_gained),
                Err(e) => {
                    error!(member_id = %member_id, error = %e, "Session time lost at shutdown");
                    report.unsettled.push(member_id);
                }
            }
        }
        report.unsettled.sort_unstable();
        info!(
            members = report.members,
            xp_credited = report.xp_credited,
            unsettled = report.unsettled.len(),
            "Ledger drained"
        );
        report
    }

    async fn settle_with_retry(
        &self,
        member_id: MemberId,
        display_name: &str,
        elapsed: Duration,
    ) -> Result<SettleOutcome, AccrualError> {
        let attempts = self.config.drain_retry_attempts.max(1);
        let mut attempt = 1_u32;
        loop {
            match self.accrual.settle(member_id, display_name, elapsed).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(member_id = %member_id, attempt, error = %e, "Drain settle failed, retrying");
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(self.config.drain_retry_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Flush every `flush_interval` until `shutdown` flips to `true`.
    ///
    /// The first flush happens one full interval after start.
    pub fn spawn_periodic(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.flush_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.flush(Utc::now()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Periodic flush stopped");
        })
    }
}
