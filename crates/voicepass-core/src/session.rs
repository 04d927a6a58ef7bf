//! In-memory session ledger.
//!
//! The ledger is the single source of truth for who is currently accruing.
//! A member has at most one open [`Session`]; the presence of an entry means
//! the member is in the active state. Elapsed time only leaves the ledger
//! through [`close`](SessionLedger::close), [`advance_start`] after a
//! successful flush, or [`drain_all`](SessionLedger::drain_all) at shutdown.
//!
//! Time removed by `close` or `drain_all` whose settle then failed is parked
//! in the owed map and retried by the next flush and by the drain.
//!
//! The ledger's own mutex only protects the maps. Keeping a member's
//! close/flush/settle sequence atomic is the scheduler's job (it holds a
//! per-member lock from [`crate::locks`] around each sequence).
//!
//! [`advance_start`]: SessionLedger::advance_start

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use voicepass_types::MemberId;

/// An open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// When the current accrual window started.
    pub started_at: DateTime<Utc>,
    /// Display name, used if the profile must be created while settling.
    pub display_name: String,
}

/// A session's elapsed time at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionElapsed {
    /// Whose session.
    pub member_id: MemberId,
    /// Display name carried by the session.
    pub display_name: String,
    /// Start of the window measured.
    pub started_at: DateTime<Utc>,
    /// Time since `started_at`, zero if the clock went backwards.
    pub elapsed: Duration,
}

/// Elapsed time that left the ledger but has not been settled yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwedTime {
    /// Whose time.
    pub member_id: MemberId,
    /// Display name for lazy profile creation.
    pub display_name: String,
    /// Accumulated unsettled time.
    pub elapsed: Duration,
}

/// `close` found no open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no open session for member {0}")]
pub struct NoSession(pub MemberId);

#[derive(Debug, Default)]
struct LedgerState {
    sessions: HashMap<MemberId, Session>,
    owed: HashMap<MemberId, OwedTime>,
}

/// Member id to open session, plus owed time.
#[derive(Debug, Default)]
pub struct SessionLedger {
    state: Mutex<LedgerState>,
}

impl SessionLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // Every critical section leaves the maps consistent, so a poisoned
        // lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session starting at `now`.
    ///
    /// Idempotent: if one is already open it is left untouched and `false`
    /// is returned.
    pub fn open(&self, member_id: MemberId, display_name: &str, now: DateTime<Utc>) -> bool {
        match self.state().sessions.entry(member_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Session {
                    started_at: now,
                    display_name: display_name.to_owned(),
                });
                true
            }
        }
    }

    /// Remove a session and return its elapsed time.
    ///
    /// # Errors
    ///
    /// [`NoSession`] if the member has no open session; callers treat this
    /// as a no-op.
    pub fn close(&self, member_id: MemberId, now: DateTime<Utc>) -> Result<SessionElapsed, NoSession> {
        let session = self
            .state()
            .sessions
            .remove(&member_id)
            .ok_or(NoSession(member_id))?;
        Ok(measure(member_id, session, now))
    }

    /// Elapsed time of one open session, without changing it.
    pub fn peek(&self, member_id: MemberId, now: DateTime<Utc>) -> Option<SessionElapsed> {
        self.state()
            .sessions
            .get(&member_id)
            .map(|session| measure(member_id, session.clone(), now))
    }

    /// Elapsed time of every open session, without changing any.
    pub fn peek_all(&self, now: DateTime<Utc>) -> Vec<SessionElapsed> {
        self.state()
            .sessions
            .iter()
            .map(|(id, session)| measure(*id, session.clone(), now))
            .collect()
    }

    /// Rebase an open session's start to `now`. Returns `false` if none is open.
    pub fn reset_start(&self, member_id: MemberId, now: DateTime<Utc>) -> bool {
        match self.state().sessions.get_mut(&member_id) {
            Some(session) => {
                session.started_at = now;
                true
            }
            None => false,
        }
    }

    /// Move an open session's start forward by `consumed`, keeping the
    /// unconsumed remainder in the window.
    ///
    /// Only applies if the session still starts at `observed_start`, so a
    /// session closed and reopened since it was measured is not touched.
    pub fn advance_start(
        &self,
        member_id: MemberId,
        observed_start: DateTime<Utc>,
        consumed: Duration,
    ) -> bool {
        let Ok(delta) = TimeDelta::from_std(consumed) else {
            return false;
        };
        let mut state = self.state();
        let Some(session) = state.sessions.get_mut(&member_id) else {
            return false;
        };
        if session.started_at != observed_start {
            return false;
        }
        match session.started_at.checked_add_signed(delta) {
            Some(next) => {
                session.started_at = next;
                true
            }
            None => false,
        }
    }

    /// Remove and return every open session. Used at shutdown.
    pub fn drain_all(&self, now: DateTime<Utc>) -> Vec<SessionElapsed> {
        self.state()
            .sessions
            .drain()
            .map(|(id, session)| measure(id, session, now))
            .collect()
    }

    /// Park unsettled time for a later retry, adding to any already owed.
    pub fn add_owed(&self, member_id: MemberId, display_name: &str, elapsed: Duration) {
        if elapsed.is_zero() {
            return;
        }
        self.state()
            .owed
            .entry(member_id)
            .and_modify(|owed| owed.elapsed = owed.elapsed.saturating_add(elapsed))
            .or_insert_with(|| OwedTime {
                member_id,
                display_name: display_name.to_owned(),
                elapsed,
            });
    }

    /// Take the owed time of one member.
    pub fn take_owed(&self, member_id: MemberId) -> Option<OwedTime> {
        self.state().owed.remove(&member_id)
    }

    /// Members with owed time.
    pub fn owed_members(&self) -> Vec<MemberId> {
        self.state().owed.keys().copied().collect()
    }

    /// Take every owed entry.
    pub fn take_all_owed(&self) -> Vec<OwedTime> {
        self.state().owed.drain().map(|(_, owed)| owed).collect()
    }

    /// Whether `member_id` has an open session.
    pub fn is_open(&self, member_id: MemberId) -> bool {
        self.state().sessions.contains_key(&member_id)
    }

    /// The open session of `member_id`, if any.
    pub fn session(&self, member_id: MemberId) -> Option<Session> {
        self.state().sessions.get(&member_id).cloned()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.state().sessions.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.state().sessions.is_empty()
    }
}

fn measure(member_id: MemberId, session: Session, now: DateTime<Utc>) -> SessionElapsed {
    let elapsed = now
        .signed_duration_since(session.started_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    SessionElapsed {
        member_id,
        display_name: session.display_name,
        started_at: session.started_at,
        elapsed,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn open_is_idempotent() {
        let ledger = SessionLedger::new();
        assert!(ledger.open(MemberId(1), "a", t0()));
        assert!(!ledger.open(MemberId(1), "a", t0() + TimeDelta::minutes(3)));
        assert_eq!(ledger.session(MemberId(1)).unwrap().started_at, t0());
    }

    #[test]
    fn close_returns_elapsed_and_removes() {
        let ledger = SessionLedger::new();
        ledger.open(MemberId(1), "a", t0());
        let closed = ledger.close(MemberId(1), t0() + TimeDelta::seconds(125)).unwrap();
        assert_eq!(closed.elapsed, Duration::from_secs(125));
        assert!(!ledger.is_open(MemberId(1)));
        assert_eq!(ledger.close(MemberId(1), t0()), Err(NoSession(MemberId(1))));
    }

    #[test]
    fn clock_going_backwards_measures_zero() {
        let ledger = SessionLedger::new();
        ledger.open(MemberId(1), "a", t0());
        let peeked = ledger.peek(MemberId(1), t0() - TimeDelta::seconds(5)).unwrap();
        assert_eq!(peeked.elapsed, Duration::ZERO);
    }

    #[test]
    fn peek_all_does_not_mutate() {
        let ledger = SessionLedger::new();
        ledger.open(MemberId(1), "a", t0());
        ledger.open(MemberId(2), "b", t0());
        assert_eq!(ledger.peek_all(t0() + TimeDelta::minutes(1)).len(), 2);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn reset_start_rebases() {
        let ledger = SessionLedger::new();
        ledger.open(MemberId(1), "a", t0());
        let later = t0() + TimeDelta::minutes(5);
        assert!(ledger.reset_start(MemberId(1), later));
        assert_eq!(ledger.peek(MemberId(1), later).unwrap().elapsed, Duration::ZERO);
        assert!(!ledger.reset_start(MemberId(9), later));
    }

    #[test]
    fn advance_start_keeps_remainder_and_checks_identity() {
        let ledger = SessionLedger::new();
        ledger.open(MemberId(1), "a", t0());
        assert!(ledger.advance_start(MemberId(1), t0(), Duration::from_secs(120)));
        let now = t0() + TimeDelta::seconds(125);
        assert_eq!(ledger.peek(MemberId(1), now).unwrap().elapsed, Duration::from_secs(5));

        // Stale observation: the start has moved on.
        assert!(!ledger.advance_start(MemberId(1), t0(), Duration::from_secs(1)));
    }

    #[test]
    fn drain_all_empties_the_ledger() {
        let ledger = SessionLedger::new();
        ledger.open(MemberId(1), "a", t0());
        ledger.open(MemberId(2), "b", t0() + TimeDelta::seconds(30));
        let mut drained = ledger.drain_all(t0() + TimeDelta::minutes(1));
        drained.sort_by_key(|entry| entry.member_id);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].elapsed, Duration::from_secs(60));
        assert_eq!(drained[1].elapsed, Duration::from_secs(30));
        assert!(ledger.is_empty());
    }

    #[test]
    fn owed_time_accumulates() {
        let ledger = SessionLedger::new();
        ledger.add_owed(MemberId(1), "a", Duration::from_secs(40));
        ledger.add_owed(MemberId(1), "a", Duration::from_secs(20));
        ledger.add_owed(MemberId(2), "b", Duration::ZERO);
        assert_eq!(ledger.owed_members(), vec![MemberId(1)]);
        let owed = ledger.take_owed(MemberId(1)).unwrap();
        assert_eq!(owed.elapsed, Duration::from_secs(60));
        assert!(ledger.take_all_owed().is_empty());
    }
}
