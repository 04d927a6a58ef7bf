//! Gateway-facing seams: platform actions and the voice roster.
//!
//! The core never talks to the chat platform. It asks a [`GuildActions`]
//! implementation to perform a [`GuildEffect`] and a [`RosterSource`] for
//! the members currently in voice. The engine binary implements both over
//! NATS; [`RecordingGuild`] and [`StaticRoster`] are in-process stand-ins.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use voicepass_types::{ActionFailure, GuildEffect, MemberId, RoleId, RosterEntry};

/// Performs platform-side effects on the engine's behalf.
pub trait GuildActions: Send + Sync + 'static {
    /// Apply one effect.
    ///
    /// # Errors
    ///
    /// The [`ActionFailure`] reported by the gateway.
    fn perform(&self, effect: &GuildEffect) -> impl Future<Output = Result<(), ActionFailure>> + Send;
}

/// Lists members currently in a voice channel with their state.
pub trait RosterSource: Send + Sync {
    /// Scan every monitored scope.
    ///
    /// # Errors
    ///
    /// [`ActionFailure::Transport`] if the gateway could not be asked.
    fn roster(&self) -> impl Future<Output = Result<Vec<RosterEntry>, ActionFailure>> + Send;
}

/// A [`GuildActions`] that records every effect and fails on request.
///
/// It also answers [`RosterSource`] scans with whatever was last passed to
/// [`RecordingGuild::set_roster`].
#[derive(Debug, Default)]
pub struct RecordingGuild {
    performed: Mutex<Vec<GuildEffect>>,
    roster: Mutex<Vec<RosterEntry>>,
    denied_roles: Mutex<HashSet<RoleId>>,
    failing_members: Mutex<HashMap<MemberId, ActionFailure>>,
}

impl RecordingGuild {
    /// A guild where every effect succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make grants of `role` fail with [`ActionFailure::PermissionDenied`].
    pub fn deny_role(&self, role: RoleId) {
        self.denied_roles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(role);
    }

    /// Allow grants of `role` again.
    pub fn allow_role(&self, role: RoleId) {
        self.denied_roles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&role);
    }

    /// Make every effect on `member` fail with `failure`.
    pub fn fail_member(&self, member: MemberId, failure: ActionFailure) {
        self.failing_members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(member, failure);
    }

    /// Replace the roster returned by scans.
    pub fn set_roster(&self, entries: Vec<RosterEntry>) {
        *self.roster.lock().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Effects performed successfully, in order.
    pub fn performed(&self) -> Vec<GuildEffect> {
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self, effect: &GuildEffect) -> Result<(), ActionFailure> {
        if let Some(failure) = self
            .failing_members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&effect.member_id())
        {
            return Err(failure.clone());
        }
        if let GuildEffect::GrantRole { role_id, .. } = effect
            && self
                .denied_roles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(role_id)
        {
            return Err(ActionFailure::PermissionDenied);
        }
        Ok(())
    }
}

impl GuildActions for RecordingGuild {
    async fn perform(&self, effect: &GuildEffect) -> Result<(), ActionFailure> {
        self.check(effect)?;
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(effect.clone());
        Ok(())
    }
}

impl RosterSource for RecordingGuild {
    async fn roster(&self) -> Result<Vec<RosterEntry>, ActionFailure> {
        Ok(self
            .roster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// A [`RosterSource`] with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster(pub Vec<RosterEntry>);

impl RosterSource for StaticRoster {
    async fn roster(&self) -> Result<Vec<RosterEntry>, ActionFailure> {
        Ok(self.0.clone())
    }
}
