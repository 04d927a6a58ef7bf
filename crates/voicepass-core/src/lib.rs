//! Presence-based XP accrual for Voicepass.
//!
//! Members earn XP for time spent active in voice. This crate owns the
//! session ledger, the accrual and level-up logic, reward claims, item
//! effects and the timers that settle time periodically and at shutdown.
//! It is transport-agnostic: presence events arrive through
//! [`Scheduler::on_transition`](scheduler::Scheduler::on_transition) and
//! platform effects leave through the [`guild::GuildActions`] seam.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `voicepass.yaml` into
//!   strongly-typed structs.
//! - [`levels`] / [`items`] -- Level table and item catalog, validated at load.
//! - [`catalog`] -- Atomically hot-swappable snapshot of both.
//! - [`session`] -- The in-memory [`SessionLedger`](session::SessionLedger).
//! - [`presence`] -- Classifies voice state transitions.
//! - [`accrual`] -- Elapsed time to XP, credits, debits and level-ups.
//! - [`rewards`] -- Exactly-once level reward claims.
//! - [`effects`] -- Item use and inventory accounting.
//! - [`admin`] -- Registration, progress and moderator adjustments.
//! - [`deferred`] -- Delayed platform actions such as timed unmutes.
//! - [`scheduler`] -- Presence intake, periodic flush, reconciliation, drain.
//! - [`service`] -- All engines wired together, with command dispatch.

pub mod accrual;
pub mod admin;
pub mod catalog;
pub mod config;
pub mod deferred;
pub mod effects;
pub mod error;
pub mod guild;
pub mod items;
pub mod levels;
pub mod locks;
pub mod notify;
pub mod presence;
pub mod rewards;
pub mod scheduler;
pub mod service;
pub mod session;

pub use accrual::{AccrualEngine, SettleOutcome, XpCredit, XpDebit};
pub use catalog::{Catalog, CatalogSizes, CatalogSnapshot};
pub use config::VoicepassConfig;
pub use error::{AccrualError, AdminError, CatalogError, ClaimError, ItemError};
pub use guild::{GuildActions, RosterSource};
pub use notify::Announcer;
pub use presence::PresenceAction;
pub use scheduler::{DrainReport, FlushReport, Scheduler};
pub use service::Voicepass;
pub use session::SessionLedger;
