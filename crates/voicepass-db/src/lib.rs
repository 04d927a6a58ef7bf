//! Profile storage for the Voicepass presence accrual engine.
//!
//! Profiles are the only persisted state. Open voice sessions live in
//! memory in the core crate and are settled into profiles through the
//! [`ProfileStore`] trait defined here.
//!
//! # Backends
//!
//! ```text
//! AccrualEngine / RewardClaimEngine / ItemService
//!     |
//!     +-- ProfileStore (trait)
//!         |-- MemoryProfileStore     (in-process map, tests and local runs)
//!         +-- DragonflyProfileStore  (Redis-compatible hashes)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The [`ProfileStore`] trait
//! - [`memory`] -- In-memory backend with an outage switch
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`backend`] -- Runtime backend selection
//! - [`error`] -- Shared error types

pub mod backend;
pub mod dragonfly;
pub mod error;
pub mod memory;
pub mod store;

// Re-export primary types for convenience.
pub use backend::ProfileBackend;
pub use dragonfly::DragonflyProfileStore;
pub use error::DbError;
pub use memory::MemoryProfileStore;
pub use store::ProfileStore;
