//! Error types for the core engines.
//!
//! One enum per engine boundary. Store failures are wrapped rather than
//! flattened so callers can ask [`DbError::is_retryable`] whether the same
//! trigger will succeed on its next run.

use std::path::PathBuf;

use voicepass_db::DbError;
use voicepass_types::{ActionFailure, ItemId, MemberId};

/// Errors raised while loading or validating the level table or item catalog.
///
/// A failed load never replaces the active catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A catalog file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A catalog file is not valid YAML for its schema.
    #[error("failed to parse catalog YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// Two entries share a level number.
    #[error("duplicate level {0} in level table")]
    DuplicateLevel(u32),

    /// A threshold is not strictly greater than the one below it.
    #[error("threshold {threshold} of level {level} does not exceed {previous} of the level below")]
    ThresholdNotIncreasing {
        /// The offending level.
        level: u32,
        /// Its threshold.
        threshold: u64,
        /// Threshold of the nearest lower level.
        previous: u64,
    },

    /// Two items share an id.
    #[error("duplicate item {0} in item catalog")]
    DuplicateItem(ItemId),

    /// `reload` was called on a catalog built in memory.
    #[error("catalog has no source files to reload from")]
    NoSource,
}

/// Errors raised by XP settlement, credits and debits.
#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    /// The profile store failed. The caller keeps the elapsed time.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

impl AccrualError {
    /// Whether the same settle may succeed on a later attempt.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
        }
    }
}

/// Errors raised by a reward claim.
///
/// Role-grant failures are not errors; they are listed in the claim report.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// The profile store failed. Levels granted before the failure are
    /// still recorded as claimed.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

/// Errors raised when a member uses an item.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    /// The item id is not in the catalog.
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    /// The item has no active use.
    #[error("item {0} works passively")]
    PassiveItem(ItemId),

    /// The actor holds none of the item.
    #[error("no {0} left in inventory")]
    OutOfStock(ItemId),

    /// The item needs a target member and none was given.
    #[error("item {0} needs a target")]
    TargetRequired(ItemId),

    /// Bots cannot be targeted.
    #[error("bots cannot be targeted")]
    BotTarget,

    /// A member that must be in voice is not.
    #[error("member {0} is not in a voice channel")]
    NotInVoice(MemberId),

    /// Summon with actor and target already together.
    #[error("already in the same voice channel")]
    SameChannel,

    /// Steal against a target with no XP.
    #[error("member {0} has no XP to steal")]
    NothingToSteal(MemberId),

    /// The gateway could not perform the effect.
    #[error("guild action failed: {0}")]
    Guild(#[from] ActionFailure),

    /// An XP credit or debit failed.
    #[error("accrual error: {0}")]
    Accrual(#[from] AccrualError),

    /// The profile store failed.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

/// Errors raised by admin operations.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// `set_level` to a level that is neither 0 nor in the table.
    #[error("level {0} is not in the level table")]
    UnknownLevel(u32),

    /// `grant_item` with an item not in the catalog.
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    /// An XP credit or debit failed.
    #[error("accrual error: {0}")]
    Accrual(#[from] AccrualError),

    /// Reloading the catalog failed; the previous catalog stays active.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The gateway could not list the roster.
    #[error("roster unavailable: {0}")]
    Roster(#[from] ActionFailure),

    /// The profile store failed.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrual_retryability_follows_the_store() {
        let transient = AccrualError::Store(DbError::Unavailable("down".to_owned()));
        assert!(transient.is_retryable());
        let logical = AccrualError::Store(DbError::NotFound(MemberId(1)));
        assert!(!logical.is_retryable());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = CatalogError::ThresholdNotIncreasing {
            level: 3,
            threshold: 150,
            previous: 200,
        };
        assert_eq!(
            err.to_string(),
            "threshold 150 of level 3 does not exceed 200 of the level below"
        );
    }
}
