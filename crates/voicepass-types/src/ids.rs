//! Type-safe identifier wrappers.
//!
//! Members, roles and channels are addressed by the chat platform's numeric
//! snowflake identifiers. Wrapping them in distinct newtypes prevents a role
//! id from being passed where a member id is expected. Items are keyed by a
//! short string taken from the item catalog.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a `u64` snowflake with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the raw snowflake value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of a tracked member (the entity that accrues XP).
    MemberId
}

define_id! {
    /// Identifier of a role that can be granted as a level reward.
    RoleId
}

define_id! {
    /// Identifier of a voice or text channel.
    ChannelId
}

/// Identifier of an item in the item catalog (e.g. `"shield"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create an item identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snowflakes_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&MemberId(1_173_882_167_504_408_626)).unwrap();
        assert_eq!(json, "1173882167504408626");

        let back: RoleId = serde_json::from_str("42").unwrap();
        assert_eq!(back, RoleId(42));
    }

    #[test]
    fn item_ids_serialize_as_strings() {
        let json = serde_json::to_string(&ItemId::new("shield")).unwrap();
        assert_eq!(json, "\"shield\"");
    }
}
