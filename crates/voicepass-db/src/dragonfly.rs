//! `Dragonfly` (Redis-compatible) profile store.
//!
//! Each profile is spread over three hashes. Creation and inventory changes
//! run as server-side scripts, so each is one atomic step:
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `profile:{id}` | Hash | `username`, `xp`, `level`, `registered_at`, `rewards_claimed` (JSON) |
//! | `profile:{id}:inventory` | Hash | item id -> count, mutated with `HINCRBY` inside a script |
//! | `profile:{id}:settings` | Hash | setting key -> `"1"` / `"0"` |
//!
//! `xp` and `level` are written by one `HSET`, so a level-up is never
//! observed half-applied. Every call is bounded by the store timeout.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fred::prelude::*;
use voicepass_types::{ItemId, MemberId, Profile, ProfileUpdate};

use crate::error::DbError;
use crate::store::ProfileStore;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and implements [`ProfileStore`] over
/// the key patterns above.
#[derive(Clone)]
pub struct DragonflyProfileStore {
    client: Client,
    timeout: Duration,
}

impl DragonflyProfileStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!(timeout_ms = duration_ms(timeout), "Connected to Dragonfly");
        Ok(Self { client, timeout })
    }

    /// Delete every key of one profile. Intended for tests and admin resets.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, id: MemberId) -> Result<(), DbError> {
        let keys = vec![profile_key(id), inventory_key(id), settings_key(id)];
        let _: u32 = self.timed("delete", self.client.del(keys)).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Run one backend call under the store timeout.
    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, fred::error::Error>>,
    ) -> Result<T, DbError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(DbError::Timeout {
                operation,
                after_ms: duration_ms(self.timeout),
            }),
        }
    }

    async fn exists(&self, id: MemberId) -> Result<bool, DbError> {
        let count: u32 = self.timed("exists", self.client.exists(profile_key(id))).await?;
        Ok(count > 0)
    }
}

impl core::fmt::Debug for DragonflyProfileStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DragonflyProfileStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProfileStore for DragonflyProfileStore {
    async fn find(&self, id: MemberId) -> Result<Option<Profile>, DbError> {
        let fields: HashMap<String, String> =
            self.timed("find", self.client.hgetall(profile_key(id))).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let inventory: HashMap<String, String> = self
            .timed("find", self.client.hgetall(inventory_key(id)))
            .await?;
        let settings: HashMap<String, String> = self
            .timed("find", self.client.hgetall(settings_key(id)))
            .await?;

        decode_profile(id, &fields, &inventory, &settings).map(Some)
    }

    async fn create(&self, id: MemberId, username: &str) -> Result<Profile, DbError> {
        let profile = Profile::new(id, username, Utc::now());
        let args = vec![
            profile.registered_at.to_rfc3339(),
            profile.username.clone(),
            serde_json::to_string(&profile.rewards_claimed)?,
        ];
        let inserted: i64 = self
            .timed("create", self.client.eval(CREATE_SCRIPT, profile_key(id), args))
            .await?;
        if inserted == 0 {
            return Err(DbError::AlreadyExists(id));
        }
        Ok(profile)
    }

    async fn update(&self, id: MemberId, update: &ProfileUpdate) -> Result<(), DbError> {
        if !self.exists(id).await? {
            return Err(DbError::NotFound(id));
        }

        let fields = encode_update(update)?;
        if !fields.is_empty() {
            let _: () = self
                .timed("update", self.client.hset(profile_key(id), fields))
                .await?;
        }

        if !update.settings.is_empty() {
            let settings: Vec<(String, String)> = update
                .settings
                .iter()
                .map(|(key, value)| (key.clone(), if *value { "1" } else { "0" }.to_owned()))
                .collect();
            let _: () = self
                .timed("update", self.client.hset(settings_key(id), settings))
                .await?;
        }
        Ok(())
    }

    async fn increment_inventory(
        &self,
        id: MemberId,
        item: &ItemId,
        delta: i64,
    ) -> Result<i64, DbError> {
        let keys = vec![profile_key(id), inventory_key(id)];
        let args = vec![item.as_str().to_owned(), delta.to_string()];
        let count: i64 = self
            .timed(
                "increment_inventory",
                self.client.eval(INCREMENT_SCRIPT, keys, args),
            )
            .await?;
        if count < 0 {
            return Err(DbError::NotFound(id));
        }
        Ok(count)
    }
}

// =========================================================================
// Scripts
// =========================================================================

/// Create the profile hash only if it does not exist. All default fields
/// land in the same step, so no reader ever sees a half-created profile.
///
/// `KEYS[1]` profile hash; `ARGV` registered_at, username, rewards_claimed.
/// Returns 1 when created and 0 when the profile already existed.
const CREATE_SCRIPT: &str = r"
if redis.call('HSETNX', KEYS[1], 'registered_at', ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'username', ARGV[2], 'xp', '0', 'level', '0', 'rewards_claimed', ARGV[3])
return 1
";

/// Add to one inventory count, stopping at zero.
///
/// `KEYS[1]` profile hash, `KEYS[2]` inventory hash; `ARGV` item, delta.
/// Returns the new count, or -1 when the profile does not exist.
const INCREMENT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
local count = redis.call('HINCRBY', KEYS[2], ARGV[1], ARGV[2])
if count < 0 then
  redis.call('HSET', KEYS[2], ARGV[1], '0')
  return 0
end
return count
";

// =========================================================================
// Encoding
// =========================================================================

fn profile_key(id: MemberId) -> String {
    format!("profile:{id}")
}

fn inventory_key(id: MemberId) -> String {
    format!("profile:{id}:inventory")
}

fn settings_key(id: MemberId) -> String {
    format!("profile:{id}:settings")
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Hash fields written for the scalar part of an update.
fn encode_update(update: &ProfileUpdate) -> Result<Vec<(&'static str, String)>, DbError> {
    let mut fields = Vec::with_capacity(4);
    if let Some(username) = &update.username {
        fields.push(("username", username.clone()));
    }
    if let Some(xp) = update.xp {
        fields.push(("xp", xp.to_string()));
    }
    if let Some(level) = update.level {
        fields.push(("level", level.to_string()));
    }
    if let Some(claimed) = &update.rewards_claimed {
        fields.push(("rewards_claimed", serde_json::to_string(claimed)?));
    }
    Ok(fields)
}

/// Rebuild a [`Profile`] from its three hashes.
///
/// Missing scalar fields read as their defaults.
fn decode_profile(
    id: MemberId,
    fields: &HashMap<String, String>,
    inventory: &HashMap<String, String>,
    settings: &HashMap<String, String>,
) -> Result<Profile, DbError> {
    let key = profile_key(id);
    let corrupt = |field: &'static str, detail: String| DbError::Corrupt {
        key: key.clone(),
        field,
        detail,
    };

    let xp = match fields.get("xp") {
        Some(raw) => raw.parse::<u64>().map_err(|e| corrupt("xp", e.to_string()))?,
        None => 0,
    };
    let level = match fields.get("level") {
        Some(raw) => raw.parse::<u32>().map_err(|e| corrupt("level", e.to_string()))?,
        None => 0,
    };
    let registered_at = match fields.get("registered_at") {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| corrupt("registered_at", e.to_string()))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let rewards_claimed: BTreeSet<u32> = match fields.get("rewards_claimed") {
        Some(raw) => serde_json::from_str(raw)?,
        None => BTreeSet::new(),
    };

    let mut items = BTreeMap::new();
    for (item, raw) in inventory {
        let count = raw
            .parse::<i64>()
            .map_err(|e| corrupt("inventory", e.to_string()))?;
        if let Ok(count) = u32::try_from(count)
            && count > 0
        {
            items.insert(ItemId::new(item.as_str()), count);
        }
    }

    let settings = settings
        .iter()
        .map(|(key, raw)| (key.clone(), raw == "1"))
        .collect();

    Ok(Profile {
        id,
        username: fields.get("username").cloned().unwrap_or_default(),
        xp,
        level,
        inventory: items,
        rewards_claimed,
        settings,
        registered_at,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn decode_full_profile() {
        let fields = hash(&[
            ("username", "alice"),
            ("xp", "105"),
            ("level", "1"),
            ("registered_at", "2026-01-01T00:00:00+00:00"),
            ("rewards_claimed", "[1]"),
        ]);
        let inventory = hash(&[("shield", "2"), ("kick", "0")]);
        let settings = hash(&[("ephemeral", "0")]);

        let profile = decode_profile(MemberId(9), &fields, &inventory, &settings).unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.xp, 105);
        assert_eq!(profile.level, 1);
        assert!(profile.rewards_claimed.contains(&1));
        assert_eq!(profile.item_count(&ItemId::new("shield")), 2);
        assert!(!profile.inventory.contains_key(&ItemId::new("kick")));
        assert!(!profile.setting("ephemeral"));
    }

    #[test]
    fn decode_partial_profile_uses_defaults() {
        let fields = hash(&[("registered_at", "2026-01-01T00:00:00+00:00")]);
        let profile =
            decode_profile(MemberId(9), &fields, &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(profile.xp, 0);
        assert_eq!(profile.level, 0);
        assert!(profile.rewards_claimed.is_empty());
    }

    #[test]
    fn decode_rejects_garbage_xp() {
        let fields = hash(&[("xp", "lots")]);
        let result = decode_profile(MemberId(9), &fields, &HashMap::new(), &HashMap::new());
        assert!(matches!(result, Err(DbError::Corrupt { field: "xp", .. })));
    }

    #[test]
    fn encode_update_writes_xp_and_level_together() {
        let fields = encode_update(&ProfileUpdate::xp_and_level(300, 3)).unwrap();
        assert_eq!(fields, vec![("xp", "300".to_owned()), ("level", "3".to_owned())]);
    }
}
