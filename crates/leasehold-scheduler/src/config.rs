//! Worker configuration.

use std::time::Duration;

use leasehold_lock::{HolderId, LockIdentity};
use serde::{Deserialize, Deserializer};

use crate::ConfigError;

/// Default tick interval (5 minutes).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(300);

/// Default lease TTL. Shorter than the tick so a crashed holder's lease is
/// gone before the next tick.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(200);

/// Default bound on the conditional-set round trip.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for every worker duration (365 days).
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Settings for one worker, as read from flags, environment or a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Label used in logs.
    pub name: String,
    /// Workers do nothing unless explicitly enabled.
    pub enabled: bool,
    /// Key contended by every instance running this worker.
    pub lock_key: String,
    /// Holder id for this instance; resolved at startup when absent.
    pub holder_id: Option<String>,
    /// Time between ticks.
    #[serde(deserialize_with = "deserialize_duration")]
    pub tick_interval: Duration,
    /// Auto-release timeout of the lease; must exceed the task's duration.
    #[serde(deserialize_with = "deserialize_duration")]
    pub lease_ttl: Duration,
    /// Bound on the acquire round trip, not on the task.
    #[serde(deserialize_with = "deserialize_duration")]
    pub acquire_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: false,
            lock_key: String::new(),
            holder_id: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            lease_ttl: DEFAULT_LEASE_TTL,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl WorkerConfig {
    /// Name used in logs: `name`, else the lock key, else `worker`.
    pub fn display_name(&self) -> String {
        match (self.name.trim(), self.lock_key.trim()) {
            ("", "") => "worker".to_string(),
            ("", key) => key.to_string(),
            (name, _) => name.to_string(),
        }
    }

    /// Validate and freeze this config.
    ///
    /// `default_holder` supplies the holder id when none is configured; pass
    /// `HolderId::generate` at runtime and a fixed id in tests.
    pub fn into_descriptor(
        self,
        default_holder: impl FnOnce() -> HolderId,
    ) -> Result<WorkerDescriptor, ConfigError> {
        let name = self.display_name();

        if self.enabled && self.lock_key.trim().is_empty() {
            return Err(ConfigError::MissingLockKey { worker: name });
        }

        for (field, value) in [
            ("tick_interval", self.tick_interval),
            ("lease_ttl", self.lease_ttl),
            ("acquire_timeout", self.acquire_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration {
                    worker: name,
                    field,
                });
            }
            if value > MAX_DURATION {
                return Err(ConfigError::DurationTooLong {
                    worker: name,
                    field,
                    max: MAX_DURATION,
                });
            }
        }

        let holder_id = match self.holder_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => HolderId::new(id),
            None => default_holder(),
        };

        Ok(WorkerDescriptor {
            name,
            enabled: self.enabled,
            identity: LockIdentity::new(self.lock_key.trim(), holder_id),
            tick_interval: self.tick_interval,
            lease_ttl: self.lease_ttl,
            acquire_timeout: self.acquire_timeout,
        })
    }
}

/// Validated, immutable worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub name: String,
    pub enabled: bool,
    pub identity: LockIdentity,
    pub tick_interval: Duration,
    pub lease_ttl: Duration,
    pub acquire_timeout: Duration,
}

/// Parse a duration such as `300s`, `5m`, `250ms`, `1h` or `1.5s`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let secs = match unit.trim() {
        "" | "s" | "sec" | "secs" => value,
        "ms" => value / 1000.0,
        "m" | "min" | "mins" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(invalid()),
    };

    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
