//! Environment-driven configuration for the mention harness.
//!
//! Every tunable named in the harness spec (worker cohort size, lease
//! duration, sweep age, jitter bounds, database/chat connection
//! parameters) is read here and nowhere else; `mh-worker` and `mh-daemon`
//! receive an already-validated `HarnessConfig` rather than reading
//! `std::env` themselves.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Database connection parameters (spec.md §6 configuration surface).
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Chat transport bot/app tokens. Opaque strings — `mh-config` never
/// interprets them, only carries them to whatever `ChatTransport`
/// implementation the embedder supplies.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub bot_token: String,
    pub app_token: Option<String>,
}

/// Worker-pool tunables (spec.md §4.3, §4.5 default configuration values).
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub worker_count: u32,
    pub base_sleep: Duration,
    pub min_jitter: i64,
    pub max_jitter: i64,
    pub max_attempts: i32,
    pub lease_duration: Duration,
    pub max_age: Duration,
    pub batch_cap: u32,
}

/// Top-level harness configuration assembled from the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub db: DbConfig,
    pub chat: ChatConfig,
    pub worker: WorkerConfig,
    /// Optional bind address for the `/healthz` surface; `None` disables it.
    pub daemon_addr: Option<String>,
}

const ENV_DATABASE_URL: &str = "MH_DATABASE_URL";
const ENV_DB_MAX_CONNECTIONS: &str = "MH_DB_MAX_CONNECTIONS";
const ENV_CHAT_BOT_TOKEN: &str = "MH_CHAT_BOT_TOKEN";
const ENV_CHAT_APP_TOKEN: &str = "MH_CHAT_APP_TOKEN";
const ENV_WORKER_COUNT: &str = "MH_WORKER_COUNT";
const ENV_BASE_SLEEP_SECS: &str = "MH_BASE_SLEEP_SECS";
const ENV_MIN_JITTER_SECS: &str = "MH_MIN_JITTER_SECS";
const ENV_MAX_JITTER_SECS: &str = "MH_MAX_JITTER_SECS";
const ENV_MAX_ATTEMPTS: &str = "MH_MAX_ATTEMPTS";
const ENV_LEASE_SECS: &str = "MH_LEASE_SECS";
const ENV_MAX_AGE_SECS: &str = "MH_MAX_AGE_SECS";
const ENV_BATCH_CAP: &str = "MH_BATCH_CAP";
const ENV_DAEMON_ADDR: &str = "MH_DAEMON_ADDR";

impl HarnessConfig {
    /// Load configuration from the real process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value lookup. Production
    /// code always uses [`from_env`](Self::from_env); this indirection
    /// exists so tests can assert defaulting/validation behavior without
    /// mutating real process environment variables, which would make
    /// tests racy under `cargo test`'s parallel harness.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(ENV_DATABASE_URL).ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;
        let max_connections =
            parse_or_default(&lookup, ENV_DB_MAX_CONNECTIONS, 10u32)?;

        let bot_token = lookup(ENV_CHAT_BOT_TOKEN).ok_or(ConfigError::Missing(ENV_CHAT_BOT_TOKEN))?;
        let app_token = lookup(ENV_CHAT_APP_TOKEN);

        let worker_count = parse_or_default(&lookup, ENV_WORKER_COUNT, 5u32)?;
        let base_sleep_secs = parse_or_default(&lookup, ENV_BASE_SLEEP_SECS, 60u64)?;
        let min_jitter = parse_or_default(&lookup, ENV_MIN_JITTER_SECS, -15i64)?;
        let max_jitter = parse_or_default(&lookup, ENV_MAX_JITTER_SECS, 15i64)?;
        let max_attempts = parse_or_default(&lookup, ENV_MAX_ATTEMPTS, 3i32)?;
        let lease_secs = parse_or_default(&lookup, ENV_LEASE_SECS, 600u64)?;
        let max_age_secs = parse_or_default(&lookup, ENV_MAX_AGE_SECS, 3600u64)?;
        let batch_cap = parse_or_default(&lookup, ENV_BATCH_CAP, 20u32)?;
        let daemon_addr = lookup(ENV_DAEMON_ADDR);

        if min_jitter > max_jitter {
            return Err(ConfigError::Invalid {
                key: ENV_MIN_JITTER_SECS,
                value: min_jitter.to_string(),
                reason: format!("must be <= {ENV_MAX_JITTER_SECS} ({max_jitter})"),
            });
        }
        if worker_count == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_WORKER_COUNT,
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        Ok(HarnessConfig {
            db: DbConfig {
                url,
                max_connections,
            },
            chat: ChatConfig {
                bot_token,
                app_token,
            },
            worker: WorkerConfig {
                worker_count,
                base_sleep: Duration::from_secs(base_sleep_secs),
                min_jitter,
                max_jitter,
                max_attempts,
                lease_duration: Duration::from_secs(lease_secs),
                max_age: Duration::from_secs(max_age_secs),
                batch_cap,
            },
            daemon_addr,
        })
    }
}

fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            reason: "not a valid number".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_match_spec() {
        let mut map = HashMap::new();
        map.insert(ENV_DATABASE_URL, "postgres://localhost/mh");
        map.insert(ENV_CHAT_BOT_TOKEN, "xoxb-test");
        let cfg = HarnessConfig::from_lookup(lookup_from(&map)).unwrap();

        assert_eq!(cfg.db.max_connections, 10);
        assert_eq!(cfg.worker.worker_count, 5);
        assert_eq!(cfg.worker.base_sleep, Duration::from_secs(60));
        assert_eq!(cfg.worker.min_jitter, -15);
        assert_eq!(cfg.worker.max_jitter, 15);
        assert_eq!(cfg.worker.max_attempts, 3);
        assert_eq!(cfg.worker.lease_duration, Duration::from_secs(600));
        assert_eq!(cfg.worker.max_age, Duration::from_secs(3600));
        assert_eq!(cfg.worker.batch_cap, 20);
        assert_eq!(cfg.daemon_addr, None);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let mut map = HashMap::new();
        map.insert(ENV_CHAT_BOT_TOKEN, "xoxb-test");
        let err = HarnessConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_DATABASE_URL));
    }

    #[test]
    fn overrides_are_applied() {
        let mut map = HashMap::new();
        map.insert(ENV_DATABASE_URL, "postgres://localhost/mh");
        map.insert(ENV_CHAT_BOT_TOKEN, "xoxb-test");
        map.insert(ENV_WORKER_COUNT, "8");
        map.insert(ENV_BATCH_CAP, "50");
        let cfg = HarnessConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(cfg.worker.worker_count, 8);
        assert_eq!(cfg.worker.batch_cap, 50);
    }

    #[test]
    fn rejects_inverted_jitter_bounds() {
        let mut map = HashMap::new();
        map.insert(ENV_DATABASE_URL, "postgres://localhost/mh");
        map.insert(ENV_CHAT_BOT_TOKEN, "xoxb-test");
        map.insert(ENV_MIN_JITTER_SECS, "30");
        map.insert(ENV_MAX_JITTER_SECS, "15");
        let err = HarnessConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_MIN_JITTER_SECS, .. }));
    }

    #[test]
    fn rejects_zero_workers() {
        let mut map = HashMap::new();
        map.insert(ENV_DATABASE_URL, "postgres://localhost/mh");
        map.insert(ENV_CHAT_BOT_TOKEN, "xoxb-test");
        map.insert(ENV_WORKER_COUNT, "0");
        let err = HarnessConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_WORKER_COUNT, .. }));
    }

    #[test]
    fn rejects_non_numeric_override() {
        let mut map = HashMap::new();
        map.insert(ENV_DATABASE_URL, "postgres://localhost/mh");
        map.insert(ENV_CHAT_BOT_TOKEN, "xoxb-test");
        map.insert(ENV_BATCH_CAP, "not-a-number");
        let err = HarnessConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_BATCH_CAP, .. }));
    }
}
