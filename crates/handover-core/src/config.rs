//! Core configuration.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! HANDOVER_TOKEN_TTL_SECS=900       # QR token lifetime, default 15 minutes, at most 24 hours
//! HANDOVER_BASE_POINTS=10           # points credited to the donor per completed pickup
//! HANDOVER_MAX_ATTEMPTS=5           # optimistic write attempts before giving up
//! HANDOVER_RETRY_BACKOFF_MS=20      # first backoff between attempts, doubled each time
//! ```

use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const MAX_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_BASE_POINTS: u32 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 20;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Lifetime of a freshly issued QR token.
    pub token_ttl: chrono::Duration,
    /// Points credited to the donor on completion, before any bonus.
    pub base_points: u32,
    /// How many times a read-modify-write is attempted when it keeps losing the version race.
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubles after each further conflict.
    pub retry_backoff: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            token_ttl: chrono::Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            base_points: DEFAULT_BASE_POINTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ttl_secs: i64 = parse_var(&lookup, "HANDOVER_TOKEN_TTL_SECS")?
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        if ttl_secs <= 0 {
            return Err(ConfigError::MustBePositive("HANDOVER_TOKEN_TTL_SECS"));
        }
        let token_ttl = chrono::Duration::try_seconds(ttl_secs)
            .filter(|_| ttl_secs <= MAX_TOKEN_TTL_SECS)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "HANDOVER_TOKEN_TTL_SECS",
                value: ttl_secs.to_string(),
            })?;

        let max_attempts: u32 =
            parse_var(&lookup, "HANDOVER_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::MustBePositive("HANDOVER_MAX_ATTEMPTS"));
        }

        let base_points =
            parse_var(&lookup, "HANDOVER_BASE_POINTS")?.unwrap_or(defaults.base_points);
        let backoff_ms: u64 =
            parse_var(&lookup, "HANDOVER_RETRY_BACKOFF_MS")?.unwrap_or(DEFAULT_RETRY_BACKOFF_MS);

        Ok(Self {
            token_ttl,
            base_points,
            max_attempts,
            retry_backoff: Duration::from_millis(backoff_ms),
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}
