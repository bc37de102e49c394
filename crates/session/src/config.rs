//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BOOTSTRAP_TIMEOUT_VAR: &str = "VENUE_BOOTSTRAP_TIMEOUT_MS";
const REQUEST_TIMEOUT_VAR: &str = "VENUE_REQUEST_TIMEOUT_MS";
const CLOCK_SKEW_VAR: &str = "VENUE_CLOCK_SKEW_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be an integer number of milliseconds, got '{value}'")]
    InvalidDuration { var: &'static str, value: String },
}

/// Timeouts applied around backend calls, and the tolerance for the
/// backend's clock.
///
/// A timed-out call is reported as `BackendError::Unavailable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on the startup "current session" query. On expiry the
    /// engine starts signed out.
    pub bootstrap_timeout: Duration,

    /// Upper bound on sign-in/up/out and profile reads/inserts.
    pub request_timeout: Duration,

    /// How far ahead of this device the backend clock may run before a
    /// freshly issued session counts as not yet valid.
    pub clock_skew: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            clock_skew: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(d) = duration_var(&lookup, BOOTSTRAP_TIMEOUT_VAR, false)? {
            config.bootstrap_timeout = d;
        }
        if let Some(d) = duration_var(&lookup, REQUEST_TIMEOUT_VAR, false)? {
            config.request_timeout = d;
        }
        if let Some(d) = duration_var(&lookup, CLOCK_SKEW_VAR, true)? {
            config.clock_skew = d;
        }
        Ok(config)
    }

    /// `clock_skew` as a claims-validation leeway.
    pub fn claims_leeway(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.clock_skew).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

fn duration_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    allow_zero: bool,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 || allow_zero => Ok(Some(Duration::from_millis(ms))),
        _ => Err(ConfigError::InvalidDuration { var, value: raw }),
    }
}
