//! Bus configuration (dispatch and unregister policies).

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable selecting the [`DispatchPolicy`].
pub const DISPATCH_POLICY_ENV: &str = "ARBUS_DISPATCH_POLICY";

/// Environment variable selecting the [`UnregisterPolicy`].
pub const UNREGISTER_POLICY_ENV: &str = "ARBUS_UNREGISTER_POLICY";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration key held a value outside its accepted set.
    #[error("invalid value {value:?} for {key} (expected one of: {expected})")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A JSON configuration document could not be parsed.
    #[error("invalid bus configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the dispatcher does when a listener returns an error.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Stop the pass at the first failing listener and return its error.
    /// Listeners registered after it do not see the event.
    #[default]
    FailFast,
    /// Notify every listener; return the first error once the pass is over.
    /// Later failures are logged.
    IsolateAndContinue,
}

impl FromStr for DispatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fail_fast" => Ok(Self::FailFast),
            "isolate_and_continue" => Ok(Self::IsolateAndContinue),
            other => Err(ConfigError::InvalidValue {
                key: DISPATCH_POLICY_ENV,
                value: other.to_string(),
                expected: "fail_fast, isolate_and_continue",
            }),
        }
    }
}

/// How many entries `unregister(identity, listener)` removes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisterPolicy {
    /// Remove the earliest matching entry only.
    FirstMatch,
    /// Remove every matching entry for the identity.
    #[default]
    AllMatches,
}

impl FromStr for UnregisterPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first_match" => Ok(Self::FirstMatch),
            "all_matches" => Ok(Self::AllMatches),
            other => Err(ConfigError::InvalidValue {
                key: UNREGISTER_POLICY_ENV,
                value: other.to_string(),
                expected: "first_match, all_matches",
            }),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub dispatch_policy: DispatchPolicy,
    pub unregister_policy: UnregisterPolicy,
}

impl BusConfig {
    pub fn with_dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch_policy = policy;
        self
    }

    pub fn with_unregister_policy(mut self, policy: UnregisterPolicy) -> Self {
        self.unregister_policy = policy;
        self
    }

    /// Read the configuration from the process environment.
    ///
    /// Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(DISPATCH_POLICY_ENV) {
            config.dispatch_policy = raw.parse()?;
        }
        if let Some(raw) = lookup(UNREGISTER_POLICY_ENV) {
            config.unregister_policy = raw.parse()?;
        }
        Ok(config)
    }

    /// Parse a JSON document such as `{"dispatch_policy": "isolate_and_continue"}`.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}
