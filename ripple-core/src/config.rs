//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Environment variable overriding [`SessionConfig::task_timeout_ms`].
/// `0` or `none` disables the timeout.
pub const ENV_TASK_TIMEOUT_MS: &str = "RIPPLE_TASK_TIMEOUT_MS";

/// Environment variable overriding [`SessionConfig::strict_reads`].
pub const ENV_STRICT_READS: &str = "RIPPLE_STRICT_READS";

/// Per-session tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound for a task node's future, in milliseconds.
    /// `None` waits forever.
    pub task_timeout_ms: Option<u64>,

    /// Reject reads of undeclared dependencies with a stale-read error.
    /// When off, such reads see whatever value is cached.
    pub strict_reads: bool,

    /// Events processed per drain. Later events stay queued.
    pub max_events_per_drain: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: Some(60_000),
            strict_reads: true,
            max_events_per_drain: 1024,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()
    }

    /// Apply `RIPPLE_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, GraphError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TASK_TIMEOUT_MS) {
            let raw = raw.trim();
            self.task_timeout_ms = if raw.eq_ignore_ascii_case("none") || raw == "0" {
                None
            } else {
                Some(raw.parse().map_err(|_| {
                    GraphError::Config(format!("{ENV_TASK_TIMEOUT_MS}: not a number: {raw}"))
                })?)
            };
        }
        if let Some(raw) = lookup(ENV_STRICT_READS) {
            self.strict_reads = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(GraphError::Config(format!(
                        "{ENV_STRICT_READS}: not a boolean: {other}"
                    )))
                }
            };
        }
        self.validate()
    }

    /// Timeout for task nodes.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }

    fn validate(self) -> Result<Self, GraphError> {
        if self.max_events_per_drain == 0 {
            return Err(GraphError::Config(
                "max_events_per_drain must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}
