//! Client configuration types.
//!
//! This module defines the structs that map to the `azmc.yaml` file. Every
//! field has a default, so an empty file (or no file at all) is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default directory holding local state.
pub const DEFAULT_STATE_DIR: &str = ".azmc";

/// Root configuration of the multicloud client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ClientConfig {
    /// Overrides the regional API endpoint, e.g. for a local emulator.
    #[validate(url)]
    pub base_path: Option<String>,
    /// Static bearer token attached to every request.
    pub access_token: Option<String>,
    /// Per-request timeout in seconds.
    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: u64,
    /// User agent sent with every request.
    #[validate(length(min = 1))]
    pub user_agent: String,
    /// Conflict retry policy of the Apply loop.
    #[validate(nested)]
    pub retry: RetryPolicy,
    /// Long-running operation polling policy.
    #[validate(nested)]
    pub poll: PollPolicy,
    /// Directory for local state.
    pub state_dir: Option<PathBuf>,
}

/// How often and how fast a conflicting apply is restarted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first included.
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[validate(range(min = 1))]
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay.
    #[validate(range(min = 1))]
    pub max_backoff_ms: u64,
    /// Growth factor between delays.
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,
}

/// Pacing of long-running operation polls and delete confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before the first poll.
    #[validate(range(min = 1))]
    pub initial_interval_ms: u64,
    /// Upper bound on the delay between polls.
    #[validate(range(min = 1))]
    pub max_interval_ms: u64,
    /// Growth factor between polls.
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,
    /// Overall time allowed for one operation.
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// Reads performed to confirm a delete.
    #[validate(range(min = 1, max = 1000))]
    pub delete_confirm_retries: u32,
    /// Delay between delete confirmation reads.
    pub delete_confirm_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            access_token: None,
            request_timeout_secs: 60,
            user_agent: default_user_agent(),
            retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
            state_dir: None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 30_000,
            multiplier: 1.5,
            timeout_secs: 3_600,
            delete_confirm_retries: 10,
            delete_confirm_interval_ms: 2_000,
        }
    }
}

fn default_user_agent() -> String {
    format!("azmc/{}", env!("CARGO_PKG_VERSION"))
}

/// Grows `initial` by `multiplier` per step, capped at `max`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(initial: u64, max: u64, multiplier: f64, step: u32) -> Duration {
    let exponent = i32::try_from(step).unwrap_or(i32::MAX);
    let ms = (initial as f64) * multiplier.powi(exponent);
    let capped = if ms.is_finite() { ms.min(max as f64) } else { max as f64 };
    Duration::from_millis(capped as u64)
}

impl ClientConfig {
    /// Returns the API root for `location`.
    #[must_use]
    pub fn base_url(&self, location: &str) -> String {
        self.base_path.as_ref().map_or_else(
            || format!("https://{location}-gkemulticloud.googleapis.com/v1"),
            |base| base.trim_end_matches('/').to_string(),
        )
    }

    /// Returns the path of the local state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
            .join("state.json")
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RetryPolicy {
    /// Returns the delay after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        scaled(
            self.initial_backoff_ms,
            self.max_backoff_ms,
            self.multiplier,
            attempt.saturating_sub(1),
        )
    }
}

impl PollPolicy {
    /// Returns the delay before poll number `poll` (0-based).
    #[must_use]
    pub fn interval(&self, poll: u32) -> Duration {
        scaled(
            self.initial_interval_ms,
            self.max_interval_ms,
            self.multiplier,
            poll,
        )
    }

    /// Returns the overall time allowed for one operation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the delay between delete confirmation reads.
    #[must_use]
    pub const fn delete_confirm_interval(&self) -> Duration {
        Duration::from_millis(self.delete_confirm_interval_ms)
    }
}

#[cfg(test)]
impl RetryPolicy {
    pub(crate) const fn fast(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
impl PollPolicy {
    pub(crate) const fn fast() -> Self {
        Self {
            initial_interval_ms: 1,
            max_interval_ms: 5,
            multiplier: 2.0,
            timeout_secs: 5,
            delete_confirm_retries: 3,
            delete_confirm_interval_ms: 1,
        }
    }
}
