//! Runtime configuration
//!
//! Table capacities are compile-time constants ([`MAX_NUM_COLORS`],
//! [`MAX_NUM_PBLOCKS`]). The runtime limits below may be smaller, are read
//! from the environment by [`FgpuConfig::from_env`], and are always validated
//! against the compiled capacities.
//!
//! | Variable                | Field                   |
//! |-------------------------|-------------------------|
//! | `FGPU_MAX_NUM_COLORS`   | `num_colors`            |
//! | `FGPU_MAX_NUM_PBLOCKS`  | `num_pblocks`           |
//! | `FGPU_POLL_TIMEOUT_MS`  | `poll.timeout`          |
//! | `FGPU_POLL_INTERVAL_US` | `poll.interval`         |
//! | `FGPU_ROUND_POLICY`     | `round_policy`          |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FgpuError, Result};
use crate::layout::{MAX_NUM_COLORS, MAX_NUM_PBLOCKS};
use crate::round::RoundPolicy;

/// Cadence for polling the indicator table
///
/// Sleeps start at `interval` and double per attempt up to `max_interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total time budget for a poll
    pub timeout: Duration,
    /// First sleep between checks
    pub interval: Duration,
    /// Upper bound on a single sleep
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            interval: Duration::from_micros(50),
            max_interval: Duration::from_millis(10),
        }
    }
}

impl PollConfig {
    /// Create new poll config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set initial sleep interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set maximum sleep interval
    #[must_use]
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Sleep before check number `attempt` (0-based), exponential backoff
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.interval.as_nanos() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.max_interval.as_nanos() as u64);
        Duration::from_nanos(capped.max(1))
    }
}

/// Top-level configuration for a scheduler's tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FgpuConfig {
    /// Colors in use (at most [`MAX_NUM_COLORS`])
    pub num_colors: usize,
    /// Physical persistent block slots in use (at most [`MAX_NUM_PBLOCKS`])
    pub num_pblocks: usize,
    /// Indicator polling cadence
    pub poll: PollConfig,
    /// Round transition policy
    pub round_policy: RoundPolicy,
}

impl Default for FgpuConfig {
    fn default() -> Self {
        Self {
            num_colors: MAX_NUM_COLORS,
            num_pblocks: MAX_NUM_PBLOCKS,
            poll: PollConfig::default(),
            round_policy: RoundPolicy::default(),
        }
    }
}

impl FgpuConfig {
    /// Create a configuration with the compiled maxima
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of colors
    #[must_use]
    pub fn with_num_colors(mut self, n: usize) -> Self {
        self.num_colors = n;
        self
    }

    /// Set number of physical block slots
    #[must_use]
    pub fn with_num_pblocks(mut self, n: usize) -> Self {
        self.num_pblocks = n;
        self
    }

    /// Set poll cadence
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Set round policy
    #[must_use]
    pub fn with_round_policy(mut self, policy: RoundPolicy) -> Self {
        self.round_policy = policy;
        self
    }

    /// Check limits against the compiled capacities
    ///
    /// # Errors
    ///
    /// Returns `Config` if a limit is zero or exceeds its capacity, or if the
    /// poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.num_colors == 0 || self.num_colors > MAX_NUM_COLORS {
            return Err(FgpuError::Config {
                reason: format!(
                    "num_colors {} outside 1..={MAX_NUM_COLORS}",
                    self.num_colors
                ),
            });
        }
        if self.num_pblocks == 0 || self.num_pblocks > MAX_NUM_PBLOCKS {
            return Err(FgpuError::Config {
                reason: format!(
                    "num_pblocks {} outside 1..={MAX_NUM_PBLOCKS}",
                    self.num_pblocks
                ),
            });
        }
        if self.poll.interval.is_zero() {
            return Err(FgpuError::Config {
                reason: "poll interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Defaults overridden by `FGPU_*` environment variables, validated
    ///
    /// # Errors
    ///
    /// Returns `Config` if a variable does not parse or the result fails
    /// [`FgpuConfig::validate`].
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(n) = env_parse::<usize>("FGPU_MAX_NUM_COLORS")? {
            config.num_colors = n;
        }
        if let Some(n) = env_parse::<usize>("FGPU_MAX_NUM_PBLOCKS")? {
            config.num_pblocks = n;
        }
        if let Some(ms) = env_parse::<u64>("FGPU_POLL_TIMEOUT_MS")? {
            config.poll.timeout = Duration::from_millis(ms);
        }
        if let Some(us) = env_parse::<u64>("FGPU_POLL_INTERVAL_US")? {
            config.poll.interval = Duration::from_micros(us);
        }
        if let Some(policy) = env_parse::<RoundPolicy>("FGPU_ROUND_POLICY")? {
            config.round_policy = policy;
        }
        config.validate()?;
        tracing::debug!(
            num_colors = config.num_colors,
            num_pblocks = config.num_pblocks,
            timeout_ms = config.poll.timeout.as_millis() as u64,
            "loaded fgpu config from environment"
        );
        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| FgpuError::Config {
                reason: format!("{name}={raw:?} is not a valid value"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FgpuConfig::default();
        assert_eq!(config.num_colors, MAX_NUM_COLORS);
        assert_eq!(config.num_pblocks, MAX_NUM_PBLOCKS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_over_capacity() {
        let config = FgpuConfig::new().with_num_colors(MAX_NUM_COLORS + 1);
        assert!(matches!(config.validate(), Err(FgpuError::Config { .. })));

        let config = FgpuConfig::new().with_num_pblocks(0);
        assert!(matches!(config.validate(), Err(FgpuError::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config =
            FgpuConfig::new().with_poll(PollConfig::new().with_interval(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_delay_backs_off_and_caps() {
        let poll = PollConfig::new()
            .with_interval(Duration::from_micros(100))
            .with_max_interval(Duration::from_micros(700));
        assert_eq!(poll.delay(0), Duration::from_micros(100));
        assert_eq!(poll.delay(1), Duration::from_micros(200));
        assert_eq!(poll.delay(2), Duration::from_micros(400));
        assert_eq!(poll.delay(3), Duration::from_micros(700));
        assert_eq!(poll.delay(60), Duration::from_micros(700));
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = FgpuConfig::new()
            .with_num_colors(2)
            .with_num_pblocks(30)
            .with_round_policy(RoundPolicy::SingleBuffer);
        assert_eq!(config.num_colors, 2);
        assert_eq!(config.num_pblocks, 30);
        assert_eq!(config.round_policy, RoundPolicy::SingleBuffer);
    }
}
