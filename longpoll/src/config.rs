//! Poll timing configuration.

use crate::error::ConfigError;

use std::env;
use std::time::Duration;

/// Environment variable holding the maximum wait, in milliseconds.
pub const ENV_MAX_WAIT_MS: &str = "LONGPOLL_MAX_WAIT_MS";

/// Environment variable holding the grace period, in milliseconds.
pub const ENV_GRACE_MS: &str = "LONGPOLL_GRACE_MS";

const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Timing of one long-poll attempt.
///
/// Both values are fixed for the lifetime of a poll. A zero grace period
/// makes the activity alarm wake on the first script with no coalescing.
/// A grace period longer than the maximum wait is allowed; the deadline
/// then always releases the poll first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    max_wait: Duration,
    grace_period: Duration,
}

impl PollConfig {
    /// Returns a builder initialised with the default timings.
    pub fn builder() -> PollConfigBuilder {
        PollConfigBuilder::new()
    }

    /// Builds a configuration from millisecond values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Negative`] for a negative value.
    pub fn from_millis(max_wait_ms: i64, grace_ms: i64) -> Result<Self, ConfigError> {
        Ok(PollConfigBuilder::new()
            .max_wait(non_negative("max_wait", max_wait_ms)?)
            .grace_period(non_negative("grace_period", grace_ms)?)
            .build())
    }

    /// Reads [`ENV_MAX_WAIT_MS`] and [`ENV_GRACE_MS`], falling back to the
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnvVar`] for a value that is not an integer,
    /// plus anything [`from_millis`](Self::from_millis) rejects.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_wait = read_env_ms(ENV_MAX_WAIT_MS)?
            .unwrap_or(DEFAULT_MAX_WAIT.as_millis() as i64);
        let grace = read_env_ms(ENV_GRACE_MS)?
            .unwrap_or(DEFAULT_GRACE_PERIOD.as_millis() as i64);

        let config = Self::from_millis(max_wait, grace)?;
        tracing::debug!(?config, "poll configuration loaded from environment");

        Ok(config)
    }

    /// Upper bound of a poll, and ceiling of its blocking wait.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Quiet time awaited after a script before the poll is released.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Builder for [`PollConfig`].
///
/// # Examples
///
/// ```rust,ignore
/// let config = PollConfig::builder()
///     .max_wait(Duration::from_secs(30))
///     .grace_period(Duration::from_millis(100))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PollConfigBuilder {
    config: PollConfig,
}

impl PollConfigBuilder {
    /// Creates a builder with the default timings
    /// (60 s maximum wait, 500 ms grace period).
    pub fn new() -> Self {
        Self {
            config: PollConfig::default(),
        }
    }

    /// Sets the maximum time a poll may block.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_wait = max_wait;
        self
    }

    /// Sets the quiet time awaited after each script.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Returns the configuration.
    pub fn build(self) -> PollConfig {
        if self.config.grace_period > self.config.max_wait {
            tracing::debug!(config = ?self.config, "grace period outlasts maximum wait, deadline always wins");
        }

        self.config
    }
}

impl Default for PollConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<Duration, ConfigError> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Negative { name, value })
}

fn read_env_ms(name: &str) -> Result<Option<i64>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                name: name.to_owned(),
                message: format!("'{raw}': {e}"),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvVar {
            name: name.to_owned(),
            message: "not valid unicode".to_owned(),
        }),
    }
}
