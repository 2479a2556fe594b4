//! Configuration for the signup workflow.
//!
//! [`SignupConfig`] holds the timing and hardening knobs of the workflow.
//! It can be built in code through a validating builder or deserialized
//! from any serde format, with durations written in humantime notation
//! (`"10m"`, `"90s"`).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use easyprep_signup::SignupConfig;
//!
//! let config = SignupConfig::builder()
//!     .code_validity(Duration::from_secs(300))
//!     .resend_cooldown(Duration::from_secs(60))
//!     .build()?;
//! assert_eq!(config.pending_horizon(), Duration::from_secs(15 * 60));
//! # Ok::<(), easyprep_signup::ConfigError>(())
//! ```

use std::time::Duration;

use chrono::TimeDelta;
use easyprep_storage::to_time_delta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lifetime of an issued code (10 minutes).
pub const DEFAULT_CODE_VALIDITY: Duration = Duration::from_secs(10 * 60);

/// Default age after which a pending signup is swept (15 minutes).
pub const DEFAULT_PENDING_HORIZON: Duration = Duration::from_secs(15 * 60);

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// The offending field.
        field: &'static str,
        /// Smallest accepted value.
        min: String,
        /// The rejected value.
        value: String,
    },

    /// Two fields are individually valid but inconsistent with each other.
    #[error("{field} is inconsistent: {reason}")]
    Inconsistent {
        /// The offending field.
        field: &'static str,
        /// What relation was violated.
        reason: String,
    },
}

/// Signup workflow configuration.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `code_validity` | 10 minutes |
/// | `pending_horizon` | 15 minutes |
/// | `resend_cooldown` | disabled |
/// | `max_failed_attempts` | disabled |
/// | `sweep_interval` | disabled |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupConfig {
    /// How long an issued code is accepted.
    #[serde(with = "humantime_serde", default = "default_code_validity")]
    pub(crate) code_validity: Duration,

    /// Age after which a pending signup is removed by a sweep.
    #[serde(with = "humantime_serde", default = "default_pending_horizon")]
    pub(crate) pending_horizon: Duration,

    /// Minimum spacing between resends of the same pending signup.
    #[serde(with = "humantime_serde", default)]
    pub(crate) resend_cooldown: Option<Duration>,

    /// Wrong codes tolerated before the pending signup is discarded.
    #[serde(default)]
    pub(crate) max_failed_attempts: Option<u32>,

    /// Period of the background sweeper.
    #[serde(with = "humantime_serde", default)]
    pub(crate) sweep_interval: Option<Duration>,
}

fn default_code_validity() -> Duration {
    DEFAULT_CODE_VALIDITY
}

fn default_pending_horizon() -> Duration {
    DEFAULT_PENDING_HORIZON
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            code_validity: DEFAULT_CODE_VALIDITY,
            pending_horizon: DEFAULT_PENDING_HORIZON,
            resend_cooldown: None,
            max_failed_attempts: None,
            sweep_interval: None,
        }
    }
}

#[bon::bon]
impl SignupConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `code_validity` is zero
    /// - `pending_horizon` is shorter than `code_validity`
    /// - `resend_cooldown` or `sweep_interval` is set to zero
    /// - `max_failed_attempts` is set to zero
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_CODE_VALIDITY)] code_validity: Duration,
        #[builder(default = DEFAULT_PENDING_HORIZON)] pending_horizon: Duration,
        resend_cooldown: Option<Duration>,
        max_failed_attempts: Option<u32>,
        sweep_interval: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            code_validity,
            pending_horizon,
            resend_cooldown,
            max_failed_attempts,
            sweep_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by the builder.
    ///
    /// Deserialized configurations are not validated automatically; call
    /// this (or let [`SignupService`](crate::SignupService) call it) before
    /// use.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_validity.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "code_validity",
                min: "1ms".into(),
                value: "0s".into(),
            });
        }
        if self.pending_horizon < self.code_validity {
            return Err(ConfigError::Inconsistent {
                field: "pending_horizon",
                reason: format!(
                    "{}s is shorter than code_validity {}s",
                    self.pending_horizon.as_secs(),
                    self.code_validity.as_secs()
                ),
            });
        }
        if self.resend_cooldown.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::BelowMinimum {
                field: "resend_cooldown",
                min: "1ms".into(),
                value: "0s".into(),
            });
        }
        if self.max_failed_attempts == Some(0) {
            return Err(ConfigError::BelowMinimum {
                field: "max_failed_attempts",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if self.sweep_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::BelowMinimum {
                field: "sweep_interval",
                min: "1ms".into(),
                value: "0s".into(),
            });
        }
        Ok(())
    }

    /// Returns how long an issued code is accepted.
    #[must_use]
    pub fn code_validity(&self) -> Duration {
        self.code_validity
    }

    /// Returns the age after which pending signups are swept.
    #[must_use]
    pub fn pending_horizon(&self) -> Duration {
        self.pending_horizon
    }

    /// Returns the resend cooldown, if enforced.
    #[must_use]
    pub fn resend_cooldown(&self) -> Option<Duration> {
        self.resend_cooldown
    }

    /// Returns the failed-attempt limit, if enforced.
    #[must_use]
    pub fn max_failed_attempts(&self) -> Option<u32> {
        self.max_failed_attempts
    }

    /// Returns the background sweep period, if enabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval
    }

    pub(crate) fn code_validity_delta(&self) -> TimeDelta {
        to_time_delta(self.code_validity)
    }

    pub(crate) fn pending_horizon_delta(&self) -> TimeDelta {
        to_time_delta(self.pending_horizon)
    }
}
