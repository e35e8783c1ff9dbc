//! Verifier configuration.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use samlsp_verify::VerifierConfig;
//!
//! let config = VerifierConfig::builder()
//!     .clock_skew(Duration::from_secs(30))
//!     .require_key_hint(true)
//!     .build()?;
//! assert_eq!(config.clock_skew(), Duration::from_secs(30));
//! assert_eq!(config.max_candidates(), 8);
//! # Ok::<(), samlsp_verify::VerifyError>(())
//! ```
//!
//! Deserialized configs use human-readable durations:
//!
//! ```
//! # use samlsp_verify::VerifierConfig;
//! let config: VerifierConfig = serde_json::from_str(r#"{"clock_skew": "3s"}"#).unwrap();
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    clock_skew::{ClockSkewPolicy, MAX_CLOCK_SKEW},
    error::{Result, VerifyError},
    key_set::DEFAULT_GRACE_PERIOD,
};

/// Default upper bound on keys tried for a hint-less signature.
pub const DEFAULT_MAX_CANDIDATES: usize = 8;

/// Settings for [`AssertionVerifier`](crate::verifier::AssertionVerifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// Tolerance applied to both bounds of the validity window.
    #[serde(with = "humantime_serde", default)]
    pub(crate) clock_skew: Duration,

    /// How long a rotated-out key keeps verifying.
    #[serde(with = "humantime_serde", default = "default_key_grace_period")]
    pub(crate) key_grace_period: Duration,

    /// Reject signatures that carry no key hint.
    #[serde(default)]
    pub(crate) require_key_hint: bool,

    /// Upper bound on keys tried for a hint-less signature.
    #[serde(default = "default_max_candidates")]
    pub(crate) max_candidates: usize,
}

fn default_key_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            clock_skew: Duration::ZERO,
            key_grace_period: default_key_grace_period(),
            require_key_hint: false,
            max_candidates: default_max_candidates(),
        }
    }
}

#[bon::bon]
impl VerifierConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `clock_skew` - Window tolerance (default: 0, strict).
    /// * `key_grace_period` - Grace for rotated-out keys (default: 1 hour).
    /// * `require_key_hint` - Reject hint-less signatures (default: false).
    /// * `max_candidates` - Keys tried for a hint-less signature (default: 8).
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    #[builder]
    pub fn new(
        #[builder(default)] clock_skew: Duration,
        #[builder(default = DEFAULT_GRACE_PERIOD)] key_grace_period: Duration,
        #[builder(default)] require_key_hint: bool,
        #[builder(default = DEFAULT_MAX_CANDIDATES)] max_candidates: usize,
    ) -> Result<Self> {
        let config = Self { clock_skew, key_grace_period, require_key_hint, max_candidates };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration. Deserialized configs must be validated
    /// before use; the builder does this itself.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::InvalidClockSkew`] if `clock_skew` exceeds one day
    /// - [`VerifyError::InvalidConfig`] if `max_candidates` is zero or
    ///   `key_grace_period` is out of range
    pub fn validate(&self) -> Result<()> {
        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(VerifyError::invalid_clock_skew(format!(
                "{}s exceeds the maximum of {}s",
                self.clock_skew.as_secs(),
                MAX_CLOCK_SKEW.as_secs()
            )));
        }
        if self.max_candidates == 0 {
            return Err(VerifyError::invalid_config("max_candidates must be at least 1"));
        }
        if chrono::TimeDelta::from_std(self.key_grace_period).is_err() {
            return Err(VerifyError::invalid_config("key_grace_period is out of range"));
        }
        Ok(())
    }

    /// Returns the clock-skew tolerance.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Returns the grace period for rotated-out keys.
    #[must_use]
    pub fn key_grace_period(&self) -> Duration {
        self.key_grace_period
    }

    /// Returns whether hint-less signatures are rejected.
    #[must_use]
    pub fn require_key_hint(&self) -> bool {
        self.require_key_hint
    }

    /// Returns the maximum number of keys tried for a hint-less signature.
    #[must_use]
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Builds the clock-skew policy for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidClockSkew`] if the tolerance is too large.
    pub fn policy(&self) -> Result<ClockSkewPolicy> {
        ClockSkewPolicy::new(self.clock_skew)
    }
}
