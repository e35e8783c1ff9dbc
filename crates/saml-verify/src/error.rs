//! Verification error types and rejection reasons.
//!
//! [`VerifyError`] covers failures raised by key lookup, key-set mutation and
//! configuration. [`RejectionReason`] is the stable code reported to callers
//! when an assertion is turned away; every [`VerifyError`] that can surface
//! during verification maps onto one via [`VerifyError::rejection_reason`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assertion::IssuerId;

/// Errors raised by the key resolver, the trusted key set and configuration.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// No signing keys are registered for the issuer.
    #[error("Unknown issuer: {issuer}")]
    UnknownIssuer {
        /// Issuer that has no registered keys.
        issuer: IssuerId,
    },

    /// The key hint does not name a current or in-grace key.
    #[error("Unknown signing key: {kid}")]
    UnknownKey {
        /// Key ID taken from the signature.
        kid: String,
    },

    /// The issuer is known but none of its keys is eligible at this instant.
    #[error("No eligible signing key for issuer: {issuer}")]
    NoEligibleKey {
        /// Issuer whose keys are all retired or not yet active.
        issuer: IssuerId,
    },

    /// A key with the same ID is already registered for the issuer.
    #[error("Signing key already registered: {kid}")]
    DuplicateKey {
        /// Key ID that collided.
        kid: String,
    },

    /// The issuer already has a current key; use rotation instead.
    #[error("Issuer already has a current signing key: {issuer}")]
    CurrentKeyExists {
        /// Issuer with an existing current key.
        issuer: IssuerId,
    },

    /// Another rotation for the same issuer is in flight.
    #[error("Key rotation already in progress for issuer: {issuer}")]
    RotationInProgress {
        /// Issuer being rotated.
        issuer: IssuerId,
    },

    /// Public key material could not be decoded or is not a valid Ed25519 point.
    #[error("Invalid public key: {message}")]
    InvalidPublicKey {
        /// Why the key was rejected.
        message: String,
    },

    /// Clock-skew tolerance is negative or exceeds the allowed maximum.
    #[error("Invalid clock skew: {message}")]
    InvalidClockSkew {
        /// Why the tolerance was rejected.
        message: String,
    },

    /// Verifier configuration failed validation.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the invalid setting.
        message: String,
    },
}

impl VerifyError {
    /// Creates an [`UnknownIssuer`](Self::UnknownIssuer) error.
    pub fn unknown_issuer(issuer: impl Into<IssuerId>) -> Self {
        Self::UnknownIssuer { issuer: issuer.into() }
    }

    /// Creates an [`UnknownKey`](Self::UnknownKey) error.
    pub fn unknown_key(kid: impl Into<String>) -> Self {
        Self::UnknownKey { kid: kid.into() }
    }

    /// Creates a [`NoEligibleKey`](Self::NoEligibleKey) error.
    pub fn no_eligible_key(issuer: impl Into<IssuerId>) -> Self {
        Self::NoEligibleKey { issuer: issuer.into() }
    }

    /// Creates a [`DuplicateKey`](Self::DuplicateKey) error.
    pub fn duplicate_key(kid: impl Into<String>) -> Self {
        Self::DuplicateKey { kid: kid.into() }
    }

    /// Creates a [`CurrentKeyExists`](Self::CurrentKeyExists) error.
    pub fn current_key_exists(issuer: impl Into<IssuerId>) -> Self {
        Self::CurrentKeyExists { issuer: issuer.into() }
    }

    /// Creates a [`RotationInProgress`](Self::RotationInProgress) error.
    pub fn rotation_in_progress(issuer: impl Into<IssuerId>) -> Self {
        Self::RotationInProgress { issuer: issuer.into() }
    }

    /// Creates an [`InvalidPublicKey`](Self::InvalidPublicKey) error.
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey { message: message.into() }
    }

    /// Creates an [`InvalidClockSkew`](Self::InvalidClockSkew) error.
    pub fn invalid_clock_skew(message: impl Into<String>) -> Self {
        Self::InvalidClockSkew { message: message.into() }
    }

    /// Creates an [`InvalidConfig`](Self::InvalidConfig) error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Maps this error onto the rejection reported for an assertion.
    ///
    /// Lookup failures reject as [`RejectionReason::UnknownKey`]; undecodable
    /// key material rejects as [`RejectionReason::BadSignature`].
    #[must_use]
    pub fn rejection_reason(&self) -> RejectionReason {
        match self {
            Self::InvalidPublicKey { .. } => RejectionReason::BadSignature,
            Self::UnknownIssuer { .. }
            | Self::UnknownKey { .. }
            | Self::NoEligibleKey { .. }
            | Self::DuplicateKey { .. }
            | Self::CurrentKeyExists { .. }
            | Self::RotationInProgress { .. }
            | Self::InvalidClockSkew { .. }
            | Self::InvalidConfig { .. } => RejectionReason::UnknownKey,
        }
    }
}

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Why an assertion was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Current time is at or past the skew-extended `NotOnOrAfter`.
    Expired,
    /// Current time is before the skew-extended `NotBefore`.
    NotYetValid,
    /// No resolved key verifies the signature.
    BadSignature,
    /// The issuer or key hint does not resolve to an eligible key.
    UnknownKey,
}

impl RejectionReason {
    /// Stable string code, suitable for logs and error pages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::BadSignature => "bad_signature",
            Self::UnknownKey => "unknown_key",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
