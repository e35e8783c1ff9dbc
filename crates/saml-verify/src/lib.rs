//! # SAML Assertion Verification
//!
//! Service-provider side checks for signed SAML assertions, after the XML
//! layer has parsed and canonicalized them.
//!
//! This crate provides:
//! - **Clock-skew validation**: validity windows checked against a symmetric tolerance
//! - **Rotation-aware key lookup**: trusted keys per issuer, with a grace period for rotated-out
//!   keys
//! - **Verification**: key resolution, then signature, then validity window, with a specific
//!   rejection reason for every failure
//!
//! ## Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use samlsp_verify::{
//!     Assertion, AssertionVerifier, IssuerId, PublicKeyMaterial, TrustedKey, TrustedKeySet,
//!     VerifierConfig,
//! };
//!
//! # fn example(assertion: Assertion) -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig::builder().clock_skew(Duration::from_secs(30)).build()?;
//! let keys = Arc::new(TrustedKeySet::from_config(&config)?);
//!
//! let issuer = IssuerId::new("https://idp.example.com/realms/demo");
//! let key = PublicKeyMaterial::from_base64url("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo")?;
//! keys.register(&issuer, TrustedKey::builder().kid("2024-01").key(key).build())?;
//!
//! let verifier = AssertionVerifier::new(keys.clone(), &config)?;
//! let result = verifier.verify_now(&assertion);
//! if !result.is_accepted() {
//!     println!("rejected: {:?}", result.rejection_reason());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Parsed assertion types.
pub mod assertion;
/// Time sources.
pub mod clock;
/// Validity window checks with clock-skew tolerance.
pub mod clock_skew;
/// Verifier configuration.
pub mod config;
/// Error types and rejection reasons.
pub mod error;
/// Trusted keys and rotation.
pub mod key_set;
/// Key lookup abstraction.
pub mod locator;
/// Verification counters.
pub mod metrics;
/// Verification core.
pub mod verifier;

/// Shared test utilities (requires `testutil` feature).
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use assertion::{Assertion, IssuerId, SignatureBlock, ValidityWindow};
pub use clock::{Clock, FixedClock, OffsetClock, SystemClock};
pub use clock_skew::{
    ClockSkewPolicy, EffectiveWindow, MAX_CLOCK_SKEW, WindowViolation, check_window,
    is_within_window,
};
pub use config::{DEFAULT_MAX_CANDIDATES, VerifierConfig};
pub use error::{RejectionReason, Result, VerifyError};
pub use key_set::{
    DEFAULT_GRACE_PERIOD, KeyEligibility, KeySnapshot, PublicKeyMaterial, TrustedKey,
    TrustedKeySet, rotate,
};
pub use locator::PublicKeyLocator;
pub use metrics::{VerificationMetrics, VerificationMetricsSnapshot};
pub use verifier::{
    AssertionVerifier, VerificationOutcome, VerificationResult, VerificationStage, verify,
};
