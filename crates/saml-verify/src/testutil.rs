//! Shared test utilities for assertion verification.
//!
//! Helpers for generating Ed25519 key pairs, signing assertions the way an
//! identity provider would, and corrupting them for negative tests. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! samlsp-verify = { path = "../saml-verify", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use samlsp_verify::testutil::{generate_test_keypair, sign_assertion, trusted_key};
//! ```

use ed25519_dalek::Signer;
pub use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use crate::{
    assertion::{Assertion, IssuerId, SignatureBlock, ValidityWindow},
    key_set::{PublicKeyMaterial, TrustedKey},
};

/// Generates a fresh Ed25519 key pair.
///
/// Returns `(signing_key, public_key)`; the signing key stands in for the
/// identity provider, the public key is what the service provider trusts.
pub fn generate_test_keypair() -> (SigningKey, PublicKeyMaterial) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = PublicKeyMaterial::from(signing_key.verifying_key());
    (signing_key, public_key)
}

/// Creates a current [`TrustedKey`] with the default activation time.
pub fn trusted_key(kid: &str, key: PublicKeyMaterial) -> TrustedKey {
    TrustedKey::builder().kid(kid).key(key).build()
}

/// Canonical bytes signed for an assertion. Stands in for the exclusive
/// C14N output of the upstream XML layer.
pub fn canonical_content(
    issuer: &IssuerId,
    subject: &str,
    window: &ValidityWindow,
) -> Vec<u8> {
    format!(
        "<saml:Assertion><saml:Issuer>{issuer}</saml:Issuer>\
         <saml:Subject><saml:NameID>{subject}</saml:NameID></saml:Subject>\
         <saml:Conditions NotBefore=\"{}\" NotOnOrAfter=\"{}\"/></saml:Assertion>",
        window.not_before.to_rfc3339(),
        window.not_on_or_after.to_rfc3339(),
    )
    .into_bytes()
}

/// Builds an assertion signed by `signing_key`.
///
/// `kid` becomes the signature's key hint; pass `None` to model an identity
/// provider that omits `<ds:KeyInfo>`.
pub fn sign_assertion(
    signing_key: &SigningKey,
    issuer: &IssuerId,
    kid: Option<&str>,
    subject: &str,
    window: ValidityWindow,
) -> Assertion {
    let content = canonical_content(issuer, subject, &window);
    let signature = signing_key.sign(&content).to_bytes().to_vec();
    Assertion::builder()
        .issuer(issuer)
        .subject(subject)
        .window(window)
        .signature(
            SignatureBlock::builder()
                .maybe_key_hint(kid)
                .signature(signature)
                .signed_content(content)
                .build(),
        )
        .build()
}

/// Returns a copy of `assertion` with one byte of its signed content flipped.
///
/// `index` wraps around the content length. Empty content is returned as is.
pub fn tampered(assertion: &Assertion, index: usize) -> Assertion {
    let block = assertion.signature();
    let mut content = block.signed_content().to_vec();
    if !content.is_empty() {
        let i = index % content.len();
        content[i] ^= 0x01;
    }
    Assertion::builder()
        .issuer(assertion.issuer())
        .subject(assertion.subject())
        .window(*assertion.window())
        .signature(
            SignatureBlock::builder()
                .maybe_key_hint(block.key_hint())
                .signature(block.signature().to_vec())
                .signed_content(content)
                .build(),
        )
        .build()
}

/// Asserts that a [`VerificationResult`](crate::verifier::VerificationResult)
/// has the expected outcome.
///
/// On failure, prints the expected outcome and the whole result.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use samlsp_verify::{VerificationOutcome, VerificationResult, assert_outcome};
///
/// let result = VerificationResult {
///     outcome: VerificationOutcome::RejectedExpired,
///     key_id: None,
///     effective_time: chrono::Utc::now(),
/// };
/// assert_outcome!(result, VerificationOutcome::RejectedExpired);
/// ```
#[macro_export]
macro_rules! assert_outcome {
    ($result:expr, $expected:expr) => {{
        let result: &$crate::verifier::VerificationResult = &$result;
        assert_eq!(
            result.outcome, $expected,
            "expected outcome {:?}, got: {:?}",
            $expected, result,
        );
    }};
    ($result:expr, $expected:expr, $msg:expr) => {{
        let result: &$crate::verifier::VerificationResult = &$result;
        assert_eq!(
            result.outcome, $expected,
            "{}: expected outcome {:?}, got: {:?}",
            $msg, $expected, result,
        );
    }};
}
