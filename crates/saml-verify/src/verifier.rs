//! Assertion verification.
//!
//! Every call walks the same stages in order and stops at the first failure:
//!
//! ```text
//! Start ──► KeyResolved ──► SignatureChecked ──► WindowChecked ──► Accepted
//!   │            │                 │                   │
//!   ▼            ▼                 ▼                   ▼
//! UnknownKey  BadSignature     Expired / NotYetValid
//! ```
//!
//! The signature is checked before the validity window, so an assertion
//! with a forged signature is reported as such even if it is also expired.
//! Verification never fails with an error: every input, including
//! malformed signature bytes or an inverted window, yields a
//! [`VerificationResult`].

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    assertion::Assertion,
    clock::{Clock, SystemClock},
    clock_skew::{ClockSkewPolicy, check_window},
    config::{DEFAULT_MAX_CANDIDATES, VerifierConfig},
    error::{RejectionReason, Result},
    key_set::TrustedKey,
    locator::PublicKeyLocator,
    metrics::VerificationMetrics,
};

/// Final decision for an assertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Signature verified and the window covers the effective time.
    Accepted,
    /// The window closed before the effective time.
    RejectedExpired,
    /// The window opens after the effective time.
    RejectedNotYetValid,
    /// No resolved key verifies the signature.
    RejectedBadSignature,
    /// The issuer or key hint does not resolve to an eligible key.
    RejectedUnknownKey,
}

impl VerificationOutcome {
    /// Returns `true` for [`Accepted`](Self::Accepted).
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Returns the rejection reason, or `None` if accepted.
    #[must_use]
    pub const fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Accepted => None,
            Self::RejectedExpired => Some(RejectionReason::Expired),
            Self::RejectedNotYetValid => Some(RejectionReason::NotYetValid),
            Self::RejectedBadSignature => Some(RejectionReason::BadSignature),
            Self::RejectedUnknownKey => Some(RejectionReason::UnknownKey),
        }
    }
}

impl From<RejectionReason> for VerificationOutcome {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::Expired => Self::RejectedExpired,
            RejectionReason::NotYetValid => Self::RejectedNotYetValid,
            RejectionReason::BadSignature => Self::RejectedBadSignature,
            RejectionReason::UnknownKey => Self::RejectedUnknownKey,
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rejection_reason() {
            None => f.write_str("accepted"),
            Some(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// Result of verifying one assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// The decision.
    pub outcome: VerificationOutcome,
    /// ID of the key the signature was checked against, if one was resolved.
    pub key_id: Option<String>,
    /// Instant the validity window was checked against.
    pub effective_time: DateTime<Utc>,
}

impl VerificationResult {
    /// Returns `true` if the assertion was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.outcome.is_accepted()
    }

    /// Returns the rejection reason, or `None` if accepted.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        self.outcome.rejection_reason()
    }
}

/// Last stage a verification completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VerificationStage {
    /// Nothing checked yet.
    Start,
    /// Key hint or candidate keys resolved.
    KeyResolved,
    /// Signature verified.
    SignatureChecked,
    /// Validity window checked.
    WindowChecked,
}

impl VerificationStage {
    /// Stable name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::KeyResolved => "key_resolved",
            Self::SignatureChecked => "signature_checked",
            Self::WindowChecked => "window_checked",
        }
    }
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs that shape key resolution.
#[derive(Clone, Copy, Debug)]
struct ResolveOptions {
    require_key_hint: bool,
    max_candidates: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { require_key_hint: false, max_candidates: DEFAULT_MAX_CANDIDATES }
    }
}

/// Carries one verification through its stages. Stages only move forward.
struct Verification<'a> {
    assertion: &'a Assertion,
    now: DateTime<Utc>,
    stage: VerificationStage,
    key_id: Option<String>,
    signature_checks: u64,
}

impl<'a> Verification<'a> {
    fn new(assertion: &'a Assertion, now: DateTime<Utc>) -> Self {
        Self { assertion, now, stage: VerificationStage::Start, key_id: None, signature_checks: 0 }
    }

    fn advance(&mut self, next: VerificationStage) {
        debug_assert!(next > self.stage, "verification stage moved backwards");
        self.stage = next;
    }

    fn resolve_keys(
        &mut self,
        locator: &(impl PublicKeyLocator + ?Sized),
        options: ResolveOptions,
    ) -> std::result::Result<Vec<TrustedKey>, RejectionReason> {
        let issuer = self.assertion.issuer();
        let keys = match self.assertion.signature().key_hint() {
            Some(kid) => locator.resolve(issuer, kid, self.now).map(|key| vec![key]),
            None if options.require_key_hint => {
                tracing::debug!("signature carries no key hint and one is required");
                return Err(RejectionReason::UnknownKey);
            },
            None => locator.candidates(issuer, self.now).map(|mut keys| {
                keys.truncate(options.max_candidates);
                keys
            }),
        };
        let keys = keys.map_err(|e| {
            tracing::debug!(error = %e, "key resolution failed");
            e.rejection_reason()
        })?;
        self.advance(VerificationStage::KeyResolved);
        Ok(keys)
    }

    fn check_signature(&mut self, keys: &[TrustedKey]) -> std::result::Result<(), RejectionReason> {
        let block = self.assertion.signature();
        for key in keys {
            self.signature_checks += 1;
            if key.key.verify(block.signed_content(), block.signature()) {
                self.key_id = Some(key.kid.clone());
                self.advance(VerificationStage::SignatureChecked);
                return Ok(());
            }
        }
        // A hinted lookup resolved exactly one key; report it even on failure.
        if block.key_hint().is_some() {
            self.key_id = keys.first().map(|k| k.kid.clone());
        }
        Err(RejectionReason::BadSignature)
    }

    fn check_window(&mut self, policy: &ClockSkewPolicy) -> std::result::Result<(), RejectionReason> {
        check_window(self.assertion.window(), policy, self.now)?;
        self.advance(VerificationStage::WindowChecked);
        Ok(())
    }

    fn run(
        &mut self,
        locator: &(impl PublicKeyLocator + ?Sized),
        policy: &ClockSkewPolicy,
        options: ResolveOptions,
    ) -> std::result::Result<(), RejectionReason> {
        let keys = self.resolve_keys(locator, options)?;
        self.check_signature(&keys)?;
        self.check_window(policy)
    }

    fn finish(self, decision: std::result::Result<(), RejectionReason>) -> VerificationResult {
        let outcome = match decision {
            Ok(()) => {
                tracing::debug!(
                    issuer = %self.assertion.issuer(),
                    kid = self.key_id.as_deref(),
                    subject = self.assertion.subject(),
                    "assertion accepted"
                );
                VerificationOutcome::Accepted
            },
            Err(reason) => {
                tracing::warn!(
                    issuer = %self.assertion.issuer(),
                    kid = self.key_id.as_deref(),
                    reason = %reason,
                    stage = %self.stage,
                    "assertion rejected"
                );
                VerificationOutcome::from(reason)
            },
        };
        VerificationResult { outcome, key_id: self.key_id, effective_time: self.now }
    }
}

#[tracing::instrument(
    name = "verify",
    skip_all,
    fields(issuer = %assertion.issuer(), kid = assertion.signature().key_hint())
)]
fn evaluate(
    assertion: &Assertion,
    locator: &(impl PublicKeyLocator + ?Sized),
    policy: &ClockSkewPolicy,
    options: ResolveOptions,
    now: DateTime<Utc>,
) -> (VerificationResult, u64) {
    let mut verification = Verification::new(assertion, now);
    let decision = verification.run(locator, policy, options);
    let checks = verification.signature_checks;
    (verification.finish(decision), checks)
}

/// Verifies `assertion` against the keys in `locator` at instant `now`.
///
/// Hint-less signatures are tried against up to
/// [`DEFAULT_MAX_CANDIDATES`] eligible keys. Use [`AssertionVerifier`] to
/// configure that bound, require key hints or collect metrics.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use ed25519_dalek::{Signer, SigningKey};
/// use samlsp_verify::{
///     Assertion, ClockSkewPolicy, IssuerId, PublicKeyMaterial, SignatureBlock, TrustedKey,
///     TrustedKeySet, ValidityWindow, VerificationOutcome, verify,
/// };
///
/// let signing_key = SigningKey::from_bytes(&[42u8; 32]);
/// let issuer = IssuerId::new("https://idp.example.com/realms/demo");
/// let keys = TrustedKeySet::default();
/// let trusted = TrustedKey::builder()
///     .kid("kid-1")
///     .key(PublicKeyMaterial::from(signing_key.verifying_key()))
///     .build();
/// keys.register(&issuer, trusted).unwrap();
///
/// let content = b"<saml:Assertion ID=\"_a1\">...</saml:Assertion>".to_vec();
/// let now = Utc::now();
/// let assertion = Assertion::builder()
///     .issuer(issuer)
///     .subject("bburke")
///     .window(ValidityWindow::starting_at(now, TimeDelta::seconds(60)))
///     .signature(
///         SignatureBlock::builder()
///             .key_hint("kid-1")
///             .signature(signing_key.sign(&content).to_bytes().to_vec())
///             .signed_content(content)
///             .build(),
///     )
///     .build();
///
/// let result = verify(&assertion, &keys, &ClockSkewPolicy::STRICT, now);
/// assert_eq!(result.outcome, VerificationOutcome::Accepted);
/// assert_eq!(result.key_id.as_deref(), Some("kid-1"));
/// ```
pub fn verify(
    assertion: &Assertion,
    locator: &(impl PublicKeyLocator + ?Sized),
    policy: &ClockSkewPolicy,
    now: DateTime<Utc>,
) -> VerificationResult {
    evaluate(assertion, locator, policy, ResolveOptions::default(), now).0
}

/// Configured verifier shared across requests.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct AssertionVerifier {
    locator: Arc<dyn PublicKeyLocator>,
    policy: ClockSkewPolicy,
    options: ResolveOptions,
    clock: Arc<dyn Clock>,
    metrics: Arc<VerificationMetrics>,
}

impl fmt::Debug for AssertionVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionVerifier")
            .field("policy", &self.policy)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl AssertionVerifier {
    /// Creates a verifier reading keys from `locator`.
    ///
    /// The config's `key_grace_period` applies to key sets built with
    /// [`TrustedKeySet::from_config`](crate::key_set::TrustedKeySet::from_config);
    /// the verifier itself uses the skew, hint and candidate settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`VerifierConfig::validate`].
    pub fn new(locator: Arc<dyn PublicKeyLocator>, config: &VerifierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            locator,
            policy: config.policy()?,
            options: ResolveOptions {
                require_key_hint: config.require_key_hint(),
                max_candidates: config.max_candidates(),
            },
            clock: Arc::new(SystemClock),
            metrics: Arc::new(VerificationMetrics::new()),
        })
    }

    /// Replaces the clock used by [`verify_now`](Self::verify_now).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares `metrics` with this verifier, e.g. across several verifiers.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<VerificationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Verifies `assertion` at instant `now`.
    pub fn verify(&self, assertion: &Assertion, now: DateTime<Utc>) -> VerificationResult {
        let (result, checks) =
            evaluate(assertion, self.locator.as_ref(), &self.policy, self.options, now);
        self.metrics.record(result.outcome);
        self.metrics.record_signature_checks(checks);
        result
    }

    /// Verifies `assertion` at the configured clock's current instant.
    pub fn verify_now(&self, assertion: &Assertion) -> VerificationResult {
        self.verify(assertion, self.clock.now())
    }

    /// Returns the clock-skew policy in use.
    #[must_use]
    pub fn policy(&self) -> &ClockSkewPolicy {
        &self.policy
    }

    /// Returns the verification counters.
    #[must_use]
    pub fn metrics(&self) -> &VerificationMetrics {
        &self.metrics
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone};
    use ed25519_dalek::SigningKey;
    use rstest::rstest;

    use super::*;
    use crate::{
        assert_outcome,
        assertion::{IssuerId, ValidityWindow},
        clock::FixedClock,
        key_set::TrustedKeySet,
        testutil::{generate_test_keypair, sign_assertion, tampered, trusted_key},
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn issuer() -> IssuerId {
        IssuerId::new("https://idp.example.com/realms/demo")
    }

    struct Fixture {
        keys: Arc<TrustedKeySet>,
        k1: SigningKey,
    }

    fn fixture() -> Fixture {
        let keys = Arc::new(TrustedKeySet::new(Duration::from_secs(3_600)).unwrap());
        let (k1, public) = generate_test_keypair();
        keys.register(&issuer(), trusted_key("k1", public)).unwrap();
        Fixture { keys, k1 }
    }

    fn signed(key: &SigningKey, kid: Option<&str>, window: ValidityWindow) -> Assertion {
        sign_assertion(key, &issuer(), kid, "bburke", window)
    }

    #[rstest]
    #[case::expired_after_offset(30, 3, 95, VerificationOutcome::RejectedExpired)]
    #[case::not_yet_valid_before_offset(30, 3, -65, VerificationOutcome::RejectedNotYetValid)]
    #[case::accepted_within_skew(60, 30, -10, VerificationOutcome::Accepted)]
    #[case::strict_inside(60, 0, 59, VerificationOutcome::Accepted)]
    fn test_window_outcomes(
        #[case] lifetime: i64,
        #[case] skew: u64,
        #[case] offset: i64,
        #[case] expected: VerificationOutcome,
    ) {
        let f = fixture();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(lifetime));
        let assertion = signed(&f.k1, Some("k1"), window);
        let policy = ClockSkewPolicy::from_secs(skew).unwrap();
        let now = t0() + TimeDelta::seconds(offset);

        let result = verify(&assertion, f.keys.as_ref(), &policy, now);
        assert_outcome!(result, expected);
        assert_eq!(result.key_id.as_deref(), Some("k1"));
        assert_eq!(result.effective_time, now);
    }

    #[test]
    fn test_tampered_content_is_bad_signature() {
        let f = fixture();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let assertion = tampered(&signed(&f.k1, Some("k1"), window), 0);

        let result = verify(&assertion, f.keys.as_ref(), &ClockSkewPolicy::STRICT, t0());
        assert_outcome!(result, VerificationOutcome::RejectedBadSignature);
        assert_eq!(result.key_id.as_deref(), Some("k1"));
    }

    #[test]
    fn test_signature_checked_before_window() {
        let f = fixture();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(30));
        let assertion = tampered(&signed(&f.k1, Some("k1"), window), 3);

        // Expired as well as forged: the forgery wins.
        let now = t0() + TimeDelta::hours(1);
        let result = verify(&assertion, f.keys.as_ref(), &ClockSkewPolicy::STRICT, now);
        assert_outcome!(result, VerificationOutcome::RejectedBadSignature);
    }

    #[test]
    fn test_unknown_kid_is_unknown_key() {
        let f = fixture();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let assertion = signed(&f.k1, Some("missing"), window);

        let result = verify(&assertion, f.keys.as_ref(), &ClockSkewPolicy::STRICT, t0());
        assert_outcome!(result, VerificationOutcome::RejectedUnknownKey);
        assert!(result.key_id.is_none());
    }

    #[test]
    fn test_unknown_issuer_is_unknown_key() {
        let f = fixture();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let assertion =
            sign_assertion(&f.k1, &IssuerId::new("https://other.example"), Some("k1"), "x", window);

        let result = verify(&assertion, f.keys.as_ref(), &ClockSkewPolicy::STRICT, t0());
        assert_outcome!(result, VerificationOutcome::RejectedUnknownKey);
    }

    #[test]
    fn test_malformed_signature_bytes_are_bad_signature() {
        let f = fixture();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let good = signed(&f.k1, Some("k1"), window);
        let assertion = Assertion::builder()
            .issuer(issuer())
            .subject("bburke")
            .window(window)
            .signature(
                crate::assertion::SignatureBlock::builder()
                    .key_hint("k1")
                    .signature(vec![0xde, 0xad])
                    .signed_content(good.signature().signed_content().to_vec())
                    .build(),
            )
            .build();

        let result = verify(&assertion, f.keys.as_ref(), &ClockSkewPolicy::STRICT, t0());
        assert_outcome!(result, VerificationOutcome::RejectedBadSignature);
    }

    #[test]
    fn test_malformed_window_is_expired() {
        let f = fixture();
        let window = ValidityWindow::new(t0(), t0() - TimeDelta::seconds(1));
        let assertion = signed(&f.k1, Some("k1"), window);

        let policy = ClockSkewPolicy::from_secs(60).unwrap();
        let result = verify(&assertion, f.keys.as_ref(), &policy, t0());
        assert_outcome!(result, VerificationOutcome::RejectedExpired);
    }

    #[test]
    fn test_hintless_uses_candidates() {
        let f = fixture();
        let (k2, public2) = generate_test_keypair();
        f.keys.rotate_at(&issuer(), trusted_key("k2", public2), t0()).unwrap();

        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let old = signed(&f.k1, None, window);
        let new = signed(&k2, None, window);
        let now = t0() + TimeDelta::seconds(10);

        let result = verify(&old, f.keys.as_ref(), &ClockSkewPolicy::STRICT, now);
        assert_outcome!(result, VerificationOutcome::Accepted);
        assert_eq!(result.key_id.as_deref(), Some("k1"));

        let result = verify(&new, f.keys.as_ref(), &ClockSkewPolicy::STRICT, now);
        assert_eq!(result.key_id.as_deref(), Some("k2"));
    }

    #[test]
    fn test_hintless_failure_reports_no_key() {
        let f = fixture();
        let (stranger, _) = generate_test_keypair();
        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let assertion = signed(&stranger, None, window);

        let result = verify(&assertion, f.keys.as_ref(), &ClockSkewPolicy::STRICT, t0());
        assert_outcome!(result, VerificationOutcome::RejectedBadSignature);
        assert!(result.key_id.is_none());
    }

    #[test]
    fn test_verifier_requires_hint() {
        let f = fixture();
        let config = VerifierConfig::builder().require_key_hint(true).build().unwrap();
        let verifier = AssertionVerifier::new(f.keys.clone(), &config).unwrap();

        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        let result = verifier.verify(&signed(&f.k1, None, window), t0());
        assert_outcome!(result, VerificationOutcome::RejectedUnknownKey);

        let result = verifier.verify(&signed(&f.k1, Some("k1"), window), t0());
        assert_outcome!(result, VerificationOutcome::Accepted);
    }

    #[test]
    fn test_verifier_max_candidates_bounds_trials() {
        let f = fixture();
        let (k2, public2) = generate_test_keypair();
        f.keys.rotate_at(&issuer(), trusted_key("k2", public2), t0()).unwrap();
        let config = VerifierConfig::builder().max_candidates(1).build().unwrap();
        let verifier = AssertionVerifier::new(f.keys.clone(), &config).unwrap();

        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(60));
        // Only the current key (k2) is tried.
        let result = verifier.verify(&signed(&f.k1, None, window), t0());
        assert_outcome!(result, VerificationOutcome::RejectedBadSignature);
        let result = verifier.verify(&signed(&k2, None, window), t0());
        assert_outcome!(result, VerificationOutcome::Accepted);

        assert_eq!(verifier.metrics().snapshot().signature_checks, 2);
    }

    #[test]
    fn test_verify_now_uses_clock_and_records_metrics() {
        let f = fixture();
        let clock = Arc::new(FixedClock::new(t0()));
        let config = VerifierConfig::builder().clock_skew(Duration::from_secs(3)).build().unwrap();
        let verifier = AssertionVerifier::new(f.keys.clone(), &config)
            .unwrap()
            .with_clock(clock.clone());

        let window = ValidityWindow::starting_at(t0(), TimeDelta::seconds(30));
        let assertion = signed(&f.k1, Some("k1"), window);

        assert_outcome!(verifier.verify_now(&assertion), VerificationOutcome::Accepted);
        clock.advance(TimeDelta::seconds(95));
        let result = verifier.verify_now(&assertion);
        assert_outcome!(result, VerificationOutcome::RejectedExpired);
        assert_eq!(result.effective_time, t0() + TimeDelta::seconds(95));

        let snapshot = verifier.metrics().snapshot();
        assert_eq!(snapshot.accepted, 1);
        assert_eq!(snapshot.rejected_expired, 1);
    }

    #[test]
    fn test_outcome_reason_round_trip() {
        for reason in [
            RejectionReason::Expired,
            RejectionReason::NotYetValid,
            RejectionReason::BadSignature,
            RejectionReason::UnknownKey,
        ] {
            assert_eq!(VerificationOutcome::from(reason).rejection_reason(), Some(reason));
        }
        assert_eq!(VerificationOutcome::Accepted.rejection_reason(), None);
        assert_eq!(VerificationOutcome::RejectedExpired.to_string(), "rejected: expired");
    }

    #[test]
    fn test_result_serializes_snake_case() {
        let result = VerificationResult {
            outcome: VerificationOutcome::RejectedNotYetValid,
            key_id: None,
            effective_time: t0(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "rejected_not_yet_valid");
    }
}
