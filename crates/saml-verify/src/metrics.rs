//! Verification outcome counters.
//!
//! # Examples
//!
//! ```
//! use samlsp_verify::{VerificationMetrics, VerificationOutcome};
//!
//! let metrics = VerificationMetrics::new();
//! metrics.record(VerificationOutcome::Accepted);
//! metrics.record(VerificationOutcome::RejectedExpired);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.total(), 2);
//! assert_eq!(snapshot.rejected(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::verifier::VerificationOutcome;

/// Snapshot of verification metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct VerificationMetricsSnapshot {
    /// Accepted assertions.
    #[builder(default)]
    pub accepted: u64,
    /// Rejected as expired.
    #[builder(default)]
    pub rejected_expired: u64,
    /// Rejected as not yet valid.
    #[builder(default)]
    pub rejected_not_yet_valid: u64,
    /// Rejected for a signature no key verified.
    #[builder(default)]
    pub rejected_bad_signature: u64,
    /// Rejected for an unknown issuer or key.
    #[builder(default)]
    pub rejected_unknown_key: u64,
    /// Signature checks performed, across all candidate keys.
    #[builder(default)]
    pub signature_checks: u64,
}

impl VerificationMetricsSnapshot {
    /// Returns the total number of verifications.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected()
    }

    /// Returns the number of rejected verifications.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected_expired
            + self.rejected_not_yet_valid
            + self.rejected_bad_signature
            + self.rejected_unknown_key
    }

    /// Returns the rejection rate as a fraction (0.0 to 1.0).
    #[must_use]
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.rejected() as f64 / total as f64
    }
}

/// Lock-free counters updated by the verifier.
#[derive(Debug, Default)]
pub struct VerificationMetrics {
    accepted: AtomicU64,
    rejected_expired: AtomicU64,
    rejected_not_yet_valid: AtomicU64,
    rejected_bad_signature: AtomicU64,
    rejected_unknown_key: AtomicU64,
    signature_checks: AtomicU64,
}

impl VerificationMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one verification with the given outcome.
    pub fn record(&self, outcome: VerificationOutcome) {
        let counter = match outcome {
            VerificationOutcome::Accepted => &self.accepted,
            VerificationOutcome::RejectedExpired => &self.rejected_expired,
            VerificationOutcome::RejectedNotYetValid => &self.rejected_not_yet_valid,
            VerificationOutcome::RejectedBadSignature => &self.rejected_bad_signature,
            VerificationOutcome::RejectedUnknownKey => &self.rejected_unknown_key,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `n` signature checks.
    pub fn record_signature_checks(&self, n: u64) {
        self.signature_checks.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> VerificationMetricsSnapshot {
        VerificationMetricsSnapshot::builder()
            .accepted(self.accepted.load(Ordering::Relaxed))
            .rejected_expired(self.rejected_expired.load(Ordering::Relaxed))
            .rejected_not_yet_valid(self.rejected_not_yet_valid.load(Ordering::Relaxed))
            .rejected_bad_signature(self.rejected_bad_signature.load(Ordering::Relaxed))
            .rejected_unknown_key(self.rejected_unknown_key.load(Ordering::Relaxed))
            .signature_checks(self.signature_checks.load(Ordering::Relaxed))
            .build()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.accepted,
            &self.rejected_expired,
            &self.rejected_not_yet_valid,
            &self.rejected_bad_signature,
            &self.rejected_unknown_key,
            &self.signature_checks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
