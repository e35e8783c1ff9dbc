//! Key lookup for signature verification.
//!
//! The [`PublicKeyLocator`] trait is the seam between the verifier and
//! wherever trusted keys live. [`TrustedKeySet`] is the in-memory
//! implementation; adapters backed by metadata or a key store implement the
//! same trait.
//!
//! # Resolution rules
//!
//! | Signature carries | Lookup                 | Failure                          |
//! |-------------------|------------------------|----------------------------------|
//! | key hint          | [`resolve`]            | `UnknownIssuer` / `UnknownKey`   |
//! | no hint           | [`candidates`]         | `UnknownIssuer` / `NoEligibleKey`|
//!
//! A key is eligible when it is active at `now` and is either the issuer's
//! current key or was deactivated less than one grace period ago.
//!
//! [`resolve`]: PublicKeyLocator::resolve
//! [`candidates`]: PublicKeyLocator::candidates

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    assertion::IssuerId,
    error::{Result, VerifyError},
    key_set::{KeyEligibility, TrustedKey, TrustedKeySet},
};

/// Source of trusted keys for an issuer.
///
/// Implementations must return consistent results for a single call: a
/// concurrent rotation is either fully visible or not visible at all.
pub trait PublicKeyLocator: Send + Sync {
    /// Looks up the key named by a signature's key hint.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::UnknownIssuer`] if the issuer has no registered keys
    /// - [`VerifyError::UnknownKey`] if `kid` is not registered, is retired or is not yet active
    fn resolve(&self, issuer: &IssuerId, kid: &str, now: DateTime<Utc>) -> Result<TrustedKey>;

    /// Returns the keys to try for a hint-less signature, in trial order:
    /// the current key first, then in-grace keys from most recently
    /// deactivated to oldest.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::UnknownIssuer`] if the issuer has no registered keys
    /// - [`VerifyError::NoEligibleKey`] if none of the issuer's keys is eligible at `now`
    fn candidates(&self, issuer: &IssuerId, now: DateTime<Utc>) -> Result<Vec<TrustedKey>>;
}

impl PublicKeyLocator for TrustedKeySet {
    #[tracing::instrument(skip(self))]
    fn resolve(&self, issuer: &IssuerId, kid: &str, now: DateTime<Utc>) -> Result<TrustedKey> {
        let snapshot = self.snapshot(issuer).ok_or_else(|| VerifyError::unknown_issuer(issuer))?;
        let key = snapshot.get(kid).ok_or_else(|| VerifyError::unknown_key(kid))?;

        match key.eligibility(now, self.grace_period()) {
            KeyEligibility::Current | KeyEligibility::InGrace => Ok(key.clone()),
            state @ (KeyEligibility::NotYetActive | KeyEligibility::Retired) => {
                tracing::debug!(?state, "signing key not eligible");
                Err(VerifyError::unknown_key(kid))
            },
        }
    }

    #[tracing::instrument(skip(self))]
    fn candidates(&self, issuer: &IssuerId, now: DateTime<Utc>) -> Result<Vec<TrustedKey>> {
        let snapshot = self.snapshot(issuer).ok_or_else(|| VerifyError::unknown_issuer(issuer))?;
        let eligible = snapshot.eligible(now, self.grace_period());
        if eligible.is_empty() {
            return Err(VerifyError::no_eligible_key(issuer));
        }
        tracing::trace!(count = eligible.len(), "resolved candidate keys");
        Ok(eligible)
    }
}

impl<T: PublicKeyLocator + ?Sized> PublicKeyLocator for Arc<T> {
    fn resolve(&self, issuer: &IssuerId, kid: &str, now: DateTime<Utc>) -> Result<TrustedKey> {
        (**self).resolve(issuer, kid, now)
    }

    fn candidates(&self, issuer: &IssuerId, now: DateTime<Utc>) -> Result<Vec<TrustedKey>> {
        (**self).candidates(issuer, now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::testutil::{generate_test_keypair, trusted_key};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn issuer() -> IssuerId {
        IssuerId::new("https://idp.example.com/realms/demo")
    }

    fn key(kid: &str) -> TrustedKey {
        let (_, material) = generate_test_keypair();
        trusted_key(kid, material)
    }

    fn rotated_set() -> TrustedKeySet {
        let set = TrustedKeySet::new(Duration::from_secs(3_600)).unwrap();
        set.register(&issuer(), key("k1")).unwrap();
        set.rotate_at(&issuer(), key("k2"), t0()).unwrap();
        set
    }

    #[test]
    fn test_single_current_key_is_only_candidate() {
        let set = TrustedKeySet::default();
        let k = key("only");
        set.register(&issuer(), k.clone()).unwrap();

        let candidates = set.candidates(&issuer(), t0()).unwrap();
        assert_eq!(candidates, vec![k]);
    }

    #[test]
    fn test_resolve_current_and_grace_keys() {
        let set = rotated_set();
        let during_grace = t0() + TimeDelta::minutes(30);
        assert_eq!(set.resolve(&issuer(), "k2", during_grace).unwrap().kid, "k2");
        assert_eq!(set.resolve(&issuer(), "k1", during_grace).unwrap().kid, "k1");
    }

    #[test]
    fn test_resolve_retired_key_is_unknown() {
        let set = rotated_set();
        let after_grace = t0() + TimeDelta::hours(2);
        let result = set.resolve(&issuer(), "k1", after_grace);
        assert!(matches!(result, Err(VerifyError::UnknownKey { kid }) if kid == "k1"));
    }

    #[test]
    fn test_resolve_unregistered_kid() {
        let set = rotated_set();
        let result = set.resolve(&issuer(), "nope", t0());
        assert!(matches!(result, Err(VerifyError::UnknownKey { .. })));
    }

    #[test]
    fn test_unknown_issuer() {
        let set = rotated_set();
        let other = IssuerId::new("https://evil.example.com");
        assert!(matches!(
            set.resolve(&other, "k2", t0()),
            Err(VerifyError::UnknownIssuer { .. })
        ));
        assert!(matches!(set.candidates(&other, t0()), Err(VerifyError::UnknownIssuer { .. })));
    }

    #[test]
    fn test_resolve_not_yet_active_key() {
        let set = TrustedKeySet::default();
        let mut future = key("next");
        future.activated_at = t0() + TimeDelta::hours(1);
        set.register(&issuer(), future).unwrap();

        assert!(matches!(set.resolve(&issuer(), "next", t0()), Err(VerifyError::UnknownKey { .. })));
        assert!(matches!(set.candidates(&issuer(), t0()), Err(VerifyError::NoEligibleKey { .. })));
        assert!(set.resolve(&issuer(), "next", t0() + TimeDelta::hours(1)).is_ok());
    }

    #[test]
    fn test_candidates_shrink_after_grace() {
        let set = rotated_set();
        let during: Vec<String> = set
            .candidates(&issuer(), t0() + TimeDelta::minutes(30))
            .unwrap()
            .into_iter()
            .map(|k| k.kid)
            .collect();
        assert_eq!(during, vec!["k2", "k1"]);

        let after: Vec<String> = set
            .candidates(&issuer(), t0() + TimeDelta::hours(2))
            .unwrap()
            .into_iter()
            .map(|k| k.kid)
            .collect();
        assert_eq!(after, vec!["k2"]);
    }

    #[test]
    fn test_arc_locator_delegates() {
        let set: Arc<dyn PublicKeyLocator> = Arc::new(rotated_set());
        assert_eq!(set.resolve(&issuer(), "k2", t0()).unwrap().kid, "k2");
        assert_eq!(set.candidates(&issuer(), t0()).unwrap().len(), 2);
    }
}
