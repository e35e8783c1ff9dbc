//! Trusted signing keys per issuer, with rotation and grace periods.
//!
//! # Key Lifecycle
//!
//! ```text
//! ┌─────────────┐  rotate   ┌─────────────┐  grace elapsed  ┌─────────────┐
//! │   Current   │──────────►│  In grace   │────────────────►│   Retired   │
//! │ (no deact.) │           │ (deact. set)│                 │  (purged)   │
//! └─────────────┘           └─────────────┘                 └─────────────┘
//! ```
//!
//! Each issuer maps to an immutable, ordered key list behind an [`Arc`].
//! Mutations build a new list and swap the [`Arc`] in under a short write
//! lock, so a reader holding a [`KeySnapshot`] never sees a half-applied
//! rotation. At most one mutation per issuer runs at a time; a concurrent
//! attempt fails with [`VerifyError::RotationInProgress`] and leaves the
//! published list untouched.
//!
//! # Examples
//!
//! ```
//! use samlsp_verify::{IssuerId, TrustedKey, TrustedKeySet, PublicKeyMaterial};
//! # use ed25519_dalek::SigningKey;
//! # let old = PublicKeyMaterial::from(SigningKey::from_bytes(&[7u8; 32]).verifying_key());
//! # let new = PublicKeyMaterial::from(SigningKey::from_bytes(&[8u8; 32]).verifying_key());
//!
//! let keys = TrustedKeySet::default();
//! let issuer = IssuerId::new("https://idp.example.com/realms/demo");
//!
//! keys.register(&issuer, TrustedKey::builder().kid("2024-01").key(old).build()).unwrap();
//! keys.rotate(&issuer, TrustedKey::builder().kid("2024-02").key(new).build()).unwrap();
//!
//! let snapshot = keys.snapshot(&issuer).unwrap();
//! assert_eq!(snapshot.current().map(|k| k.kid.as_str()), Some("2024-02"));
//! assert_eq!(snapshot.len(), 2);
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
    time::Duration,
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, Signature, VerifyingKey};
use parking_lot::{Mutex, RwLock};
use zeroize::Zeroizing;

use crate::{
    assertion::IssuerId,
    config::VerifierConfig,
    error::{Result, VerifyError},
};

/// Default grace period for deactivated keys (1 hour).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3_600);

/// Ed25519 public key used to check assertion signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial(VerifyingKey);

impl PublicKeyMaterial {
    /// Parses a raw 32-byte Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidPublicKey`] on wrong length or an
    /// invalid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key_bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            VerifyError::invalid_public_key(format!(
                "expected {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        VerifyingKey::from_bytes(&key_bytes)
            .map(Self)
            .map_err(|e| VerifyError::invalid_public_key(format!("invalid Ed25519 key: {e}")))
    }

    /// Parses a base64url (no padding) encoded Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidPublicKey`] if decoding fails or the
    /// decoded bytes are not a valid key.
    pub fn from_base64url(encoded: &str) -> Result<Self> {
        let decoded: Zeroizing<Vec<u8>> = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(encoded.as_bytes())
                .map_err(|e| VerifyError::invalid_public_key(format!("base64 decode: {e}")))?,
        );
        Self::from_bytes(&decoded)
    }

    /// Encodes the key as base64url without padding.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Returns the underlying verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// Checks `signature` over `message`.
    ///
    /// Malformed signature bytes verify as `false`. Uses strict verification,
    /// which rejects small-order keys and non-canonical signatures.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.0.verify_strict(message, &signature).is_ok()
    }
}

impl From<VerifyingKey> for PublicKeyMaterial {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKeyMaterial").field(&self.to_base64url()).finish()
    }
}

/// Where a key stands at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEligibility {
    /// The issuer's signing key, no deactivation time.
    Current,
    /// Deactivated, but still inside the grace period.
    InGrace,
    /// Activation time is still in the future.
    NotYetActive,
    /// Deactivated and past the grace period.
    Retired,
}

impl KeyEligibility {
    /// Returns `true` for [`Current`](Self::Current) and [`InGrace`](Self::InGrace).
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Current | Self::InGrace)
    }
}

/// A signing key trusted for one issuer.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct TrustedKey {
    /// Key ID, matched against the signature's key hint.
    #[builder(into)]
    pub kid: String,
    /// Public key material.
    pub key: PublicKeyMaterial,
    /// When the key starts being accepted. Defaults to the earliest
    /// representable instant; set it only for pre-published keys.
    #[builder(default = DateTime::<Utc>::MIN_UTC)]
    pub activated_at: DateTime<Utc>,
    /// When the key was rotated out. `None` for the current key.
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl TrustedKey {
    /// Returns `true` if the key has not been rotated out.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.deactivated_at.is_none()
    }

    /// Classifies the key at `now` under the given grace period.
    #[must_use]
    pub fn eligibility(&self, now: DateTime<Utc>, grace: TimeDelta) -> KeyEligibility {
        if now < self.activated_at {
            return KeyEligibility::NotYetActive;
        }
        match self.deactivated_at {
            None => KeyEligibility::Current,
            Some(deactivated_at) => match deactivated_at.checked_add_signed(grace) {
                Some(grace_end) if now >= grace_end => KeyEligibility::Retired,
                _ => KeyEligibility::InGrace,
            },
        }
    }
}

/// An immutable view of one issuer's keys, in registration order.
#[derive(Clone, Debug)]
pub struct KeySnapshot(Arc<Vec<TrustedKey>>);

impl KeySnapshot {
    /// Returns the current key, if one is registered.
    #[must_use]
    pub fn current(&self) -> Option<&TrustedKey> {
        self.0.iter().rev().find(|k| k.is_current())
    }

    /// Looks a key up by ID.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&TrustedKey> {
        self.0.iter().find(|k| k.kid == kid)
    }

    /// Iterates keys in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TrustedKey> {
        self.0.iter()
    }

    /// Number of keys, current and deactivated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Eligible keys at `now` in trial order: the current key first, then
    /// keys in grace from most recently deactivated to oldest.
    #[must_use]
    pub fn eligible(&self, now: DateTime<Utc>, grace: TimeDelta) -> Vec<TrustedKey> {
        let mut eligible: Vec<TrustedKey> =
            self.0.iter().filter(|k| k.eligibility(now, grace).is_eligible()).cloned().collect();
        // `None` (current) sorts above any deactivation time.
        eligible.sort_by(|a, b| match (a.deactivated_at, b.deactivated_at) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(a), Some(b)) => b.cmp(&a),
        });
        eligible
    }
}

/// Trusted signing keys for every known issuer.
///
/// Shared by reference across verification calls. See the
/// [module docs](self) for the concurrency model.
pub struct TrustedKeySet {
    /// Published key lists. Each list is replaced wholesale, never edited.
    issuers: RwLock<HashMap<IssuerId, Arc<Vec<TrustedKey>>>>,
    /// Issuers with a mutation in flight.
    mutating: Mutex<HashSet<IssuerId>>,
    /// How long a deactivated key keeps verifying.
    grace_period: TimeDelta,
}

impl Default for TrustedKeySet {
    fn default() -> Self {
        Self::with_grace(TimeDelta::seconds(DEFAULT_GRACE_PERIOD.as_secs() as i64))
    }
}

impl fmt::Debug for TrustedKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedKeySet")
            .field("issuers", &self.issuers.read().len())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

/// Marks an issuer as being mutated until dropped.
struct MutationGuard<'a> {
    set: &'a TrustedKeySet,
    issuer: IssuerId,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.set.mutating.lock().remove(&self.issuer);
    }
}

impl TrustedKeySet {
    /// Creates an empty key set.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidConfig`] if the grace period does not fit
    /// a signed time delta.
    pub fn new(grace_period: Duration) -> Result<Self> {
        let grace = TimeDelta::from_std(grace_period)
            .map_err(|e| VerifyError::invalid_config(format!("key grace period: {e}")))?;
        Ok(Self::with_grace(grace))
    }

    /// Creates an empty key set using the config's `key_grace_period`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.key_grace_period())
    }

    fn with_grace(grace_period: TimeDelta) -> Self {
        Self {
            issuers: RwLock::new(HashMap::new()),
            mutating: Mutex::new(HashSet::new()),
            grace_period,
        }
    }

    /// Returns the grace period applied to deactivated keys.
    #[must_use]
    pub fn grace_period(&self) -> TimeDelta {
        self.grace_period
    }

    /// Returns a consistent view of `issuer`'s keys.
    #[must_use]
    pub fn snapshot(&self, issuer: &IssuerId) -> Option<KeySnapshot> {
        self.issuers.read().get(issuer).map(|keys| KeySnapshot(Arc::clone(keys)))
    }

    /// Number of issuers with registered keys.
    #[must_use]
    pub fn issuer_count(&self) -> usize {
        self.issuers.read().len()
    }

    /// Adds a key for `issuer` without touching existing keys.
    ///
    /// Used to bootstrap trust, or to load keys that were already rotated
    /// out (with a deactivation time) so they keep verifying during grace.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::DuplicateKey`] if the key ID is already registered
    /// - [`VerifyError::CurrentKeyExists`] if `key` has no deactivation time and the issuer
    ///   already has a current key
    /// - [`VerifyError::RotationInProgress`] if another mutation for `issuer` is running
    #[tracing::instrument(skip(self, key), fields(kid = %key.kid))]
    pub fn register(&self, issuer: &IssuerId, key: TrustedKey) -> Result<()> {
        let _guard = self.begin_mutation(issuer)?;
        let mut keys = self.current_list(issuer);

        if keys.iter().any(|k| k.kid == key.kid) {
            return Err(VerifyError::duplicate_key(key.kid));
        }
        if key.is_current() && keys.iter().any(TrustedKey::is_current) {
            return Err(VerifyError::current_key_exists(issuer));
        }

        let resource = format!("issuer:{issuer}/kid:{}", key.kid);
        keys.push(key);
        self.publish(issuer, keys);

        tracing::info!(
            audit.action = "register_signing_key",
            audit.resource = %resource,
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Rotates `issuer` to `new_key`, deactivating the current key now.
    ///
    /// # Errors
    ///
    /// See [`rotate_at`](Self::rotate_at).
    pub fn rotate(&self, issuer: &IssuerId, new_key: TrustedKey) -> Result<()> {
        self.rotate_at(issuer, new_key, Utc::now())
    }

    /// Rotates `issuer` to `new_key`, deactivating the current key at `now`.
    ///
    /// `new_key` becomes the current key; any deactivation time it carries is
    /// cleared. The previous current key stays verifiable for the grace period.
    /// Rotating an issuer with no keys registers `new_key` as its first key.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::DuplicateKey`] if `new_key`'s ID is already registered
    /// - [`VerifyError::RotationInProgress`] if another mutation for `issuer` is running
    ///
    /// On error the published key list is unchanged.
    #[tracing::instrument(skip(self, new_key), fields(kid = %new_key.kid))]
    pub fn rotate_at(
        &self,
        issuer: &IssuerId,
        mut new_key: TrustedKey,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.begin_mutation(issuer)?;
        let mut keys = self.current_list(issuer);

        let resource = format!("issuer:{issuer}/kid:{}", new_key.kid);
        if keys.iter().any(|k| k.kid == new_key.kid) {
            tracing::info!(
                audit.action = "rotate_signing_key",
                audit.resource = %resource,
                audit.result = "duplicate_kid",
                "audit_event"
            );
            return Err(VerifyError::duplicate_key(new_key.kid));
        }

        let mut retired = None;
        for key in keys.iter_mut().filter(|k| k.is_current()) {
            key.deactivated_at = Some(now);
            retired = Some(key.kid.clone());
        }

        new_key.deactivated_at = None;
        keys.push(new_key);
        self.publish(issuer, keys);

        tracing::info!(
            audit.action = "rotate_signing_key",
            audit.resource = %resource,
            audit.result = "success",
            previous_kid = retired.as_deref().unwrap_or("-"),
            "audit_event"
        );
        Ok(())
    }

    /// Drops keys whose grace period ended before `now`.
    ///
    /// Issuers left without keys are removed. Issuers with a mutation in
    /// flight are skipped and picked up by the next purge. Returns the number
    /// of keys removed.
    #[tracing::instrument(skip(self))]
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let issuers: Vec<IssuerId> = self.issuers.read().keys().cloned().collect();
        let mut removed = 0;

        for issuer in issuers {
            let Ok(_guard) = self.begin_mutation(&issuer) else {
                tracing::debug!(%issuer, "purge skipped: mutation in flight");
                continue;
            };
            let keys = self.current_list(&issuer);
            let before = keys.len();
            let kept: Vec<TrustedKey> = keys
                .into_iter()
                .filter(|k| k.eligibility(now, self.grace_period) != KeyEligibility::Retired)
                .collect();
            if kept.len() == before {
                continue;
            }
            removed += before - kept.len();
            if kept.is_empty() {
                self.issuers.write().remove(&issuer);
            } else {
                self.publish(&issuer, kept);
            }
        }

        if removed > 0 {
            tracing::info!(
                audit.action = "purge_signing_keys",
                audit.resource = "retired_signing_keys",
                audit.result = "success",
                audit.removed = removed,
                "audit_event"
            );
        }
        removed
    }

    fn begin_mutation(&self, issuer: &IssuerId) -> Result<MutationGuard<'_>> {
        if !self.mutating.lock().insert(issuer.clone()) {
            return Err(VerifyError::rotation_in_progress(issuer));
        }
        Ok(MutationGuard { set: self, issuer: issuer.clone() })
    }

    /// Copies the published list for editing. Only call under a mutation guard.
    fn current_list(&self, issuer: &IssuerId) -> Vec<TrustedKey> {
        self.issuers.read().get(issuer).map(|keys| keys.as_ref().clone()).unwrap_or_default()
    }

    fn publish(&self, issuer: &IssuerId, keys: Vec<TrustedKey>) {
        self.issuers.write().insert(issuer.clone(), Arc::new(keys));
    }
}

/// Rotates `issuer` in `key_set` to `new_key`. See [`TrustedKeySet::rotate`].
///
/// # Errors
///
/// See [`TrustedKeySet::rotate_at`].
pub fn rotate(key_set: &TrustedKeySet, issuer: &IssuerId, new_key: TrustedKey) -> Result<()> {
    key_set.rotate(issuer, new_key)
}
