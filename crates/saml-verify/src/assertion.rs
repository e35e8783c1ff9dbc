//! Parsed assertion as handed over by the SAML binding layer.
//!
//! XML decoding and canonicalization happen upstream. By the time an
//! [`Assertion`] exists, the signed bytes have been canonicalized and the
//! `Conditions` timestamps parsed, so verification only compares bytes and
//! instants.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Identity provider entity ID (the assertion `<Issuer>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssuerId(String);

impl IssuerId {
    /// Wraps an entity ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IssuerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for IssuerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&IssuerId> for IssuerId {
    fn from(id: &IssuerId) -> Self {
        id.clone()
    }
}

impl fmt::Display for IssuerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `NotBefore` / `NotOnOrAfter` pair from the assertion conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// First instant at which the assertion is valid.
    pub not_before: DateTime<Utc>,
    /// First instant at which the assertion is no longer valid.
    pub not_on_or_after: DateTime<Utc>,
}

impl ValidityWindow {
    /// Creates a window from its two bounds. No ordering check is made here;
    /// see [`is_well_formed`](Self::is_well_formed).
    #[must_use]
    pub const fn new(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Self {
        Self { not_before, not_on_or_after }
    }

    /// Creates a window opening at `start` and lasting `lifetime`.
    ///
    /// Saturates at the maximum representable instant.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, lifetime: TimeDelta) -> Self {
        let end = start.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(start, end)
    }

    /// Returns `true` when `not_before <= not_on_or_after`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.not_before <= self.not_on_or_after
    }
}

/// The `<ds:Signature>` of an assertion, reduced to what verification needs.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct SignatureBlock {
    /// Key identifier from `<ds:KeyInfo>`, if the issuer sent one.
    #[builder(into)]
    key_hint: Option<String>,
    /// Raw signature value.
    #[builder(into)]
    signature: Vec<u8>,
    /// Canonicalized bytes the signature covers.
    #[builder(into)]
    signed_content: Vec<u8>,
}

impl SignatureBlock {
    /// Returns the key identifier hint, if any.
    #[must_use]
    pub fn key_hint(&self) -> Option<&str> {
        self.key_hint.as_deref()
    }

    /// Returns the raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the signed content.
    #[must_use]
    pub fn signed_content(&self) -> &[u8] {
        &self.signed_content
    }
}

/// A parsed, signed assertion. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct Assertion {
    /// Asserting party.
    #[builder(into)]
    issuer: IssuerId,
    /// Authenticated principal (`<Subject><NameID>`).
    #[builder(into)]
    subject: String,
    /// Temporal validity window.
    window: ValidityWindow,
    /// Signature over the assertion.
    signature: SignatureBlock,
}

impl Assertion {
    /// Returns the issuer.
    #[must_use]
    pub fn issuer(&self) -> &IssuerId {
        &self.issuer
    }

    /// Returns the subject principal.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the validity window.
    #[must_use]
    pub fn window(&self) -> &ValidityWindow {
        &self.window
    }

    /// Returns the signature block.
    #[must_use]
    pub fn signature(&self) -> &SignatureBlock {
        &self.signature
    }
}
