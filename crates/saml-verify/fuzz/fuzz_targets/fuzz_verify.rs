//! Structured fuzz target for assertion verification.
//!
//! Builds a key set with a rotated-out and a current key, then feeds
//! arbitrary assertions through `verify`: genuine signatures over shifted
//! windows, corrupted content, and raw signature bytes. Verification must
//! never panic, and an accepted assertion must always name the key used.

#![no_main]

use arbitrary::Arbitrary;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use samlsp_verify::{
    Assertion, ClockSkewPolicy, IssuerId, PublicKeyMaterial, SignatureBlock, TrustedKeySet,
    ValidityWindow, VerificationOutcome,
    testutil::{SigningKey, sign_assertion, tampered, trusted_key},
    verify,
};

/// Which kind of signature the fuzzed assertion carries.
#[derive(Debug, Arbitrary)]
enum FuzzedSignature {
    /// Signed by the rotated-out key.
    Previous,
    /// Signed by the current key.
    Current,
    /// Signed by the current key, then one content byte flipped.
    Tampered(usize),
    /// Arbitrary bytes over arbitrary content.
    Raw { signature: Vec<u8>, content: Vec<u8> },
}

/// Structured input representing a fuzzed assertion and verification instant.
#[derive(Debug, Arbitrary)]
struct FuzzedAssertion {
    /// Key hint, if any.
    kid: Option<String>,
    /// Use a hint naming a registered key instead of `kid`.
    known_kid: Option<bool>,
    subject: String,
    /// `NotBefore` offset from the fixed base instant, in seconds.
    not_before: i32,
    /// Window length in seconds; negative values yield a malformed window.
    lifetime: i32,
    /// Verification instant offset from the base instant, in seconds.
    now: i32,
    /// Clock-skew tolerance in seconds.
    skew: u16,
    signature: FuzzedSignature,
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fuzz_target!(|input: FuzzedAssertion| {
    let issuer = IssuerId::new("https://idp.example.com/realms/fuzz");
    let previous = signing_key(1);
    let current = signing_key(2);

    let keys = TrustedKeySet::default();
    keys.register(&issuer, trusted_key("prev", PublicKeyMaterial::from(previous.verifying_key())))
        .expect("register previous key");
    keys.rotate_at(
        &issuer,
        trusted_key("curr", PublicKeyMaterial::from(current.verifying_key())),
        base(),
    )
    .expect("rotate to current key");

    let not_before = base() + TimeDelta::seconds(i64::from(input.not_before));
    let window = ValidityWindow::new(
        not_before,
        not_before + TimeDelta::seconds(i64::from(input.lifetime)),
    );
    let kid = match input.known_kid {
        Some(true) => Some("curr".to_owned()),
        Some(false) => Some("prev".to_owned()),
        None => input.kid,
    };

    let assertion = match input.signature {
        FuzzedSignature::Previous => {
            sign_assertion(&previous, &issuer, kid.as_deref(), &input.subject, window)
        },
        FuzzedSignature::Current => {
            sign_assertion(&current, &issuer, kid.as_deref(), &input.subject, window)
        },
        FuzzedSignature::Tampered(index) => tampered(
            &sign_assertion(&current, &issuer, kid.as_deref(), &input.subject, window),
            index,
        ),
        FuzzedSignature::Raw { signature, content } => Assertion::builder()
            .issuer(&issuer)
            .subject(input.subject)
            .window(window)
            .signature(
                SignatureBlock::builder()
                    .maybe_key_hint(kid)
                    .signature(signature)
                    .signed_content(content)
                    .build(),
            )
            .build(),
    };

    let Ok(policy) = ClockSkewPolicy::from_secs(u64::from(input.skew)) else {
        return;
    };
    let now = base() + TimeDelta::seconds(i64::from(input.now));
    let result = verify(&assertion, &keys, &policy, now);

    assert_eq!(result.effective_time, now);
    if result.outcome == VerificationOutcome::Accepted {
        assert!(result.key_id.is_some());
        assert!(window.is_well_formed());
    }
});
