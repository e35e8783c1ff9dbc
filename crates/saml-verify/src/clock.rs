//! Time sources for verification.
//!
//! The validator itself never reads the wall clock. [`AssertionVerifier`]
//! asks a [`Clock`] for "now" only in [`verify_now`]; tests and adapters that
//! need to shift time (the adapter and the identity provider moved forward or
//! back together) wrap a clock in an [`OffsetClock`].
//!
//! [`AssertionVerifier`]: crate::verifier::AssertionVerifier
//! [`verify_now`]: crate::verifier::AssertionVerifier::verify_now

use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Source of the current instant.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `instant`.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant: Mutex::new(instant) }
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock() = instant;
    }

    /// Moves the clock by `delta`, saturating at the representable range.
    pub fn advance(&self, delta: TimeDelta) {
        let mut instant = self.instant.lock();
        *instant = saturating_add(*instant, delta);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock()
    }
}

/// Wraps another clock and shifts it by a signed number of seconds.
///
/// The offset can be changed at any time from any thread; readers see either
/// the old or the new offset.
#[derive(Debug, Default)]
pub struct OffsetClock<C = SystemClock> {
    inner: C,
    offset_secs: AtomicI64,
}

impl<C: Clock> OffsetClock<C> {
    /// Wraps `inner` with a zero offset.
    pub fn new(inner: C) -> Self {
        Self { inner, offset_secs: AtomicI64::new(0) }
    }

    /// Sets the offset in seconds. Negative values move the clock back.
    pub fn set_offset(&self, secs: i64) {
        let previous = self.offset_secs.swap(secs, Ordering::AcqRel);
        if previous != secs {
            tracing::debug!(previous, offset_secs = secs, "clock offset changed");
        }
    }

    /// Returns the current offset in seconds.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset_secs.load(Ordering::Acquire)
    }
}

impl<C: Clock> Clock for OffsetClock<C> {
    fn now(&self) -> DateTime<Utc> {
        let base = self.inner.now();
        let secs = self.offset();
        match TimeDelta::try_seconds(secs) {
            Some(delta) => saturating_add(base, delta),
            None if secs < 0 => DateTime::<Utc>::MIN_UTC,
            None => DateTime::<Utc>::MAX_UTC,
        }
    }
}

fn saturating_add(instant: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    instant.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
