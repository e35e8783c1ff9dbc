//! Clock-skew tolerant validity window checks.
//!
//! The tolerance widens both ends of the window symmetrically:
//!
//! ```text
//!   not_before - skew            not_on_or_after + skew
//!         [─────────────────────────────)
//!   NotYetValid        valid              Expired
//! ```
//!
//! The lower bound is inclusive and the upper bound exclusive, matching
//! `NotOnOrAfter`. All checks take the current instant as an argument, so a
//! shifted clock (see [`crate::clock::OffsetClock`]) and genuine drift are
//! handled the same way.
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeDelta, TimeZone, Utc};
//! use samlsp_verify::{ClockSkewPolicy, ValidityWindow, WindowViolation, check_window};
//!
//! let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let window = ValidityWindow::starting_at(t, TimeDelta::seconds(30));
//! let policy = ClockSkewPolicy::from_secs(3).unwrap();
//!
//! assert_eq!(check_window(&window, &policy, t + TimeDelta::seconds(95)), Err(WindowViolation::Expired));
//! assert_eq!(check_window(&window, &policy, t - TimeDelta::seconds(65)), Err(WindowViolation::NotYetValid));
//! ```

use std::{fmt, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    assertion::ValidityWindow,
    error::{RejectionReason, Result, VerifyError},
};

/// Largest tolerance accepted by [`ClockSkewPolicy::new`] (1 day).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(86_400);

/// Tolerance applied to both bounds of an assertion validity window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockSkewPolicy {
    tolerance: TimeDelta,
}

impl ClockSkewPolicy {
    /// No tolerance: the window is checked as-is.
    pub const STRICT: Self = Self { tolerance: TimeDelta::zero() };

    /// Creates a policy with the given tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidClockSkew`] if `tolerance` exceeds
    /// [`MAX_CLOCK_SKEW`].
    pub fn new(tolerance: Duration) -> Result<Self> {
        if tolerance > MAX_CLOCK_SKEW {
            return Err(VerifyError::invalid_clock_skew(format!(
                "{}s exceeds the maximum of {}s",
                tolerance.as_secs(),
                MAX_CLOCK_SKEW.as_secs()
            )));
        }
        let tolerance = TimeDelta::from_std(tolerance)
            .map_err(|e| VerifyError::invalid_clock_skew(e.to_string()))?;
        Ok(Self { tolerance })
    }

    /// Creates a policy with a tolerance in whole seconds.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_secs(secs: u64) -> Result<Self> {
        Self::new(Duration::from_secs(secs))
    }

    /// Creates a policy from a signed delta, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidClockSkew`] if `tolerance` is negative or
    /// exceeds [`MAX_CLOCK_SKEW`].
    pub fn from_delta(tolerance: TimeDelta) -> Result<Self> {
        let tolerance = tolerance
            .to_std()
            .map_err(|_| VerifyError::invalid_clock_skew("tolerance must not be negative"))?;
        Self::new(tolerance)
    }

    /// Returns the tolerance.
    #[must_use]
    pub fn tolerance(&self) -> TimeDelta {
        self.tolerance
    }
}

/// Which side of the tolerant window an instant fell on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowViolation {
    /// At or past the skew-extended upper bound, or the window is malformed.
    Expired,
    /// Before the skew-extended lower bound.
    NotYetValid,
}

impl From<WindowViolation> for RejectionReason {
    fn from(violation: WindowViolation) -> Self {
        match violation {
            WindowViolation::Expired => RejectionReason::Expired,
            WindowViolation::NotYetValid => RejectionReason::NotYetValid,
        }
    }
}

impl fmt::Display for WindowViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        RejectionReason::from(*self).fmt(f)
    }
}

/// Skew-extended bounds, `[lower, upper)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectiveWindow {
    /// Inclusive lower bound.
    pub lower: DateTime<Utc>,
    /// Exclusive upper bound.
    pub upper: DateTime<Utc>,
}

impl EffectiveWindow {
    /// Computes the tolerant bounds of `window`, saturating at the
    /// representable range. Returns `None` for a malformed window.
    #[must_use]
    pub fn of(window: &ValidityWindow, policy: &ClockSkewPolicy) -> Option<Self> {
        if !window.is_well_formed() {
            return None;
        }
        let lower = window
            .not_before
            .checked_sub_signed(policy.tolerance)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let upper = window
            .not_on_or_after
            .checked_add_signed(policy.tolerance)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(Self { lower, upper })
    }
}

/// Checks `now` against the tolerant window.
///
/// A malformed window (`not_before > not_on_or_after`) is never valid and
/// reports [`WindowViolation::Expired`].
///
/// # Errors
///
/// Returns the side of the window `now` fell outside of.
pub fn check_window(
    window: &ValidityWindow,
    policy: &ClockSkewPolicy,
    now: DateTime<Utc>,
) -> std::result::Result<(), WindowViolation> {
    let Some(bounds) = EffectiveWindow::of(window, policy) else {
        return Err(WindowViolation::Expired);
    };

    if now < bounds.lower {
        return Err(WindowViolation::NotYetValid);
    }
    if now >= bounds.upper {
        return Err(WindowViolation::Expired);
    }
    Ok(())
}

/// Returns `true` if `now` lies inside the tolerant window.
#[must_use]
pub fn is_within_window(
    window: &ValidityWindow,
    policy: &ClockSkewPolicy,
    now: DateTime<Utc>,
) -> bool {
    check_window(window, policy, now).is_ok()
}
