// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, ops, time::Duration};

/// An absolute point in time, measured in microseconds from an epoch chosen
/// by the event loop.
///
/// Timestamps are only comparable with other timestamps of the same loop.
/// The largest representable value, [`Timestamp::MAX`], is used as the "never"
/// sentinel by schedulers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(any(feature = "generator", test), derive(bolero_generator::TypeGenerator))]
pub struct Timestamp(u64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            return write!(f, "Timestamp(never)");
        }
        let duration = self.as_duration();
        let micros = duration.subsec_micros();
        let secs = duration.as_secs() % 60;
        let mins = duration.as_secs() / 60 % 60;
        let hours = duration.as_secs() / 60 / 60;
        if micros != 0 {
            write!(f, "Timestamp({hours}:{mins:02}:{secs:02}.{micros:06})")
        } else {
            write!(f, "Timestamp({hours}:{mins:02}:{secs:02})")
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Timestamp {
    /// The epoch
    pub const ZERO: Self = Self(0);

    /// The "never" sentinel
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a `Timestamp` from a number of microseconds since the epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates a `Timestamp` from a [`Duration`] since the epoch
    ///
    /// Durations that cannot be represented saturate to [`Timestamp::MAX`].
    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
    }

    /// Returns the number of microseconds since the epoch
    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Returns the time since the epoch
    #[inline]
    pub const fn as_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }

    /// Returns true if this is the "never" sentinel
    #[inline]
    pub const fn is_never(self) -> bool {
        self.0 == u64::MAX
    }

    /// Returns true if the timestamp is at or before `current_time`
    #[inline]
    pub fn has_elapsed(self, current_time: Self) -> bool {
        self <= current_time
    }

    /// Returns the amount of time elapsed between `earlier` and `self`, or
    /// zero if `earlier` is later than `self`
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Adds a duration, returning `None` on overflow
    #[inline]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let micros = u64::try_from(duration.as_micros()).ok()?;
        self.0.checked_add(micros).map(Self)
    }

    /// Subtracts a duration, returning `None` on underflow
    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        let micros = u64::try_from(duration.as_micros()).ok()?;
        self.0.checked_sub(micros).map(Self)
    }

    /// Adds a duration, saturating at [`Timestamp::MAX`]
    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        self.checked_add(duration).unwrap_or(Self::MAX)
    }
}

impl ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl ops::AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        self.checked_sub(rhs).unwrap_or(Self::ZERO)
    }
}

impl ops::Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_test() {
        let ts = Timestamp::from_micros(1_000);
        assert_eq!(ts + Duration::from_millis(1), Timestamp::from_micros(2_000));
        assert_eq!(ts - Duration::from_millis(2), Timestamp::ZERO);
        assert_eq!(Timestamp::from_micros(3_000) - ts, Duration::from_millis(2));
        assert_eq!(ts - Timestamp::from_micros(3_000), Duration::ZERO);
    }

    #[test]
    fn never_saturates_test() {
        bolero::check!()
            .with_type::<(Timestamp, u32)>()
            .cloned()
            .for_each(|(ts, micros)| {
                let later = ts + Duration::from_micros(micros as u64);
                assert!(later >= ts);
                assert_eq!(
                    Timestamp::MAX + Duration::from_micros(micros as u64),
                    Timestamp::MAX
                );
            });
    }

    #[test]
    fn debug_test() {
        insta::assert_snapshot!(format!("{:?}", Timestamp::from_micros(3_723_000_001)), @"Timestamp(1:02:03.000001)");
        insta::assert_snapshot!(format!("{:?}", Timestamp::MAX), @"Timestamp(never)");
    }
}
