//! Time bases and timestamps.
//!
//! Every timing field on a [`crate::Buffer`] is an integer tick count paired
//! with the rational [`TimeBase`] it is expressed in. Unknown values use the
//! [`Timestamp::NONE`] sentinel.

use crate::error::Result;
use crate::rational::Rational;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A time base: the duration of one tick, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBase(pub Rational);

impl TimeBase {
    /// Create a new time base from numerator and denominator.
    pub fn new(num: i64, den: i64) -> Self {
        Self(Rational::new(num, den))
    }

    /// Standard MPEG time base (1/90000).
    pub const MPEG: Self = Self(Rational { num: 1, den: 90000 });

    /// Millisecond time base (1/1000).
    pub const MILLISECONDS: Self = Self(Rational { num: 1, den: 1000 });

    /// Microsecond time base (1/1000000).
    pub const MICROSECONDS: Self = Self(Rational { num: 1, den: 1_000_000 });

    /// Time base with one tick per sample at `sample_rate`.
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self::new(1, i64::from(sample_rate.max(1)))
    }

    /// Convert a tick count from this time base to another.
    pub fn convert(&self, value: i64, target: TimeBase) -> i64 {
        if value == Timestamp::NONE {
            return Timestamp::NONE;
        }
        self.0.rescale(value, target.0)
    }

    /// Convert to seconds as f64.
    pub fn to_seconds(&self, value: i64) -> f64 {
        value as f64 * self.0.to_f64()
    }

    /// Get the time base as a rational.
    pub fn as_rational(&self) -> Rational {
        self.0
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MPEG
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TimeBase {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let r: Rational = s.parse()?;
        if !r.is_positive() {
            return Err(crate::error::Error::invalid_config(format!(
                "time base must be positive, got {r}"
            )));
        }
        Ok(Self(r))
    }
}

impl From<Rational> for TimeBase {
    fn from(r: Rational) -> Self {
        Self(r)
    }
}

/// A timestamp with an associated time base.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    /// The raw tick value, or [`Timestamp::NONE`].
    pub value: i64,
    /// The time base for interpreting the value.
    pub time_base: TimeBase,
}

impl Timestamp {
    /// Value representing an unknown timestamp.
    pub const NONE: i64 = i64::MIN;

    /// Create a new timestamp.
    pub fn new(value: i64, time_base: TimeBase) -> Self {
        Self { value, time_base }
    }

    /// Create an unknown timestamp.
    pub fn none() -> Self {
        Self {
            value: Self::NONE,
            time_base: TimeBase::default(),
        }
    }

    /// Check if this timestamp is known.
    pub fn is_valid(&self) -> bool {
        self.value != Self::NONE
    }

    /// Convert to a different time base. Unknown stays unknown.
    pub fn rescale(&self, target: TimeBase) -> Self {
        if !self.is_valid() {
            return Self {
                value: Self::NONE,
                time_base: target,
            };
        }
        Self {
            value: self.time_base.convert(self.value, target),
            time_base: target,
        }
    }

    /// Shift by `ticks` in this timestamp's own time base. Unknown stays unknown.
    pub fn offset(&self, ticks: i64) -> Self {
        if !self.is_valid() {
            return *self;
        }
        Self {
            value: self.value.saturating_add(ticks),
            time_base: self.time_base,
        }
    }

    /// Convert to seconds.
    pub fn to_seconds(&self) -> Option<f64> {
        self.is_valid().then(|| self.time_base.to_seconds(self.value))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::none()
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Unknown timestamps order before every known one.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (true, true) => {
                let a = self.time_base.0;
                let b = other.time_base.0;
                let lhs = self.value as i128 * a.num as i128 * b.den as i128;
                let rhs = other.value as i128 * b.num as i128 * a.den as i128;
                lhs.cmp(&rhs)
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}@{}", self.value, self.time_base)
        } else {
            write!(f, "NONE")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_base_convert() {
        assert_eq!(TimeBase::MILLISECONDS.convert(1000, TimeBase::MPEG), 90000);
        assert_eq!(
            TimeBase::MILLISECONDS.convert(Timestamp::NONE, TimeBase::MPEG),
            Timestamp::NONE
        );
    }

    #[test]
    fn test_timestamp_comparison_across_bases() {
        let a = Timestamp::new(90000, TimeBase::MPEG);
        let b = Timestamp::new(1000, TimeBase::MILLISECONDS);
        assert_eq!(a, b);
        assert!(Timestamp::none() < b);
        assert!(Timestamp::new(1001, TimeBase::MILLISECONDS) > a);
    }

    #[test]
    fn test_rescale_none() {
        let ts = Timestamp::none().rescale(TimeBase::MILLISECONDS);
        assert!(!ts.is_valid());
        assert_eq!(ts.time_base, TimeBase::MILLISECONDS);
    }

    #[test]
    fn test_offset() {
        let ts = Timestamp::new(10, TimeBase::MILLISECONDS).offset(5);
        assert_eq!(ts.value, 15);
        assert!(!Timestamp::none().offset(5).is_valid());
    }

    #[test]
    fn test_parse_time_base() {
        assert_eq!("1/48000".parse::<TimeBase>().unwrap(), TimeBase::for_sample_rate(48000));
        assert!("0/1".parse::<TimeBase>().is_err());
    }
}
