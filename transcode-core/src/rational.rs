//! Rational numbers for time bases, frame rates and aspect ratios.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A rational number represented as a numerator and a positive denominator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rational {
    /// Numerator
    pub num: i64,
    /// Denominator (always positive)
    pub den: i64,
}

impl Rational {
    /// Create a new rational number, normalising the sign onto the numerator.
    ///
    /// # Panics
    ///
    /// Panics if denominator is zero. Use [`Rational::try_new`] for untrusted input.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        Self { num, den }
    }

    /// Create a rational, rejecting a zero denominator.
    pub fn try_new(num: i64, den: i64) -> Result<Self> {
        if den == 0 {
            return Err(Error::invalid_config(format!("{num}/0 has a zero denominator")));
        }
        Ok(Self::new(num, den))
    }

    /// Create a rational from an integer.
    pub const fn from_int(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// Check if this rational is zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Check if this rational is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Reduce to lowest terms.
    pub fn reduce(&self) -> Self {
        if self.num == 0 {
            return Self { num: 0, den: 1 };
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()) as i64;
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Reciprocal, or `None` for zero.
    pub fn inverse(&self) -> Option<Self> {
        if self.num == 0 {
            None
        } else {
            Some(Self::new(self.den, self.num))
        }
    }

    /// Rescale `value` expressed in units of `self` into units of `target`,
    /// rounding to the nearest integer (halves away from zero).
    pub fn rescale(&self, value: i64, target: Rational) -> i64 {
        let num = value as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        if den == 0 {
            return 0;
        }
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        rounded.clamp(i64::MIN as i128 + 1, i64::MAX as i128) as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self { num: 0, den: 1 }
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

/// Parses `"num/den"`, `"num:den"` or a plain integer.
impl FromStr for Rational {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| Error::invalid_config(format!("'{s}' is not a rational number")))
        };
        match s.split_once(['/', ':']) {
            Some((num, den)) => Self::try_new(parse(num)?, parse(den)?),
            None => Ok(Self::from_int(parse(s)?)),
        }
    }
}

impl TryFrom<String> for Rational {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Rational> for String {
    fn from(r: Rational) -> Self {
        r.to_string()
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num as i64, den as i64)
    }
}

/// Greatest common divisor (Euclid).
pub(crate) fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_negative_den() {
        let r = Rational::new(1, -2);
        assert_eq!(r.num, -1);
        assert_eq!(r.den, 2);
    }

    #[test]
    fn test_rational_reduce() {
        let r = Rational::new(30000, 1200).reduce();
        assert_eq!((r.num, r.den), (25, 1));
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let ms = Rational::new(1, 1000);
        let tb = Rational::new(1, 90000);
        assert_eq!(ms.rescale(1000, tb), 90000);
        // 1 tick of 1/3 in milliseconds is 333.33.. -> 333
        assert_eq!(Rational::new(1, 3).rescale(1, ms), 333);
        // 2/3 s -> 666.66.. -> 667
        assert_eq!(Rational::new(1, 3).rescale(2, ms), 667);
        assert_eq!(Rational::new(1, 3).rescale(-2, ms), -667);
    }

    #[test]
    fn test_parse() {
        assert_eq!("30000/1001".parse::<Rational>().unwrap(), Rational::new(30000, 1001));
        assert_eq!("16:9".parse::<Rational>().unwrap(), Rational::new(16, 9));
        assert_eq!("25".parse::<Rational>().unwrap(), Rational::from_int(25));
        assert!("1/0".parse::<Rational>().is_err());
        assert!("abc".parse::<Rational>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Rational::new(1, 3) < Rational::new(1, 2));
        assert_eq!(Rational::new(2, 4).cmp(&Rational::new(1, 2)), Ordering::Equal);
    }

    #[test]
    fn test_inverse() {
        assert_eq!(Rational::new(1, 25).inverse(), Some(Rational::new(25, 1)));
        assert_eq!(Rational::default().inverse(), None);
    }
}
