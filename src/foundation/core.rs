use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use crate::foundation::error::{FrameCacheError, FrameCacheResult};

/// Exact rational timestamp `num/den` on an arbitrary timebase.
///
/// Values are always stored reduced with a positive denominator, so derived equality and hashing
/// are exact (`1/24 == 2/48`). Arithmetic runs in `i128` and saturates back into `i64`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// Largest representable timestamp.
    pub const MAX: Rational = Rational {
        num: i64::MAX,
        den: 1,
    };

    /// Create a validated, reduced rational.
    pub fn new(num: i64, den: i64) -> FrameCacheResult<Self> {
        if den == 0 {
            return Err(FrameCacheError::validation(
                "rational denominator must be non-zero",
            ));
        }
        Ok(Self::from_i128(i128::from(num), i128::from(den)))
    }

    /// Whole-number rational `n/1`.
    pub const fn from_int(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// `0/1`.
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// Numerator of the reduced form.
    pub fn num(self) -> i64 {
        self.num
    }

    /// Denominator of the reduced form (always positive).
    pub fn den(self) -> i64 {
        self.den
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    pub fn is_positive(self) -> bool {
        self.num > 0
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Multiply by an integer.
    pub fn mul_int(self, n: i64) -> Self {
        Self::from_i128(i128::from(self.num) * i128::from(n), i128::from(self.den))
    }

    /// Integer floor of `self / divisor`, computed without leaving rational arithmetic.
    pub fn floor_div(self, divisor: Rational) -> FrameCacheResult<i64> {
        if divisor.is_zero() {
            return Err(FrameCacheError::validation("division by zero rational"));
        }
        let mut n = i128::from(self.num) * i128::from(divisor.den);
        let mut m = i128::from(self.den) * i128::from(divisor.num);
        if m < 0 {
            n = -n;
            m = -m;
        }
        Ok(saturate_i64(n.div_euclid(m)))
    }

    /// Snap down to the nearest multiple of `timebase`.
    pub fn snap_floor(self, timebase: Rational) -> FrameCacheResult<Self> {
        Ok(timebase.mul_int(self.floor_div(timebase)?))
    }

    fn from_i128(num: i128, den: i128) -> Self {
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i128;
        Self {
            num: saturate_i64(num / g),
            den: saturate_i64(den / g).max(1),
        }
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn saturate_i64(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Rational {
    type Output = Rational;

    fn add(self, rhs: Rational) -> Rational {
        let num = i128::from(self.num) * i128::from(rhs.den)
            + i128::from(rhs.num) * i128::from(self.den);
        Self::from_i128(num, i128::from(self.den) * i128::from(rhs.den))
    }
}

impl AddAssign for Rational {
    fn add_assign(&mut self, rhs: Rational) {
        *self = *self + rhs;
    }
}

impl Sub for Rational {
    type Output = Rational;

    fn sub(self, rhs: Rational) -> Rational {
        let num = i128::from(self.num) * i128::from(rhs.den)
            - i128::from(rhs.num) * i128::from(self.den);
        Self::from_i128(num, i128::from(self.den) * i128::from(rhs.den))
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = i128::from(self.num) * i128::from(other.den);
        let rhs = i128::from(other.num) * i128::from(self.den);
        lhs.cmp(&rhs)
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

impl FromStr for Rational {
    type Err = FrameCacheError;

    /// Parse `"num/den"` or a bare integer.
    fn from_str(s: &str) -> FrameCacheResult<Self> {
        let parse = |part: &str| {
            part.trim().parse::<i64>().map_err(|e| {
                FrameCacheError::validation(format!("invalid rational '{s}': {e}"))
            })
        };
        match s.split_once('/') {
            Some((num, den)) => Self::new(parse(num)?, parse(den)?),
            None => Ok(Self::from_int(parse(s)?)),
        }
    }
}

impl From<Rational> for String {
    fn from(r: Rational) -> String {
        r.to_string()
    }
}

impl TryFrom<String> for Rational {
    type Error = FrameCacheError;

    fn try_from(s: String) -> FrameCacheResult<Self> {
        s.parse()
    }
}

/// Closed-open time range `[start, end)` on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeRange {
    /// Inclusive range start.
    pub start: Rational,
    /// Exclusive range end.
    pub end: Rational,
}

impl TimeRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: Rational, end: Rational) -> FrameCacheResult<Self> {
        if start > end {
            return Err(FrameCacheError::validation("TimeRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Zero-length range addressing a single instant.
    pub fn at(t: Rational) -> Self {
        Self { start: t, end: t }
    }

    pub fn length(self) -> Rational {
        self.end - self.start
    }

    /// `true` when both ranges share a non-empty span.
    pub fn overlaps(self, other: TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Common span of both ranges, if any.
    pub fn intersect(self, other: TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeRange { start, end })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
