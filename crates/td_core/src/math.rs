//! Fixed-point math utilities for the simulation.
//!
//! All simulation quantities use fixed-point arithmetic so a seeded run
//! replays identically on the same build. Gold is the only integer quantity.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Slack allowed when an accumulated timer is compared against an interval.
///
/// Deltas such as 0.1 s are not exact in binary, so a sum of them can land a
/// few ulps either side of the interval.
pub const TIME_EPSILON: Fixed = Fixed::from_bits(1 << 12);

/// Build a fixed-point fraction from an integer percentage (`25` -> 0.25).
///
/// Rounds to the nearest representable value.
#[must_use]
pub fn percent(value: u32) -> Fixed {
    ratio(value, 100)
}

/// Convert whole milliseconds to seconds, rounded to nearest.
///
/// Defined for every `u32`; the result never overflows.
#[must_use]
pub fn from_millis(ms: u32) -> Fixed {
    ratio(ms, 1000)
}

fn ratio(numerator: u32, denominator: u32) -> Fixed {
    let scaled = i128::from(numerator) << Fixed::FRAC_NBITS;
    let denominator = i128::from(denominator);
    let bits = (scaled + denominator / 2) / denominator;
    Fixed::from_bits(i64::try_from(bits).unwrap_or(i64::MAX))
}

/// Whether a timer has accumulated a full `interval`, within [`TIME_EPSILON`].
#[must_use]
pub fn interval_elapsed(timer: Fixed, interval: Fixed) -> bool {
    timer.saturating_add(TIME_EPSILON) >= interval
}

/// Fixed-point 3D vector. `y` is up; paths run on the `x`/`z` plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z coordinate.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Values are written as decimals so config files stay hand-editable.
/// Conversion goes through `f64`, which is exact for every value a
/// 32-bit fraction can hold within the simulation's range.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

impl Vec3Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32, z: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y), Fixed::from_num(z))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let d = self - other;
        d.dot(d)
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Multiply every component by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Move from `self` toward `target` by at most `max_step`.
    ///
    /// Lands exactly on `target` when it is within reach.
    #[must_use]
    pub fn move_towards(self, target: Self, max_step: Fixed) -> Self {
        let diff = target - self;
        let len = fixed_sqrt(diff.dot(diff));
        if len <= max_step || len == Fixed::ZERO {
            return target;
        }
        self + diff.scale(max_step / len)
    }
}

/// Computes the square root of a fixed-point number using binary search.
fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / Fixed::from_num(10_000)
    }

    #[test]
    fn test_vec3_distance_squared() {
        let a = Vec3Fixed::from_ints(3, 0, 0);
        let b = Vec3Fixed::from_ints(0, 0, 4);
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_vec3_distance() {
        let a = Vec3Fixed::from_ints(0, 0, 0);
        let b = Vec3Fixed::from_ints(3, 0, 4);
        assert!((a.distance(b) - Fixed::from_num(5)).abs() < epsilon());
    }

    #[test]
    fn test_move_towards_partial_step() {
        let start = Vec3Fixed::ZERO;
        let target = Vec3Fixed::from_ints(10, 0, 0);
        let moved = start.move_towards(target, Fixed::from_num(2));
        assert!((moved.x - Fixed::from_num(2)).abs() < epsilon());
        assert_eq!(moved.y, Fixed::ZERO);
        assert_eq!(moved.z, Fixed::ZERO);
    }

    #[test]
    fn test_move_towards_lands_on_target() {
        let start = Vec3Fixed::ZERO;
        let target = Vec3Fixed::from_ints(1, 0, 1);
        let moved = start.move_towards(target, Fixed::from_num(5));
        assert_eq!(moved, target);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(50), Fixed::from_num(0.5));
        assert_eq!(percent(100), Fixed::ONE);
        assert_eq!(percent(10), Fixed::from_num(0.1));
    }

    #[test]
    fn test_ten_tenths_make_a_second() {
        let mut total = Fixed::ZERO;
        for _ in 0..10 {
            total += percent(10);
        }
        assert!(interval_elapsed(total, Fixed::ONE));
        assert!(!interval_elapsed(total - percent(10), Fixed::ONE));
    }

    #[test]
    fn test_from_millis() {
        assert_eq!(from_millis(100), percent(10));
        assert_eq!(from_millis(2500), Fixed::from_num(2.5));
        assert_eq!(from_millis(u32::MAX).to_num::<i64>(), 4_294_967);
    }

    #[test]
    fn test_interval_elapsed_tolerates_rounding() {
        let almost = Fixed::ONE - Fixed::from_bits(3);
        assert!(interval_elapsed(almost, Fixed::ONE));
        assert!(!interval_elapsed(percent(99), Fixed::ONE));
        assert!(interval_elapsed(Fixed::MAX, Fixed::ONE));
    }

    #[test]
    fn test_fixed_serde_roundtrip_through_ron() {
        let v = Vec3Fixed::new(Fixed::from_num(-30), Fixed::from_num(0.5), Fixed::from_num(12.25));
        let text = ron::to_string(&v).expect("serialize");
        let back: Vec3Fixed = ron::from_str(&text).expect("deserialize");
        assert_eq!(v, back);
    }
}
