/*
 * 17.14 Signed Fixed-Point Arithmetic
 *
 * MLFQS needs fractional recent-cpu and load-average values but the
 * kernel has no floating point unit available (and wouldn't want one in
 * interrupt context regardless). This module is a direct port of the
 * Pintos `fixed_point.h` contract: a signed integer interpreted with 14
 * fractional bits, multiplication and division widened to 64 bits to
 * avoid overflow.
 *
 * One deliberate deviation from the original: its `SUB` macro is
 * defined as `x + y`, which is a bug in the source, not a specified
 * behavior (see spec §9's open question). `sub` here is true
 * subtraction.
 */

/// Number of fractional bits.
const DECIMAL_BITS: u32 = 14;

/// `2^14`, the fixed-point scale.
pub const SCALE: i64 = 1 << DECIMAL_BITS;

/// A signed 17.14 fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fixed(i64);

impl Fixed {
    /// The fixed-point representation of zero.
    pub const ZERO: Fixed = Fixed(0);

    /// Convert an integer to fixed point.
    pub const fn from_int(n: i32) -> Fixed {
        Fixed((n as i64) * SCALE)
    }

    /// Truncate toward zero to an integer.
    pub const fn to_int_trunc(self) -> i32 {
        (self.0 / SCALE) as i32
    }

    /// Round to the nearest integer (half away from zero).
    pub const fn to_int_round(self) -> i32 {
        let half = SCALE / 2;
        let rounded = if self.0 >= 0 {
            (self.0 + half) / SCALE
        } else {
            (self.0 - half) / SCALE
        };
        rounded as i32
    }

    /// `self + other`.
    pub const fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0 + other.0)
    }

    /// `self - other`.
    pub const fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0 - other.0)
    }

    /// `self + n`.
    pub const fn add_int(self, n: i32) -> Fixed {
        Fixed(self.0 + (n as i64) * SCALE)
    }

    /// `self - n`.
    pub const fn sub_int(self, n: i32) -> Fixed {
        Fixed(self.0 - (n as i64) * SCALE)
    }

    /// `self * other`, widened through i64 to avoid overflow before
    /// rescaling.
    pub const fn mul(self, other: Fixed) -> Fixed {
        Fixed((self.0 * other.0) / SCALE)
    }

    /// `self / other`, widened through i64 so the numerator survives
    /// the pre-scale multiply.
    pub const fn div(self, other: Fixed) -> Fixed {
        Fixed((self.0 * SCALE) / other.0)
    }

    /// `self * n` (n an integer, result fixed-point).
    pub const fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n as i64)
    }

    /// `self / n` (n an integer, result fixed-point).
    pub const fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n as i64)
    }

    /// Raw underlying representation, for diagnostics only.
    pub const fn raw(self) -> i64 {
        self.0
    }
}

impl core::ops::Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed::add(self, rhs)
    }
}

impl core::ops::Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed::sub(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_integers() {
        for n in -50..=50 {
            assert_eq!(Fixed::from_int(n).to_int_round(), n);
        }
    }

    #[test]
    fn add_with_zero_is_identity() {
        let x = Fixed::from_int(7).add_int(3).div_int(2);
        assert_eq!(x.add(Fixed::from_int(0)), x);
    }

    #[test]
    fn truncation_matches_spec_example() {
        // recent_cpu = to_fp(5); recent_cpu/4 truncates to 1 (S5 in spec §8).
        let recent_cpu = Fixed::from_int(5);
        assert_eq!(recent_cpu.div_int(4).to_int_trunc(), 1);
    }

    #[test]
    fn mul_div_roundtrip() {
        let a = Fixed::from_int(59).div_int(60);
        let b = Fixed::from_int(100);
        let product = a.mul(b);
        // 59/60 * 100 ~= 98.33
        assert_eq!(product.to_int_trunc(), 98);
    }

    #[test]
    fn sub_is_true_subtraction_not_the_source_bug() {
        let x = Fixed::from_int(10);
        let y = Fixed::from_int(3);
        assert_eq!(x.sub(y), Fixed::from_int(7));
        assert_eq!(x - y, Fixed::from_int(7));
    }

    #[test]
    fn negative_rounding() {
        assert_eq!(Fixed::from_int(-5).to_int_round(), -5);
        let almost = Fixed::from_int(-5).add(Fixed::from_int(1).div_int(3));
        assert_eq!(almost.to_int_round(), -5);
    }
}
