// Numeric precision tiers for the hub pool simulator.
//
// The same swap state machine runs over two number types:
//   - BigInt: exact integer math, bit-for-bit parity with the hub contract.
//   - f64:    fast approximate screening (no rounding direction, no overflow guard).

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::MathError;
use crate::math::tick_math;

pub trait Numeric:
    Clone
    + fmt::Debug
    + fmt::Display
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
    /// Exact tiers must reach the tolerance; approximate tiers may stop early
    /// once successive steps stagnate.
    const EXACT: bool;

    fn zero_value() -> Self;
    fn from_i64(v: i64) -> Self;
    fn pow2(bits: u32) -> Self;

    /// Division rounded toward negative infinity.
    fn floor_div(&self, rhs: &Self) -> Result<Self, MathError>;
    /// Division rounded toward positive infinity.
    fn ceil_div(&self, rhs: &Self) -> Result<Self, MathError>;

    fn is_zero_value(&self) -> bool;
    fn abs_value(&self) -> Self;
    fn to_f64_lossy(&self) -> f64;

    /// Q72 sqrt price at a tick.
    fn sqrt_price_at_tick(tick: i32) -> Result<Self, MathError>;

    /// Whether the magnitude fits in an EVM word (256 bits).
    fn fits_word(&self) -> bool {
        true
    }

    fn q72() -> Self {
        Self::pow2(72)
    }

    fn e5() -> Self {
        Self::from_i64(100_000)
    }

    fn e10() -> Self {
        Self::from_i64(10_000_000_000)
    }
}

// --------------------------------- BigInt ---------------------------------

impl Numeric for BigInt {
    const EXACT: bool = true;

    fn zero_value() -> Self {
        Zero::zero()
    }

    fn from_i64(v: i64) -> Self {
        BigInt::from(v)
    }

    fn pow2(bits: u32) -> Self {
        BigInt::one() << bits
    }

    fn floor_div(&self, rhs: &Self) -> Result<Self, MathError> {
        if rhs.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        Ok(Integer::div_floor(self, rhs))
    }

    fn ceil_div(&self, rhs: &Self) -> Result<Self, MathError> {
        if rhs.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        let neg = -self;
        Ok(-Integer::div_floor(&neg, rhs))
    }

    fn is_zero_value(&self) -> bool {
        self.is_zero()
    }

    fn abs_value(&self) -> Self {
        self.abs()
    }

    fn to_f64_lossy(&self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }

    fn sqrt_price_at_tick(tick: i32) -> Result<Self, MathError> {
        tick_math::tick_to_sqrt_price(tick)
    }

    fn fits_word(&self) -> bool {
        self.bits() <= 256
    }
}

// ---------------------------------- f64 -----------------------------------

impl Numeric for f64 {
    const EXACT: bool = false;

    fn zero_value() -> Self {
        0.0
    }

    fn from_i64(v: i64) -> Self {
        v as f64
    }

    fn pow2(bits: u32) -> Self {
        2f64.powi(bits as i32)
    }

    fn floor_div(&self, rhs: &Self) -> Result<Self, MathError> {
        if *rhs == 0.0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(self / rhs)
    }

    fn ceil_div(&self, rhs: &Self) -> Result<Self, MathError> {
        self.floor_div(rhs)
    }

    fn is_zero_value(&self) -> bool {
        *self == 0.0
    }

    fn abs_value(&self) -> Self {
        self.abs()
    }

    fn to_f64_lossy(&self) -> f64 {
        *self
    }

    fn sqrt_price_at_tick(tick: i32) -> Result<Self, MathError> {
        if !(tick_math::MIN_TICK..=tick_math::MAX_TICK).contains(&tick) {
            return Err(MathError::TickOutOfRange(tick));
        }
        Ok(1.0001f64.powf(tick as f64).sqrt() * Self::q72())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_rounding_matches_floor_and_ceil() {
        let a = BigInt::from(-7);
        let b = BigInt::from(2);
        assert_eq!(a.floor_div(&b).unwrap(), BigInt::from(-4));
        assert_eq!(a.ceil_div(&b).unwrap(), BigInt::from(-3));
        assert_eq!(BigInt::from(7).ceil_div(&b).unwrap(), BigInt::from(4));
        assert_eq!(BigInt::from(6).ceil_div(&b).unwrap(), BigInt::from(3));
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(
            BigInt::from(1).floor_div(&BigInt::zero()),
            Err(MathError::DivisionByZero)
        );
        assert_eq!(1.0f64.ceil_div(&0.0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn word_bound() {
        let max: BigInt = (BigInt::one() << 256u32) - BigInt::one();
        assert!(max.fits_word());
        assert!(!(max + BigInt::one()).fits_word());
    }

    #[test]
    fn float_tick_price_close_to_exact() {
        for tick in [-50_000, -1, 0, 1, 12_345] {
            let exact = <BigInt as Numeric>::sqrt_price_at_tick(tick).unwrap().to_f64_lossy();
            let approx = <f64 as Numeric>::sqrt_price_at_tick(tick).unwrap();
            assert!(((exact - approx) / exact).abs() < 1e-9, "tick {}", tick);
        }
    }
}
