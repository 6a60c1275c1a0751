// Constant-product (x*y=k) pair math
// ----------------------------------
// Uniswap V2 style getAmountOut / getAmountIn on raw integer reserves.
//
// Notes:
// - Reserves and amounts are raw token units held as U256, like the pair contract.
// - Fee is in basis points; γ = 10_000 - fee_bps (30 bps => 997/1000).
// - Every multiply is checked: an overflowing quote is an error, never a wrap.

use ethers::types::U256;
use num_bigint::{BigInt, Sign};

use crate::error::{MathError, SimulationError};

pub const FEE_DENOMINATOR_BPS: u32 = 10_000;
pub const DEFAULT_FEE_BPS: u32 = 30;

// ------------------------------- Core math -----------------------------------

fn gamma(fee_bps: u32) -> U256 {
    U256::from(FEE_DENOMINATOR_BPS - fee_bps.min(FEE_DENOMINATOR_BPS - 1))
}

fn overflow(what: &str) -> MathError {
    MathError::Overflow(what.to_string())
}

/// out = in·γ·R_out / (R_in·10⁴ + in·γ), rounded down.
pub fn amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Result<U256, MathError> {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return Ok(U256::zero());
    }
    let in_with_fee = amount_in
        .checked_mul(gamma(fee_bps))
        .ok_or_else(|| overflow("amount_in * gamma"))?;
    let num = in_with_fee
        .checked_mul(reserve_out)
        .ok_or_else(|| overflow("amount_in * gamma * reserve_out"))?;
    let den = reserve_in
        .checked_mul(U256::from(FEE_DENOMINATOR_BPS))
        .and_then(|r| r.checked_add(in_with_fee))
        .ok_or_else(|| overflow("reserve_in * 10000 + amount_in * gamma"))?;
    Ok(num / den)
}

/// in = R_in·out·10⁴ / ((R_out − out)·γ) + 1.
pub fn amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Result<U256, SimulationError> {
    if amount_out >= reserve_out {
        return Err(SimulationError::InsufficientReserves {
            requested: amount_out.to_string(),
            reserve: reserve_out.to_string(),
        });
    }
    let num = reserve_in
        .checked_mul(amount_out)
        .and_then(|v| v.checked_mul(U256::from(FEE_DENOMINATOR_BPS)))
        .ok_or_else(|| overflow("reserve_in * amount_out * 10000"))?;
    let den = (reserve_out - amount_out)
        .checked_mul(gamma(fee_bps))
        .ok_or_else(|| overflow("(reserve_out - amount_out) * gamma"))?;
    if den.is_zero() {
        return Err(MathError::DivisionByZero.into());
    }
    Ok(num / den + U256::one())
}

// --------------------------- Price & conversions -----------------------------

/// Spot price (tokenOut per tokenIn), normalized by decimals. Reporting only.
pub fn spot_price(reserve_in: U256, reserve_out: U256, dec_in: u8, dec_out: u8) -> f64 {
    if reserve_in.is_zero() {
        return 0.0;
    }
    let r_in = u256_to_f64(reserve_in) / 10f64.powi(dec_in as i32);
    let r_out = u256_to_f64(reserve_out) / 10f64.powi(dec_out as i32);
    r_out / r_in
}

fn u256_to_f64(v: U256) -> f64 {
    let mut acc = 0.0f64;
    for word in v.0.iter().rev() {
        acc = acc * 18_446_744_073_709_551_616.0 + *word as f64;
    }
    acc
}

pub fn u256_to_bigint(v: U256) -> BigInt {
    let mut bytes = [0u8; 32];
    v.to_big_endian(&mut bytes);
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

/// Non-negative BigInt that fits 256 bits -> U256.
pub fn bigint_to_u256(v: &BigInt) -> Result<U256, MathError> {
    let (sign, bytes) = v.to_bytes_be();
    if sign == Sign::Minus {
        return Err(MathError::InvalidAmount {
            expected: "non-negative",
            got: v.to_string(),
        });
    }
    if bytes.len() > 32 {
        return Err(MathError::Overflow(v.to_string()));
    }
    Ok(U256::from_big_endian(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(n: u32) -> U256 {
        U256::exp10(n as usize)
    }

    #[test]
    fn matches_uniswap_v2_get_amount_out() {
        // 1 WETH into 1000 WETH / 2M USDC
        let out = amount_out(e(18), e(21), U256::from(2_000_000u64) * e(6), 30).unwrap();
        // 1e18*997*2e12 / (1e21*1000 + 1e18*997)
        let g = U256::from(997u64);
        let expected = (e(18) * g * U256::from(2_000_000u64) * e(6))
            / (e(21) * U256::from(1_000u64) + e(18) * g);
        assert_eq!(out, expected);
        assert!(out < U256::from(2_000u64) * e(6));
    }

    #[test]
    fn amount_in_covers_amount_out() {
        let r_in = e(21);
        let r_out = U256::from(2_000_000u64) * e(6);
        let want = U256::from(1_000u64) * e(6);
        let needed = amount_in(want, r_in, r_out, 30).unwrap();
        assert!(amount_out(needed, r_in, r_out, 30).unwrap() >= want);
    }

    #[test]
    fn draining_the_pool_is_rejected() {
        let err = amount_in(e(6), e(18), e(6), 30).unwrap_err();
        assert!(matches!(err, SimulationError::InsufficientReserves { .. }));
    }

    #[test]
    fn zero_liquidity_quotes_nothing() {
        assert_eq!(amount_out(e(18), U256::zero(), e(6), 30).unwrap(), U256::zero());
    }

    #[test]
    fn overflow_is_an_error() {
        let big = U256::MAX / U256::from(2u8);
        assert!(matches!(amount_out(big, e(18), e(18), 30), Err(MathError::Overflow(_))));
    }

    #[test]
    fn bigint_conversions() {
        let v = U256::from(123_456_789u64) * e(30);
        assert_eq!(bigint_to_u256(&u256_to_bigint(v)).unwrap(), v);
        assert!(bigint_to_u256(&BigInt::from(-1)).is_err());
        assert!(bigint_to_u256(&(BigInt::from(1) << 256u32)).is_err());
    }

    #[test]
    fn spot_price_normalizes_decimals() {
        let p = spot_price(e(21), U256::from(2_000_000u64) * e(6), 18, 6);
        assert!((p - 2_000.0).abs() < 1e-9);
    }
}
