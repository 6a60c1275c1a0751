// Token amount <-> sqrt price conversions for a single liquidity position.
//
// Sign convention: positive = token flows into the pool, negative = out of it.
// Rounding always favours the pool: inputs round up, outputs round toward zero.

use crate::error::MathError;
use crate::math::numeric::Numeric;

fn div<N: Numeric>(a: &N, b: &N, round_up: bool) -> Result<N, MathError> {
    if round_up {
        a.ceil_div(b)
    } else {
        a.floor_div(b)
    }
}

fn ensure_word<N: Numeric>(v: N) -> Result<N, MathError> {
    if v.fits_word() {
        Ok(v)
    } else {
        Err(MathError::Overflow(v.to_string()))
    }
}

/// Δx = L (√P0 - √P1) / (√P0 √P1)
pub fn amount0_from_sqrt_prices<N: Numeric>(
    sqrt_p0: &N,
    sqrt_p1: &N,
    liquidity: &N,
) -> Result<N, MathError> {
    let price_up = sqrt_p1 > sqrt_p0;
    let (hi, lo) = if price_up { (sqrt_p1, sqrt_p0) } else { (sqrt_p0, sqrt_p1) };

    // L * (hi - lo) is below 2^256 for 128-bit operands; the Q72 scaling is a
    // full-width mul-div on chain, so only the quotient has to fit a word.
    let num = ensure_word(liquidity.clone() * (hi.clone() - lo.clone()))? * N::q72();
    let amt0 = ensure_word(div(&num, &(hi.clone() * lo.clone()), !price_up)?)?;
    Ok(if price_up { -amt0 } else { amt0 })
}

/// Δy = L (√P1 - √P0)
pub fn amount1_from_sqrt_prices<N: Numeric>(
    sqrt_p0: &N,
    sqrt_p1: &N,
    liquidity: &N,
) -> Result<N, MathError> {
    let price_down = sqrt_p1 < sqrt_p0;
    let (lo, hi) = if price_down { (sqrt_p1, sqrt_p0) } else { (sqrt_p0, sqrt_p1) };

    let num = ensure_word(liquidity.clone() * (hi.clone() - lo.clone()))?;
    let amt1 = div(&num, &N::q72(), !price_down)?;
    Ok(if price_down { -amt1 } else { amt1 })
}

/// New sqrt price after `amt` of token0 (or token1) enters (or leaves) the pool.
pub fn sqrt_price_from_amount<N: Numeric>(
    is_token0: bool,
    sqrt_p0: &N,
    liquidity: &N,
    amt: &N,
) -> Result<N, MathError> {
    let q72 = N::q72();
    if is_token0 {
        let l_q72 = liquidity.clone() * q72;
        let product = amt.abs_value() * sqrt_p0.clone();
        if !product.fits_word() {
            // reorder to keep the intermediate product within a word
            let denom = l_q72.floor_div(sqrt_p0)? + amt.clone();
            return l_q72.ceil_div(&denom);
        }
        let num = l_q72.clone() * sqrt_p0.clone();
        let denom = l_q72 + amt.clone() * sqrt_p0.clone();
        num.ceil_div(&denom)
    } else if *amt >= N::zero_value() {
        Ok(sqrt_p0.clone() + (amt.clone() * q72).floor_div(liquidity)?)
    } else {
        Ok(sqrt_p0.clone() - (amt.abs_value() * q72).ceil_div(liquidity)?)
    }
}
