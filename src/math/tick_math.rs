// Hub pool tick math (Q72 sqrt prices)
// ------------------------------------
// Exact integer conversions between a tick index and its sqrt price, mirroring
// the hub contract's TickMath library. The hub uses 72 fractional bits instead
// of Uniswap's 96 and a narrower tick range.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};

use crate::error::MathError;

pub const MIN_TICK: i32 = -776_363;
pub const MAX_TICK: i32 = 776_363;

/// Fractional bits of a sqrt price.
pub const NFRAC: u32 = 72;

/// sqrt(1.0001^(-2^k)) in Q128, for k = 0..20.
const SQRT_RATIO_FACTORS: [u128; 20] = [
    0xFFFCB933BD6FAD37AA2D162D1A594001,
    0xFFF97272373D413259A46990580E213A,
    0xFFF2E50F5F656932EF12357CF3C7FDCC,
    0xFFE5CACA7E10E4E61C3624EAA0941CD0,
    0xFFCB9843D60F6159C9DB58835C926644,
    0xFF973B41FA98C081472E6896DFB254C0,
    0xFF2EA16466C96A3843EC78B326B52861,
    0xFE5DEE046A99A2A811C461F1969C3053,
    0xFCBE86C7900A88AEDCFFC83B479AA3A4,
    0xF987A7253AC413176F2B074CF7815E54,
    0xF3392B0822B70005940C7A398E4B70F3,
    0xE7159475A2C29B7443B29C7FA6E889D9,
    0xD097F3BDFD2022B8845AD8F792AA5825,
    0xA9F746462D870FDF8A65DC1F90E061E5,
    0x70D869A156D2A1B890BB3DF62BAF32F7,
    0x31BE135F97D08FD981231505542FCFA6,
    0x9AA508B5B7A84E1C677DE54F3E99BC9,
    0x5D6AF8DEDB81196699C329225EE604,
    0x2216E584F5FA1EA926041BEDFE98,
    0x48A170391F7DC42444E8FA2,
];

// log2 -> tick conversion constants (Q128)
const LOG_SQRT_10001_INV: u128 = 255_738_958_999_603_826_347_141;
const TICK_UPPER_OFFSET: u128 = 17_996_007_701_288_367_970_265_332_090_599_899_137;
const TICK_LOWER_OFFSET_FAR: u128 = 98_577_143_636_729_737_466_164_032_634_120_830_977;
const TICK_LOWER_OFFSET_NEAR: u128 = 527_810_000_259_722_480_933_883_300_202_676_225;

/// Exact tickToSqrtPrice: returns sqrt(1.0001^tick) in Q72, rounded up.
pub fn tick_to_sqrt_price(tick: i32) -> Result<BigInt, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfRange(tick));
    }
    let abs_tick = tick.unsigned_abs();

    // r is Q128.128
    let mut r = BigInt::one() << 128u32;
    for (bit, factor) in SQRT_RATIO_FACTORS.iter().enumerate() {
        if abs_tick & (1u32 << bit) != 0 {
            r = (r * BigInt::from(*factor)) >> 128u32;
        }
    }

    if tick >= 0 {
        let max = (BigInt::one() << 256u32) - 1;
        r = max / r;
    }

    // shrink Q128 -> Q72, rounding up
    let nshift = 128 - NFRAC;
    let mask = (BigInt::one() << nshift) - 1;
    let round_up = !(&r & &mask).is_zero();
    let mut sqrt_p = r >> nshift;
    if round_up {
        sqrt_p += 1;
    }
    Ok(sqrt_p)
}

/// Exact sqrtPriceToTick: the greatest tick whose sqrt price is <= `sqrt_p`.
///
/// Computes log2 of the price in Q64 from the MSB plus 18 squaring
/// refinements, maps it to two candidate ticks, and keeps the upper one only
/// if its sqrt price does not exceed `sqrt_p`.
pub fn sqrt_price_to_tick(sqrt_p: &BigInt) -> Result<i32, MathError> {
    let upper_bound = BigInt::one() << 128u32;
    if *sqrt_p <= BigInt::zero() || *sqrt_p >= upper_bound {
        return Err(MathError::SqrtPriceOutOfRange(sqrt_p.to_string()));
    }

    let msb = most_significant_bit(sqrt_p);

    let mut res = BigInt::from(msb as i64 - NFRAC as i64) << 64u32;
    let mut y: BigInt = sqrt_p << (127 - msb);

    for i in (46..=63u32).rev() {
        y = (&y * &y) >> 127u32;
        if y >= upper_bound {
            y >>= 1u32;
            res += BigInt::one() << i;
        }
    }

    res *= BigInt::from(LOG_SQRT_10001_INV);

    let q128 = BigInt::one() << 128u32;
    let tick_upper = Integer::div_floor(&(&res + BigInt::from(TICK_UPPER_OFFSET)), &q128);
    let lower_numerator = if res < BigInt::from(-676_363) * &q128 {
        &res - BigInt::from(TICK_LOWER_OFFSET_FAR)
    } else if res < BigInt::from(-476_363) * &q128 {
        &res - BigInt::from(TICK_LOWER_OFFSET_NEAR)
    } else {
        res.clone()
    };
    let tick_lower = Integer::div_floor(&lower_numerator, &q128);

    let tick_upper = to_tick(&tick_upper)?;
    let tick_lower = to_tick(&tick_lower)?;

    if tick_upper == tick_lower {
        return Ok(tick_upper);
    }
    if tick_upper <= MAX_TICK && *sqrt_p >= tick_to_sqrt_price(tick_upper)? {
        return Ok(tick_upper);
    }
    Ok(tick_lower)
}

fn to_tick(v: &BigInt) -> Result<i32, MathError> {
    v.to_i32()
        .ok_or_else(|| MathError::SqrtPriceOutOfRange(v.to_string()))
}

/// Index of the highest set bit; `x` must be positive and below 2^128.
fn most_significant_bit(x: &BigInt) -> u32 {
    let mut xc = x.clone();
    let mut msb = 0u32;
    for shift in [64u32, 32, 16, 8, 4, 2, 1] {
        if xc >= (BigInt::one() << shift) {
            xc >>= shift;
            msb += shift;
        }
    }
    msb
}
