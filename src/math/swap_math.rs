// Multi-tier swap math: tier allocation and the per-tier swap step.

use crate::error::MathError;
use crate::math::numeric::Numeric;
use crate::math::pool_math::{
    amount0_from_sqrt_prices, amount1_from_sqrt_prices, sqrt_price_from_amount,
};

/// Per-tier inputs to the allocation solver, parallel slices indexed by tier.
#[derive(Clone, Copy, Debug)]
pub struct TierView<'a, N> {
    pub sqrt_gammas: &'a [N],
    pub sqrt_prices: &'a [N],
    pub liquidities: &'a [N],
}

/// Split `amount` across the enabled tiers so that every used tier ends at
/// the same marginal price.
///
/// Positive `amount` is an exact input, negative an exact output. Tiers whose
/// share comes out with the wrong sign are dropped and the rest re-solved.
/// Returns the per-tier amounts (zero for unused tiers) and the final mask.
pub fn allocate_tier_amounts<N: Numeric>(
    is_token0: bool,
    amount: &N,
    tier_choices: &[bool],
    tiers: TierView<'_, N>,
) -> Result<(Vec<N>, Vec<bool>), MathError> {
    let exact_in = *amount > N::zero_value();
    if !exact_in && *amount >= N::zero_value() {
        return Err(MathError::InvalidAmount {
            expected: "non-zero",
            got: amount.to_string(),
        });
    }

    let size = tier_choices.len();
    let (lsg, res) = if exact_in {
        weights_exact_in(is_token0, tiers, size)?
    } else {
        weights_exact_out(is_token0, tiers, size)?
    };

    let mut mask = tier_choices.to_vec();
    let mut amts = vec![N::zero_value(); size];

    // each pass either succeeds or drops at least one tier
    for _ in 0..=size {
        let (lambda_num, lambda_denom) = mask
            .iter()
            .enumerate()
            .filter(|(_, enabled)| **enabled)
            .fold((N::zero_value(), amount.clone()), |(num, denom), (i, _)| {
                (num + lsg[i].clone(), denom + res[i].clone())
            });

        let mut feasible = true;
        for i in 0..size {
            if !mask[i] {
                amts[i] = N::zero_value();
                continue;
            }
            let scaled = lsg[i].clone() * lambda_denom.clone();
            let share = if exact_in {
                scaled.floor_div(&lambda_num)?
            } else {
                scaled.ceil_div(&lambda_num)?
            };
            amts[i] = share - res[i].clone();
            let wrong_sign = if exact_in { amts[i] < N::zero_value() } else { amts[i] > N::zero_value() };
            if wrong_sign {
                feasible = false;
            }
        }

        if feasible {
            return Ok((amts, mask));
        }
        for i in 0..size {
            let wrong_sign = if exact_in { amts[i] < N::zero_value() } else { amts[i] > N::zero_value() };
            if mask[i] && wrong_sign {
                mask[i] = false;
                amts[i] = N::zero_value();
            }
        }
    }

    Err(MathError::InvalidAmount {
        expected: "a feasible tier allocation",
        got: amount.to_string(),
    })
}

// lsg: liquidity / sqrt_gamma; res: virtual reserve (divided by gamma on the input side)
fn weights_exact_in<N: Numeric>(
    is_token0: bool,
    tiers: TierView<'_, N>,
    size: usize,
) -> Result<(Vec<N>, Vec<N>), MathError> {
    let mut lsg = Vec::with_capacity(size);
    let mut res = Vec::with_capacity(size);
    for i in 0..size {
        let l = &tiers.liquidities[i];
        let sg = &tiers.sqrt_gammas[i];
        let p = &tiers.sqrt_prices[i];
        let gamma = sg.clone() * sg.clone();
        lsg.push((l.clone() * N::e5()).ceil_div(sg)?);
        res.push(if is_token0 {
            (l.clone() * N::q72() * N::e10()).ceil_div(&(p.clone() * gamma))?
        } else {
            (l.clone() * p.clone()).ceil_div(&(N::q72() * gamma).floor_div(&N::e10())?)?
        });
    }
    Ok((lsg, res))
}

fn weights_exact_out<N: Numeric>(
    is_token0: bool,
    tiers: TierView<'_, N>,
    size: usize,
) -> Result<(Vec<N>, Vec<N>), MathError> {
    let mut lsg = Vec::with_capacity(size);
    let mut res = Vec::with_capacity(size);
    for i in 0..size {
        let l = &tiers.liquidities[i];
        let p = &tiers.sqrt_prices[i];
        lsg.push((l.clone() * N::e5()).floor_div(&tiers.sqrt_gammas[i])?);
        res.push(if is_token0 {
            (l.clone() * N::q72()).floor_div(p)?
        } else {
            (l.clone() * p.clone()).floor_div(&N::q72())?
        });
    }
    Ok((lsg, res))
}

/// Outcome of one tier's swap step.
///
/// `amount_a` is the specified side (input for exact-in, output for
/// exact-out), `amount_b` the counter side.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome<N> {
    pub allowed: bool,
    pub crossed: bool,
    pub amount_a: N,
    pub amount_b: N,
    pub sqrt_price: N,
    pub fee_amount: N,
}

/// Inputs of a single-tier swap step.
#[derive(Clone, Debug)]
pub struct StepInput<'a, N> {
    pub is_token0: bool,
    pub exact_in: bool,
    pub amount: &'a N,
    pub sqrt_gamma: &'a N,
    pub sqrt_price: &'a N,
    pub liquidity: &'a N,
    pub next_tick: i32,
}

pub fn compute_step<N: Numeric>(input: StepInput<'_, N>) -> Result<StepOutcome<N>, MathError> {
    let StepInput {
        is_token0,
        exact_in,
        amount,
        sqrt_gamma,
        sqrt_price,
        liquidity,
        next_tick,
    } = input;

    let sqrt_p_tick = N::sqrt_price_at_tick(next_tick)?;

    // specified-token amount needed to reach the tick
    let amt_tick = if is_token0 {
        amount0_from_sqrt_prices(sqrt_price, &sqrt_p_tick, liquidity)?
    } else {
        amount1_from_sqrt_prices(sqrt_price, &sqrt_p_tick, liquidity)?
    };

    // gamma with 1e10 precision
    let gamma = sqrt_gamma.clone() * sqrt_gamma.clone();

    let amount_b_for = |new_price: &N| {
        if is_token0 {
            amount1_from_sqrt_prices(sqrt_price, new_price, liquidity)
        } else {
            amount0_from_sqrt_prices(sqrt_price, new_price, liquidity)
        }
    };

    let (crossed, amount_a, amount_b, sqrt_p_new, fee_amount, amt_in_excl_fee);
    if exact_in {
        let mut amt_a = amount.clone();
        let mut excl_fee = (amt_a.clone() * gamma.clone()).floor_div(&N::e10())?;
        crossed = excl_fee >= amt_tick;
        let new_price = if crossed {
            excl_fee = amt_tick;
            amt_a = (excl_fee.clone() * N::e10()).ceil_div(&gamma)?;
            sqrt_p_tick.clone()
        } else {
            sqrt_price_from_amount(is_token0, sqrt_price, liquidity, &excl_fee)?
        };
        amount_b = amount_b_for(&new_price)?;
        fee_amount = amt_a.clone() - excl_fee.clone();
        amount_a = amt_a;
        sqrt_p_new = new_price;
        amt_in_excl_fee = excl_fee;
    } else {
        crossed = *amount <= amt_tick;
        let (amt_a, new_price) = if crossed {
            (amt_tick, sqrt_p_tick.clone())
        } else {
            let p = sqrt_price_from_amount(is_token0, sqrt_price, liquidity, amount)?;
            (amount.clone(), p)
        };
        let excl_fee = amount_b_for(&new_price)?;
        let amt_b = (excl_fee.clone() * N::e10()).ceil_div(&gamma)?;
        fee_amount = amt_b.clone() - excl_fee.clone();
        amount_a = amt_a;
        amount_b = amt_b;
        sqrt_p_new = new_price;
        amt_in_excl_fee = excl_fee;
    }

    // a tier that would move nothing without reaching its tick is skipped
    if amt_in_excl_fee.is_zero_value() && sqrt_p_new != sqrt_p_tick {
        return Ok(StepOutcome {
            allowed: false,
            crossed: false,
            amount_a: N::zero_value(),
            amount_b: N::zero_value(),
            sqrt_price: sqrt_price.clone(),
            fee_amount: N::zero_value(),
        });
    }

    Ok(StepOutcome {
        allowed: true,
        crossed,
        amount_a,
        amount_b,
        sqrt_price: sqrt_p_new,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick_math::{MAX_TICK, MIN_TICK};
    use num_bigint::BigInt;
    use num_traits::{One, Signed, Zero};

    fn q72() -> BigInt {
        BigInt::one() << 72u32
    }

    fn bi(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn allocation_sums_to_amount_exact_in() {
        let gammas = vec![bi(99_850), bi(99_900), bi(99_950)];
        let prices = vec![q72(), q72(), q72()];
        let liqs = vec![bi(25_600), bi(25_600), bi(25_600)];
        let view = TierView { sqrt_gammas: &gammas, sqrt_prices: &prices, liquidities: &liqs };

        let amount = bi(10_000_000);
        let (amts, mask) = allocate_tier_amounts(true, &amount, &[true, true, true], view).unwrap();
        assert!(mask.iter().all(|m| *m));
        let total: BigInt = amts.iter().sum();
        assert!((&amount - &total).abs() <= bi(3), "total {}", total);
        assert!(amts.iter().all(|a| *a > BigInt::zero()));
    }

    #[test]
    fn allocation_rejects_off_market_tier() {
        // tier 1 is priced far below the others; an exact-in token1 swap
        // (price going up) should not use tier 0 which is already expensive.
        let gammas = vec![bi(99_850), bi(99_850)];
        let prices = vec![q72() * 2, q72()];
        let liqs = vec![bi(1_000_000), bi(1_000_000)];
        let view = TierView { sqrt_gammas: &gammas, sqrt_prices: &prices, liquidities: &liqs };

        let amount = bi(1_000);
        let (amts, mask) = allocate_tier_amounts(false, &amount, &[true, true], view).unwrap();
        assert_eq!(mask, vec![false, true]);
        assert_eq!(amts[0], BigInt::zero());
        assert_eq!(amts[1], amount);
    }

    #[test]
    fn allocation_exact_out_signs() {
        let gammas = vec![bi(99_850), bi(99_950)];
        let prices = vec![q72(), q72()];
        let liqs = vec![bi(5_000_000), bi(1_000_000)];
        let view = TierView { sqrt_gammas: &gammas, sqrt_prices: &prices, liquidities: &liqs };

        let amount = bi(-50_000);
        let (amts, _) = allocate_tier_amounts(true, &amount, &[true, true], view).unwrap();
        assert!(amts.iter().all(|a| *a <= BigInt::zero()));
        let total: BigInt = amts.iter().sum();
        assert!((&amount - &total).abs() <= bi(3));
    }

    #[test]
    fn allocation_rejects_zero_amount() {
        let gammas = vec![bi(99_850)];
        let prices = vec![q72()];
        let liqs = vec![bi(1)];
        let view = TierView { sqrt_gammas: &gammas, sqrt_prices: &prices, liquidities: &liqs };
        assert!(allocate_tier_amounts(true, &BigInt::zero(), &[true], view).is_err());
    }

    #[test]
    fn zero_fee_step_matches_closed_form() {
        let l = bi(25_600);
        let p = q72();
        let amount = bi(10_000_000);
        let out = compute_step(StepInput {
            is_token0: true,
            exact_in: true,
            amount: &amount,
            sqrt_gamma: &bi(100_000),
            sqrt_price: &p,
            liquidity: &l,
            next_tick: MIN_TICK,
        })
        .unwrap();

        let new_p = (&l * &p * q72()).ceil_div(&(&l * q72() + &amount * &p)).unwrap();
        let expected = -(&l * (&p - &new_p)).floor_div(&q72()).unwrap();

        assert!(out.allowed && !out.crossed);
        assert_eq!(out.amount_a, amount);
        assert_eq!(out.sqrt_price, new_p);
        assert_eq!(out.amount_b, expected);
        assert_eq!(out.amount_b, bi(-25_534));
        assert_eq!(out.fee_amount, BigInt::zero());
    }

    #[test]
    fn step_clamps_at_tick_and_recomputes_input() {
        let l = bi(1_000_000_000);
        let p = q72();
        let amount = bi(1_000_000_000_000);
        let out = compute_step(StepInput {
            is_token0: false,
            exact_in: true,
            amount: &amount,
            sqrt_gamma: &bi(99_850),
            sqrt_price: &p,
            liquidity: &l,
            next_tick: 100,
        })
        .unwrap();

        assert!(out.crossed);
        assert_eq!(out.sqrt_price, BigInt::sqrt_price_at_tick(100).unwrap());
        assert!(out.amount_a < amount);
        assert!(out.amount_b < BigInt::zero());
        assert!(out.fee_amount > BigInt::zero());
    }

    #[test]
    fn exact_out_step_charges_fee_on_input() {
        let l = bi(1_000_000_000);
        let p = q72();
        let amount = bi(-1_000);
        let out = compute_step(StepInput {
            is_token0: true,
            exact_in: false,
            amount: &amount,
            sqrt_gamma: &bi(99_850),
            sqrt_price: &p,
            liquidity: &l,
            next_tick: MAX_TICK,
        })
        .unwrap();

        assert!(out.allowed && !out.crossed);
        assert_eq!(out.amount_a, amount);
        assert!(out.amount_b > bi(1_000));
        assert!(out.fee_amount > BigInt::zero());
        assert!(out.sqrt_price > p);
    }

    #[test]
    fn starved_tier_is_disallowed() {
        let l = bi(1_000_000_000);
        let p = q72();
        let amount = bi(1);
        let out = compute_step(StepInput {
            is_token0: true,
            exact_in: true,
            amount: &amount,
            sqrt_gamma: &bi(99_000),
            sqrt_price: &p,
            liquidity: &l,
            next_tick: MIN_TICK,
        })
        .unwrap();

        assert!(!out.allowed);
        assert_eq!(out.sqrt_price, p);
        assert_eq!(out.amount_a, BigInt::zero());
    }
}
