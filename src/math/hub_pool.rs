// Multi-tier hub pool swap simulator
// ----------------------------------
// One state machine, two precision tiers (`Pool<BigInt, _>` for exact quotes,
// `Pool<f64, _>` for screening). Tick-link data is pulled lazily through a
// `TickSource`; the pool never owns a tick cache.
//
// Amount signs follow the pool: positive = into the pool, negative = out.

use std::collections::HashMap;

use num_bigint::BigInt;

use crate::error::SimulationError;
use crate::math::numeric::Numeric;
use crate::math::swap_math::{allocate_tier_amounts, compute_step, StepInput, TierView};
use crate::math::tick_math::{MAX_TICK, MIN_TICK};

// ------------------------------- Tick links --------------------------------

/// What happens to a tier when its price crosses a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickLink<N> {
    pub liquidity_delta: N,
    pub next_below: i32,
    pub next_above: i32,
}

/// Lazy accessor for tick-link records, keyed by `(tier, tick)`.
pub trait TickSource<N> {
    fn tick_link(&self, tier: usize, tick: i32) -> Result<TickLink<N>, SimulationError>;
}

impl<N, F> TickSource<N> for F
where
    F: Fn(usize, i32) -> Result<TickLink<N>, SimulationError>,
{
    fn tick_link(&self, tier: usize, tick: i32) -> Result<TickLink<N>, SimulationError> {
        self(tier, tick)
    }
}

/// In-memory tick links, e.g. loaded from a snapshot.
#[derive(Clone, Debug, Default)]
pub struct TickTable<N> {
    links: HashMap<(usize, i32), TickLink<N>>,
}

impl<N: Clone> TickTable<N> {
    pub fn new() -> Self {
        Self { links: HashMap::new() }
    }

    pub fn insert(&mut self, tier: usize, tick: i32, link: TickLink<N>) {
        self.links.insert((tier, tick), link);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, i32), &TickLink<N>)> {
        self.links.iter()
    }
}

impl<N: Clone> TickSource<N> for TickTable<N> {
    fn tick_link(&self, tier: usize, tick: i32) -> Result<TickLink<N>, SimulationError> {
        self.links
            .get(&(tier, tick))
            .cloned()
            .ok_or(SimulationError::MissingTick { tier, tick })
    }
}

/// Serves an exact tick source to the float tier.
pub struct FloatTicks<'a, S>(pub &'a S);

impl<S: TickSource<BigInt>> TickSource<f64> for FloatTicks<'_, S> {
    fn tick_link(&self, tier: usize, tick: i32) -> Result<TickLink<f64>, SimulationError> {
        let link = self.0.tick_link(tier, tick)?;
        Ok(TickLink {
            liquidity_delta: link.liquidity_delta.to_f64_lossy(),
            next_below: link.next_below,
            next_above: link.next_above,
        })
    }
}

// ------------------------------- Pool state --------------------------------

/// One tier as fetched from chain.
#[derive(Clone, Debug, PartialEq)]
pub struct TierState<N> {
    pub liquidity: N,
    pub sqrt_price: N,
    pub sqrt_gamma: N,
    pub next_tick_below: i32,
    pub next_tick_above: i32,
}

/// Mutable per-tier arrays; everything a swap is allowed to change.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolState<N> {
    pub liquidities: Vec<N>,
    pub sqrt_prices: Vec<N>,
    pub next_ticks_below: Vec<i32>,
    pub next_ticks_above: Vec<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationParams {
    /// Raw-unit distance from the requested amount at which a swap is done.
    pub swap_amount_tolerance: i64,
    /// Float tier only: remaining fraction under which a repeated step ends the swap.
    pub stagnation_epsilon: f64,
    pub max_steps: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            swap_amount_tolerance: 100,
            stagnation_epsilon: 1e-7,
            max_steps: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwapResult<N> {
    /// Total of the specified token (input if exact-in, output if exact-out).
    pub amount_a: N,
    /// Total of the counter token.
    pub amount_b: N,
    pub fee_amount: N,
    pub amounts_a: Vec<N>,
    pub amounts_b: Vec<N>,
    pub fee_amounts: Vec<N>,
    /// Fee per unit of liquidity, Q64.
    pub fee_growths: Vec<N>,
    pub step_count: usize,
    pub state: PoolState<N>,
}

impl<N: Numeric> SwapResult<N> {
    fn empty(state: &PoolState<N>) -> Self {
        let size = state.liquidities.len();
        Self {
            amount_a: N::zero_value(),
            amount_b: N::zero_value(),
            fee_amount: N::zero_value(),
            amounts_a: vec![N::zero_value(); size],
            amounts_b: vec![N::zero_value(); size],
            fee_amounts: vec![N::zero_value(); size],
            fee_growths: vec![N::zero_value(); size],
            step_count: 0,
            state: state.clone(),
        }
    }
}

pub struct Pool<N, S> {
    state: PoolState<N>,
    sqrt_gammas: Vec<N>,
    ticks: S,
    params: SimulationParams,
}

impl<N: Numeric, S: TickSource<N>> Pool<N, S> {
    pub fn new(tiers: Vec<TierState<N>>, ticks: S) -> Self {
        let mut state = PoolState {
            liquidities: Vec::with_capacity(tiers.len()),
            sqrt_prices: Vec::with_capacity(tiers.len()),
            next_ticks_below: Vec::with_capacity(tiers.len()),
            next_ticks_above: Vec::with_capacity(tiers.len()),
        };
        let mut sqrt_gammas = Vec::with_capacity(tiers.len());
        for tier in tiers {
            state.liquidities.push(tier.liquidity);
            state.sqrt_prices.push(tier.sqrt_price);
            state.next_ticks_below.push(tier.next_tick_below);
            state.next_ticks_above.push(tier.next_tick_above);
            sqrt_gammas.push(tier.sqrt_gamma);
        }
        Self {
            state,
            sqrt_gammas,
            ticks,
            params: SimulationParams::default(),
        }
    }

    pub fn with_params(mut self, params: SimulationParams) -> Self {
        self.params = params;
        self
    }

    pub fn size(&self) -> usize {
        self.sqrt_gammas.len()
    }

    pub fn state(&self) -> &PoolState<N> {
        &self.state
    }

    pub fn sqrt_gammas(&self) -> &[N] {
        &self.sqrt_gammas
    }

    pub fn params(&self) -> SimulationParams {
        self.params
    }

    pub fn ticks(&self) -> &S {
        &self.ticks
    }

    pub fn tiers(&self) -> Vec<TierState<N>> {
        (0..self.size())
            .map(|i| TierState {
                liquidity: self.state.liquidities[i].clone(),
                sqrt_price: self.state.sqrt_prices[i].clone(),
                sqrt_gamma: self.sqrt_gammas[i].clone(),
                next_tick_below: self.state.next_ticks_below[i],
                next_tick_above: self.state.next_ticks_above[i],
            })
            .collect()
    }

    /// Swap against the pool, mutating its state.
    pub fn swap(
        &mut self,
        is_token0: bool,
        amount_desired: &N,
        tier_choices: &[bool],
    ) -> Result<SwapResult<N>, SimulationError> {
        let mut state = self.state.clone();
        let result = self.execute(&mut state, is_token0, amount_desired, tier_choices)?;
        self.state = state;
        Ok(result)
    }

    /// Same as `swap` but on a scratch copy; the pool is left untouched.
    pub fn quote(
        &self,
        is_token0: bool,
        amount_desired: &N,
        tier_choices: &[bool],
    ) -> Result<SwapResult<N>, SimulationError> {
        let mut scratch = self.state.clone();
        self.execute(&mut scratch, is_token0, amount_desired, tier_choices)
    }

    fn execute(
        &self,
        state: &mut PoolState<N>,
        is_token0: bool,
        amount_desired: &N,
        tier_choices: &[bool],
    ) -> Result<SwapResult<N>, SimulationError> {
        let size = self.size();
        if tier_choices.len() != size {
            return Err(SimulationError::MismatchedTiers);
        }

        let mut result = SwapResult::empty(state);
        if amount_desired.is_zero_value() {
            return Ok(result);
        }

        let mut choices = tier_choices.to_vec();
        let exact_in = *amount_desired > N::zero_value();
        let token0_in = is_token0 == exact_in;
        let tolerance = N::from_i64(self.params.swap_amount_tolerance);
        let q64 = N::pow2(64);
        let mut last_step_amount: Option<N> = None;

        while choices.iter().any(|c| *c) {
            result.step_count += 1;

            let remaining = amount_desired.clone() - result.amount_a.clone();
            let (amts, enabled) = allocate_tier_amounts(
                is_token0,
                &remaining,
                &choices,
                TierView {
                    sqrt_gammas: &self.sqrt_gammas,
                    sqrt_prices: &state.sqrt_prices,
                    liquidities: &state.liquidities,
                },
            )?;

            let mut step_amount = N::zero_value();
            let mut crossed = vec![false; size];
            for i in (0..size).filter(|i| enabled[*i]) {
                let next_tick = if token0_in {
                    state.next_ticks_below[i]
                } else {
                    state.next_ticks_above[i]
                };
                let step = compute_step(StepInput {
                    is_token0,
                    exact_in,
                    amount: &amts[i],
                    sqrt_gamma: &self.sqrt_gammas[i],
                    sqrt_price: &state.sqrt_prices[i],
                    liquidity: &state.liquidities[i],
                    next_tick,
                })?;
                if !step.allowed {
                    continue;
                }

                if !step.fee_amount.is_zero_value() && !state.liquidities[i].is_zero_value() {
                    let growth = (step.fee_amount.clone() * q64.clone())
                        .floor_div(&state.liquidities[i])?;
                    result.fee_growths[i] = result.fee_growths[i].clone() + growth;
                }

                step_amount = step_amount + step.amount_a.clone();
                result.amount_a = result.amount_a.clone() + step.amount_a.clone();
                result.amount_b = result.amount_b.clone() + step.amount_b.clone();
                result.fee_amount = result.fee_amount.clone() + step.fee_amount.clone();
                result.amounts_a[i] = result.amounts_a[i].clone() + step.amount_a;
                result.amounts_b[i] = result.amounts_b[i].clone() + step.amount_b;
                result.fee_amounts[i] = result.fee_amounts[i].clone() + step.fee_amount;

                crossed[i] = step.crossed;
                state.sqrt_prices[i] = step.sqrt_price;
            }

            for i in (0..size).filter(|i| crossed[*i]) {
                let tick = if token0_in {
                    state.next_ticks_below[i]
                } else {
                    state.next_ticks_above[i]
                };

                // no liquidity beyond the boundary ticks
                if tick == MIN_TICK || tick == MAX_TICK {
                    log::debug!("tier {} reached boundary tick {}", i, tick);
                    choices[i] = false;
                    continue;
                }

                let link = self.ticks.tick_link(i, tick)?;
                log::debug!(
                    "tier {} crossed tick {} (delta {}, below {}, above {})",
                    i,
                    tick,
                    link.liquidity_delta,
                    link.next_below,
                    link.next_above
                );
                if token0_in {
                    state.liquidities[i] = state.liquidities[i].clone() - link.liquidity_delta;
                    state.next_ticks_below[i] = link.next_below;
                    state.next_ticks_above[i] = tick;
                } else {
                    state.liquidities[i] = state.liquidities[i].clone() + link.liquidity_delta;
                    state.next_ticks_above[i] = link.next_above;
                    state.next_ticks_below[i] = tick;
                }
            }

            let remaining = amount_desired.clone() - result.amount_a.clone();
            let within_tolerance = if exact_in {
                remaining <= tolerance
            } else {
                remaining >= -tolerance.clone()
            };
            if within_tolerance {
                break;
            }

            let remaining_fraction =
                remaining.to_f64_lossy() / amount_desired.to_f64_lossy();
            if !N::EXACT {
                // float rounding can leave a remainder no step will ever consume
                let repeated = last_step_amount.as_ref() == Some(&step_amount);
                if repeated
                    && (step_amount.is_zero_value()
                        || remaining_fraction < self.params.stagnation_epsilon)
                {
                    break;
                }
                last_step_amount = Some(step_amount.clone());
            }

            if result.step_count > self.params.max_steps {
                return Err(SimulationError::TooManySteps {
                    steps: result.step_count,
                    last_step_amount: step_amount.to_f64_lossy(),
                    remaining_fraction,
                });
            }
        }

        result.state = state.clone();
        Ok(result)
    }
}

impl<S: TickSource<BigInt>> Pool<BigInt, S> {
    /// Float copy of this pool for fast screening. Tick links are read from
    /// the same source and converted on the fly.
    pub fn to_float(&self) -> Pool<f64, FloatTicks<'_, S>> {
        let tiers = self
            .tiers()
            .into_iter()
            .map(|t| TierState {
                liquidity: t.liquidity.to_f64_lossy(),
                sqrt_price: t.sqrt_price.to_f64_lossy(),
                sqrt_gamma: t.sqrt_gamma.to_f64_lossy(),
                next_tick_below: t.next_tick_below,
                next_tick_above: t.next_tick_above,
            })
            .collect();
        Pool::new(tiers, FloatTicks(&self.ticks)).with_params(self.params)
    }
}
