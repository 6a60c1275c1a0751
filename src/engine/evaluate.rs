// src/engine/evaluate.rs
// ============================================================================
// Sizing and pricing a two-leg round trip.
//
// Leg 1 sells `token_in` for `token_bridge`, leg 2 sells the bridge amount
// back. The net profit in `token_in` is maximized over the input amount, then
// the gas bill (converted to `token_in`) is taken off.
// ============================================================================

use chrono::Utc;
use ethers::types::{Address, H160};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::chain::markets::Market;
use crate::engine::optimizer::{gen_guess, maximize, Memoized, SearchParams};
use crate::error::{Error, EvaluationFailure, MathError, SimulationError};
use crate::models::{EvaluationResult, TierChoices, Token};

pub const MAINNET_WETH: Address = H160([
    0xc0, 0x2a, 0xaa, 0x39, 0xb2, 0x23, 0xfe, 0x8d, 0x0a, 0x0e, 0x5c, 0x4f, 0x27, 0xea, 0xd9,
    0x08, 0x3c, 0x75, 0x6c, 0xc2,
]);

pub const MAINNET_USDC: Address = H160([
    0xa0, 0xb8, 0x69, 0x91, 0xc6, 0x21, 0x8b, 0x36, 0xc1, 0xd1, 0x9d, 0x4a, 0x2e, 0x9e, 0xb0,
    0xce, 0x36, 0x06, 0xeb, 0x48,
]);

#[derive(Clone, Debug)]
pub struct EvaluationParams {
    pub search: SearchParams,
    /// Probe amount is `unit / probe_divisor`, floored at `probe_floor`.
    pub probe_divisor: u64,
    pub probe_floor: u64,
    pub gas_per_arb: u64,
    /// Static ETH price in whole USDC, used to price gas for USDC inputs.
    pub eth_price_usdc: u64,
    pub weth: Address,
    pub usdc: Address,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            search: SearchParams::default(),
            probe_divisor: 1_000_000,
            probe_floor: 1_000,
            gas_per_arb: 190_000,
            eth_price_usdc: 2_000,
            weth: MAINNET_WETH,
            usdc: MAINNET_USDC,
        }
    }
}

/// One market of the round trip, with the hub tiers it may use.
pub struct Leg<'a> {
    pub market: &'a dyn Market,
    pub tier_choices: Option<TierChoices>,
}

impl<'a> Leg<'a> {
    /// All tiers enabled for hub markets, none for the rest.
    pub fn new(market: &'a dyn Market) -> Self {
        Self {
            market,
            tier_choices: market.tier_count().map(TierChoices::all),
        }
    }

    pub fn with_tier_choices(market: &'a dyn Market, tier_choices: TierChoices) -> Self {
        Self {
            market,
            tier_choices: Some(tier_choices),
        }
    }

    fn sell(&self, token: &Token, amount: &BigInt) -> Result<BigInt, SimulationError> {
        let received = self.market.quote(token, amount, self.tier_choices.as_ref())?;
        Ok(-received)
    }

    fn sell_float(&self, token: &Token, amount: f64) -> Result<f64, SimulationError> {
        let received = self
            .market
            .quote_float(token, amount, self.tier_choices.as_ref())?;
        Ok(-received)
    }
}

#[derive(Clone, Debug)]
struct RoundTrip {
    amt_net: BigInt,
    amt_bridge: BigInt,
    amt_out: BigInt,
}

fn round_trip(
    leg1: &Leg<'_>,
    leg2: &Leg<'_>,
    token_in: &Token,
    token_bridge: &Token,
    amt_in: &BigInt,
) -> Result<RoundTrip, SimulationError> {
    if amt_in.is_negative() {
        return Err(MathError::InvalidAmount {
            expected: "non-negative",
            got: amt_in.to_string(),
        }
        .into());
    }
    let amt_bridge = leg1.sell(token_in, amt_in)?;
    let amt_out = leg2.sell(token_bridge, &amt_bridge)?;
    Ok(RoundTrip {
        amt_net: &amt_out - amt_in,
        amt_bridge,
        amt_out,
    })
}

fn probe_amount(token_in: &Token, params: &EvaluationParams) -> BigInt {
    let scaled = token_in.unit() / BigInt::from(params.probe_divisor.max(1));
    scaled.max(BigInt::from(params.probe_floor))
}

/// Gas bill expressed in `token_in` raw units.
pub fn gas_cost_in(
    token_in: &Token,
    gas_cost_wei: &BigInt,
    params: &EvaluationParams,
) -> Result<BigInt, EvaluationFailure> {
    if token_in.address == params.weth {
        Ok(gas_cost_wei.clone())
    } else if token_in.address == params.usdc {
        let wei_per_eth = BigInt::from(10u64.pow(18));
        Ok(gas_cost_wei * BigInt::from(params.eth_price_usdc) * token_in.unit() / wei_per_eth)
    } else {
        Err(EvaluationFailure::UnpricedGasToken(token_in.symbol.clone()))
    }
}

/// Size and price the round trip `token_in -> leg1 -> token_bridge -> leg2 -> token_in`.
///
/// Ordinary "no opportunity" outcomes come back as `Error::Evaluation`;
/// simulation failures are `Error::Simulation` and should not be swallowed.
pub fn evaluate_arb(
    leg1: &Leg<'_>,
    leg2: &Leg<'_>,
    token_in: &Token,
    token_bridge: &Token,
    gas_price_wei: &BigInt,
    params: &EvaluationParams,
) -> Result<EvaluationResult, Error> {
    let mut arbitrage =
        Memoized::new(|x: &BigInt| round_trip(leg1, leg2, token_in, token_bridge, x));

    let probe = probe_amount(token_in, params);
    let probed = arbitrage.get(&probe)?;
    if !probed.amt_net.is_positive() {
        return Err(EvaluationFailure::NotProfitable {
            amt_net: probed.amt_net,
        }
        .into());
    }

    let amt_in = maximize(
        |x: &BigInt| arbitrage.get(x).map(|r| r.amt_net),
        gen_guess(BigInt::from(1), token_in.unit()),
        &params.search,
    )?;
    let best = arbitrage.get(&amt_in)?;
    log::debug!(
        "{} -> {}: {} simulations, best input {}",
        token_in,
        token_bridge,
        arbitrage.len(),
        amt_in
    );

    let gas_cost_wei = BigInt::from(params.gas_per_arb) * gas_price_wei;
    let gas_cost = gas_cost_in(token_in, &gas_cost_wei, params)?;
    let profit = &best.amt_net - &gas_cost;
    if !profit.is_positive() {
        return Err(EvaluationFailure::NegativeProfit {
            profit,
            amt_net: best.amt_net,
            gas_cost,
        }
        .into());
    }

    Ok(EvaluationResult {
        market1: leg1.market.info(),
        market2: leg2.market.info(),
        token_in: token_in.clone(),
        token_bridge: token_bridge.clone(),
        tier_choices1: leg1.tier_choices.clone(),
        tier_choices2: leg2.tier_choices.clone(),
        amt_in,
        amt_bridge: best.amt_bridge,
        amt_out: best.amt_out,
        amt_net: best.amt_net,
        gas_cost,
        gas_cost_wei,
        profit,
        evaluated_at: Utc::now(),
    })
}

/// Float-tier net result at the probe amount. Only a screening signal.
pub fn screen_float(
    leg1: &Leg<'_>,
    leg2: &Leg<'_>,
    token_in: &Token,
    token_bridge: &Token,
    params: &EvaluationParams,
) -> Result<f64, SimulationError> {
    let amt_in = probe_amount(token_in, params).to_f64().unwrap_or(0.0);
    let amt_bridge = leg1.sell_float(token_in, amt_in)?;
    if amt_bridge <= 0.0 {
        return Ok(-amt_in);
    }
    let amt_out = leg2.sell_float(token_bridge, amt_bridge)?;
    Ok(amt_out - amt_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::markets::ConstantProductMarket;
    use ethers::types::U256;
    use num_traits::Zero;

    fn weth() -> Token {
        Token::new(MAINNET_WETH, "WETH", 18)
    }

    fn usdc() -> Token {
        Token::new(MAINNET_USDC, "USDC", 6)
    }

    /// USDC/WETH pair quoting `usdc_per_eth` with 1000 WETH of depth.
    fn pair(byte: u8, usdc_per_eth: u64) -> ConstantProductMarket {
        let (t0, t1) = (usdc(), weth());
        ConstantProductMarket::new(
            Address::repeat_byte(byte),
            t0,
            t1,
            U256::from(usdc_per_eth * 1_000) * U256::exp10(6),
            U256::exp10(21),
        )
    }

    #[test]
    fn finds_profit_between_mispriced_pairs() {
        let cheap = pair(0xa1, 1_900);
        let dear = pair(0xa2, 2_100);
        let leg1 = Leg::new(&dear);
        let leg2 = Leg::new(&cheap);

        let res = evaluate_arb(
            &leg1,
            &leg2,
            &weth(),
            &usdc(),
            &BigInt::from(10u64.pow(9)),
            &EvaluationParams::default(),
        )
        .unwrap();

        assert!(res.profit.is_positive());
        assert_eq!(res.amt_net, &res.amt_out - &res.amt_in);
        assert_eq!(res.gas_cost_wei, BigInt::from(190_000u64 * 10u64.pow(9)));
        assert_eq!(res.gas_cost, res.gas_cost_wei);
        assert!(res.tier_choices1.is_none());

        // moving off the optimum by 1% in either direction is no better
        let one_pct = &res.amt_in / BigInt::from(100);
        for x in [&res.amt_in - &one_pct, &res.amt_in + &one_pct] {
            let rt = round_trip(&leg1, &leg2, &weth(), &usdc(), &x).unwrap();
            assert!(rt.amt_net <= res.amt_net);
        }
    }

    #[test]
    fn equal_prices_are_not_profitable() {
        let a = pair(0xa1, 2_000);
        let b = pair(0xa2, 2_000);
        let err = evaluate_arb(
            &Leg::new(&a),
            &Leg::new(&b),
            &weth(),
            &usdc(),
            &BigInt::zero(),
            &EvaluationParams::default(),
        )
        .unwrap_err();
        assert!(err.is_evaluation_failure());
        assert!(matches!(
            err,
            Error::Evaluation(EvaluationFailure::NotProfitable { .. })
        ));
    }

    #[test]
    fn gas_can_eat_the_profit() {
        // 190 ETH of gas at 1e15 wei per unit
        let cheap = pair(0xa1, 1_900);
        let dear = pair(0xa2, 2_100);
        let err = evaluate_arb(
            &Leg::new(&dear),
            &Leg::new(&cheap),
            &weth(),
            &usdc(),
            &BigInt::from(10u64.pow(15)),
            &EvaluationParams::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Evaluation(EvaluationFailure::NegativeProfit { .. })
        ));
    }

    #[test]
    fn converts_gas_to_usdc() {
        let params = EvaluationParams::default();
        // 0.01 ETH at 2000 USDC/ETH = 20 USDC
        let wei = BigInt::from(10u64.pow(16));
        assert_eq!(
            gas_cost_in(&usdc(), &wei, &params).unwrap(),
            BigInt::from(20_000_000u64)
        );
        assert_eq!(gas_cost_in(&weth(), &wei, &params).unwrap(), wei);

        let dai = Token::new(Address::repeat_byte(0xda), "DAI", 18);
        assert_eq!(
            gas_cost_in(&dai, &wei, &params),
            Err(EvaluationFailure::UnpricedGasToken("DAI".to_string()))
        );
    }

    #[test]
    fn probe_respects_floor() {
        let params = EvaluationParams::default();
        assert_eq!(probe_amount(&weth(), &params), BigInt::from(10u64.pow(12)));
        assert_eq!(probe_amount(&usdc(), &params), BigInt::from(1_000));
    }

    #[test]
    fn float_screen_agrees_on_direction() {
        let cheap = pair(0xa1, 1_900);
        let dear = pair(0xa2, 2_100);
        let params = EvaluationParams::default();
        let good = screen_float(&Leg::new(&dear), &Leg::new(&cheap), &weth(), &usdc(), &params)
            .unwrap();
        let bad = screen_float(&Leg::new(&cheap), &Leg::new(&dear), &weth(), &usdc(), &params)
            .unwrap();
        assert!(good > 0.0);
        assert!(bad < 0.0);
    }
}
