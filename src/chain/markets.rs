// src/chain/markets.rs
// Quote interface shared by the hub pool and constant-product pairs.
//
// Sign convention for `quote`: `amount_desired` is the change in the market's
// balance of `token` (positive = we send it in, negative = we take it out).
// The return value is the matching change of the other token.

use ethers::abi::{self, Token as AbiToken};
use ethers::types::{Address, H256, U256};
use ethers::utils::{get_create2_address_from_hash, keccak256};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::error::SimulationError;
use crate::math::constant_product::{self, bigint_to_u256, u256_to_bigint, DEFAULT_FEE_BPS};
use crate::math::{Numeric, Pool, SimulationParams, TickSource, TierState};
use crate::models::{MarketInfo, MarketKind, TierChoices, Token};

/// Uniswap V2 pair init code hash (mainnet factory).
pub const UNISWAP_V2_INIT_CODE_HASH: [u8; 32] = [
    0x96, 0xe8, 0xac, 0x42, 0x77, 0x19, 0x8f, 0xf8,
    0xb6, 0xf7, 0x85, 0x47, 0x8a, 0xa9, 0xa3, 0x9f,
    0x40, 0x3c, 0xb7, 0x68, 0xdd, 0x02, 0xcb, 0xee,
    0x32, 0x6c, 0x3e, 0x7d, 0xa3, 0x48, 0x84, 0x5f,
];

pub trait Market {
    fn info(&self) -> MarketInfo;

    fn token0(&self) -> &Token;

    fn token1(&self) -> &Token;

    /// Number of hub tiers, if the market has any.
    fn tier_count(&self) -> Option<usize> {
        None
    }

    fn quote(
        &self,
        token: &Token,
        amount_desired: &BigInt,
        tier_choices: Option<&TierChoices>,
    ) -> Result<BigInt, SimulationError>;

    /// Approximate quote for screening.
    fn quote_float(
        &self,
        token: &Token,
        amount_desired: f64,
        tier_choices: Option<&TierChoices>,
    ) -> Result<f64, SimulationError>;

    fn trades(&self, token: &Token) -> bool {
        token.address == self.token0().address || token.address == self.token1().address
    }
}

fn side_of(market: &dyn Market, token: &Token) -> Result<bool, SimulationError> {
    if token.address == market.token0().address {
        Ok(true)
    } else if token.address == market.token1().address {
        Ok(false)
    } else {
        Err(SimulationError::UnknownToken(format!("{:#x}", token.address)))
    }
}

// -------------------------------- Hub pool ----------------------------------

pub struct HubMarket<S> {
    token0: Token,
    token1: Token,
    pool_id: H256,
    pool: Pool<BigInt, S>,
}

impl<S: TickSource<BigInt>> HubMarket<S> {
    pub fn new(
        token0: Token,
        token1: Token,
        tiers: Vec<TierState<BigInt>>,
        ticks: S,
        params: SimulationParams,
    ) -> Self {
        let pool_id = Self::compute_pool_id(token0.address, token1.address);
        Self {
            token0,
            token1,
            pool_id,
            pool: Pool::new(tiers, ticks).with_params(params),
        }
    }

    /// keccak256(abi.encode(token0, token1))
    pub fn compute_pool_id(token0: Address, token1: Address) -> H256 {
        let encoded = abi::encode(&[AbiToken::Address(token0), AbiToken::Address(token1)]);
        H256::from(keccak256(encoded))
    }

    pub fn pool_id(&self) -> H256 {
        self.pool_id
    }

    pub fn pool(&self) -> &Pool<BigInt, S> {
        &self.pool
    }

    fn choices(&self, tier_choices: Option<&TierChoices>) -> TierChoices {
        tier_choices
            .cloned()
            .unwrap_or_else(|| TierChoices::all(self.pool.size()))
    }
}

impl<S: TickSource<BigInt>> Market for HubMarket<S> {
    fn info(&self) -> MarketInfo {
        MarketInfo {
            kind: MarketKind::Hub,
            id: format!("{:#x}", self.pool_id),
            token0: self.token0.address,
            token1: self.token1.address,
        }
    }

    fn token0(&self) -> &Token {
        &self.token0
    }

    fn token1(&self) -> &Token {
        &self.token1
    }

    fn tier_count(&self) -> Option<usize> {
        Some(self.pool.size())
    }

    fn quote(
        &self,
        token: &Token,
        amount_desired: &BigInt,
        tier_choices: Option<&TierChoices>,
    ) -> Result<BigInt, SimulationError> {
        let is_token0 = side_of(self, token)?;
        let choices = self.choices(tier_choices);
        let res = self.pool.quote(is_token0, amount_desired, choices.as_slice())?;
        log::debug!(
            "hub quote {} {} -> {} ({} steps)",
            amount_desired,
            token.symbol,
            res.amount_b,
            res.step_count
        );
        Ok(res.amount_b)
    }

    fn quote_float(
        &self,
        token: &Token,
        amount_desired: f64,
        tier_choices: Option<&TierChoices>,
    ) -> Result<f64, SimulationError> {
        let is_token0 = side_of(self, token)?;
        let choices = self.choices(tier_choices);
        let res = self
            .pool
            .to_float()
            .quote(is_token0, &amount_desired, choices.as_slice())?;
        Ok(res.amount_b)
    }
}

// ---------------------------- Constant product ------------------------------

#[derive(Clone, Debug)]
pub struct ConstantProductMarket {
    address: Address,
    token0: Token,
    token1: Token,
    reserve0: U256,
    reserve1: U256,
    fee_bps: u32,
}

impl ConstantProductMarket {
    pub fn new(address: Address, token0: Token, token1: Token, reserve0: U256, reserve1: U256) -> Self {
        Self {
            address,
            token0,
            token1,
            reserve0,
            reserve1,
            fee_bps: DEFAULT_FEE_BPS,
        }
    }

    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps;
        self
    }

    /// CREATE2 address of a V2-style pair.
    pub fn compute_pair_address(
        factory: Address,
        token0: Address,
        token1: Address,
    ) -> Address {
        let mut packed = Vec::with_capacity(40);
        packed.extend_from_slice(token0.as_bytes());
        packed.extend_from_slice(token1.as_bytes());
        let salt = keccak256(packed);
        get_create2_address_from_hash(factory, salt, UNISWAP_V2_INIT_CODE_HASH)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn reserves(&self) -> (U256, U256) {
        (self.reserve0, self.reserve1)
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    /// token1 per token0, decimals applied.
    pub fn price(&self) -> f64 {
        constant_product::spot_price(
            self.reserve0,
            self.reserve1,
            self.token0.decimals,
            self.token1.decimals,
        )
    }

    fn reserves_for(&self, token_is0: bool, exact_in: bool) -> (U256, U256) {
        if token_is0 == exact_in {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        }
    }
}

impl Market for ConstantProductMarket {
    fn info(&self) -> MarketInfo {
        MarketInfo {
            kind: MarketKind::ConstantProduct,
            id: format!("{:#x}", self.address),
            token0: self.token0.address,
            token1: self.token1.address,
        }
    }

    fn token0(&self) -> &Token {
        &self.token0
    }

    fn token1(&self) -> &Token {
        &self.token1
    }

    fn quote(
        &self,
        token: &Token,
        amount_desired: &BigInt,
        _tier_choices: Option<&TierChoices>,
    ) -> Result<BigInt, SimulationError> {
        let token_is0 = side_of(self, token)?;
        if amount_desired.is_zero() {
            return Ok(BigInt::zero());
        }
        let exact_in = amount_desired.is_positive();
        let (res_in, res_out) = self.reserves_for(token_is0, exact_in);

        if exact_in {
            let out = constant_product::amount_out(
                bigint_to_u256(amount_desired)?,
                res_in,
                res_out,
                self.fee_bps,
            )?;
            Ok(-u256_to_bigint(out))
        } else {
            let wanted = bigint_to_u256(&amount_desired.abs())?;
            let needed = constant_product::amount_in(wanted, res_in, res_out, self.fee_bps)?;
            Ok(u256_to_bigint(needed))
        }
    }

    fn quote_float(
        &self,
        token: &Token,
        amount_desired: f64,
        _tier_choices: Option<&TierChoices>,
    ) -> Result<f64, SimulationError> {
        let token_is0 = side_of(self, token)?;
        if amount_desired == 0.0 {
            return Ok(0.0);
        }
        let exact_in = amount_desired > 0.0;
        let (res_in, res_out) = self.reserves_for(token_is0, exact_in);
        let r_in = u256_to_bigint(res_in).to_f64_lossy();
        let r_out = u256_to_bigint(res_out).to_f64_lossy();
        let gamma = 1.0 - self.fee_bps as f64 / 10_000.0;

        if exact_in {
            let with_fee = amount_desired * gamma;
            Ok(-(with_fee * r_out / (r_in + with_fee)))
        } else {
            let out = -amount_desired;
            if out >= r_out {
                return Err(SimulationError::InsufficientReserves {
                    requested: out.to_string(),
                    reserve: r_out.to_string(),
                });
            }
            Ok(r_in * out / ((r_out - out) * gamma))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::TickTable;
    use num_traits::One;
    use std::str::FromStr;

    fn token(byte: u8, symbol: &str, decimals: u8) -> Token {
        Token::new(Address::repeat_byte(byte), symbol, decimals)
    }

    fn pair() -> ConstantProductMarket {
        ConstantProductMarket::new(
            Address::repeat_byte(0xaa),
            token(1, "USDC", 6),
            token(2, "WETH", 18),
            U256::from(2_000_000u64) * U256::exp10(6),
            U256::exp10(21),
        )
    }

    #[test]
    fn constant_product_quote_signs() {
        let m = pair();
        let usdc = m.token0().clone();
        let weth = m.token1().clone();

        // sell 1 WETH
        let got = m.quote(&weth, &BigInt::from(10u64.pow(18)), None).unwrap();
        assert!(got < BigInt::zero());
        assert!(got > BigInt::from(-2_000_000_000i64));

        // buy 1000 USDC out
        let cost = m.quote(&usdc, &BigInt::from(-1_000_000_000i64), None).unwrap();
        assert!(cost > BigInt::zero());
        assert!(cost > BigInt::from(5u64) * BigInt::from(10u64.pow(17)));

        assert!((m.price() - 1.0 / 2_000.0).abs() < 1e-12);
    }

    #[test]
    fn float_quote_tracks_exact() {
        let m = pair();
        let weth = m.token1().clone();
        let exact = m.quote(&weth, &BigInt::from(10u64.pow(18)), None).unwrap();
        let approx = m.quote_float(&weth, 1e18, None).unwrap();
        assert!((exact.to_f64_lossy() - approx).abs() <= 1.0);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let m = pair();
        let other = token(3, "DAI", 18);
        assert!(matches!(
            m.quote(&other, &BigInt::one(), None),
            Err(SimulationError::UnknownToken(_))
        ));
    }

    #[test]
    fn uniswap_v2_pair_address() {
        // WETH/USDC pair on mainnet
        let factory = Address::from_str("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f").unwrap();
        let usdc = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let weth = Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap();
        let pair = ConstantProductMarket::compute_pair_address(factory, usdc, weth);
        assert_eq!(
            pair,
            Address::from_str("0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc").unwrap()
        );
    }

    #[test]
    fn hub_market_defaults_to_all_tiers() {
        let q72 = BigInt::one() << 72u32;
        let tier = |sg: i64| TierState {
            liquidity: BigInt::from(10u64.pow(18)),
            sqrt_price: q72.clone(),
            sqrt_gamma: BigInt::from(sg),
            next_tick_below: crate::math::tick_math::MIN_TICK,
            next_tick_above: crate::math::tick_math::MAX_TICK,
        };
        let m = HubMarket::new(
            token(1, "USDC", 6),
            token(2, "WETH", 18),
            vec![tier(99_975), tier(99_850)],
            TickTable::<BigInt>::new(),
            SimulationParams::default(),
        );
        let usdc = m.token0().clone();
        let amount = BigInt::from(10u64.pow(12));

        let all = m.quote(&usdc, &amount, None).unwrap();
        let explicit = m
            .quote(&usdc, &amount, Some(&TierChoices(vec![true, true])))
            .unwrap();
        let one = m
            .quote(&usdc, &amount, Some(&TierChoices(vec![false, true])))
            .unwrap();
        assert_eq!(all, explicit);
        // two tiers give a better (more negative) output than one
        assert!(all < one);
        assert_eq!(m.tier_count(), Some(2));
        assert_eq!(m.info().kind, MarketKind::Hub);
        assert!(m.info().id.starts_with("0x"));
    }
}
