use std::fmt;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------- Tokens ----------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// 10^decimals raw units.
    pub fn unit(&self) -> BigInt {
        BigInt::from(10u8).pow(self.decimals as u32)
    }

    /// Pool token order: lower address first.
    pub fn sort<'a>(a: &'a Token, b: &'a Token) -> (&'a Token, &'a Token) {
        if a.address < b.address {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Human-readable amount, e.g. "1.5 WETH".
    pub fn format_raw_amount(&self, amount: &BigInt) -> String {
        let human = amount
            .to_i128()
            .filter(|_| self.decimals <= 28)
            .and_then(|raw| Decimal::try_from_i128_with_scale(raw, self.decimals as u32).ok())
            .map(|d| d.round_dp(6).normalize().to_string())
            .unwrap_or_else(|| {
                let v = amount.to_f64().unwrap_or(f64::NAN) / 10f64.powi(self.decimals as i32);
                format!("{:.6e}", v)
            });
        format!("{} {}", human, self.symbol)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

// ------------------------------- Tier choices -------------------------------

/// Tiers addressable by a `u32` mask.
pub const MAX_TIERS: usize = 32;

/// Which hub tiers a swap may route through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChoices(pub Vec<bool>);

impl TierChoices {
    pub fn all(tier_count: usize) -> Self {
        Self(vec![true; tier_count])
    }

    /// Bit i set <=> tier i enabled, e.g. [false, false, true] -> 0b100.
    /// Tiers from `MAX_TIERS` on have no bit and are left out.
    pub fn to_mask(&self) -> u32 {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .filter_map(|(i, _)| 1u32.checked_shl(i as u32))
            .fold(0, |mask, bit| mask | bit)
    }

    pub fn from_mask(mask: u32, tier_count: usize) -> Self {
        Self(
            (0..tier_count)
                .map(|i| 1u32.checked_shl(i as u32).map_or(false, |bit| mask & bit != 0))
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// --------------------------------- Markets ----------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketKind {
    Hub,
    ConstantProduct,
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Hub => f.write_str("Hub"),
            MarketKind::ConstantProduct => f.write_str("ConstantProduct"),
        }
    }
}

/// Identifies a market for the transaction builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub kind: MarketKind,
    /// Hub pool id or pair contract address, 0x-prefixed hex.
    pub id: String,
    pub token0: Address,
    pub token1: Address,
}

// -------------------------------- Evaluation --------------------------------

/// A sized, profitable round trip. Amounts are raw token units.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub market1: MarketInfo,
    pub market2: MarketInfo,
    pub token_in: Token,
    pub token_bridge: Token,
    pub tier_choices1: Option<TierChoices>,
    pub tier_choices2: Option<TierChoices>,

    #[serde(with = "bigint_string")]
    pub amt_in: BigInt,
    #[serde(with = "bigint_string")]
    pub amt_bridge: BigInt,
    #[serde(with = "bigint_string")]
    pub amt_out: BigInt,
    #[serde(with = "bigint_string")]
    pub amt_net: BigInt,
    #[serde(with = "bigint_string")]
    pub gas_cost: BigInt,
    #[serde(with = "bigint_string")]
    pub gas_cost_wei: BigInt,
    #[serde(with = "bigint_string")]
    pub profit: BigInt,

    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// One-line summary for logs.
    pub fn brief(&self) -> String {
        format!(
            "{} -> [{}] -> {} -> [{}]: in {}, out {}, profit {}",
            self.token_in,
            self.market1.kind,
            self.token_bridge,
            self.market2.kind,
            self.token_in.format_raw_amount(&self.amt_in),
            self.token_in.format_raw_amount(&self.amt_out),
            self.token_in.format_raw_amount(&self.profit),
        )
    }
}

/// Big integers as decimal strings in JSON.
pub mod bigint_string {
    use std::str::FromStr;

    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigInt::from_str(s.trim()).map_err(de::Error::custom)
    }
}
