// src/chain/snapshot.rs
// JSON market snapshots for offline evaluation passes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::types::Address;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::chain::markets::{ConstantProductMarket, HubMarket};
use crate::chain::ticks::tick_link_from_d8;
use crate::engine::service::{MarketSnapshot, MarketSource, SharedMarket};
use crate::math::constant_product::{bigint_to_u256, DEFAULT_FEE_BPS};
use crate::math::{SimulationParams, TickTable, TierState};
use crate::models::{bigint_string, Token, MAX_TIERS};

#[derive(Debug, Deserialize, Serialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(with = "bigint_string")]
    pub base_fee_per_gas: BigInt,
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub hub_pools: Vec<HubPoolRecord>,
    #[serde(default)]
    pub cp_pools: Vec<CpPoolRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HubPoolRecord {
    pub token0: Address,
    pub token1: Address,
    pub tiers: Vec<TierRecord>,
    #[serde(default)]
    pub ticks: Vec<TickRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TierRecord {
    #[serde(with = "bigint_string")]
    pub liquidity: BigInt,
    #[serde(with = "bigint_string")]
    pub sqrt_price: BigInt,
    pub sqrt_gamma: u32,
    pub next_tick_below: i32,
    pub next_tick_above: i32,
}

/// Tick record as returned by the hub's `getTick`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TickRecord {
    pub tier: usize,
    pub tick: i32,
    #[serde(with = "bigint_string")]
    pub liquidity_lower_d8: BigInt,
    #[serde(with = "bigint_string")]
    pub liquidity_upper_d8: BigInt,
    pub next_below: i32,
    pub next_above: i32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CpPoolRecord {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    #[serde(with = "bigint_string")]
    pub reserve0: BigInt,
    #[serde(with = "bigint_string")]
    pub reserve1: BigInt,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
}

fn default_fee_bps() -> u32 {
    DEFAULT_FEE_BPS
}

impl SnapshotFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse market snapshot")
    }

    /// Builds live markets. Every pool token must be listed in `tokens`, in
    /// pool order (lower address first).
    pub fn into_markets(self, params: SimulationParams) -> Result<MarketSnapshot> {
        let by_address: HashMap<Address, Token> = self
            .tokens
            .iter()
            .map(|t| (t.address, t.clone()))
            .collect();
        let pair = |a: Address, b: Address| -> Result<(Token, Token)> {
            if a >= b {
                bail!("pool tokens {:#x}/{:#x} are not in pool order", a, b);
            }
            let t0 = by_address.get(&a).with_context(|| format!("unknown token {:#x}", a))?;
            let t1 = by_address.get(&b).with_context(|| format!("unknown token {:#x}", b))?;
            Ok((t0.clone(), t1.clone()))
        };

        let mut hub_markets: Vec<SharedMarket> = Vec::with_capacity(self.hub_pools.len());
        for pool in self.hub_pools {
            let (t0, t1) = pair(pool.token0, pool.token1)?;
            if pool.tiers.is_empty() {
                bail!("hub pool {}/{} has no tiers", t0, t1);
            }
            if pool.tiers.len() > MAX_TIERS {
                bail!(
                    "hub pool {}/{} has {} tiers, at most {} are supported",
                    t0,
                    t1,
                    pool.tiers.len(),
                    MAX_TIERS
                );
            }
            let tiers = pool
                .tiers
                .into_iter()
                .map(|t| TierState {
                    liquidity: t.liquidity,
                    sqrt_price: t.sqrt_price,
                    sqrt_gamma: BigInt::from(t.sqrt_gamma),
                    next_tick_below: t.next_tick_below,
                    next_tick_above: t.next_tick_above,
                })
                .collect::<Vec<_>>();
            let mut ticks = TickTable::new();
            for t in pool.ticks {
                let link = tick_link_from_d8(
                    &t.liquidity_lower_d8,
                    &t.liquidity_upper_d8,
                    t.next_below,
                    t.next_above,
                );
                ticks.insert(t.tier, t.tick, link);
            }
            log::debug!("hub {}/{}: {} tiers, {} ticks", t0, t1, tiers.len(), ticks.len());
            hub_markets.push(Arc::new(HubMarket::new(t0, t1, tiers, ticks, params)));
        }

        let mut cp_markets: Vec<SharedMarket> = Vec::with_capacity(self.cp_pools.len());
        for pool in self.cp_pools {
            let (t0, t1) = pair(pool.token0, pool.token1)?;
            let reserve0 = bigint_to_u256(&pool.reserve0)
                .with_context(|| format!("bad reserve0 for pair {:#x}", pool.address))?;
            let reserve1 = bigint_to_u256(&pool.reserve1)
                .with_context(|| format!("bad reserve1 for pair {:#x}", pool.address))?;
            cp_markets.push(Arc::new(
                ConstantProductMarket::new(pool.address, t0, t1, reserve0, reserve1)
                    .with_fee_bps(pool.fee_bps),
            ));
        }

        Ok(MarketSnapshot {
            hub_markets,
            cp_markets,
            base_fee_per_gas: self.base_fee_per_gas,
            block_number: self.block_number,
        })
    }
}

/// Re-reads a snapshot file on every `load`.
pub struct SnapshotSource {
    path: PathBuf,
    params: SimulationParams,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>, params: SimulationParams) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }
}

#[async_trait]
impl MarketSource for SnapshotSource {
    async fn load(&self) -> Result<MarketSnapshot> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;
        SnapshotFile::from_json(&json)?.into_markets(self.params)
    }
}
