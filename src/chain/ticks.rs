// src/chain/ticks.rs
// Caller-side memoization for hub tick-link lookups.

use std::collections::HashMap;
use std::sync::Mutex;

use num_bigint::BigInt;

use crate::error::SimulationError;
use crate::math::{TickLink, TickSource};

/// Decode a hub `getTick` record. Liquidity is stored divided by 2^8 on chain.
pub fn tick_link_from_d8(
    liquidity_lower_d8: &BigInt,
    liquidity_upper_d8: &BigInt,
    next_below: i32,
    next_above: i32,
) -> TickLink<BigInt> {
    TickLink {
        liquidity_delta: (liquidity_lower_d8 - liquidity_upper_d8) << 8u32,
        next_below,
        next_above,
    }
}

/// Wraps a possibly slow fetcher; each `(tier, tick)` is fetched at most once.
pub struct CachedTickSource<F> {
    fetch: F,
    cache: Mutex<HashMap<(usize, i32), TickLink<BigInt>>>,
}

impl<F> CachedTickSource<F>
where
    F: Fn(usize, i32) -> Result<TickLink<BigInt>, SimulationError>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl<F> TickSource<BigInt> for CachedTickSource<F>
where
    F: Fn(usize, i32) -> Result<TickLink<BigInt>, SimulationError>,
{
    fn tick_link(&self, tier: usize, tick: i32) -> Result<TickLink<BigInt>, SimulationError> {
        if let Some(hit) = self.cache.lock().map_err(|_| poisoned(tier, tick))?.get(&(tier, tick)) {
            return Ok(hit.clone());
        }

        log::debug!("fetching tick {} of tier {}", tick, tier);
        let link = (self.fetch)(tier, tick)?;
        self.cache
            .lock()
            .map_err(|_| poisoned(tier, tick))?
            .insert((tier, tick), link.clone());
        Ok(link)
    }
}

fn poisoned(tier: usize, tick: i32) -> SimulationError {
    SimulationError::TickFetch {
        tier,
        tick,
        reason: "tick cache lock poisoned".to_string(),
    }
}
