use std::env;
use std::str::FromStr;

use crate::engine::evaluate::EvaluationParams;
use crate::engine::optimizer::SearchParams;
use crate::math::SimulationParams;

#[derive(Debug, Clone)]
pub struct Config {
    // Token addresses
    pub eth_weth_address: String,
    pub eth_usdc_address: String,

    // Pool simulation
    pub swap_amount_tolerance: i64,
    pub float_stagnation_epsilon: f64,
    pub max_swap_steps: usize,

    // Search
    pub search_xatol: u64,
    pub search_xrtol: f64,
    pub search_fatol: u64,
    pub probe_divisor: u64,
    pub probe_floor: u64,
    pub float_screening: bool,

    // Gas constants
    pub gas_per_arb: u64,
    pub eth_price_usdc: u64,

    pub snapshot_path: Option<String>,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration files (secrets first, then public config)
        dotenv::from_filename("secrets.env").ok();
        dotenv::from_filename("config/arb.env").ok();
        dotenv::dotenv().ok();

        let defaults = EvaluationParams::default();
        let sim = SimulationParams::default();

        Ok(Config {
            eth_weth_address: env::var("ETH_WETH_ADDRESS")
                .unwrap_or_else(|_| format!("{:#x}", defaults.weth)),
            eth_usdc_address: env::var("ETH_USDC_ADDRESS")
                .unwrap_or_else(|_| format!("{:#x}", defaults.usdc)),

            swap_amount_tolerance: var_or("SWAP_AMOUNT_TOLERANCE", sim.swap_amount_tolerance),
            float_stagnation_epsilon: var_or("FLOAT_STAGNATION_EPSILON", sim.stagnation_epsilon),
            max_swap_steps: var_or("MAX_SWAP_STEPS", sim.max_steps),

            search_xatol: var_or("SEARCH_XATOL", 1),
            search_xrtol: var_or("SEARCH_XRTOL", 1e-5),
            search_fatol: var_or("SEARCH_FATOL", 1),
            probe_divisor: var_or("PROBE_DIVISOR", defaults.probe_divisor),
            probe_floor: var_or("PROBE_FLOOR", defaults.probe_floor),
            float_screening: var_or("FLOAT_SCREENING", false),

            gas_per_arb: var_or("GAS_PER_ARB", defaults.gas_per_arb),
            eth_price_usdc: var_or("ETH_PRICE_USDC", defaults.eth_price_usdc),

            snapshot_path: env::var("SNAPSHOT_PATH").ok().filter(|p| !p.is_empty()),
        })
    }

    pub fn simulation(&self) -> SimulationParams {
        SimulationParams {
            swap_amount_tolerance: self.swap_amount_tolerance,
            stagnation_epsilon: self.float_stagnation_epsilon,
            max_steps: self.max_swap_steps,
        }
    }

    pub fn search(&self) -> SearchParams {
        SearchParams {
            xatol: self.search_xatol.into(),
            xrtol: self.search_xrtol,
            fatol: self.search_fatol.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let config = Config {
            eth_weth_address: String::new(),
            eth_usdc_address: String::new(),
            swap_amount_tolerance: 100,
            float_stagnation_epsilon: 1e-7,
            max_swap_steps: 100,
            search_xatol: 1,
            search_xrtol: 1e-5,
            search_fatol: 1,
            probe_divisor: 1_000_000,
            probe_floor: 1_000,
            float_screening: false,
            gas_per_arb: 190_000,
            eth_price_usdc: 2_000,
            snapshot_path: None,
        };
        assert_eq!(config.simulation(), SimulationParams::default());
        assert_eq!(config.search(), SearchParams::default());
    }

    #[test]
    fn test_var_or_falls_back_on_garbage() {
        env::set_var("MUFFIN_TEST_GARBAGE", "not-a-number");
        assert_eq!(var_or("MUFFIN_TEST_GARBAGE", 7u64), 7);
        env::set_var("MUFFIN_TEST_GARBAGE", " 42 ");
        assert_eq!(var_or("MUFFIN_TEST_GARBAGE", 7u64), 42);
        assert!(!var_or("MUFFIN_TEST_UNSET_FLAG", false));
    }
}
