use std::str::FromStr;

use ethers::prelude::*;

use crate::config::Config;
use crate::engine::evaluate::EvaluationParams;
use crate::engine::service::ServiceParams;
use crate::math::SimulationParams;

pub struct AppState {
    pub simulation: SimulationParams,
    pub service: ServiceParams,
    pub snapshot_path: Option<String>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let evaluation = EvaluationParams {
            search: config.search(),
            probe_divisor: config.probe_divisor,
            probe_floor: config.probe_floor,
            gas_per_arb: config.gas_per_arb,
            eth_price_usdc: config.eth_price_usdc,

            // Parse token addresses from config
            weth: Address::from_str(&config.eth_weth_address)?,
            usdc: Address::from_str(&config.eth_usdc_address)?,
        };

        Ok(AppState {
            simulation: config.simulation(),
            service: ServiceParams {
                evaluation,
                float_screening: config.float_screening,
            },
            snapshot_path: config.snapshot_path.clone(),
        })
    }
}
