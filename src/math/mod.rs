pub mod constant_product;
pub mod hub_pool;
pub mod numeric;
pub mod pool_math;
pub mod swap_math;
pub mod tick_math;

pub use hub_pool::{
    FloatTicks, Pool, PoolState, SimulationParams, SwapResult, TickLink, TickSource, TickTable,
    TierState,
};
pub use numeric::Numeric;
