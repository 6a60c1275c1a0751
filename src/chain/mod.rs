pub mod markets;
pub mod snapshot;
pub mod ticks;
