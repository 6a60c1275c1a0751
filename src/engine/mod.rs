pub mod evaluate;
pub mod optimizer;
pub mod service;
