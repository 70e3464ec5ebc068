pub mod adapters;
pub mod market_worker;
pub mod router;
pub mod transport;
pub mod types;
