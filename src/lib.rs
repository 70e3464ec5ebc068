//! Live ticker table fed by a WebSocket market-data stream.
//!
//! Partial record updates are merged into a keyed snapshot, soft-deleting
//! on tombstones, and flushed to the renderer at most once per throttle
//! interval. The connection lifecycle, subscription control and status
//! counters are driven through a single [`engine::FeedEngine`].

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod metrics;
pub mod state;

pub use config::{Config, ThrottleInterval};
pub use engine::{EngineEvent, FeedEngine, Frame, UserCommand};
pub use error::FeedError;
