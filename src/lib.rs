//! Setup Scout
//!
//! A multi-timeframe signal generation and trade lifecycle engine for
//! cryptocurrency markets. Classifies market regimes from EMA structure,
//! locates volume-backed supply/demand zones, constructs entry/stop/target
//! setups, and tracks each signal through entry, exit, and expiry without
//! look-ahead bias.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod lifecycle;
pub mod notify;
pub mod signal;
pub mod store;
pub mod types;
pub mod zones;

pub use config::Config;
pub use error::EngineError;
pub use types::*;
