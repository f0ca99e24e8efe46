//! Engine error taxonomy
//!
//! Failures here are per-timeframe: one timeframe hitting any of these
//! skips its cycle while the others proceed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Candle window shorter than the largest indicator window
    #[error("insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Slope window reaches back before the first defined EMA value
    #[error("insufficient history: slope window {window} exceeds {available} available EMA values")]
    InsufficientHistory { window: usize, available: usize },

    /// No configuration entry for the requested timeframe
    #[error("no configuration for timeframe '{0}'")]
    MissingTimeframe(String),
}
