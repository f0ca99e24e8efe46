//! Core data types used across the signal engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }
}

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every signal and every log line; Arc<str> keeps
/// that O(1) instead of reallocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol stripped of separators, for use in signal ids ("BTC/USDT" -> "BTCUSDT")
    pub fn compact(&self) -> String {
        self.0.chars().filter(|c| c.is_alphanumeric()).collect()
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction, fixed at signal creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for Long, -1.0 for Short; used to sign stop/target offsets
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Single-letter tag used in signal ids
    pub fn tag(self) -> char {
        match self {
            Direction::Long => 'L',
            Direction::Short => 'S',
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

/// Market regime classified from the normalized EMA slope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    StrongUp,
    WeakUp,
    Ranging,
    WeakDown,
    StrongDown,
}

impl Regime {
    pub fn is_up(self) -> bool {
        matches!(self, Regime::StrongUp | Regime::WeakUp)
    }

    pub fn is_down(self) -> bool {
        matches!(self, Regime::StrongDown | Regime::WeakDown)
    }

    pub fn is_strong(self) -> bool {
        matches!(self, Regime::StrongUp | Regime::StrongDown)
    }

    pub fn is_ranging(self) -> bool {
        self == Regime::Ranging
    }

    /// Direction implied by the regime, None when ranging
    pub fn direction(self) -> Option<Direction> {
        if self.is_up() {
            Some(Direction::Long)
        } else if self.is_down() {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regime::StrongUp => "strong_up",
            Regime::WeakUp => "weak_up",
            Regime::Ranging => "ranging",
            Regime::WeakDown => "weak_down",
            Regime::StrongDown => "strong_down",
        };
        write!(f, "{}", s)
    }
}

/// Signal lifecycle status
///
/// Transitions are one-directional: pending -> active -> {won, lost},
/// or pending -> expired. Terminal states are never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Active,
    Won,
    Lost,
    Expired,
}

impl SignalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SignalStatus::Won | SignalStatus::Lost | SignalStatus::Expired
        )
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Active => "active",
            SignalStatus::Won => "won",
            SignalStatus::Lost => "lost",
            SignalStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// A proposed trade setup tracked through its lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub symbol: Symbol,
    pub timeframe: String,
    pub direction: Direction,
    pub status: SignalStatus,
    pub regime: Regime,
    pub entry: f64,
    pub stop: f64,
    pub target1: f64,
    pub target2: f64,
    pub risk_reward: f64,
    /// How many times this setup has replaced an earlier pending one
    pub refinements: u32,
    pub signal_time: DateTime<Utc>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
}

impl Signal {
    pub fn is_pending(&self) -> bool {
        self.status == SignalStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
