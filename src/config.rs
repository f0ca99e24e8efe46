//! Configuration management
//!
//! Loads a JSON configuration file with per-timeframe tables for every
//! tunable the engine consumes: indicator windows, expiry budgets,
//! proximity and dedup thresholds, regime breakpoints, ATR/R multiples and
//! the tagged behavior policies. Telegram credentials overlay from the
//! environment so they never live in the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::types::Regime;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Signal store file path
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Suppress signals whose direction disagrees with the highest
    /// non-ranging timeframe (anchor trend filter)
    #[serde(default)]
    pub anchor_filter: bool,

    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Ordered fast to slow; the anchor-trend filter treats the last
    /// non-ranging entry as the highest timeframe
    #[serde(default = "TimeframeConfig::default_set")]
    pub timeframes: Vec<TimeframeConfig>,
}

fn default_symbol() -> String {
    "BTC/USDT".to_string()
}

fn default_store_path() -> String {
    "signals.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            symbol: default_symbol(),
            store_path: default_store_path(),
            anchor_filter: false,
            telegram: TelegramConfig::default(),
            timeframes: TimeframeConfig::default_set(),
        }
    }
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load Telegram credentials from environment if not set
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            config.telegram.bot_token = Some(token);
        }
        if let Ok(chat_id) = std::env::var("CHAT_ID") {
            config.telegram.chat_id = Some(chat_id);
        }

        Ok(config)
    }

    /// Configuration for a single timeframe, or `MissingTimeframe`
    pub fn timeframe(&self, name: &str) -> Result<&TimeframeConfig, EngineError> {
        self.timeframes
            .iter()
            .find(|tf| tf.name == name)
            .ok_or_else(|| EngineError::MissingTimeframe(name.to_string()))
    }
}

/// Telegram alert channel credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// UTC offset in hours for the human-readable time in alerts
    #[serde(default = "default_alert_utc_offset")]
    pub alert_utc_offset_hours: i32,
}

fn default_alert_utc_offset() -> i32 {
    -5
}

/// Slope thresholds (percent) separating the five regimes.
///
/// Strict `>` comparisons, checked from the strongest bucket down, so every
/// slope maps to exactly one regime and boundary values fall into the
/// lower-magnitude bucket on the upside.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeBreakpoints {
    pub strong_pct: f64,
    pub weak_pct: f64,
}

impl Default for RegimeBreakpoints {
    fn default() -> Self {
        RegimeBreakpoints {
            strong_pct: 0.8,
            weak_pct: 0.3,
        }
    }
}

impl RegimeBreakpoints {
    pub fn classify(&self, slope: f64) -> Regime {
        if slope > self.strong_pct {
            Regime::StrongUp
        } else if slope > self.weak_pct {
            Regime::WeakUp
        } else if slope > -self.weak_pct {
            Regime::Ranging
        } else if slope > -self.strong_pct {
            Regime::WeakDown
        } else {
            Regime::StrongDown
        }
    }
}

/// What a ranging regime does to signal generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangingPolicy {
    /// No trend, no trade (default)
    Suppress,
    /// Fall back to EMA20-vs-EMA50 ordering for direction
    EmaOrder,
}

/// Trend validation applied before constructing an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendFilter {
    /// Require close beyond EMA50 by a tolerance in the trade direction
    /// and EMA20/EMA50 ordered with it
    Strict,
    /// Regime direction alone is enough
    Permissive,
}

/// How the entry price is derived in weak (or EMA-order ranging) regimes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum WeakEntryRule {
    /// Nearest entry-side zone within a relative distance of close;
    /// suppress when none qualifies
    NearestZone { max_distance_pct: f64 },
    /// Fixed retracement fraction of the most recent swing range
    Retracement { fraction: f64, swing_window: usize },
}

/// Deduplication applied against pending signals of the same timeframe
/// and direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Replace the pending signal up to a refinement cap, then keep the old one
    Refine { max_refinements: u32 },
    /// One pending signal per direction, new ones suppressed unconditionally
    SinglePending,
    /// Suppress only when regime matches and the entry moved less than the
    /// threshold; otherwise replace
    Adaptive { entry_delta_pct: f64 },
}

/// Which candle prices detect entry touches and exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    /// Intrabar high/low (default; the complete check)
    HighLow,
    /// Candle close only
    Close,
}

/// Tie-break when stop and target are both hit within one candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPriority {
    /// Record the loss (conservative default)
    StopFirst,
    TargetFirst,
}

/// Which target closes an active signal as won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinTarget {
    Target1,
    Target2,
}

/// Per-timeframe engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeConfig {
    /// Timeframe label, e.g. "15m", "1h", "4h"
    pub name: String,

    /// Candles fetched per cycle
    pub limit: u32,

    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Candles the slope metric looks back over
    #[serde(default = "default_slope_window")]
    pub slope_window: usize,
    #[serde(default = "default_zone_lookback")]
    pub zone_lookback: usize,

    /// Pending signals expire after this long
    pub expiry_secs: i64,

    /// Reject entries farther than this from the current close (percent)
    pub max_entry_distance_pct: f64,

    #[serde(default = "default_atr_stop_multiple")]
    pub atr_stop_multiple: f64,
    #[serde(default = "default_target1_r")]
    pub target1_r: f64,
    #[serde(default = "default_target2_r")]
    pub target2_r: f64,

    /// Fraction of the way from EMA20 toward EMA50 for strong-regime entries
    #[serde(default = "default_strong_entry_weight")]
    pub strong_entry_weight: f64,

    /// Close must clear EMA50 by this much (percent) under the strict filter
    #[serde(default = "default_trend_tolerance_pct")]
    pub trend_tolerance_pct: f64,

    #[serde(default)]
    pub regime_breakpoints: RegimeBreakpoints,

    #[serde(default = "default_ranging_policy")]
    pub ranging_policy: RangingPolicy,
    #[serde(default = "default_trend_filter")]
    pub trend_filter: TrendFilter,
    #[serde(default = "default_weak_entry")]
    pub weak_entry: WeakEntryRule,
    pub dedup: DedupPolicy,
    #[serde(default = "default_exit_trigger")]
    pub exit_trigger: ExitTrigger,
    #[serde(default = "default_intrabar_priority")]
    pub intrabar_priority: IntrabarPriority,
    #[serde(default = "default_win_target")]
    pub win_target: WinTarget,
}

fn default_ema_fast() -> usize {
    20
}
fn default_ema_slow() -> usize {
    50
}
fn default_atr_period() -> usize {
    14
}
fn default_slope_window() -> usize {
    10
}
fn default_zone_lookback() -> usize {
    50
}
fn default_atr_stop_multiple() -> f64 {
    1.5
}
fn default_target1_r() -> f64 {
    2.0
}
fn default_target2_r() -> f64 {
    3.0
}
fn default_strong_entry_weight() -> f64 {
    0.8
}
fn default_trend_tolerance_pct() -> f64 {
    0.5
}
fn default_ranging_policy() -> RangingPolicy {
    RangingPolicy::Suppress
}
fn default_trend_filter() -> TrendFilter {
    TrendFilter::Strict
}
fn default_weak_entry() -> WeakEntryRule {
    WeakEntryRule::NearestZone {
        max_distance_pct: 0.3,
    }
}
fn default_exit_trigger() -> ExitTrigger {
    ExitTrigger::HighLow
}
fn default_intrabar_priority() -> IntrabarPriority {
    IntrabarPriority::StopFirst
}
fn default_win_target() -> WinTarget {
    WinTarget::Target2
}

impl TimeframeConfig {
    /// Candle count required before the generator can run at all
    pub fn min_candles(&self) -> usize {
        (self.ema_slow + self.slope_window).max(self.atr_period + 1)
    }

    /// The deployed 15m/1h/4h set: refinement dedup on the fast timeframe,
    /// single-pending on the slower two, expiry 2h/12h/3d.
    pub fn default_set() -> Vec<TimeframeConfig> {
        vec![
            TimeframeConfig {
                dedup: DedupPolicy::Refine { max_refinements: 3 },
                ..TimeframeConfig::base("15m", 778, 2 * 3600, 1.5)
            },
            TimeframeConfig::base("1h", 490, 12 * 3600, 2.5),
            TimeframeConfig::base("4h", 188, 3 * 24 * 3600, 4.0),
        ]
    }

    fn base(name: &str, limit: u32, expiry_secs: i64, max_entry_distance_pct: f64) -> Self {
        TimeframeConfig {
            name: name.to_string(),
            limit,
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            atr_period: default_atr_period(),
            slope_window: default_slope_window(),
            zone_lookback: default_zone_lookback(),
            expiry_secs,
            max_entry_distance_pct,
            atr_stop_multiple: default_atr_stop_multiple(),
            target1_r: default_target1_r(),
            target2_r: default_target2_r(),
            strong_entry_weight: default_strong_entry_weight(),
            trend_tolerance_pct: default_trend_tolerance_pct(),
            regime_breakpoints: RegimeBreakpoints::default(),
            ranging_policy: default_ranging_policy(),
            trend_filter: default_trend_filter(),
            weak_entry: default_weak_entry(),
            dedup: DedupPolicy::SinglePending,
            exit_trigger: default_exit_trigger(),
            intrabar_priority: default_intrabar_priority(),
            win_target: default_win_target(),
        }
    }
}
