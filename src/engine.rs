//! Per-timeframe cycle orchestration
//!
//! One synchronous pass: indicators -> zones -> signal generation (deduped
//! against the store's pending signals) -> store mutation -> lifecycle
//! advance. The store map is owned by the caller for the whole run; this
//! module only mutates it in memory.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::TimeframeConfig;
use crate::error::EngineError;
use crate::lifecycle::{self, Transition};
use crate::signal::{Emission, SignalGenerator};
use crate::types::{Candle, Direction, Signal, Symbol};
use crate::zones;

/// Cross-timeframe anchor-trend constraint for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorFilter {
    /// No constraint (filter disabled)
    Off,
    /// Only signals agreeing with the anchor timeframe's direction pass
    Require(Direction),
    /// Every timeframe is ranging; no generation this cycle
    SuppressAll,
}

impl AnchorFilter {
    fn allows(self, direction: Direction) -> bool {
        match self {
            AnchorFilter::Off => true,
            AnchorFilter::Require(anchor) => direction == anchor,
            AnchorFilter::SuppressAll => false,
        }
    }
}

/// State change visible to the notification channel
#[derive(Debug, Clone)]
pub enum SignalEvent {
    Created(Signal),
    Refined { replaced: String, signal: Signal },
    Activated(Signal),
    Won(Signal),
    Lost(Signal),
    Expired(Signal),
}

/// Pick the anchor direction from per-timeframe regimes, ordered fast to
/// slow: the highest timeframe with a non-ranging trend anchors the cycle.
pub fn anchor_from_regimes(regimes: &[(String, crate::types::Regime)]) -> AnchorFilter {
    regimes
        .iter()
        .rev()
        .find_map(|(_, regime)| regime.direction())
        .map(AnchorFilter::Require)
        .unwrap_or(AnchorFilter::SuppressAll)
}

/// Run one timeframe's cycle against the shared store map.
///
/// Candles must be in ascending timestamp order. Returns the ordered list
/// of state changes; errors skip this timeframe without touching the store.
pub fn run_timeframe_cycle(
    cfg: &TimeframeConfig,
    symbol: &Symbol,
    candles: &[Candle],
    store: &mut HashMap<String, Signal>,
    now: DateTime<Utc>,
    anchor: AnchorFilter,
) -> Result<Vec<SignalEvent>, EngineError> {
    let needed = cfg.min_candles();
    if candles.len() < needed {
        return Err(EngineError::InsufficientData {
            needed,
            got: candles.len(),
        });
    }

    let mut events = Vec::new();
    let generator = SignalGenerator::new(cfg.clone(), symbol.clone());
    let zones = zones::detect_zones(candles, cfg.zone_lookback);
    debug!(timeframe = %cfg.name, zones = zones.len(), "zone scan complete");

    let pending: Vec<&Signal> = store
        .values()
        .filter(|s| s.timeframe == cfg.name && s.is_pending())
        .collect();

    let emission = generator.evaluate(candles, &zones, &pending)?;

    if let Some(emission) = emission {
        if anchor.allows(emission.signal().direction) {
            match emission {
                Emission::New(signal) => {
                    info!(
                        timeframe = %cfg.name,
                        id = %signal.id,
                        direction = %signal.direction,
                        entry = format!("{:.2}", signal.entry),
                        "new signal"
                    );
                    store.insert(signal.id.clone(), signal.clone());
                    events.push(SignalEvent::Created(signal));
                }
                Emission::Replace { old_id, signal } => {
                    info!(
                        timeframe = %cfg.name,
                        id = %signal.id,
                        replaces = %old_id,
                        refinement = signal.refinements,
                        "refined signal"
                    );
                    store.remove(&old_id);
                    store.insert(signal.id.clone(), signal.clone());
                    events.push(SignalEvent::Refined {
                        replaced: old_id,
                        signal,
                    });
                }
            }
        } else {
            debug!(
                timeframe = %cfg.name,
                direction = %emission.signal().direction,
                "signal suppressed by anchor trend filter"
            );
        }
    }

    // Advance every non-terminal signal of this timeframe, including one
    // created this cycle (its candles all precede its signal_time, so the
    // no-look-ahead guard leaves it pending)
    let ids: Vec<String> = store
        .values()
        .filter(|s| s.timeframe == cfg.name && !s.is_terminal())
        .map(|s| s.id.clone())
        .collect();

    for id in ids {
        if let Some(signal) = store.get_mut(&id) {
            for transition in lifecycle::advance(signal, candles, now, cfg) {
                let snapshot = signal.clone();
                events.push(match transition {
                    Transition::Activated => SignalEvent::Activated(snapshot),
                    Transition::Won => SignalEvent::Won(snapshot),
                    Transition::Lost => SignalEvent::Lost(snapshot),
                    Transition::Expired => SignalEvent::Expired(snapshot),
                });
            }
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Regime;

    #[test]
    fn test_anchor_prefers_highest_timeframe() {
        let regimes = vec![
            ("15m".to_string(), Regime::StrongUp),
            ("1h".to_string(), Regime::Ranging),
            ("4h".to_string(), Regime::WeakDown),
        ];
        assert_eq!(
            anchor_from_regimes(&regimes),
            AnchorFilter::Require(Direction::Short)
        );
    }

    #[test]
    fn test_anchor_skips_ranging_highs() {
        let regimes = vec![
            ("15m".to_string(), Regime::WeakUp),
            ("1h".to_string(), Regime::Ranging),
            ("4h".to_string(), Regime::Ranging),
        ];
        assert_eq!(
            anchor_from_regimes(&regimes),
            AnchorFilter::Require(Direction::Long)
        );
    }

    #[test]
    fn test_all_ranging_suppresses_cycle() {
        let regimes = vec![
            ("15m".to_string(), Regime::Ranging),
            ("4h".to_string(), Regime::Ranging),
        ];
        assert_eq!(anchor_from_regimes(&regimes), AnchorFilter::SuppressAll);
    }

    #[test]
    fn test_anchor_allows() {
        assert!(AnchorFilter::Off.allows(Direction::Long));
        assert!(AnchorFilter::Require(Direction::Long).allows(Direction::Long));
        assert!(!AnchorFilter::Require(Direction::Short).allows(Direction::Long));
        assert!(!AnchorFilter::SuppressAll.allows(Direction::Long));
    }
}
