//! Signal generation
//!
//! Turns one timeframe's indicator state, zone set and pending-signal
//! snapshot into at most one new trade setup. Every behavioral fork the
//! product has shipped (strict vs permissive trend validation, zone vs
//! retracement weak-regime entries, refinement vs single-pending dedup) is
//! a tagged policy on [`TimeframeConfig`], never an implicit default.
//!
//! The slope feeding regime classification is taken over the fast EMA: it
//! reacts within the slope window while the slow EMA anchors entry and
//! trend validation.

use tracing::debug;

use crate::config::{DedupPolicy, RangingPolicy, TimeframeConfig, TrendFilter, WeakEntryRule};
use crate::error::EngineError;
use crate::indicators::{atr, ema, slope_pct};
use crate::types::{Candle, Direction, Regime, Signal, SignalStatus, Symbol};
use crate::zones::{self, Zone};

/// Outcome of a generation pass that produced a signal
#[derive(Debug, Clone)]
pub enum Emission {
    New(Signal),
    /// The new signal refines `old_id`, which must be removed from the store
    Replace { old_id: String, signal: Signal },
}

impl Emission {
    pub fn signal(&self) -> &Signal {
        match self {
            Emission::New(s) => s,
            Emission::Replace { signal, .. } => signal,
        }
    }
}

/// Per-timeframe signal generator
pub struct SignalGenerator {
    cfg: TimeframeConfig,
    symbol: Symbol,
}

impl SignalGenerator {
    pub fn new(cfg: TimeframeConfig, symbol: Symbol) -> Self {
        SignalGenerator { cfg, symbol }
    }

    /// Regime for the current candle window, without generating anything.
    /// Used by the anchor-trend filter.
    pub fn regime(&self, candles: &[Candle]) -> Result<Regime, EngineError> {
        let needed = self.cfg.min_candles();
        if candles.len() < needed {
            return Err(EngineError::InsufficientData {
                needed,
                got: candles.len(),
            });
        }

        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema(&close, self.cfg.ema_fast);
        let slope = slope_pct(&fast, self.cfg.slope_window)?;
        Ok(self.cfg.regime_breakpoints.classify(slope))
    }

    /// Evaluate the current window and decide whether to emit a signal.
    ///
    /// `pending` is the store's pending signals for this timeframe; the
    /// dedup policy is applied against them before anything is emitted.
    pub fn evaluate(
        &self,
        candles: &[Candle],
        zones: &[Zone],
        pending: &[&Signal],
    ) -> Result<Option<Emission>, EngineError> {
        let needed = self.cfg.min_candles();
        if candles.len() < needed {
            return Err(EngineError::InsufficientData {
                needed,
                got: candles.len(),
            });
        }

        let close_series: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high_series: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low_series: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let fast_series = ema(&close_series, self.cfg.ema_fast);
        let slow_series = ema(&close_series, self.cfg.ema_slow);

        let missing = || EngineError::InsufficientData {
            needed,
            got: candles.len(),
        };
        let fast_now = fast_series.last().copied().flatten().ok_or_else(missing)?;
        let slow_now = slow_series.last().copied().flatten().ok_or_else(missing)?;
        let close = *close_series.last().ok_or_else(missing)?;

        let slope = slope_pct(&fast_series, self.cfg.slope_window)?;
        let regime = self.cfg.regime_breakpoints.classify(slope);

        // Direction from regime, or the configured ranging fallback
        let direction = match regime.direction() {
            Some(d) => d,
            None => match self.cfg.ranging_policy {
                RangingPolicy::Suppress => {
                    debug!(
                        timeframe = %self.cfg.name,
                        slope = format!("{:.3}", slope),
                        "no signal: ranging regime"
                    );
                    return Ok(None);
                }
                RangingPolicy::EmaOrder => {
                    if fast_now > slow_now {
                        Direction::Long
                    } else if fast_now < slow_now {
                        Direction::Short
                    } else {
                        return Ok(None);
                    }
                }
            },
        };

        if self.cfg.trend_filter == TrendFilter::Strict
            && !self.trend_aligned(direction, close, fast_now, slow_now)
        {
            debug!(
                timeframe = %self.cfg.name,
                %direction,
                "no signal: strict trend validation failed"
            );
            return Ok(None);
        }

        // Entry construction: strong regimes pull back to a weighted point
        // between the EMAs, weak regimes anchor to structure
        let entry = if regime.is_strong() {
            fast_now + self.cfg.strong_entry_weight * (slow_now - fast_now)
        } else {
            match self.weak_entry(direction, close, candles, zones) {
                Some(e) => e,
                None => {
                    debug!(
                        timeframe = %self.cfg.name,
                        %direction,
                        "no signal: no entry anchor in weak regime"
                    );
                    return Ok(None);
                }
            }
        };

        // Sanity filter: unreachable entries are artifacts, not setups
        let entry_distance_pct = (entry - close).abs() / close * 100.0;
        if entry_distance_pct > self.cfg.max_entry_distance_pct {
            debug!(
                timeframe = %self.cfg.name,
                entry = format!("{:.2}", entry),
                close = format!("{:.2}", close),
                distance_pct = format!("{:.2}", entry_distance_pct),
                "no signal: entry beyond proximity threshold"
            );
            return Ok(None);
        }

        let atr_series = atr(&high_series, &low_series, &close_series, self.cfg.atr_period);
        let atr_now = atr_series.last().copied().flatten().ok_or_else(missing)?;

        let sign = direction.sign();
        let stop = entry - sign * self.cfg.atr_stop_multiple * atr_now;
        let risk = (entry - stop).abs();

        let target1 = entry + sign * self.cfg.target1_r * risk;
        let mut target2 = entry + sign * self.cfg.target2_r * risk;
        if let Some(level) = zones::snap_target(zones, direction, target2) {
            target2 = level;
        }

        let risk_reward = if risk == 0.0 {
            0.0
        } else {
            round2((target1 - entry).abs() / risk)
        };

        let signal_time = candles[candles.len() - 1].datetime;

        let candidate = Signal {
            id: self.signal_id(signal_time, direction, entry),
            symbol: self.symbol.clone(),
            timeframe: self.cfg.name.clone(),
            direction,
            status: SignalStatus::Pending,
            regime,
            entry,
            stop,
            target1,
            target2,
            risk_reward,
            refinements: 1,
            signal_time,
            entry_time: None,
            exit_time: None,
            exit_reason: None,
        };

        Ok(self.dedup(candidate, pending))
    }

    /// Strict trend validation: close beyond EMA50 by the tolerance in the
    /// trade direction, EMAs ordered with it.
    fn trend_aligned(&self, direction: Direction, close: f64, fast: f64, slow: f64) -> bool {
        let tol = self.cfg.trend_tolerance_pct / 100.0;
        match direction {
            Direction::Long => close > slow * (1.0 + tol) && fast > slow,
            Direction::Short => close < slow * (1.0 - tol) && fast < slow,
        }
    }

    fn weak_entry(
        &self,
        direction: Direction,
        close: f64,
        candles: &[Candle],
        zones: &[Zone],
    ) -> Option<f64> {
        match self.cfg.weak_entry {
            WeakEntryRule::NearestZone { max_distance_pct } => {
                zones::nearest_entry_zone(zones, direction, close, max_distance_pct)
            }
            WeakEntryRule::Retracement {
                fraction,
                swing_window,
            } => {
                let window = &candles[candles.len().saturating_sub(swing_window)..];
                let swing_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
                let swing_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
                let range = swing_high - swing_low;
                match direction {
                    Direction::Long => Some(swing_high - fraction * range),
                    Direction::Short => Some(swing_low + fraction * range),
                }
            }
        }
    }

    /// Apply the configured dedup policy against pending signals of the
    /// same direction. Only call with signals of this generator's timeframe.
    pub fn dedup(&self, candidate: Signal, pending: &[&Signal]) -> Option<Emission> {
        let existing = pending
            .iter()
            .filter(|s| s.is_pending() && s.direction == candidate.direction)
            .max_by_key(|s| s.signal_time);

        let existing = match existing {
            Some(s) => *s,
            None => return Some(Emission::New(candidate)),
        };

        match self.cfg.dedup {
            DedupPolicy::Refine { max_refinements } => {
                if existing.refinements >= max_refinements {
                    debug!(
                        timeframe = %self.cfg.name,
                        direction = %candidate.direction,
                        "max refinements reached, keeping existing signal"
                    );
                    None
                } else {
                    let mut refined = candidate;
                    refined.refinements = existing.refinements + 1;
                    debug!(
                        timeframe = %self.cfg.name,
                        refinement = refined.refinements,
                        replaces = %existing.id,
                        "refining pending signal"
                    );
                    Some(Emission::Replace {
                        old_id: existing.id.clone(),
                        signal: refined,
                    })
                }
            }
            DedupPolicy::SinglePending => {
                debug!(
                    timeframe = %self.cfg.name,
                    direction = %candidate.direction,
                    "pending signal already exists, suppressing"
                );
                None
            }
            DedupPolicy::Adaptive { entry_delta_pct } => {
                let delta = (candidate.entry - existing.entry).abs() / existing.entry * 100.0;
                if existing.regime == candidate.regime && delta < entry_delta_pct {
                    debug!(
                        timeframe = %self.cfg.name,
                        delta_pct = format!("{:.3}", delta),
                        "near-duplicate signal, suppressing"
                    );
                    None
                } else {
                    let mut replacement = candidate;
                    replacement.refinements = existing.refinements + 1;
                    Some(Emission::Replace {
                        old_id: existing.id.clone(),
                        signal: replacement,
                    })
                }
            }
        }
    }

    /// Id stable per candle and direction, distinct per distinct entry price
    fn signal_id(
        &self,
        signal_time: chrono::DateTime<chrono::Utc>,
        direction: Direction,
        entry: f64,
    ) -> String {
        // Entry at cent precision, folded into a short hex fingerprint
        let fingerprint = ((entry * 100.0).round().abs() as u64) & 0xFF_FFFF;
        format!(
            "{}_{}_{}_{}_{:06x}",
            self.symbol.compact(),
            self.cfg.name,
            signal_time.format("%Y%m%d_%H%M%S"),
            direction.tag(),
            fingerprint
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntrabarPriority, RegimeBreakpoints};
    use chrono::{Duration, TimeZone, Utc};

    fn test_cfg() -> TimeframeConfig {
        let mut cfg = TimeframeConfig::default_set()
            .into_iter()
            .find(|tf| tf.name == "1h")
            .unwrap();
        cfg.max_entry_distance_pct = 5.0;
        cfg
    }

    fn ramp_candles(count: usize, base: f64, step: f64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let price = base + step * i as f64;
                Candle {
                    datetime: start + Duration::hours(i as i64),
                    open: price - step * 0.3,
                    high: price + base * 0.002,
                    low: price - base * 0.002,
                    close: price,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn dummy_signal(cfg: &TimeframeConfig, direction: Direction, entry: f64) -> Signal {
        Signal {
            id: format!("test_{}_{}", cfg.name, entry),
            symbol: Symbol::new("BTC/USDT"),
            timeframe: cfg.name.clone(),
            direction,
            status: SignalStatus::Pending,
            regime: Regime::StrongUp,
            entry,
            stop: entry - 5.0,
            target1: entry + 10.0,
            target2: entry + 15.0,
            risk_reward: 2.0,
            refinements: 1,
            signal_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            entry_time: None,
            exit_time: None,
            exit_reason: None,
        }
    }

    #[test]
    fn test_strong_uptrend_emits_long() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        // 0.15/candle on base 100 gives a fast-EMA slope well above 0.8%/10
        let candles = ramp_candles(80, 100.0, 0.15);

        let emission = gen.evaluate(&candles, &[], &[]).unwrap();
        let signal = match emission {
            Some(Emission::New(s)) => s,
            other => panic!("expected new signal, got {:?}", other),
        };

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.status, SignalStatus::Pending);
        assert!(signal.regime.is_up());
        assert!(signal.stop < signal.entry);
        assert!(signal.target1 > signal.entry);
        assert!(signal.target2 > signal.target1);
        assert_eq!(signal.refinements, 1);
        assert_eq!(signal.signal_time, candles.last().unwrap().datetime);
    }

    #[test]
    fn test_strong_downtrend_emits_short() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 200.0, -0.3);

        let emission = gen.evaluate(&candles, &[], &[]).unwrap();
        let signal = emission.expect("short signal").signal().clone();

        assert_eq!(signal.direction, Direction::Short);
        assert!(signal.stop > signal.entry);
        assert!(signal.target1 < signal.entry);
    }

    #[test]
    fn test_flat_market_suppressed_by_default() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 100.0, 0.0);

        assert!(gen.evaluate(&candles, &[], &[]).unwrap().is_none());
    }

    #[test]
    fn test_ranging_ema_order_fallback_needs_entry_anchor() {
        let mut cfg = test_cfg();
        cfg.ranging_policy = RangingPolicy::EmaOrder;
        cfg.trend_filter = TrendFilter::Permissive;
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));

        // Barely rising: ranging regime, EMA20 above EMA50, but no zones to
        // anchor a weak entry, so still nothing
        let candles = ramp_candles(80, 100.0, 0.01);
        assert!(gen.evaluate(&candles, &[], &[]).unwrap().is_none());
    }

    #[test]
    fn test_weak_regime_anchors_entry_to_nearest_zone() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        // 0.05/candle keeps the fast-EMA slope between 0.3% and 0.8%
        let candles = ramp_candles(80, 100.0, 0.05);
        let close = candles.last().unwrap().close;

        // Demand zone 0.2% below close, inside the default 0.3% budget
        let level = close * 0.998;
        let zones = vec![Zone {
            kind: crate::zones::ZoneKind::Demand,
            level,
            volume: 1.0,
        }];

        let signal = gen
            .evaluate(&candles, &zones, &[])
            .unwrap()
            .expect("signal")
            .signal()
            .clone();

        assert_eq!(signal.regime, Regime::WeakUp);
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry, level);
    }

    #[test]
    fn test_weak_regime_suppressed_when_zone_too_far() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 100.0, 0.05);
        let close = candles.last().unwrap().close;

        // Only zone sits 5% below close, far outside the 0.3% budget
        let zones = vec![Zone {
            kind: crate::zones::ZoneKind::Demand,
            level: close * 0.95,
            volume: 1.0,
        }];

        assert!(gen.evaluate(&candles, &zones, &[]).unwrap().is_none());
    }

    #[test]
    fn test_weak_regime_retracement_entry() {
        let mut cfg = test_cfg();
        cfg.weak_entry = WeakEntryRule::Retracement {
            fraction: 0.575,
            swing_window: 20,
        };
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 100.0, 0.05);

        let window = &candles[candles.len() - 20..];
        let swing_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let swing_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let expected = swing_high - 0.575 * (swing_high - swing_low);

        let signal = gen
            .evaluate(&candles, &[], &[])
            .unwrap()
            .expect("signal")
            .signal()
            .clone();

        assert_eq!(signal.regime, Regime::WeakUp);
        assert!((signal.entry - expected).abs() < 1e-9);
        // A long retracement entry waits below the current close
        assert!(signal.entry < candles.last().unwrap().close);
    }

    #[test]
    fn test_insufficient_data_is_an_error() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(20, 100.0, 0.15);

        assert!(matches!(
            gen.evaluate(&candles, &[], &[]),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_proximity_filter_rejects_distant_entry() {
        let mut cfg = test_cfg();
        cfg.max_entry_distance_pct = 0.01;
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 100.0, 0.15);

        // The EMA-blend entry trails a steady ramp by far more than 0.01%
        assert!(gen.evaluate(&candles, &[], &[]).unwrap().is_none());
    }

    #[test]
    fn test_risk_reward_matches_r_multiple() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg.clone(), Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 100.0, 0.15);

        let signal = gen
            .evaluate(&candles, &[], &[])
            .unwrap()
            .expect("signal")
            .signal()
            .clone();

        // target1 is an exact R-multiple of the stop distance
        assert!((signal.risk_reward - cfg.target1_r).abs() < 0.01);
    }

    #[test]
    fn test_refine_policy_replaces_until_cap() {
        let mut cfg = test_cfg();
        cfg.dedup = DedupPolicy::Refine { max_refinements: 3 };
        let gen = SignalGenerator::new(cfg.clone(), Symbol::new("BTC/USDT"));

        let mut existing = dummy_signal(&cfg, Direction::Long, 100.0);
        existing.refinements = 2;
        let candidate = dummy_signal(&cfg, Direction::Long, 101.0);

        match gen.dedup(candidate.clone(), &[&existing]) {
            Some(Emission::Replace { old_id, signal }) => {
                assert_eq!(old_id, existing.id);
                assert_eq!(signal.refinements, 3);
            }
            other => panic!("expected replacement, got {:?}", other),
        }

        existing.refinements = 3;
        assert!(gen.dedup(candidate, &[&existing]).is_none());
    }

    #[test]
    fn test_single_pending_policy_suppresses() {
        let mut cfg = test_cfg();
        cfg.dedup = DedupPolicy::SinglePending;
        let gen = SignalGenerator::new(cfg.clone(), Symbol::new("BTC/USDT"));

        let existing = dummy_signal(&cfg, Direction::Long, 100.0);
        let candidate = dummy_signal(&cfg, Direction::Long, 105.0);
        assert!(gen.dedup(candidate, &[&existing]).is_none());

        // Opposite direction is not a duplicate
        let short = dummy_signal(&cfg, Direction::Short, 100.0);
        assert!(matches!(
            gen.dedup(short, &[&existing]),
            Some(Emission::New(_))
        ));
    }

    #[test]
    fn test_adaptive_policy_thresholds() {
        let mut cfg = test_cfg();
        cfg.dedup = DedupPolicy::Adaptive {
            entry_delta_pct: 0.5,
        };
        let gen = SignalGenerator::new(cfg.clone(), Symbol::new("BTC/USDT"));

        let existing = dummy_signal(&cfg, Direction::Long, 100.0);

        // Entry barely moved, same regime: suppressed
        let near = dummy_signal(&cfg, Direction::Long, 100.2);
        assert!(gen.dedup(near, &[&existing]).is_none());

        // Entry moved past the threshold: replaced
        let far = dummy_signal(&cfg, Direction::Long, 101.0);
        assert!(matches!(
            gen.dedup(far, &[&existing]),
            Some(Emission::Replace { .. })
        ));
    }

    #[test]
    fn test_ids_distinct_per_entry_price() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let a = gen.signal_id(time, Direction::Long, 100.25);
        let b = gen.signal_id(time, Direction::Long, 100.50);
        let a2 = gen.signal_id(time, Direction::Long, 100.25);

        assert_ne!(a, b);
        assert_eq!(a, a2);
        assert!(a.starts_with("BTCUSDT_1h_20240301_120000_L_"));
    }

    #[test]
    fn test_target2_snaps_to_zone() {
        let cfg = test_cfg();
        let gen = SignalGenerator::new(cfg, Symbol::new("BTC/USDT"));
        let candles = ramp_candles(80, 100.0, 0.15);

        // First find where the un-snapped target2 lands
        let plain = gen
            .evaluate(&candles, &[], &[])
            .unwrap()
            .expect("signal")
            .signal()
            .clone();

        let zone_level = plain.target2 + 0.5;
        let zones = vec![Zone {
            kind: crate::zones::ZoneKind::Supply,
            level: zone_level,
            volume: 1.0,
        }];

        let snapped = gen
            .evaluate(&candles, &zones, &[])
            .unwrap()
            .expect("signal")
            .signal()
            .clone();
        assert_eq!(snapped.target2, zone_level);
    }

    #[test]
    fn test_default_priority_is_stop_first() {
        let cfg = test_cfg();
        assert_eq!(cfg.intrabar_priority, IntrabarPriority::StopFirst);
        assert_eq!(cfg.regime_breakpoints.strong_pct, RegimeBreakpoints::default().strong_pct);
    }
}
