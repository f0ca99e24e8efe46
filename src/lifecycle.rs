//! Signal lifecycle state machine
//!
//! Advances each stored signal through pending -> active -> {won, lost},
//! or pending -> expired, using only candles strictly after the signal's
//! creation candle. The creation candle itself is never consulted: the
//! signal was derived from it, so reading it back would be look-ahead.
//!
//! Re-running over the same data is idempotent; terminal signals are never
//! touched again. `entry_time` and `exit_time` stamp the triggering
//! candle's timestamp so backfilled and live runs agree; only an expiry
//! with no candle past the deadline falls back to the caller's clock.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::{ExitTrigger, IntrabarPriority, TimeframeConfig, WinTarget};
use crate::types::{Candle, Direction, Signal, SignalStatus};

pub const REASON_STOP: &str = "stop loss hit";
pub const REASON_TARGET: &str = "take profit hit";
pub const REASON_EXPIRED: &str = "signal expired";

/// A state change that occurred during one advance pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Won,
    Lost,
    Expired,
}

/// Advance one signal over `candles`, mutating it in place and returning the
/// transitions that occurred, in order. `now` is the evaluation clock used
/// for expiry when no candle reaches past the deadline.
pub fn advance(
    signal: &mut Signal,
    candles: &[Candle],
    now: DateTime<Utc>,
    cfg: &TimeframeConfig,
) -> Vec<Transition> {
    let mut transitions = Vec::new();

    if signal.is_terminal() {
        return transitions;
    }

    let expiry = Duration::seconds(cfg.expiry_secs);
    let signal_time = signal.signal_time;
    let deadline = signal_time + expiry;

    for candle in candles.iter().filter(|c| c.datetime > signal_time) {
        match signal.status {
            SignalStatus::Pending => {
                if candle.datetime > deadline {
                    expire(signal, candle.datetime);
                    transitions.push(Transition::Expired);
                    return transitions;
                }

                if entry_touched(signal, candle, cfg.exit_trigger) {
                    signal.status = SignalStatus::Active;
                    signal.entry_time = Some(candle.datetime);
                    transitions.push(Transition::Activated);
                    debug!(id = %signal.id, entry = signal.entry, "signal activated");

                    // Same-candle ambiguity: the entry candle may also reach
                    // stop or target; re-check before moving on
                    if let Some(t) = check_exit(signal, candle, cfg) {
                        transitions.push(t);
                        return transitions;
                    }
                }
            }
            SignalStatus::Active => {
                if let Some(t) = check_exit(signal, candle, cfg) {
                    transitions.push(t);
                    return transitions;
                }
            }
            // Terminal, handled above; unreachable inside the loop
            _ => return transitions,
        }
    }

    // No candle reached past the deadline, but wall-clock time may have
    if signal.status == SignalStatus::Pending && now > deadline {
        expire(signal, now);
        transitions.push(Transition::Expired);
    }

    transitions
}

fn expire(signal: &mut Signal, at: DateTime<Utc>) {
    signal.status = SignalStatus::Expired;
    signal.exit_time = Some(at);
    signal.exit_reason = Some(REASON_EXPIRED.to_string());
    debug!(id = %signal.id, "signal expired");
}

fn entry_touched(signal: &Signal, candle: &Candle, trigger: ExitTrigger) -> bool {
    match trigger {
        ExitTrigger::HighLow => candle.low <= signal.entry && signal.entry <= candle.high,
        ExitTrigger::Close => match signal.direction {
            Direction::Long => candle.close <= signal.entry,
            Direction::Short => candle.close >= signal.entry,
        },
    }
}

/// Check stop and target against one candle, applying the configured
/// intrabar priority when both are true. Mutates the signal on exit.
fn check_exit(signal: &mut Signal, candle: &Candle, cfg: &TimeframeConfig) -> Option<Transition> {
    let target = match cfg.win_target {
        WinTarget::Target1 => signal.target1,
        WinTarget::Target2 => signal.target2,
    };

    let (stop_hit, target_hit) = match cfg.exit_trigger {
        ExitTrigger::HighLow => match signal.direction {
            Direction::Long => (candle.low <= signal.stop, candle.high >= target),
            Direction::Short => (candle.high >= signal.stop, candle.low <= target),
        },
        ExitTrigger::Close => match signal.direction {
            Direction::Long => (candle.close <= signal.stop, candle.close >= target),
            Direction::Short => (candle.close >= signal.stop, candle.close <= target),
        },
    };

    let transition = match (stop_hit, target_hit) {
        (false, false) => return None,
        (true, false) => Transition::Lost,
        (false, true) => Transition::Won,
        (true, true) => match cfg.intrabar_priority {
            IntrabarPriority::StopFirst => Transition::Lost,
            IntrabarPriority::TargetFirst => Transition::Won,
        },
    };

    match transition {
        Transition::Lost => {
            signal.status = SignalStatus::Lost;
            signal.exit_reason = Some(REASON_STOP.to_string());
        }
        Transition::Won => {
            signal.status = SignalStatus::Won;
            signal.exit_reason = Some(REASON_TARGET.to_string());
        }
        _ => unreachable!(),
    }
    signal.exit_time = Some(candle.datetime);
    debug!(id = %signal.id, status = %signal.status, "signal closed");

    Some(transition)
}
