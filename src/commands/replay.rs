//! Replay command
//!
//! Runs the engine over a CSV candle file for one timeframe, stepping
//! candle by candle the way the live scheduler would have seen them.
//! No network, no notifications; the store lives in memory and the final
//! signal states are printed. Useful for backfilling and for verifying a
//! config change against history.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::info;

use setup_scout::config::Config;
use setup_scout::engine::{self, AnchorFilter};
use setup_scout::data;
use setup_scout::types::{Signal, SignalStatus, Symbol};

pub fn run(config_path: String, file: String, timeframe: String) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let tf = config.timeframe(&timeframe)?.clone();
    let symbol = Symbol::new(&config.symbol);

    let candles = data::load_csv(&file)?;
    let warmup = tf.min_candles();
    anyhow::ensure!(
        candles.len() >= warmup,
        "need at least {} candles for {}, file has {}",
        warmup,
        timeframe,
        candles.len()
    );

    info!(
        timeframe = %tf.name,
        candles = candles.len(),
        warmup,
        "replay started"
    );

    let mut signals: HashMap<String, Signal> = HashMap::new();
    let mut event_count = 0usize;

    for end in warmup..=candles.len() {
        let window = &candles[..end];
        let now = candles[end - 1].datetime;
        let events =
            engine::run_timeframe_cycle(&tf, &symbol, window, &mut signals, now, AnchorFilter::Off)?;
        event_count += events.len();
    }

    let count_by = |status: SignalStatus| signals.values().filter(|s| s.status == status).count();
    info!(
        events = event_count,
        signals = signals.len(),
        pending = count_by(SignalStatus::Pending),
        active = count_by(SignalStatus::Active),
        won = count_by(SignalStatus::Won),
        lost = count_by(SignalStatus::Lost),
        expired = count_by(SignalStatus::Expired),
        "replay complete"
    );

    let mut rows: Vec<&Signal> = signals.values().collect();
    rows.sort_by_key(|s| s.signal_time);
    for s in rows {
        println!(
            "{} | {} {} | entry {:.2} sl {:.2} tp1 {:.2} tp2 {:.2} | {} | {}",
            s.id,
            s.direction,
            s.regime,
            s.entry,
            s.stop,
            s.target1,
            s.target2,
            s.status,
            s.exit_reason.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
