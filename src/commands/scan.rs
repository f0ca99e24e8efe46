//! Scan command
//!
//! One batch pass over every configured timeframe: fetch candles, run the
//! engine cycle, persist the store, send alerts. Invoked periodically by an
//! external scheduler; each invocation is independent. A timeframe that
//! fails (short candle window, fetch error, missing config) is logged and
//! skipped without harming the others.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use setup_scout::config::Config;
use setup_scout::engine::{self, AnchorFilter, SignalEvent};
use setup_scout::feed::KucoinClient;
use setup_scout::notify::TelegramNotifier;
use setup_scout::signal::SignalGenerator;
use setup_scout::store::{JsonFileStore, SignalStore};
use setup_scout::types::{Candle, Symbol};

pub async fn run(config_path: String, store_path: Option<String>, dry_run: bool) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let symbol = Symbol::new(&config.symbol);
    let store = JsonFileStore::new(store_path.unwrap_or_else(|| config.store_path.clone()));
    let feed = KucoinClient::new();
    let notifier = TelegramNotifier::from_config(&config.telegram);
    if notifier.is_none() {
        info!("telegram credentials not set, alerts disabled");
    }

    let mut signals = store.load().context("Failed to load signal store")?;
    info!(
        symbol = %symbol,
        timeframes = config.timeframes.len(),
        stored_signals = signals.len(),
        "scan started"
    );

    // Fetch every timeframe's window up front; a regime snapshot per
    // timeframe feeds the anchor filter when enabled
    let mut windows: Vec<(usize, Vec<Candle>)> = Vec::new();
    for (idx, tf) in config.timeframes.iter().enumerate() {
        match feed.fetch_candles(symbol.as_str(), &tf.name, tf.limit).await {
            Ok(candles) => windows.push((idx, candles)),
            Err(e) => warn!(timeframe = %tf.name, error = %e, "candle fetch failed, skipping"),
        }
    }

    let anchor = if config.anchor_filter {
        let mut regimes = Vec::new();
        for (idx, candles) in &windows {
            let tf = &config.timeframes[*idx];
            let generator = SignalGenerator::new(tf.clone(), symbol.clone());
            match generator.regime(candles) {
                Ok(regime) => {
                    info!(timeframe = %tf.name, %regime, "regime snapshot");
                    regimes.push((tf.name.clone(), regime));
                }
                Err(e) => warn!(timeframe = %tf.name, error = %e, "regime snapshot failed"),
            }
        }
        engine::anchor_from_regimes(&regimes)
    } else {
        AnchorFilter::Off
    };

    let now = Utc::now();
    let mut events: Vec<SignalEvent> = Vec::new();

    for (idx, candles) in &windows {
        let tf = &config.timeframes[*idx];
        match engine::run_timeframe_cycle(tf, &symbol, candles, &mut signals, now, anchor) {
            Ok(tf_events) => events.extend(tf_events),
            Err(e) => error!(timeframe = %tf.name, error = %e, "cycle failed, skipping"),
        }
    }

    // Persist before notifying: a dead alert channel must never cost state
    store.save(&signals).context("Failed to save signal store")?;

    if dry_run {
        info!(events = events.len(), "dry run, skipping notifications");
    } else if let Some(notifier) = &notifier {
        for event in &events {
            notifier.notify_event(event).await;
        }
    }

    info!(
        events = events.len(),
        stored_signals = signals.len(),
        "scan complete"
    );

    Ok(())
}
