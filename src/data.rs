//! CSV candle loading and saving
//!
//! Used by the replay command and test fixtures. Layout:
//! datetime,open,high,low,close,volume with an ISO-8601 or
//! "%Y-%m-%d %H:%M:%S" (assumed UTC) datetime.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::types::Candle;

/// Load OHLCV data from a CSV file, ascending by timestamp
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .parse()
                .with_context(|| format!("Failed to parse {}", name))
        };

        candles.push(Candle {
            datetime,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        });
    }

    candles.sort_by_key(|c| c.datetime);

    Ok(candles)
}

/// Save candles to a CSV file
pub fn save_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref()).context("Failed to create CSV file")?;

    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;

    for candle in candles {
        writer.write_record([
            candle.datetime.to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }

    writer.flush().context("Failed to flush CSV file")?;
    Ok(())
}
