//! KuCoin market data client
//!
//! Fetches OHLCV candles from KuCoin's public klines endpoint. No API key
//! is required for market data. The client is constructed explicitly and
//! injected into the scan cycle; nothing here is process-global.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration as StdDuration;
use tracing::debug;

use crate::error::EngineError;
use crate::types::Candle;

/// Base URL for the KuCoin REST API
const KUCOIN_API_BASE: &str = "https://api.kucoin.com/api/v1";

/// (label, KuCoin kline type, seconds per candle)
const TIMEFRAMES: &[(&str, &str, i64)] = &[
    ("1m", "1min", 60),
    ("5m", "5min", 300),
    ("15m", "15min", 900),
    ("30m", "30min", 1800),
    ("1h", "1hour", 3600),
    ("4h", "4hour", 14400),
    ("1d", "1day", 86400),
];

/// KuCoin market data client
#[derive(Debug, Clone)]
pub struct KucoinClient {
    client: Client,
    base_url: String,
}

impl Default for KucoinClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KucoinClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        KucoinClient {
            client,
            base_url: KUCOIN_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (test servers)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut c = Self::new();
        c.base_url = base_url.into();
        c
    }

    /// Convert a symbol to KuCoin pair format ("BTC/USDT" -> "BTC-USDT")
    pub fn to_kucoin_pair(symbol: &str) -> String {
        symbol.replace('/', "-")
    }

    /// Fetch up to `limit` most recent candles for `timeframe`, ascending
    /// by timestamp. Fails with `MissingTimeframe` for labels KuCoin does
    /// not serve.
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let (_, kline_type, secs) = TIMEFRAMES
            .iter()
            .find(|(label, _, _)| *label == timeframe)
            .ok_or_else(|| EngineError::MissingTimeframe(timeframe.to_string()))?;

        let pair = Self::to_kucoin_pair(symbol);
        let end_at = Utc::now().timestamp();
        let start_at = end_at - secs * limit as i64;

        let url = format!("{}/market/candles", self.base_url);
        let params = [
            ("symbol", pair.clone()),
            ("type", kline_type.to_string()),
            ("startAt", start_at.to_string()),
            ("endAt", end_at.to_string()),
        ];

        debug!(symbol = %pair, timeframe, limit, "fetching candles");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to send request to KuCoin")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("KuCoin API error {}: {}", status, body);
        }

        let payload: KlinesResponse = response
            .json()
            .await
            .context("Failed to parse KuCoin response")?;

        if payload.code != "200000" {
            anyhow::bail!("KuCoin API returned code {}", payload.code);
        }

        // KuCoin returns rows newest-first: [time, open, close, high, low,
        // volume, turnover], all strings
        let mut candles: Vec<Candle> = payload
            .data
            .iter()
            .filter_map(|row| parse_kline_row(row))
            .collect();

        candles.sort_by_key(|c| c.datetime);
        candles.dedup_by_key(|c| c.datetime);

        if candles.len() > limit as usize {
            candles.drain(..candles.len() - limit as usize);
        }

        debug!(symbol = %pair, timeframe, count = candles.len(), "candles fetched");
        Ok(candles)
    }
}

#[derive(Debug, serde::Deserialize)]
struct KlinesResponse {
    code: String,
    #[serde(default)]
    data: Vec<Vec<String>>,
}

fn parse_kline_row(row: &[String]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }

    let ts: i64 = row[0].parse().ok()?;
    let datetime: DateTime<Utc> = DateTime::from_timestamp(ts, 0)?;

    Candle::new(
        datetime,
        row[1].parse().ok()?,
        row[3].parse().ok()?,
        row[4].parse().ok()?,
        row[2].parse().ok()?,
        row[5].parse().ok()?,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_mapping() {
        assert_eq!(KucoinClient::to_kucoin_pair("BTC/USDT"), "BTC-USDT");
        assert_eq!(KucoinClient::to_kucoin_pair("ETH-USDT"), "ETH-USDT");
    }

    #[test]
    fn test_parse_kline_row() {
        let row: Vec<String> = ["1700000000", "100.5", "101.2", "102.0", "99.8", "3.5", "352.1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let candle = parse_kline_row(&row).unwrap();
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.close, 101.2);
        assert_eq!(candle.high, 102.0);
        assert_eq!(candle.low, 99.8);
        assert_eq!(candle.volume, 3.5);
        assert_eq!(candle.datetime.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_malformed_row_skipped() {
        let row: Vec<String> = ["not_a_ts", "100.5"].iter().map(|s| s.to_string()).collect();
        assert!(parse_kline_row(&row).is_none());
    }

    #[test]
    fn test_inconsistent_ohlc_row_skipped() {
        // High below low fails candle validation
        let row: Vec<String> = ["1700000000", "100.5", "101.2", "99.0", "102.0", "3.5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(parse_kline_row(&row).is_none());
    }
}
