//! Technical indicators
//!
//! EMA, ATR and the normalized trend-slope metric the regime classifier
//! runs on. ATR is EMA-smoothed (recursive with the 2/(period+1) factor)
//! rather than simple-windowed; every consumer in this crate relies on
//! that.

use crate::error::EngineError;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate Exponential Moving Average
///
/// Smoothing factor 2/(period+1), seeded with the simple average of the
/// first `period` values; defined for indices >= period-1.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    if values.is_empty() || period == 0 {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_value: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        if i < period - 1 {
            result.push(None);
        } else if i == period - 1 {
            // Seed with SMA
            let sum: f64 = values[0..period].iter().sum();
            ema_value = Some(sum / period as f64);
            result.push(ema_value);
        } else if let Some(prev_ema) = ema_value {
            let new_ema = (value - prev_ema) * multiplier + prev_ema;
            ema_value = Some(new_ema);
            result.push(Some(new_ema));
        }
    }

    result
}

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range (ATR) as the EMA of the true range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    ema(&tr, period)
}

/// Normalized slope of an EMA series over `window` steps, in percent:
/// (now - then) / then * 100
///
/// Fails with `InsufficientHistory` when the series does not have a defined
/// value `window` steps back from its last element.
pub fn slope_pct(series: &[Option<f64>], window: usize) -> Result<f64, EngineError> {
    let available = series.iter().filter(|v| v.is_some()).count();
    let short = || EngineError::InsufficientHistory { window, available };

    let last_idx = series.len().checked_sub(1).ok_or_else(short)?;
    let now = series[last_idx].ok_or_else(short)?;
    let back_idx = last_idx.checked_sub(window).ok_or_else(short)?;
    let then = series[back_idx].ok_or_else(short)?;

    if then == 0.0 {
        return Ok(0.0);
    }

    Ok((now - then) / then * 100.0)
}
