/// Portfolio- and signal-level gating before execution (§4.5, C7).
use crate::config::Config;
use crate::types::{GatedSignal, RankedSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedDayPattern {
    OversoldWeak,
    OverboughtWeak,
    WeakVolumeAlone,
}

impl RedDayPattern {
    pub fn reason(&self) -> &'static str {
        match self {
            RedDayPattern::OversoldWeak => "RED_DAY_P1",
            RedDayPattern::OverboughtWeak => "RED_DAY_P2",
            RedDayPattern::WeakVolumeAlone => "RED_DAY_P3",
        }
    }
}

struct CohortStats {
    pct_weak_volume: f64,
    pct_oversold: f64,
    pct_overbought: f64,
    avg_rsi: f64,
    avg_macd: f64,
    avg_rs_vs_spy: f64,
    avg_vwap_distance: f64,
    avg_volume_ratio: f64,
}

fn cohort_stats(cohort: &[RankedSignal], config: &Config) -> CohortStats {
    let n = cohort.len() as f64;
    if cohort.is_empty() {
        return CohortStats {
            pct_weak_volume: 0.0,
            pct_oversold: 0.0,
            pct_overbought: 0.0,
            avg_rsi: 0.0,
            avg_macd: 0.0,
            avg_rs_vs_spy: 0.0,
            avg_vwap_distance: 0.0,
            avg_volume_ratio: 0.0,
        };
    }

    let weak_volume = cohort.iter().filter(|s| s.raw.features.volume_ratio < config.red_day_weak_volume_ratio).count();
    let oversold = cohort.iter().filter(|s| s.raw.features.rsi < config.red_day_oversold_rsi).count();
    let overbought = cohort.iter().filter(|s| s.raw.features.rsi > config.red_day_overbought_rsi).count();

    CohortStats {
        pct_weak_volume: weak_volume as f64 / n,
        pct_oversold: oversold as f64 / n,
        pct_overbought: overbought as f64 / n,
        avg_rsi: cohort.iter().map(|s| s.raw.features.rsi).sum::<f64>() / n,
        avg_macd: cohort.iter().map(|s| s.raw.features.macd_histogram).sum::<f64>() / n,
        avg_rs_vs_spy: cohort.iter().map(|s| s.raw.features.rs_vs_spy_pct).sum::<f64>() / n,
        avg_vwap_distance: cohort.iter().map(|s| s.raw.features.vwap_distance_pct).sum::<f64>() / n,
        avg_volume_ratio: cohort.iter().map(|s| s.raw.features.volume_ratio).sum::<f64>() / n,
    }
}

fn detect_pattern(stats: &CohortStats, config: &Config) -> Option<RedDayPattern> {
    if stats.pct_oversold >= config.red_day_pct_oversold_weak && stats.pct_weak_volume >= config.red_day_pct_weak_volume_alone {
        return Some(RedDayPattern::OversoldWeak);
    }
    if stats.pct_overbought >= config.red_day_pct_overbought_weak && stats.pct_weak_volume >= config.red_day_pct_weak_volume_alone {
        return Some(RedDayPattern::OverboughtWeak);
    }
    if stats.pct_weak_volume >= config.red_day_pct_weak_volume_alone {
        return Some(RedDayPattern::WeakVolumeAlone);
    }
    None
}

/// Any override satisfied allows trading even if a red-day pattern fired.
fn override_satisfied(stats: &CohortStats) -> bool {
    let primary = stats.avg_macd > 0.0 && stats.avg_rs_vs_spy > 2.0;
    let secondary = stats.avg_macd > 10.0 && stats.avg_rs_vs_spy == 0.0;
    let tertiary = stats.avg_vwap_distance > 1.0 && stats.avg_macd > 0.0;
    primary || secondary || tertiary
}

/// Signal-level rejection applied after the portfolio gate (§4.5).
fn signal_level_reject(signal: &RankedSignal, config: &Config) -> Option<&'static str> {
    let f = &signal.raw.features;
    if f.volume_ratio >= config.red_day_weak_volume_ratio {
        return None;
    }
    if f.rsi < config.red_day_oversold_rsi {
        return Some("OVERSOLD_WEAK_VOLUME");
    }
    if f.macd_histogram <= 0.0 && f.rs_vs_spy_pct <= 0.0 {
        return Some("NO_MOMENTUM_WEAK_VOLUME");
    }
    if f.vwap_distance_pct < -0.5 {
        return Some("BELOW_VWAP_WEAK_VOLUME");
    }
    None
}

pub struct RedDayResult {
    pub gated: Vec<GatedSignal>,
    pub pattern: Option<RedDayPattern>,
    pub failsafe_triggered: bool,
}

/// Runs the full red-day filter: data-quality failsafe, portfolio pattern
/// detection with 3-tier override, then the signal-level filter.
pub fn apply(cohort: Vec<RankedSignal>, config: &Config) -> RedDayResult {
    if !config.red_day_filter_enabled {
        let gated = cohort
            .into_iter()
            .map(|ranked| GatedSignal { ranked, is_red_day: false, rejected: false, reject_reason: None })
            .collect();
        return RedDayResult { gated, pattern: None, failsafe_triggered: false };
    }

    let stats = cohort_stats(&cohort, config);

    // Data-quality failsafe (§4.5): stale data must not be mistaken for a
    // real red day. Invariant 9: when it fires, every signal's
    // `is_red_day` must come out false.
    if stats.avg_rsi == 0.0 || stats.avg_volume_ratio == 0.0 {
        let gated = cohort
            .into_iter()
            .map(|ranked| GatedSignal { ranked, is_red_day: false, rejected: false, reject_reason: None })
            .collect();
        return RedDayResult { gated, pattern: None, failsafe_triggered: true };
    }

    let pattern = detect_pattern(&stats, config);
    let is_red_day = pattern.is_some() && !override_satisfied(&stats);

    let gated = cohort
        .into_iter()
        .map(|ranked| {
            if is_red_day {
                GatedSignal {
                    ranked,
                    is_red_day: true,
                    rejected: true,
                    reject_reason: pattern.map(|p| p.reason().to_string()),
                }
            } else if let Some(reason) = signal_level_reject(&ranked, config) {
                GatedSignal { ranked, is_red_day: false, rejected: true, reject_reason: Some(reason.to_string()) }
            } else {
                GatedSignal { ranked, is_red_day: false, rejected: false, reject_reason: None }
            }
        })
        .collect();

    RedDayResult { gated, pattern: if is_red_day { pattern } else { None }, failsafe_triggered: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureBundle, RawSignal, Side};
    use chrono::Utc;

    fn ranked(symbol: &str, rsi: f64, volume_ratio: f64, macd: f64, rs: f64, vwap: f64) -> RankedSignal {
        RankedSignal {
            raw: RawSignal {
                symbol: symbol.to_string(),
                side: Side::Long,
                current_price: 100.0,
                features: FeatureBundle {
                    rsi,
                    macd_histogram: macd,
                    vwap_distance_pct: vwap,
                    rs_vs_spy_pct: rs,
                    volume_ratio,
                    orb_volume_ratio: 1.0,
                    entry_bar_volatility_pct: 2.0,
                    confidence: 0.5,
                },
                generated_at: Utc::now(),
            },
            priority_score: 0.5,
            rank: 1,
        }
    }

    #[test]
    fn p3_fires_without_override() {
        let config = Config::default();
        let cohort: Vec<RankedSignal> = (0..10)
            .map(|i| ranked(&format!("S{i}"), 50.0, if i < 9 { 0.5 } else { 1.5 }, 0.0, 0.5, 0.0))
            .collect();
        let result = apply(cohort, &config);
        assert_eq!(result.pattern, Some(RedDayPattern::WeakVolumeAlone));
        assert!(result.gated.iter().all(|g| g.rejected));
    }

    #[test]
    fn primary_override_allows_trading_despite_p3() {
        let config = Config::default();
        let cohort: Vec<RankedSignal> = (0..10)
            .map(|i| ranked(&format!("S{i}"), 50.0, 0.5, 5.0, 3.0, 0.0))
            .collect();
        let result = apply(cohort, &config);
        assert!(result.pattern.is_none());
    }

    #[test]
    fn failsafe_clears_all_red_day_flags() {
        let config = Config::default();
        let cohort: Vec<RankedSignal> = (0..5).map(|i| ranked(&format!("S{i}"), 0.0, 0.5, 0.0, 0.0, 0.0)).collect();
        let result = apply(cohort, &config);
        assert!(result.failsafe_triggered);
        assert!(result.gated.iter().all(|g| !g.is_red_day));
    }
}
