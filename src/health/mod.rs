/// Portfolio Health Monitor (§4.9, C11): five red flags over the
/// currently open and closed-today positions, evaluated every 15 minutes
/// and idempotent within its window.
use std::collections::HashSet;

use crate::config::Config;
use crate::types::{ClosedTrade, Position, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    None,
    Warning,
    Emergency,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioStats {
    pub win_rate: f64,
    pub avg_pnl_pct: f64,
    pub pct_momentum_positive: f64,
    pub avg_peak_pct: f64,
    pub pct_losing_now: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthReport {
    pub stats: PortfolioStats,
    pub flags: u8,
    pub action: HealthAction,
}

fn compute_stats(open: &[Position], closed: &[ClosedTrade], current_prices: &std::collections::HashMap<String, f64>) -> PortfolioStats {
    let total = open.len() + closed.len();
    if total == 0 {
        return PortfolioStats::default();
    }

    let wins = closed.iter().filter(|t| t.pnl_pct > 0.0).count();
    let open_unrealized: Vec<f64> = open
        .iter()
        .filter_map(|p| current_prices.get(&p.symbol).map(|price| p.unrealized_pct(*price)))
        .collect();
    let open_wins = open_unrealized.iter().filter(|pct| **pct > 0.0).count();

    let win_rate = (wins + open_wins) as f64 / total as f64;

    let closed_pnl_sum: f64 = closed.iter().map(|t| t.pnl_pct).sum();
    let open_pnl_sum: f64 = open_unrealized.iter().sum();
    let avg_pnl_pct = (closed_pnl_sum + open_pnl_sum) / total as f64;

    let momentum_positive = closed.iter().filter(|t| t.pnl_pct > 0.0).count()
        + open_unrealized.iter().filter(|pct| **pct > 0.0).count();
    let pct_momentum_positive = momentum_positive as f64 / total as f64;

    let peak_pcts: Vec<f64> = open.iter().map(|p| p.peak_pct()).collect();
    let avg_peak_pct = if peak_pcts.is_empty() { 0.0 } else { peak_pcts.iter().sum::<f64>() / peak_pcts.len() as f64 };

    let losing_now = open_unrealized.iter().filter(|pct| **pct < 0.0).count();
    let pct_losing_now = if open_unrealized.is_empty() { 0.0 } else { losing_now as f64 / open_unrealized.len() as f64 };

    PortfolioStats { win_rate, avg_pnl_pct, pct_momentum_positive, avg_peak_pct, pct_losing_now }
}

fn count_flags(stats: &PortfolioStats, config: &Config) -> u8 {
    let mut flags = 0;
    if stats.win_rate < config.health_check_win_rate_threshold {
        flags += 1;
    }
    if stats.avg_pnl_pct < config.health_check_avg_pnl_threshold {
        flags += 1;
    }
    if stats.pct_momentum_positive < config.health_check_momentum_threshold {
        flags += 1;
    }
    if stats.avg_peak_pct < config.health_check_weak_peaks_threshold {
        flags += 1;
    }
    if (stats.pct_losing_now - 1.0).abs() < f64::EPSILON {
        flags += 1;
    }
    flags
}

/// Evaluates the red flags and derives the action (§4.9). `Side` is
/// imported only because `Position::unrealized_pct` is side-aware.
pub fn evaluate(
    open: &[Position],
    closed: &[ClosedTrade],
    current_prices: &std::collections::HashMap<String, f64>,
    config: &Config,
) -> HealthReport {
    let stats = compute_stats(open, closed, current_prices);
    let flags = count_flags(&stats, config);
    let action = match flags {
        f if f >= 3 => HealthAction::Emergency,
        2 => HealthAction::Warning,
        _ => HealthAction::None,
    };
    let _ = Side::Long; // side-awareness lives in Position, not here
    HealthReport { stats, flags, action }
}

/// Idempotent dedup key for a 15-minute evaluation window (§4.9: "single-
/// pass and idempotent within its 15-minute window").
pub fn window_key(now: chrono::DateTime<chrono_tz::Tz>, window_minutes: i64) -> String {
    let bucket = now.timestamp() / (window_minutes * 60);
    format!("health-{bucket}")
}

#[derive(Default)]
pub struct EvaluatedWindows {
    seen: HashSet<String>,
}

impl EvaluatedWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_evaluated(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn mark_evaluated(&mut self, key: String) {
        self.seen.insert(key);
    }
}
