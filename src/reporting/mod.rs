/// End-of-day performance report (§3 supplemented feature, emitted
/// unconditionally during EOD_REPORT per §7). Grounded on the teacher's
/// `analytics::performance::PerformanceAnalyzer` (trade-stat/win-loss/P&L/
/// risk/execution metric groups over closed positions), retargeted from
/// options CE/PE strategy buckets to long/short side buckets since this
/// orchestrator trades equities, not options.
use serde::{Deserialize, Serialize};

use crate::types::{ClosedTrade, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub date: String,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,

    // Win/loss metrics
    pub win_rate: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub largest_win_pct: f64,
    pub largest_loss_pct: f64,

    // P&L metrics
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_pnl: f64,
    pub profit_factor: f64,

    // Risk metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub avg_risk_reward: f64,

    // Execution metrics
    pub avg_hold_time_minutes: f64,
    pub fastest_trade_minutes: f64,
    pub longest_trade_minutes: f64,

    // Side breakdown
    pub long_trades: usize,
    pub short_trades: usize,
    pub long_win_rate: f64,
    pub short_win_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPerformanceReport {
    pub metrics: PerformanceMetrics,
    pub trades: Vec<ClosedTrade>,
    pub notes: Vec<String>,
}

fn win_rate_of(trades: &[&ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.pnl_pct > 0.0).count();
    wins as f64 / trades.len() as f64
}

fn max_drawdown(trades: &[ClosedTrade]) -> (f64, f64) {
    let mut cumulative = 0.0;
    let mut peak: f64 = 0.0;
    let mut max_dd = 0.0;

    for trade in trades {
        cumulative += trade.pnl_absolute;
        peak = peak.max(cumulative);
        max_dd = max_dd.max(peak - cumulative);
    }

    let max_dd_pct = if peak > 0.0 { max_dd / peak } else { 0.0 };
    (max_dd, max_dd_pct)
}

/// Computes the full metric set from the day's closed trades, in the
/// order they were closed (the caller owns ordering — `ClosedTrade`s
/// should be passed in close order for the drawdown curve to be
/// meaningful).
pub fn calculate_metrics(date: &str, trades: &[ClosedTrade]) -> PerformanceMetrics {
    let total_trades = trades.len();
    if total_trades == 0 {
        return PerformanceMetrics {
            date: date.to_string(),
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            breakeven_trades: 0,
            win_rate: 0.0,
            avg_win_pct: 0.0,
            avg_loss_pct: 0.0,
            largest_win_pct: 0.0,
            largest_loss_pct: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            net_pnl: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            avg_risk_reward: 0.0,
            avg_hold_time_minutes: 0.0,
            fastest_trade_minutes: 0.0,
            longest_trade_minutes: 0.0,
            long_trades: 0,
            short_trades: 0,
            long_win_rate: 0.0,
            short_win_rate: 0.0,
        };
    }

    let winners: Vec<&ClosedTrade> = trades.iter().filter(|t| t.pnl_pct > 0.0).collect();
    let losers: Vec<&ClosedTrade> = trades.iter().filter(|t| t.pnl_pct < 0.0).collect();
    let breakeven = total_trades - winners.len() - losers.len();

    let avg_win_pct = if winners.is_empty() { 0.0 } else { winners.iter().map(|t| t.pnl_pct).sum::<f64>() / winners.len() as f64 };
    let avg_loss_pct = if losers.is_empty() { 0.0 } else { losers.iter().map(|t| t.pnl_pct).sum::<f64>() / losers.len() as f64 };
    let largest_win_pct = winners.iter().map(|t| t.pnl_pct).fold(0.0, f64::max);
    let largest_loss_pct = losers.iter().map(|t| t.pnl_pct).fold(0.0, f64::min);

    let gross_profit: f64 = winners.iter().map(|t| t.pnl_absolute).sum();
    let gross_loss: f64 = losers.iter().map(|t| t.pnl_absolute.abs()).sum();
    let net_pnl: f64 = trades.iter().map(|t| t.pnl_absolute).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let (max_dd, max_dd_pct) = max_drawdown(trades);
    let avg_risk_reward = if avg_loss_pct != 0.0 { avg_win_pct / avg_loss_pct.abs() } else { 0.0 };

    let hold_times: Vec<f64> = trades.iter().map(|t| (t.exit_time - t.entry_time).num_seconds() as f64 / 60.0).collect();
    let avg_hold_time_minutes = hold_times.iter().sum::<f64>() / hold_times.len() as f64;
    let fastest_trade_minutes = hold_times.iter().cloned().fold(f64::INFINITY, f64::min);
    let longest_trade_minutes = hold_times.iter().cloned().fold(0.0, f64::max);

    let long: Vec<&ClosedTrade> = trades.iter().filter(|t| t.side == Side::Long).collect();
    let short: Vec<&ClosedTrade> = trades.iter().filter(|t| t.side == Side::Short).collect();

    PerformanceMetrics {
        date: date.to_string(),
        total_trades,
        winning_trades: winners.len(),
        losing_trades: losers.len(),
        breakeven_trades: breakeven,
        win_rate: win_rate_of(&trades.iter().collect::<Vec<_>>()),
        avg_win_pct,
        avg_loss_pct,
        largest_win_pct,
        largest_loss_pct,
        gross_profit,
        gross_loss,
        net_pnl,
        profit_factor,
        max_drawdown: max_dd,
        max_drawdown_pct: max_dd_pct,
        avg_risk_reward,
        avg_hold_time_minutes,
        fastest_trade_minutes: if fastest_trade_minutes.is_finite() { fastest_trade_minutes } else { 0.0 },
        longest_trade_minutes,
        long_trades: long.len(),
        short_trades: short.len(),
        long_win_rate: win_rate_of(&long),
        short_win_rate: win_rate_of(&short),
    }
}

/// Builds the full report, adding a note whenever the day traded nothing
/// so the report is never silently empty.
pub fn build_report(date: &str, trades: Vec<ClosedTrade>) -> DailyPerformanceReport {
    let metrics = calculate_metrics(date, &trades);
    let mut notes = Vec::new();
    if trades.is_empty() {
        notes.push("no trades closed today".to_string());
    }
    if metrics.profit_factor.is_infinite() {
        notes.push("no losing trades today; profit factor is undefined (infinite)".to_string());
    }
    DailyPerformanceReport { metrics, trades, notes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn trade(pnl_pct: f64, side: Side, hold_minutes: i64) -> ClosedTrade {
        let entry = Utc::now();
        ClosedTrade {
            position_id: uuid::Uuid::new_v4().to_string(),
            symbol: "AAPL".to_string(),
            side,
            entry_price: 100.0,
            quantity: 10,
            entry_time: entry,
            exit_price: 100.0 * (1.0 + pnl_pct),
            exit_time: entry + Duration::minutes(hold_minutes),
            exit_reason: "TEST".to_string(),
            pnl_absolute: pnl_pct * 1000.0,
            pnl_pct,
        }
    }

    #[test]
    fn empty_day_reports_zeroed_metrics_with_a_note() {
        let report = build_report("2026-07-28", Vec::new());
        assert_eq!(report.metrics.total_trades, 0);
        assert!(report.notes.iter().any(|n| n.contains("no trades")));
    }

    #[test]
    fn mixed_day_computes_win_rate_and_profit_factor() {
        let trades = vec![
            trade(0.02, Side::Long, 30),
            trade(-0.01, Side::Long, 45),
            trade(0.015, Side::Short, 20),
        ];
        let metrics = calculate_metrics("2026-07-28", &trades);
        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert!((metrics.win_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(metrics.profit_factor > 0.0);
    }

    #[test]
    fn all_winners_yields_infinite_profit_factor_flagged_in_notes() {
        let trades = vec![trade(0.01, Side::Long, 10), trade(0.02, Side::Long, 20)];
        let report = build_report("2026-07-28", trades);
        assert!(report.metrics.profit_factor.is_infinite());
        assert!(report.notes.iter().any(|n| n.contains("profit factor")));
    }
}
