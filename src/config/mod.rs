pub mod loader;

pub use loader::load_config;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Demo,
    Live,
}

/// Exhaustive set of config keys recognized by the core (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: Mode,
    pub enable_orb: bool,
    pub enable_0dte: bool,

    /// Universe of symbols the orchestrator scans.
    pub universe: Vec<String>,

    // Allocation
    pub so_capital_pct: f64,
    pub cash_reserve_pct: f64,
    pub max_position_size_pct: f64,
    pub max_concurrent_positions: usize,

    // Sizing
    pub slip_guard_enabled: bool,
    pub slip_guard_adv_pct: f64,
    pub slip_guard_lookback_days: u32,

    // Stops
    pub stealth_breakeven_threshold: f64,
    pub stealth_breakeven_time_min: f64,
    pub stealth_breakeven_offset: f64,
    pub stealth_trailing_activation_threshold: f64,
    pub stealth_trailing_activation_time_min: f64,
    pub stealth_base_trailing: f64,
    pub stealth_trailing_min: f64,
    pub stealth_trailing_max: f64,
    pub stealth_profit_timeout_hours: f64,
    pub stealth_max_hold_time_hours: f64,

    // Rapid exits
    pub rapid_exit_no_momentum_threshold: f64,
    pub rapid_exit_reversal_threshold: f64,
    pub rapid_exit_weak_threshold: f64,
    pub rapid_exit_weak_peak_threshold: f64,

    // Health
    pub health_check_frequency_min: f64,
    pub health_check_win_rate_threshold: f64,
    pub health_check_avg_pnl_threshold: f64,
    pub health_check_momentum_threshold: f64,
    pub health_check_weak_peaks_threshold: f64,

    // Red-day
    pub red_day_filter_enabled: bool,
    pub red_day_oversold_rsi: f64,
    pub red_day_overbought_rsi: f64,
    pub red_day_weak_volume_ratio: f64,
    pub red_day_pct_oversold_weak: f64,
    pub red_day_pct_overbought_weak: f64,
    pub red_day_pct_weak_volume_alone: f64,

    // CLI / ops
    pub cloud_mode_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::Demo,
            enable_orb: true,
            enable_0dte: false,
            universe: Vec::new(),
            so_capital_pct: 0.90,
            cash_reserve_pct: 0.10,
            max_position_size_pct: 0.35,
            max_concurrent_positions: 15,
            slip_guard_enabled: true,
            slip_guard_adv_pct: 0.01,
            slip_guard_lookback_days: 90,
            stealth_breakeven_threshold: 0.0075,
            stealth_breakeven_time_min: 6.4,
            stealth_breakeven_offset: 0.002,
            stealth_trailing_activation_threshold: 0.007,
            stealth_trailing_activation_time_min: 6.4,
            stealth_base_trailing: 0.015,
            stealth_trailing_min: 0.015,
            stealth_trailing_max: 0.025,
            stealth_profit_timeout_hours: 2.5,
            stealth_max_hold_time_hours: 4.0,
            rapid_exit_no_momentum_threshold: 0.003,
            rapid_exit_reversal_threshold: 0.005,
            rapid_exit_weak_threshold: 0.003,
            rapid_exit_weak_peak_threshold: 0.002,
            health_check_frequency_min: 15.0,
            health_check_win_rate_threshold: 0.35,
            health_check_avg_pnl_threshold: -0.005,
            health_check_momentum_threshold: 0.40,
            health_check_weak_peaks_threshold: 0.008,
            red_day_filter_enabled: true,
            red_day_oversold_rsi: 40.0,
            red_day_overbought_rsi: 80.0,
            red_day_weak_volume_ratio: 1.0,
            red_day_pct_oversold_weak: 0.70,
            red_day_pct_overbought_weak: 0.80,
            red_day_pct_weak_volume_alone: 0.80,
            cloud_mode_port: 8080,
        }
    }
}
