/// Floor/breakeven/trailing stop progression and the fourteen exit
/// triggers (§4.8, C10). Pure functions over `Position` plus a small
/// external context the orchestrator assembles each tick — no I/O, no
/// locking, so the trigger ladder is independently testable.
use chrono::{DateTime, Utc};

use crate::types::{Position, PositionStatus, Price, Side, Symbol};

/// Tiered by entry-bar ORB range percent (§4.8). Set once at fill, never
/// relaxed afterward.
pub fn floor_stop_fraction(orb_range_pct: f64) -> f64 {
    if orb_range_pct >= 6.0 {
        0.08
    } else if orb_range_pct >= 3.0 {
        0.05
    } else if orb_range_pct >= 2.0 {
        0.03
    } else {
        0.02
    }
}

fn base_trailing_distance(orb_range_pct: f64) -> f64 {
    if orb_range_pct >= 3.0 {
        0.02
    } else {
        0.015
    }
}

fn widen_trailing_distance(current: f64, unrealized_pct: f64) -> f64 {
    let widened = if unrealized_pct >= 0.02 { current + 0.005 } else { current };
    widened.min(0.025)
}

#[allow(clippy::too_many_arguments)]
pub fn open_position(
    position_id: String,
    symbol: Symbol,
    side: Side,
    entry_price: Price,
    quantity: i64,
    entry_time: DateTime<Utc>,
    orb_range_pct: f64,
) -> Position {
    let tier = floor_stop_fraction(orb_range_pct);
    let floor_stop = match side {
        Side::Long => entry_price * (1.0 - tier),
        Side::Short => entry_price * (1.0 + tier),
    };
    Position {
        position_id,
        symbol,
        side,
        entry_price,
        quantity,
        entry_time,
        peak_price: entry_price,
        peak_time: entry_time,
        max_adverse_excursion: 0.0,
        floor_stop,
        current_stop: floor_stop,
        breakeven_armed: false,
        trailing_armed: false,
        trailing_distance_pct: base_trailing_distance(orb_range_pct),
        status: PositionStatus::Open,
    }
}

/// Moves the stop toward the entry, never away from it.
fn tighten(side: Side, current: Price, candidate: Price) -> Price {
    match side {
        Side::Long => current.max(candidate),
        Side::Short => current.min(candidate),
    }
}

fn enforce_floor(side: Side, current_stop: Price, floor_stop: Price) -> Price {
    match side {
        Side::Long => current_stop.max(floor_stop),
        Side::Short => current_stop.min(floor_stop),
    }
}

pub fn update_peak(position: &mut Position, current_price: Price, now: DateTime<Utc>) {
    let improves = match position.side {
        Side::Long => current_price > position.peak_price,
        Side::Short => current_price < position.peak_price,
    };
    if improves {
        position.peak_price = current_price;
        position.peak_time = now;
    }

    let adverse = match position.side {
        Side::Long => (position.entry_price - current_price) / position.entry_price,
        Side::Short => (current_price - position.entry_price) / position.entry_price,
    };
    if adverse > position.max_adverse_excursion {
        position.max_adverse_excursion = adverse;
    }
}

/// Arms breakeven/trailing and raises `current_stop` accordingly (§4.8
/// stop progression). Must run after `update_peak` so trailing tracks the
/// latest peak.
pub fn progress_stops(position: &mut Position, current_price: Price, now: DateTime<Utc>) {
    let unrealized = position.unrealized_pct(current_price);
    let age_min = position.age(now).num_seconds() as f64 / 60.0;

    if unrealized >= 0.0075 && age_min >= 6.4 {
        position.breakeven_armed = true;
    }
    if position.breakeven_armed {
        let breakeven_stop = match position.side {
            Side::Long => position.entry_price * 1.002,
            Side::Short => position.entry_price * 0.998,
        };
        position.current_stop = tighten(position.side, position.current_stop, breakeven_stop);
    }

    if (unrealized >= 0.007 && age_min >= 6.4) || unrealized >= 0.03 {
        // unrealized >= 0.03 is trigger 4, take-profit arming: forces
        // trailing armed without exiting.
        position.trailing_armed = true;
    }
    if position.trailing_armed {
        position.trailing_distance_pct = widen_trailing_distance(position.trailing_distance_pct, unrealized);
        let trail_stop = match position.side {
            Side::Long => position.peak_price * (1.0 - position.trailing_distance_pct),
            Side::Short => position.peak_price * (1.0 + position.trailing_distance_pct),
        };
        position.current_stop = tighten(position.side, position.current_stop, trail_stop);
    }

    position.current_stop = enforce_floor(position.side, position.current_stop, position.floor_stop);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopHit,
    TrailingStop,
    Breakeven,
    ProfitTimeout,
    MaxHold,
    NoMomentumRapidExit,
    ImmediateReversal,
    WeakPosition,
    RsiExit,
    GapRisk,
    ForcedClose,
    EmergencyPortfolioExit,
    WeakDayExit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopHit => "STOP_HIT",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::Breakeven => "BREAKEVEN",
            ExitReason::ProfitTimeout => "PROFIT_TIMEOUT",
            ExitReason::MaxHold => "MAX_HOLD",
            ExitReason::NoMomentumRapidExit => "NO_MOMENTUM_RAPID_EXIT",
            ExitReason::ImmediateReversal => "IMMEDIATE_REVERSAL",
            ExitReason::WeakPosition => "WEAK_POSITION",
            ExitReason::RsiExit => "RSI_EXIT",
            ExitReason::GapRisk => "GAP_RISK",
            ExitReason::ForcedClose => "FORCED_CLOSE",
            ExitReason::EmergencyPortfolioExit => "EMERGENCY_PORTFOLIO_EXIT",
            ExitReason::WeakDayExit => "WEAK_DAY_EXIT",
        }
    }
}

/// External context the fourteen-trigger ladder needs but a `Position`
/// does not carry on its own (§4.8, §4.9).
pub struct ExitContext {
    pub current_price: Price,
    pub now: DateTime<Utc>,
    pub rsi: f64,
    /// When RSI first dropped below 45 and has stayed there since, tracked
    /// by the caller across ticks (trigger 10 requires 90s sustained).
    pub rsi_weak_since: Option<DateTime<Utc>>,
    /// Enables trigger 7 on a portfolio-weak day (§4.9 WARNING state).
    pub portfolio_weak_day: bool,
    pub health_emergency: bool,
    pub health_weak_day_exit: bool,
    pub forced_close: bool,
}

/// Evaluates the fourteen exit triggers in order; first match wins (§4.8).
/// Trigger 4 (take-profit arming) never exits so it has no variant here —
/// it is handled entirely inside `progress_stops`.
pub fn evaluate_exit(position: &Position, ctx: &ExitContext) -> Option<ExitReason> {
    let unrealized = position.unrealized_pct(ctx.current_price);
    let age_min = position.age(ctx.now).num_seconds() as f64 / 60.0;
    let peak_pct = position.peak_pct();

    let stop_hit = match position.side {
        Side::Long => ctx.current_price <= position.current_stop,
        Side::Short => ctx.current_price >= position.current_stop,
    };
    if stop_hit {
        return Some(if position.trailing_armed {
            ExitReason::TrailingStop
        } else if position.breakeven_armed {
            ExitReason::Breakeven
        } else {
            ExitReason::StopHit
        });
    }

    if age_min >= 150.0 && unrealized > 0.0 && !position.breakeven_armed && !position.trailing_armed {
        return Some(ExitReason::ProfitTimeout);
    }

    if age_min >= 240.0 {
        return Some(ExitReason::MaxHold);
    }

    if ctx.portfolio_weak_day && age_min >= 15.0 && peak_pct < 0.003 {
        return Some(ExitReason::NoMomentumRapidExit);
    }

    if (5.0..=10.0).contains(&age_min) && unrealized <= -0.005 {
        return Some(ExitReason::ImmediateReversal);
    }

    if age_min >= 20.0 && unrealized <= -0.003 && peak_pct < 0.002 {
        return Some(ExitReason::WeakPosition);
    }

    if let Some(since) = ctx.rsi_weak_since {
        let sustained = (ctx.now - since).num_seconds() >= 90;
        if ctx.rsi < 45.0 && sustained && unrealized <= -0.00375 {
            return Some(ExitReason::RsiExit);
        }
    }

    if position.peak_price > 0.0 {
        let gap = (position.peak_price - ctx.current_price).abs() / position.peak_price;
        if gap > 0.02 {
            return Some(ExitReason::GapRisk);
        }
    }

    if ctx.forced_close {
        return Some(ExitReason::ForcedClose);
    }

    if ctx.health_emergency {
        return Some(ExitReason::EmergencyPortfolioExit);
    }

    if ctx.health_weak_day_exit && unrealized < -0.005 {
        return Some(ExitReason::WeakDayExit);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_position(side: Side, entry: Price, orb_range_pct: f64, age: Duration) -> Position {
        let now = Utc::now();
        let mut position = open_position("p1".to_string(), "AAPL".to_string(), side, entry, 10, now - age, orb_range_pct);
        position.peak_price = entry;
        position
    }

    #[test]
    fn floor_tiers_match_volatility_bands() {
        assert_eq!(floor_stop_fraction(7.0), 0.08);
        assert_eq!(floor_stop_fraction(4.0), 0.05);
        assert_eq!(floor_stop_fraction(2.5), 0.03);
        assert_eq!(floor_stop_fraction(1.0), 0.02);
    }

    #[test]
    fn floor_stop_never_relaxed_by_progression() {
        let mut position = base_position(Side::Long, 100.0, 1.0, Duration::minutes(1));
        let floor = position.floor_stop;
        progress_stops(&mut position, 99.0, Utc::now());
        assert!(position.current_stop >= floor);
    }

    #[test]
    fn breakeven_arms_after_threshold_and_age() {
        let mut position = base_position(Side::Long, 100.0, 1.0, Duration::minutes(10));
        update_peak(&mut position, 100.8, Utc::now());
        progress_stops(&mut position, 100.8, Utc::now());
        assert!(position.breakeven_armed);
        assert!(position.current_stop >= 100.0 * 1.002 - 1e-9);
    }

    #[test]
    fn stop_hit_takes_priority_over_other_triggers() {
        let mut position = base_position(Side::Long, 100.0, 1.0, Duration::hours(5));
        position.current_stop = 99.0;
        let ctx = ExitContext {
            current_price: 98.0,
            now: Utc::now(),
            rsi: 60.0,
            rsi_weak_since: None,
            portfolio_weak_day: false,
            health_emergency: false,
            health_weak_day_exit: false,
            forced_close: false,
        };
        assert_eq!(evaluate_exit(&position, &ctx), Some(ExitReason::StopHit));
    }

    #[test]
    fn max_hold_fires_after_four_hours() {
        let position = base_position(Side::Long, 100.0, 1.0, Duration::hours(4) + Duration::minutes(1));
        let ctx = ExitContext {
            current_price: 100.5,
            now: Utc::now(),
            rsi: 60.0,
            rsi_weak_since: None,
            portfolio_weak_day: false,
            health_emergency: false,
            health_weak_day_exit: false,
            forced_close: false,
        };
        assert_eq!(evaluate_exit(&position, &ctx), Some(ExitReason::MaxHold));
    }

    #[test]
    fn rsi_exit_requires_sustained_weakness() {
        let mut position = base_position(Side::Long, 100.0, 1.0, Duration::minutes(30));
        position.current_stop = 90.0;
        let now = Utc::now();
        let ctx_not_sustained = ExitContext {
            current_price: 99.5,
            now,
            rsi: 40.0,
            rsi_weak_since: Some(now - Duration::seconds(30)),
            portfolio_weak_day: false,
            health_emergency: false,
            health_weak_day_exit: false,
            forced_close: false,
        };
        assert_ne!(evaluate_exit(&position, &ctx_not_sustained), Some(ExitReason::RsiExit));

        let ctx_sustained = ExitContext { rsi_weak_since: Some(now - Duration::seconds(120)), ..ctx_not_sustained };
        position.current_stop = 90.0;
        assert_eq!(evaluate_exit(&position, &ctx_sustained), Some(ExitReason::RsiExit));
    }

    #[test]
    fn weak_day_exit_only_closes_losing_positions() {
        let mut profitable = base_position(Side::Long, 100.0, 1.0, Duration::minutes(30));
        profitable.current_stop = 90.0;
        let ctx = ExitContext {
            current_price: 100.5,
            now: Utc::now(),
            rsi: 60.0,
            rsi_weak_since: None,
            portfolio_weak_day: false,
            health_emergency: false,
            health_weak_day_exit: true,
            forced_close: false,
        };
        assert_eq!(evaluate_exit(&profitable, &ctx), None, "WARNING must not close a profitable position");

        let mut losing = base_position(Side::Long, 100.0, 1.0, Duration::minutes(30));
        losing.current_stop = 90.0;
        let losing_ctx = ExitContext { current_price: 99.0, ..ctx };
        assert_eq!(evaluate_exit(&losing, &losing_ctx), Some(ExitReason::WeakDayExit));
    }

    #[test]
    fn forced_close_fires_when_flagged() {
        let mut position = base_position(Side::Long, 100.0, 1.0, Duration::minutes(30));
        position.current_stop = 50.0;
        let ctx = ExitContext {
            current_price: 100.5,
            now: Utc::now(),
            rsi: 60.0,
            rsi_weak_since: None,
            portfolio_weak_day: false,
            health_emergency: false,
            health_weak_day_exit: false,
            forced_close: true,
        };
        assert_eq!(evaluate_exit(&position, &ctx), Some(ExitReason::ForcedClose));
    }
}
