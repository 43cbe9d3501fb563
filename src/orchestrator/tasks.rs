/// T-Scanner / T-Monitor / T-Health task bodies (§5, §6). Each runs as its
/// own `tokio::spawn`ed task for the lifetime the concurrency model gives
/// it, talking back to T-FSM only through the shared, internally-locked
/// collaborators (`SignalGenerator`, `PositionManager`, `HealthFlags`) —
/// mirroring the teacher's worker-task shape in `main.rs`'s WebSocket/
/// analysis loops, generalized from a single ADX poll to three independent
/// cadences.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::alerts::{send_deduped, AlertSink};
use crate::data::OpeningRangeStore;
use crate::error::Result;
use crate::execution::TradeExecutor;
use crate::health;
use crate::market::MarketDataGateway;
use crate::positions::{evaluate_exit, progress_stops, update_peak, ExitContext, PositionManager};
use crate::signal::generator::{breaks_out_long, breaks_out_short};
use crate::signal::indicators::{approximate_rsi_from_bar, percentage_change, relative_strength};
use crate::signal::SignalGenerator;
use crate::types::{AlertKind, Bar, DailyMarker, FeatureBundle, Symbol};

/// Shared flags the health task writes and the monitor task reads, so a
/// portfolio-level EMERGENCY/WARNING verdict can force individual exits
/// without the two tasks sharing a channel (§4.9 feeds §4.8 trigger 7/13).
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthFlags {
    pub emergency: bool,
    pub weak_day_exit: bool,
}

/// Builds the feature bundle the scanner needs from only the single
/// previous 15-minute bar the data model provides (§4.3) plus the current
/// quote and a SPY reference point — there is no bar-history series in
/// this system's scope, so RSI/MACD/VWAP are approximated rather than
/// computed from a multi-bar window (documented in DESIGN.md). `spy_bar`
/// and `spy_price` are `None` when the universe scan has no SPY quote this
/// tick, in which case relative strength falls back to 0.
fn approximate_features(
    current_price: f64,
    orb_range_pct: f64,
    previous_bar: &Bar,
    spy_previous_bar: Option<&Bar>,
    spy_current_price: Option<f64>,
) -> FeatureBundle {
    let bar_return_pct = percentage_change(previous_bar.open, previous_bar.close);
    let rsi = approximate_rsi_from_bar(previous_bar);
    let macd_histogram = bar_return_pct;

    let typical_price = (previous_bar.high + previous_bar.low + previous_bar.close) / 3.0;
    let vwap_distance_pct = percentage_change(typical_price, current_price);

    let rs_vs_spy_pct = match (spy_previous_bar, spy_current_price) {
        (Some(spy_bar), Some(spy_price)) => {
            let symbol_return = percentage_change(previous_bar.close, current_price);
            let spy_return = percentage_change(spy_bar.close, spy_price);
            relative_strength(symbol_return, spy_return)
        }
        _ => 0.0,
    };

    let volume_ratio = if previous_bar.volume > 0 { 1.0 } else { 0.0 };
    let orb_volume_ratio = volume_ratio;
    let confidence = ((current_price - previous_bar.close).abs() / previous_bar.close.max(1e-9)).min(1.0);

    FeatureBundle {
        rsi,
        macd_histogram,
        vwap_distance_pct,
        rs_vs_spy_pct,
        volume_ratio,
        orb_volume_ratio,
        entry_bar_volatility_pct: orb_range_pct,
        confidence,
    }
}

/// T-Scanner (§5): polls the universe every 30s for the duration of
/// SO_COLLECTION, evaluating the breakout conditions and feeding any new
/// or updated signal into the shared generator.
pub async fn scanner_loop(
    gateway: Arc<dyn MarketDataGateway>,
    orb_store: Arc<RwLock<OpeningRangeStore>>,
    generator: Arc<Mutex<SignalGenerator>>,
    universe: Vec<Symbol>,
    allow_short: bool,
    spy_symbol: Option<Symbol>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let quotes = match gateway.batch_quote(&universe).await {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "scanner quote batch failed, retrying next tick");
                continue;
            }
        };

        let now = chrono::Utc::now();
        let window_start = now - chrono::Duration::minutes(15);

        let (spy_bar, spy_price) = match &spy_symbol {
            Some(spy) => {
                let bar = gateway.bar(spy, window_start, now).await.ok();
                let price = quotes.get(spy).map(|q| q.price);
                (bar, price)
            }
            None => (None, None),
        };

        let orb_store = orb_store.read().await;
        let mut generator = generator.lock().await;

        for symbol in &universe {
            let Some(quote) = quotes.get(symbol) else { continue };
            let Some(orb) = orb_store.get(symbol) else { continue };
            if orb_store.is_untradeable(symbol) {
                continue;
            }

            let previous_bar = match gateway.bar(symbol, window_start, now).await {
                Ok(bar) => bar,
                Err(_) => continue,
            };

            if !breaks_out_long(quote.price, orb, &previous_bar) && !(allow_short && breaks_out_short(quote.price, orb, &previous_bar)) {
                continue;
            }

            let features = approximate_features(quote.price, orb.range_pct(), &previous_bar, spy_bar.as_ref(), spy_price);
            generator.scan_symbol(symbol, quote.price, orb, &previous_bar, features, now, allow_short);
        }
    }
}

/// T-Monitor (§5): evaluates the fourteen-trigger exit ladder for every
/// open position every 30s.
#[allow(clippy::too_many_arguments)]
pub async fn monitor_loop(
    gateway: Arc<dyn MarketDataGateway>,
    executor: Arc<dyn TradeExecutor>,
    positions: Arc<PositionManager>,
    health_flags: Arc<RwLock<HealthFlags>>,
    portfolio_weak_day: Arc<RwLock<bool>>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut rsi_weak_since: HashMap<Symbol, chrono::DateTime<chrono::Utc>> = HashMap::new();

    loop {
        ticker.tick().await;
        let open = positions.open_positions().await;
        if open.is_empty() {
            continue;
        }

        let symbols: Vec<Symbol> = open.iter().map(|p| p.symbol.clone()).collect();
        let quotes = match gateway.batch_quote(&symbols).await {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "monitor quote batch failed, skipping this tick");
                continue;
            }
        };

        let flags = *health_flags.read().await;
        let weak_day = *portfolio_weak_day.read().await;
        let now = chrono::Utc::now();
        let window_start = now - chrono::Duration::minutes(15);

        for position in open {
            let Some(quote) = quotes.get(&position.symbol) else { continue };

            // RSI trigger 10 needs a per-symbol reading each tick; approximated
            // from the same single recent bar the scanner uses (§4.3 data
            // model provides no multi-bar history here either).
            let rsi = match gateway.bar(&position.symbol, window_start, now).await {
                Ok(bar) => approximate_rsi_from_bar(&bar),
                Err(_) => 50.0,
            };
            if rsi < 45.0 {
                rsi_weak_since.entry(position.symbol.clone()).or_insert(now);
            } else {
                rsi_weak_since.remove(&position.symbol);
            }
            let weak_since = rsi_weak_since.get(&position.symbol).copied();

            let ctx = ExitContext {
                current_price: quote.price,
                now,
                rsi,
                rsi_weak_since: weak_since,
                portfolio_weak_day: weak_day,
                health_emergency: flags.emergency,
                health_weak_day_exit: flags.weak_day_exit,
                forced_close: false,
            };

            let exit_reason = evaluate_exit(&position, &ctx);

            if let Some(reason) = exit_reason {
                match executor.place_exit(&position.symbol, position.side, position.quantity, &position.position_id).await {
                    Ok(fill) => {
                        if let Err(e) = positions.close(&position.position_id, fill.fill_price, reason.as_str().to_string(), now).await {
                            warn!(position_id = %position.position_id, error = %e, "failed to record position close after exit fill");
                        }
                        rsi_weak_since.remove(&position.symbol);
                    }
                    Err(e) => warn!(position_id = %position.position_id, error = %e, "exit order failed, position remains open"),
                }
                continue;
            }

            if let Err(e) = positions
                .mutate(&position.position_id, |p| {
                    update_peak(p, quote.price, now);
                    progress_stops(p, quote.price, now);
                })
                .await
            {
                warn!(position_id = %position.position_id, error = %e, "stop progression failed");
            }
        }
    }
}

/// T-Health (§5): evaluates the five-flag portfolio health check on a
/// 15-minute cadence, idempotent within its own window per symbol-set.
#[allow(clippy::too_many_arguments)]
pub async fn health_loop(
    gateway: Arc<dyn MarketDataGateway>,
    positions: Arc<PositionManager>,
    config: Arc<crate::config::Config>,
    health_flags: Arc<RwLock<HealthFlags>>,
    portfolio_weak_day: Arc<RwLock<bool>>,
    alert_sink: Arc<dyn AlertSink>,
    marker: Arc<Mutex<DailyMarker>>,
    evaluated_windows: Arc<Mutex<health::EvaluatedWindows>>,
    clock: Arc<dyn crate::time::Clock>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let window_minutes = (config.health_check_frequency_min.max(1.0)) as i64;
        let key = health::window_key(clock.now().with_timezone(&crate::time::SCHEDULING_ZONE), window_minutes);
        {
            let mut windows = evaluated_windows.lock().await;
            if windows.already_evaluated(&key) {
                continue;
            }
            windows.mark_evaluated(key);
        }

        let open = positions.open_positions().await;
        let closed = positions.closed_today().await;
        let symbols: Vec<Symbol> = open.iter().map(|p| p.symbol.clone()).collect();
        let quotes = gateway.batch_quote(&symbols).await.unwrap_or_default();
        let current_prices: HashMap<Symbol, f64> = quotes.iter().map(|(s, q)| (s.clone(), q.price)).collect();

        let report = health::evaluate(&open, &closed, &current_prices, config.as_ref());
        info!(flags = report.flags, action = ?report.action, "portfolio health evaluated");

        let mut flags = health_flags.write().await;
        flags.weak_day_exit = matches!(report.action, health::HealthAction::Warning);
        flags.emergency = matches!(report.action, health::HealthAction::Emergency);
        drop(flags);

        // §4.9 WARNING also enables trigger 7 (no-momentum rapid exit) for
        // surviving positions; EMERGENCY implies WARNING's effects too.
        *portfolio_weak_day.write().await = matches!(report.action, health::HealthAction::Warning | health::HealthAction::Emergency);

        let kind = match report.action {
            health::HealthAction::Emergency => Some(AlertKind::HealthEmergency),
            health::HealthAction::Warning => Some(AlertKind::HealthWarning),
            health::HealthAction::None => None,
        };

        if let Some(kind) = kind {
            let mut marker = marker.lock().await;
            let message = format!("portfolio health flags={} action={:?}", report.flags, report.action);
            if let Err(e) = send_deduped(alert_sink.as_ref(), &mut marker, kind, &message).await {
                if !matches!(e, crate::error::TradingError::DuplicateAlert(_)) {
                    warn!(error = %e, "health alert dispatch failed");
                }
            }
        }
    }
}

/// Closes every open position at market on the EOD_CLOSE transition
/// (§4.1, invariant 10: no overnight positions).
pub async fn force_close_all(
    gateway: &dyn MarketDataGateway,
    executor: &dyn TradeExecutor,
    positions: &PositionManager,
) -> Result<()> {
    let open = positions.open_positions().await;
    let symbols: Vec<Symbol> = open.iter().map(|p| p.symbol.clone()).collect();
    let quotes = gateway.batch_quote(&symbols).await.unwrap_or_default();
    let now = chrono::Utc::now();

    for position in open {
        let fallback_price = quotes.get(&position.symbol).map(|q| q.price).unwrap_or(position.entry_price);
        match executor.place_exit(&position.symbol, position.side, position.quantity, &position.position_id).await {
            Ok(fill) => {
                positions.close(&position.position_id, fill.fill_price, "FORCED_CLOSE".to_string(), now).await?;
            }
            Err(e) => {
                warn!(position_id = %position.position_id, error = %e, "forced close order failed, closing at last known quote");
                positions.close(&position.position_id, fallback_price, "FORCED_CLOSE".to_string(), now).await?;
            }
        }
    }
    Ok(())
}
