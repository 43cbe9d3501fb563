/// C14: the Orchestrator. Owns the phase FSM and the day's mutable state
/// (`OpeningRangeStore`, `DailyMarker`, `Phase`), composes every other
/// component, and runs the T-FSM/T-Scanner/T-Monitor/T-Health task
/// topology from spec §5. Grounded on the teacher's `TradingApp` (main.rs)
/// as the composition root shape — a long-lived struct holding every
/// collaborator plus a `run` loop — generalized from a single ADX poll
/// loop to a wall-clock phase schedule with edge-triggered one-shot
/// actions.
pub mod tasks;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::alerts::{send_deduped, AlertSink};
use crate::config::Config;
use crate::data::OpeningRangeStore;
use crate::error::{Result, TradingError};
use crate::execution::{new_session_id, sized_lines_to_orders, TradeExecutor};
use crate::health;
use crate::http::{AppState, HealthMetrics};
use crate::market::MarketDataGateway;
use crate::positions::PositionManager;
use crate::signal::{apply_red_day_filter, ranker, SignalGenerator};
use crate::sizer::{size_batch, SizerConfig, SizerInput};
use crate::state::StateStore;
use crate::time::{Clock, HolidayCalendar, Phase, Schedule, MARKET_ZONE, SCHEDULING_ZONE};
use crate::types::{AlertKind, Side};
use tasks::HealthFlags;

const SCANNER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const MONITOR_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const HEALTH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15 * 60);
const FSM_TICK: std::time::Duration = std::time::Duration::from_secs(1);

/// The Orchestrator's run loop ends with one of three outcomes the CLI
/// turns into a process exit code (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// DRAIN completed cleanly after a shutdown signal.
    CleanShutdown,
    /// A fatal error aborted the run before any recoverable retry applied.
    Fatal,
}

pub struct Orchestrator {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    calendar: Arc<dyn HolidayCalendar>,
    gateway: Arc<dyn MarketDataGateway>,
    executor: Arc<dyn TradeExecutor>,
    state_store: Arc<dyn StateStore>,
    alert_sink: Arc<dyn AlertSink>,
    schedule: Schedule,

    phase: Phase,
    read_only: bool,
    marker: Arc<Mutex<crate::types::DailyMarker>>,
    orb_store: Arc<RwLock<OpeningRangeStore>>,
    signal_generator: Arc<Mutex<SignalGenerator>>,
    positions: Arc<PositionManager>,
    evaluated_health_windows: Arc<Mutex<health::EvaluatedWindows>>,
    health_flags: Arc<RwLock<HealthFlags>>,
    portfolio_weak_day: Arc<RwLock<bool>>,

    scanner_handle: Option<JoinHandle<()>>,
    monitor_handle: Option<JoinHandle<()>>,
    health_handle: Option<JoinHandle<()>>,

    /// Optional `--cloud-mode` health-endpoint state, updated every tick
    /// so `GET /health` reflects the live phase and open-position count.
    health_state: Option<Arc<AppState>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        calendar: Arc<dyn HolidayCalendar>,
        gateway: Arc<dyn MarketDataGateway>,
        executor: Arc<dyn TradeExecutor>,
        state_store: Arc<dyn StateStore>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        Orchestrator {
            config: Arc::new(config),
            clock,
            calendar,
            gateway,
            executor,
            state_store,
            alert_sink,
            schedule: Schedule::default(),
            phase: Phase::Idle,
            read_only: false,
            marker: Arc::new(Mutex::new(crate::types::DailyMarker::new(String::new()))),
            orb_store: Arc::new(RwLock::new(OpeningRangeStore::new())),
            signal_generator: Arc::new(Mutex::new(SignalGenerator::new())),
            positions: Arc::new(PositionManager::new(0.0)),
            evaluated_health_windows: Arc::new(Mutex::new(health::EvaluatedWindows::new())),
            health_flags: Arc::new(RwLock::new(HealthFlags::default())),
            portfolio_weak_day: Arc::new(RwLock::new(false)),
            scanner_handle: None,
            monitor_handle: None,
            health_handle: None,
            health_state: None,
        }
    }

    /// Wires the `--cloud-mode` HTTP health state so the run loop keeps it
    /// in sync with the phase FSM and open positions (§6).
    pub fn with_health_state(mut self, health_state: Arc<AppState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    fn today(&self) -> String {
        self.clock.today_in_zone(MARKET_ZONE).format("%Y-%m-%d").to_string()
    }

    /// Reconstructs today's `DailyMarker`, account and open positions from
    /// the state store, so a restart mid-day resumes without repeating
    /// one-shot actions or losing trailing-stop state (§4.10, scenario S6).
    async fn cold_start(&mut self) -> Result<()> {
        let date = self.today();

        let marker = match self.state_store.read_marker(&date).await? {
            Some(marker) => marker,
            None => crate::types::DailyMarker::new(date.clone()),
        };
        *self.marker.lock().await = marker;

        let account = match self.state_store.read_account().await? {
            Some(account) => account,
            None => {
                let replayed = self.state_store.replay_trades(&date).await?;
                let starting_balance = 100_000.0;
                let cash_balance = starting_balance + replayed.iter().map(|t| t.pnl_absolute).sum::<f64>();
                crate::types::Account { cash_balance, starting_balance }
            }
        };
        self.positions = Arc::new(PositionManager::from_account(account));

        let reloaded = self.state_store.read_open_positions(&date).await?;
        for position in reloaded {
            info!(position_id = %position.position_id, symbol = %position.symbol, "restored open position from checkpoint");
            self.positions.restore(position).await;
        }

        Ok(())
    }

    /// Persists the account, marker and open-position set. Called after
    /// every state-changing transition so a crash never loses more than
    /// one tick of progress.
    async fn checkpoint(&self) -> Result<()> {
        let date = self.today();
        self.state_store.write_account(&self.positions.account().await).await?;
        self.state_store.write_marker(&*self.marker.lock().await).await?;
        self.state_store.write_open_positions(&date, &self.positions.open_positions().await).await?;
        Ok(())
    }

    async fn send_alert(&self, kind: AlertKind, message: &str) {
        let mut marker = self.marker.lock().await;
        if let Err(e) = send_deduped(self.alert_sink.as_ref(), &mut marker, kind, message).await {
            if !matches!(e, TradingError::DuplicateAlert(_)) {
                warn!(error = %e, "alert dispatch failed");
            }
        }
    }

    /// Main entry point. Runs until a shutdown signal is observed, then
    /// drains and returns.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.cold_start().await?;

        let mut shutdown = Box::pin(shutdown_signal());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, entering DRAIN");
                    self.enter_drain().await;
                    return Ok(RunOutcome::CleanShutdown);
                }
                result = self.tick() => {
                    if let Err(e) = result {
                        if e.is_fatal() {
                            error!(error = %e, "fatal error, aborting run");
                            self.abort_tasks();
                            return Err(e);
                        }
                        if e.requires_read_only() {
                            warn!(error = %e, "entering READ_ONLY sub-state");
                            self.read_only = true;
                        } else {
                            warn!(error = %e, "recoverable error, continuing");
                        }
                    }
                }
            }
            tokio::time::sleep(FSM_TICK).await;
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let date = self.today();
        {
            let mut marker = self.marker.lock().await;
            if marker.date != date {
                *marker = crate::types::DailyMarker::new(date.clone());
                self.positions.reset_daily().await;
            }
        }

        let local_date = self.clock.today_in_zone(SCHEDULING_ZONE);
        if !self.calendar.is_trading_day(local_date) {
            self.phase = Phase::Idle;
            return Ok(());
        }

        let local_time = self.clock.local_time_in_zone(SCHEDULING_ZONE);
        let steady_state = self.schedule.phase_for_time(local_time);

        if steady_state != self.phase {
            self.transition(self.phase, steady_state).await?;
            self.phase = steady_state;
        }

        if self.phase == Phase::OrbCapture && self.schedule.should_fire_orb_capture(local_time) {
            self.run_orb_capture().await?;
        }

        self.checkpoint().await?;
        self.refresh_health_state().await;
        Ok(())
    }

    async fn refresh_health_state(&self) {
        let Some(health_state) = &self.health_state else { return };
        health_state.set_phase(self.phase).await;
        let account = self.positions.account().await;
        health_state
            .set_metrics(HealthMetrics {
                open_positions: self.positions.open_positions().await.len(),
                trades_today: self.positions.closed_today().await.len(),
                cash_balance: account.cash_balance,
            })
            .await;
    }

    async fn transition(&mut self, from: Phase, to: Phase) -> Result<()> {
        info!(?from, ?to, "phase transition");

        match from {
            Phase::SoCollection => self.abort_scanner(),
            Phase::Monitoring => self.abort_monitor_and_health(),
            _ => {}
        }

        match to {
            Phase::MorningAlert => self.run_morning_alert().await,
            Phase::SoCollection => self.run_so_collection_start().await,
            Phase::Monitoring => self.run_batch_execution_then_monitoring().await,
            Phase::EodClose => self.run_eod_close().await,
            Phase::Idle if from == Phase::EodClose => self.run_eod_report().await,
            _ => Ok(()),
        }
    }

    async fn run_morning_alert(&mut self) -> Result<()> {
        let mut marker = self.marker.lock().await;
        if marker.phase_done("MORNING_ALERT") {
            return Ok(());
        }
        drop(marker);

        self.send_alert(AlertKind::Morning, "good morning: trading day is active").await;
        self.marker.lock().await.mark_phase_done("MORNING_ALERT");
        Ok(())
    }

    async fn run_orb_capture(&mut self) -> Result<()> {
        let mut marker = self.marker.lock().await;
        if marker.phase_done("ORB_CAPTURE") {
            return Ok(());
        }
        drop(marker);

        let mut orb_store = self.orb_store.write().await;
        orb_store.reset();
        orb_store.capture(self.gateway.as_ref(), &self.config.universe, 3).await?;
        info!(captured = orb_store.len(), "opening range captured");
        drop(orb_store);

        self.send_alert(AlertKind::OrbCapture, "opening range captured").await;
        self.marker.lock().await.mark_phase_done("ORB_CAPTURE");
        Ok(())
    }

    async fn run_so_collection_start(&mut self) -> Result<()> {
        self.signal_generator.lock().await.reset();

        let spy_symbol = if self.config.universe.iter().any(|s| s == "SPY") { None } else { Some("SPY".to_string()) };

        let handle = tokio::spawn(tasks::scanner_loop(
            self.gateway.clone(),
            self.orb_store.clone(),
            self.signal_generator.clone(),
            self.config.universe.clone(),
            false,
            spy_symbol,
            SCANNER_INTERVAL,
        ));
        self.scanner_handle = Some(handle);

        self.send_alert(AlertKind::SignalCollection, "signal collection window opened").await;
        Ok(())
    }

    fn abort_scanner(&mut self) {
        if let Some(handle) = self.scanner_handle.take() {
            handle.abort();
        }
    }

    fn abort_monitor_and_health(&mut self) {
        if let Some(handle) = self.monitor_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.health_handle.take() {
            handle.abort();
        }
    }

    fn abort_tasks(&mut self) {
        self.abort_scanner();
        self.abort_monitor_and_health();
    }

    /// Edge-triggered BATCH_EXECUTION action, run exactly once when
    /// SO_COLLECTION yields to MONITORING, then starts T-Monitor/T-Health
    /// for the monitoring window (§4.1, §5).
    async fn run_batch_execution_then_monitoring(&mut self) -> Result<()> {
        self.abort_scanner();

        let mut marker = self.marker.lock().await;
        let already_done = marker.phase_done("BATCH_EXECUTION");
        drop(marker);

        if !already_done {
            self.run_batch_execution().await?;
            self.marker.lock().await.mark_phase_done("BATCH_EXECUTION");
        }

        let monitor_handle = tokio::spawn(tasks::monitor_loop(
            self.gateway.clone(),
            self.executor.clone(),
            self.positions.clone(),
            self.health_flags.clone(),
            self.portfolio_weak_day.clone(),
            MONITOR_INTERVAL,
        ));
        self.monitor_handle = Some(monitor_handle);

        let health_handle = tokio::spawn(tasks::health_loop(
            self.gateway.clone(),
            self.positions.clone(),
            self.config.clone(),
            self.health_flags.clone(),
            self.portfolio_weak_day.clone(),
            self.alert_sink.clone(),
            self.marker.clone(),
            self.evaluated_health_windows.clone(),
            self.clock.clone(),
            HEALTH_INTERVAL,
        ));
        self.health_handle = Some(health_handle);

        Ok(())
    }

    async fn run_batch_execution(&mut self) -> Result<()> {
        let raw_signals: Vec<_> = self.signal_generator.lock().await.signals().cloned().collect();
        if raw_signals.is_empty() {
            info!("no breakout signals generated today");
            return Ok(());
        }

        let ranked = ranker::rank(&raw_signals);
        let gated_result = apply_red_day_filter(ranked, self.config.as_ref());
        let executable: Vec<_> = gated_result.gated.iter().filter(|g| !g.rejected).cloned().collect();

        self.state_store.archive_signals(&self.today(), &gated_result.gated).await?;

        if gated_result.pattern.is_some() {
            warn!(pattern = ?gated_result.pattern, "red-day pattern detected, signals suppressed");
        }
        if gated_result.failsafe_triggered {
            warn!("red-day data-quality failsafe triggered, treating signals as non-red-day");
        }

        if executable.is_empty() {
            info!("no signals survived the red-day filter");
            return Ok(());
        }

        let account = self.positions.account().await;

        let sizer_inputs = build_sizer_inputs(executable, self.gateway.as_ref()).await?;

        let sizer_config = SizerConfig {
            target_deployment_fraction: self.config.so_capital_pct,
            max_position_fraction: self.config.max_position_size_pct,
            adv_cap_fraction: self.config.slip_guard_adv_pct,
            slip_guard_enabled: self.config.slip_guard_enabled,
        };
        // `size_batch` applies `T` internally (fair share, normalize); pass
        // raw cash, not cash already scaled by `so_capital_pct` (§4.6).
        let sized_lines = size_batch(sizer_inputs, account.cash_balance, &sizer_config);

        let orders = sized_lines_to_orders(sized_lines, Side::Long);
        let session_id = new_session_id();
        let reports = self.executor.place_batch(orders, &session_id).await;

        for report in &reports {
            if let Some(fill) = &report.fill {
                let orb_range_pct = self
                    .orb_store
                    .read()
                    .await
                    .get(&report.order.symbol)
                    .map(|o| o.range_pct())
                    .unwrap_or(2.0);
                let position = crate::positions::open_position(
                    uuid::Uuid::new_v4().to_string(),
                    report.order.symbol.clone(),
                    report.order.side,
                    fill.fill_price,
                    fill.filled_quantity,
                    chrono::Utc::now(),
                    orb_range_pct,
                );
                self.positions.open(position).await?;
            } else if let Some(error) = &report.error {
                warn!(symbol = %report.order.symbol, error, "order not filled, position not opened");
            }
        }

        self.send_alert(AlertKind::BatchExecution, &format!("batch execution placed {} orders", reports.len())).await;
        Ok(())
    }

    async fn run_eod_close(&mut self) -> Result<()> {
        self.abort_monitor_and_health();
        tasks::force_close_all(self.gateway.as_ref(), self.executor.as_ref(), self.positions.as_ref()).await?;
        self.send_alert(AlertKind::AggregatedExit, "all positions force-closed at end of day").await;
        Ok(())
    }

    async fn run_eod_report(&mut self) -> Result<()> {
        let date = self.today();
        let trades = self.positions.closed_today().await;
        let report = crate::reporting::build_report(&date, trades);
        info!(
            total_trades = report.metrics.total_trades,
            net_pnl = report.metrics.net_pnl,
            win_rate = report.metrics.win_rate,
            "end of day report"
        );

        self.send_alert(
            AlertKind::EodReport,
            &format!("EOD report: {} trades, net pnl {:.2}, win rate {:.1}%", report.metrics.total_trades, report.metrics.net_pnl, report.metrics.win_rate * 100.0),
        )
        .await;
        Ok(())
    }

    async fn enter_drain(&mut self) {
        self.abort_tasks();
        if let Err(e) = self.executor.cancel_all().await {
            warn!(error = %e, "cancel_all failed during drain");
        }
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "checkpoint failed during drain");
        }
        if let Some(health_state) = &self.health_state {
            health_state.set_phase(Phase::Drain).await;
            *health_state.running.write().await = false;
        }
    }
}

/// Fetches ADV for every gated signal's symbol, batching nothing extra
/// since ADV is per-symbol and the set is already small post-gating.
async fn build_sizer_inputs(executable: Vec<crate::types::GatedSignal>, gateway: &dyn MarketDataGateway) -> Result<Vec<SizerInput>> {
    let mut inputs = Vec::with_capacity(executable.len());
    for signal in executable {
        let adv = gateway.adv(signal.symbol()).await.unwrap_or(0);
        inputs.push(SizerInput {
            symbol: signal.symbol().to_string(),
            rank: signal.ranked.rank,
            price: signal.price(),
            adv,
        });
    }
    Ok(inputs)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
