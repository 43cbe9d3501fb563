/// Composition root: parses CLI flags, loads config, wires every
/// collaborator behind its trait boundary, and runs the Orchestrator to
/// completion (§6 CLI surface, §4.10). Grounded on the teacher's
/// `TradingApp::new` (main.rs) as the construct-every-collaborator shape,
/// generalized from a fixed Angel One/paper-trading pairing to a
/// mode-selected gateway/executor/state-store trio behind the traits this
/// crate defines.
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use orb_orchestrator::alerts::{AlertSink, LoggingAlertSink};
use orb_orchestrator::config::{load_config, Config, Mode};
use orb_orchestrator::execution::{GatewayExecutor, TradeExecutor};
use orb_orchestrator::http;
use orb_orchestrator::market::{LiveGateway, MarketDataGateway, MockGateway};
use orb_orchestrator::orchestrator::{Orchestrator, RunOutcome};
use orb_orchestrator::state::{FileStateStore, StateStore};
use orb_orchestrator::time::{Clock, HolidayCalendar, SystemClock, WeekdayCalendar};

/// Intraday ORB trading orchestrator (§1 PURPOSE & SCOPE).
#[derive(Parser, Debug)]
#[command(name = "orb-orchestrator", version)]
struct Cli {
    /// Path to the TOML config file (§6 config keys).
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Boot the long-running orchestrator with an embedded HTTP health
    /// endpoint instead of exiting after a single invocation (§6).
    #[arg(long)]
    cloud_mode: bool,

    /// Directory the state store persists trades/account/markers/signals
    /// to. Ignored in demo mode, where state lives only for the process
    /// lifetime.
    #[arg(long, default_value = "./state")]
    state_dir: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orb_orchestrator=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds the mode-selected `MarketDataGateway`. Live mode reads the
/// broker base URL and API key from the environment — the secret store
/// and the credential portal are external collaborators this crate only
/// consumes through that boundary (§1 out of scope).
fn build_gateway(config: &Config) -> orb_orchestrator::error::Result<Arc<dyn MarketDataGateway>> {
    match config.mode {
        Mode::Demo => Ok(Arc::new(MockGateway::new(2.0))),
        Mode::Live => {
            let base_url = std::env::var("BROKER_BASE_URL")
                .map_err(|_| orb_orchestrator::error::TradingError::ConfigError("BROKER_BASE_URL not set for live mode".to_string()))?;
            let api_key = std::env::var("BROKER_API_KEY")
                .map_err(|_| orb_orchestrator::error::TradingError::ConfigError("BROKER_API_KEY not set for live mode".to_string()))?;
            Ok(Arc::new(LiveGateway::new(base_url, api_key)?))
        }
    }
}

async fn run(cli: Cli) -> i32 {
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "config validation failed");
            return 2;
        }
    };

    info!(mode = ?config.mode, universe = config.universe.len(), "starting orb-orchestrator");

    let gateway = match build_gateway(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "failed to initialize market data gateway");
            return 1;
        }
    };

    // Holiday calendar data is explicitly out of scope (§1 non-goals); the
    // weekday-only baseline is the mechanism the spec keeps.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let calendar: Arc<dyn HolidayCalendar> = Arc::new(WeekdayCalendar);
    let executor: Arc<dyn TradeExecutor> = Arc::new(GatewayExecutor::new(gateway.clone()));
    let state_store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(cli.state_dir.clone()));
    let alert_sink: Arc<dyn AlertSink> = Arc::new(LoggingAlertSink);

    let http_state = Arc::new(http::AppState::new());
    let http_server = if cli.cloud_mode {
        let port = config.cloud_mode_port;
        match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => {
                info!(port, "cloud-mode health endpoint listening");
                let app = http::router(http_state.clone());
                Some(tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!(error = %e, "health endpoint server stopped");
                    }
                }))
            }
            Err(e) => {
                error!(error = %e, port, "failed to bind cloud-mode health endpoint");
                None
            }
        }
    } else {
        None
    };

    let mut orchestrator = Orchestrator::new(config, clock, calendar, gateway, executor, state_store, alert_sink)
        .with_health_state(http_state.clone());

    let outcome = orchestrator.run().await;

    if let Some(handle) = http_server {
        handle.abort();
    }

    match outcome {
        Ok(RunOutcome::CleanShutdown) => {
            info!("orchestrator drained cleanly");
            0
        }
        Ok(RunOutcome::Fatal) => 1,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "orchestrator aborted");
            1
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}
