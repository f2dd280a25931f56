//! lobbykit simulator
//!
//! Wires a host and a guest coordinator to one in-process loopback network
//! and walks a lobby through create, search, join and teardown, logging
//! every completion and session event.

mod scenario;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use scenario::ScenarioSettings;

#[derive(Parser, Debug)]
#[command(name = "lobbykit-sim")]
#[command(version, about = "lobbykit simulator - host/search/join over a loopback backend")]
struct Args {
    /// Directory holding `.lobbykit/settings.json`
    #[arg(long, env = "LOBBYKIT_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Name the host advertises
    #[arg(long, default_value = "lobbykit-sim", env = "LOBBYKIT_SESSION_NAME")]
    session_name: String,

    /// Public slots offered by the host
    #[arg(long, default_value_t = 4, env = "LOBBYKIT_PUBLIC_SLOTS")]
    public_slots: u32,

    /// Game type published as the first session user-data entry
    #[arg(long, default_value_t = 7)]
    game_type: i32,

    /// Seconds to wait for each step of the scenario
    #[arg(long, default_value_t = 5)]
    step_timeout: u64,

    /// Executor tick period in milliseconds (overrides config)
    #[arg(long, env = "LOBBYKIT_TICK_INTERVAL_MS")]
    tick_ms: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, env = "LOBBYKIT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, env = "LOBBYKIT_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = lobbykit_core::config::load_config(args.project_dir.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.log_json {
        config.logging.json = true;
    }
    if let Some(ms) = args.tick_ms {
        config.timeouts.tick_interval_ms = ms;
    }
    lobbykit_core::tracing_init::init_tracing("lobbykit_sim", &config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_tasks = config.matchmaking.max_tasks,
        max_sessions = config.matchmaking.max_sessions,
        tick_ms = config.timeouts.tick_interval_ms,
        "Starting lobbykit-sim"
    );

    let settings = ScenarioSettings {
        session_name: args.session_name,
        public_slots: args.public_slots,
        game_type: args.game_type,
        step_timeout: Duration::from_secs(args.step_timeout),
    };
    scenario::run(&config, &settings).await
}
