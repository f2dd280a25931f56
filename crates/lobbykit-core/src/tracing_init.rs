//! Tracing subscriber setup shared by the engine's hosts.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the env-filter for `target`.
///
/// `RUST_LOG` wins when set; otherwise `target=<level>` from the config is used.
pub fn env_filter(target: &str, logging: &LoggingConfig) -> EnvFilter {
    let level = &logging.level;
    std::env::var("RUST_LOG").map_or_else(
        |_| EnvFilter::new(format!("{target}={level},lobbykit_matchmaking={level}")),
        EnvFilter::new,
    )
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed (e.g. by a test harness).
pub fn init_tracing(target: &str, logging: &LoggingConfig) -> bool {
    let filter = env_filter(target, logging);
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(logging.show_target))
            .try_init()
            .is_ok()
    }
}
