//! Configuration resolution for lobbykit.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`~/.config/lobbykit/settings.json`)
//! 3. Project config (`.lobbykit/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Complete lobbykit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub matchmaking: MatchmakingConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pool capacities and queue sizing for one coordinator instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Task slots shared by every operation kind.
    pub max_tasks: usize,
    /// Session slots (hosted and joined together).
    pub max_sessions: usize,
    /// Remote connection slots per session.
    pub max_remote_connections: usize,
    /// Entries allowed in a session's user-data list.
    pub max_session_user_data: usize,
    /// Bounded capacity of each cross-thread queue.
    pub queue_capacity: usize,
    /// Capacity of the session event broadcast channel.
    pub event_capacity: usize,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            max_tasks: 8,
            max_sessions: 4,
            max_remote_connections: 32,
            max_session_user_data: 64,
            queue_capacity: 256,
            event_capacity: 64,
        }
    }
}

/// Per-kind timeout thresholds and the executor tick period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub session_search_ms: u64,
    pub session_join_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            session_search_ms: 10_000,
            session_join_ms: 10_000,
            tick_interval_ms: 16,
        }
    }
}

impl TimeoutConfig {
    pub const fn session_search(&self) -> Duration {
        Duration::from_millis(self.session_search_ms)
    }

    pub const fn session_join(&self) -> Duration {
        Duration::from_millis(self.session_join_ms)
    }

    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            show_target: true,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
        debug!(path = %global_path.display(), "Applied global settings");
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".lobbykit").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
            debug!(path = %project_path.display(), "Applied project settings");
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lobbykit").join("settings.json"))
}

/// Read and parse a single settings file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    let defaults = Config::default();

    // Only fields the overlay actually changed from the defaults replace the base.
    let mm = overlay.matchmaking;
    if mm.max_tasks != defaults.matchmaking.max_tasks {
        base.matchmaking.max_tasks = mm.max_tasks;
    }
    if mm.max_sessions != defaults.matchmaking.max_sessions {
        base.matchmaking.max_sessions = mm.max_sessions;
    }
    if mm.max_remote_connections != defaults.matchmaking.max_remote_connections {
        base.matchmaking.max_remote_connections = mm.max_remote_connections;
    }
    if mm.max_session_user_data != defaults.matchmaking.max_session_user_data {
        base.matchmaking.max_session_user_data = mm.max_session_user_data;
    }
    if mm.queue_capacity != defaults.matchmaking.queue_capacity {
        base.matchmaking.queue_capacity = mm.queue_capacity;
    }
    if mm.event_capacity != defaults.matchmaking.event_capacity {
        base.matchmaking.event_capacity = mm.event_capacity;
    }

    if overlay.timeouts.session_search_ms != defaults.timeouts.session_search_ms {
        base.timeouts.session_search_ms = overlay.timeouts.session_search_ms;
    }
    if overlay.timeouts.session_join_ms != defaults.timeouts.session_join_ms {
        base.timeouts.session_join_ms = overlay.timeouts.session_join_ms;
    }
    if overlay.timeouts.tick_interval_ms != defaults.timeouts.tick_interval_ms {
        base.timeouts.tick_interval_ms = overlay.timeouts.tick_interval_ms;
    }

    if overlay.logging != defaults.logging {
        base.logging = overlay.logging;
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
        var(key).and_then(|v| v.parse().ok())
    }

    if let Some(n) = parsed(&var, "LOBBYKIT_MAX_TASKS") {
        config.matchmaking.max_tasks = n;
    }
    if let Some(n) = parsed(&var, "LOBBYKIT_MAX_SESSIONS") {
        config.matchmaking.max_sessions = n;
    }
    if let Some(n) = parsed(&var, "LOBBYKIT_MAX_REMOTE_CONNECTIONS") {
        config.matchmaking.max_remote_connections = n;
    }
    if let Some(n) = parsed(&var, "LOBBYKIT_QUEUE_CAPACITY") {
        config.matchmaking.queue_capacity = n;
    }
    if let Some(ms) = parsed(&var, "LOBBYKIT_SEARCH_TIMEOUT_MS") {
        config.timeouts.session_search_ms = ms;
    }
    if let Some(ms) = parsed(&var, "LOBBYKIT_JOIN_TIMEOUT_MS") {
        config.timeouts.session_join_ms = ms;
    }
    if let Some(ms) = parsed(&var, "LOBBYKIT_TICK_INTERVAL_MS") {
        config.timeouts.tick_interval_ms = ms;
    }
    if let Some(level) = var("LOBBYKIT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = parsed(&var, "LOBBYKIT_LOG_JSON") {
        config.logging.json = json;
    }
}

/// Reject capacities a coordinator cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    let mm = &config.matchmaking;
    if mm.max_tasks == 0 || mm.max_sessions == 0 {
        return Err(Error::Config(
            "max_tasks and max_sessions must be at least 1".to_string(),
        ));
    }
    if mm.queue_capacity == 0 || mm.event_capacity == 0 {
        return Err(Error::Config(
            "queue_capacity and event_capacity must be at least 1".to_string(),
        ));
    }
    Ok(())
}
