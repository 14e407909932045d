/// Configuration management for the orchestration engine
///
/// Environment-variable driven configuration with sensible defaults. All
/// variables are prefixed STEPWAY_. Engine timing knobs are in milliseconds
/// so tests can shrink the polling loops to millisecond scale.

use std::env;

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite database file
    pub data_dir: String,
    /// Database file name
    pub db_file: String,
}

impl DatabaseConfig {
    /// SQLite connection URL for the workflow definition database.
    pub fn url(&self) -> String {
        format!("sqlite:{}/{}", self.data_dir, self.db_file)
    }
}

/// Engine timing and behavior knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause polling: initial interval
    pub pause_poll_initial_ms: u64,
    /// Pause polling: per-iteration increment
    pub pause_poll_increment_ms: u64,
    /// Pause polling: interval ceiling
    pub pause_poll_max_ms: u64,
    /// Pause polling: give up and abandon the branch after this long
    pub pause_horizon_ms: u64,
    /// Admission polling: initial interval
    pub admission_poll_initial_ms: u64,
    /// Admission polling: per-iteration increment
    pub admission_poll_increment_ms: u64,
    /// Admission polling: interval ceiling
    pub admission_poll_max_ms: u64,
    /// Admission polling: give up after this long
    pub admission_horizon_ms: u64,
    /// Admission polling: re-read group capacity every Nth iteration
    pub capacity_recheck_every: u32,
    /// When true, a Stopped run state abandons waiting branches instead of
    /// letting them proceed
    pub stop_abandons_branch: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::var("STEPWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("STEPWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: env::var("STEPWAY_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            db_file: env::var("STEPWAY_DB_FILE").unwrap_or_else(|_| "stepway.db".to_string()),
        }
    }
}

const SEVEN_DAYS_MS: u64 = 7 * 24 * 60 * 60 * 1000;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pause_poll_initial_ms: env_ms("STEPWAY_PAUSE_POLL_INITIAL_MS", 15_000),
            pause_poll_increment_ms: env_ms("STEPWAY_PAUSE_POLL_INCREMENT_MS", 1_000),
            pause_poll_max_ms: env_ms("STEPWAY_PAUSE_POLL_MAX_MS", 300_000),
            pause_horizon_ms: env_ms("STEPWAY_PAUSE_HORIZON_MS", SEVEN_DAYS_MS),
            admission_poll_initial_ms: env_ms("STEPWAY_ADMISSION_POLL_INITIAL_MS", 10_000),
            admission_poll_increment_ms: env_ms("STEPWAY_ADMISSION_POLL_INCREMENT_MS", 1_000),
            admission_poll_max_ms: env_ms("STEPWAY_ADMISSION_POLL_MAX_MS", 60_000),
            admission_horizon_ms: env_ms("STEPWAY_ADMISSION_HORIZON_MS", SEVEN_DAYS_MS),
            capacity_recheck_every: env::var("STEPWAY_CAPACITY_RECHECK_EVERY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5)
                .max(1),
            stop_abandons_branch: env::var("STEPWAY_STOP_ABANDONS_BRANCH")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }
}

fn env_ms(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
