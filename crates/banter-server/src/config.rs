//! Server configuration loading from file and environment variables.

use banter_pipeline::PipelineConfig;
use banter_voice::{AgentConfig, SttConfig, TtsConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reply pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Speech-to-text adapter settings.
    #[serde(default)]
    pub stt: SttConfig,

    /// Text-to-speech adapter settings.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Reply backend settings.
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "banter_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Reply pipeline tunables, converted into [`PipelineConfig`] at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Queued turns before submissions are rejected with 503.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Additional agent attempts after the first failure.
    #[serde(default = "default_agent_retries")]
    pub agent_retries: u32,

    /// Pause between agent attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Whole-turn watchdog budget, in seconds.
    #[serde(default = "default_turn_budget_secs")]
    pub turn_budget_secs: u64,

    /// Text committed when the agent call fails outright.
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
}

impl From<PipelineSettings> for PipelineConfig {
    fn from(s: PipelineSettings) -> Self {
        Self {
            queue_capacity: s.queue_capacity,
            agent_retries: s.agent_retries,
            retry_delay: Duration::from_millis(s.retry_delay_ms),
            turn_budget: Duration::from_secs(s.turn_budget_secs),
            fallback_text: s.fallback_text,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "banter.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_capacity() -> usize {
    32
}

fn default_agent_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_turn_budget_secs() -> u64 {
    120
}

fn default_fallback_text() -> String {
    "Sorry, I couldn't come up with a reply just now.".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            agent_retries: default_agent_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            turn_budget_secs: default_turn_budget_secs(),
            fallback_text: default_fallback_text(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `BANTER_HOST` overrides `server.host`
/// - `BANTER_PORT` overrides `server.port`
/// - `BANTER_DB_PATH` overrides `database.path`
/// - `BANTER_LOG_LEVEL` overrides `logging.level`
/// - `BANTER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `BANTER_AGENT_URL` overrides `agent.url`
/// - `BANTER_AGENT_TOKEN` overrides `agent.api_token`
/// - `BANTER_AUDIO_DIR` overrides `tts.audio_dir`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("BANTER_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("BANTER_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("BANTER_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("BANTER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("BANTER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(url) = std::env::var("BANTER_AGENT_URL") {
        config.agent.url = url;
    }
    if let Ok(token) = std::env::var("BANTER_AGENT_TOKEN") {
        config.agent.api_token = token;
    }
    if let Ok(dir) = std::env::var("BANTER_AUDIO_DIR") {
        config.tts.audio_dir = dir;
    }

    Ok(config)
}
