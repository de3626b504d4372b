use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::history::DEFAULT_HISTORY_CAPACITY;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub toolpath: ToolpathSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_url: default_stream_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportSettings {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
    /// Samples fetched from the backend to seed the charts after connecting
    #[serde(default)]
    pub seed_limit: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            seed_limit: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LineSourceKind {
    #[default]
    Filesystem,
    /// In-memory logs that start empty and are filled through
    /// `POST /console/logs/{trace|exception}`, for running away from the machine PC
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Log roots in priority order; each holds `Trace/` and `Exception/`
    #[serde(default = "default_log_roots")]
    pub log_roots: Vec<PathBuf>,
    #[serde(default)]
    pub line_source: LineSourceKind,
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

impl SessionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            log_roots: default_log_roots(),
            line_source: LineSourceKind::default(),
            auto_save: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolpathSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Local NC program to use instead of the backend's parsed path
    #[serde(default)]
    pub nc_file: Option<PathBuf>,
}

impl ToolpathSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for ToolpathSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_poll_interval_ms(),
            nc_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_stream_url() -> String {
    "ws://127.0.0.1:8001/ws".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_log_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(r"C:\DED\Log"), PathBuf::from(r"D:\DED\Log")]
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:8090".to_string()
}

/// Load `config/console.toml` (optional) overlaid with `DED_CONSOLE__*`
/// environment variables, e.g. `DED_CONSOLE__BACKEND__BASE_URL`.
pub fn load_console_config() -> anyhow::Result<ConsoleConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/console").required(false))
        .add_source(config::Environment::with_prefix("DED_CONSOLE").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_console_constants() {
        let config = ConsoleConfig::default();

        assert_eq!(config.backend.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.transport.reconnect_delay_ms, 3_000);
        assert_eq!(config.transport.max_reconnect_attempts, 5);
        assert_eq!(config.history.capacity, 500);
        assert_eq!(config.session.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.session.log_roots.len(), 2);
        assert_eq!(config.session.line_source, LineSourceKind::Filesystem);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [backend]
            base_url = "http://10.0.0.5:8001"

            [session]
            line_source = "memory"
            log_roots = ["/var/log/ded"]
        "#;
        let config: ConsoleConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.backend.base_url, "http://10.0.0.5:8001");
        assert_eq!(config.backend.stream_url, "ws://127.0.0.1:8001/ws");
        assert_eq!(config.session.line_source, LineSourceKind::Memory);
        assert_eq!(config.session.log_roots, vec![PathBuf::from("/var/log/ded")]);
        assert!(config.session.auto_save);
        assert_eq!(config.server.bind, "127.0.0.1:8090");
    }
}
