//! Application configuration.
//!
//! One TOML file shared by the controller and the enforcer so both agree
//! on the session store path and the rule limits.

use crate::error::{AppError, AppResult};
use crate::news::NewsEvent;
use guard_bridge::{BridgeConfig, StoreConfig};
use guard_executor::{ActuatorConfig, SizingConfig};
use guard_rules::RulesConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Controller loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Enforcer heartbeat older than this raises an operator alert while a
    /// session is active.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/daily_history.jsonl")
}

fn default_heartbeat_timeout_secs() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            history_path: default_history_path(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

/// Enforcer loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("data/journal")
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            journal_dir: default_journal_dir(),
        }
    }
}

/// Trading terminal executable managed by the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// No executable: the controller does not manage the terminal.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Scheduled high-impact news.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// Lock window on each side of an event.
    #[serde(default = "default_news_buffer_minutes")]
    pub buffer_minutes: u32,
    #[serde(default)]
    pub events: Vec<NewsEvent>,
}

fn default_news_buffer_minutes() -> u32 {
    30
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: default_news_buffer_minutes(),
            events: Vec::new(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub enforcer: EnforcerConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Rule limits are not validated here: the enforcer must still start
    /// (locked) with an invalid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Config path: CLI flag, then `GUARD_CONFIG`, then `config/default.toml`.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var("GUARD_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::Usd;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.store.path, PathBuf::from("data/session.json"));
        assert_eq!(config.bridge.read_interval_ms, 2000);
        assert_eq!(config.actuator.max_attempts, 3);
        assert_eq!(config.news.buffer_minutes, 30);
        assert!(config.terminal.executable.is_none());
        assert_eq!(config.sizing.lot_step, guard_core::Lots::new(dec!(0.01)));
        config.rules.validate().unwrap();
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [store]
            path = "/tmp/guard/session.json"

            [rules.limits]
            max_loss_per_trade = "8.5"

            [sizing]
            value_per_point = "10"

            [terminal]
            executable = "/opt/mt5/terminal64.exe"
            args = ["/portable"]

            [[news.events]]
            at = "2026-03-06T13:30:00Z"
            title = "US Non-Farm Payrolls"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/guard/session.json"));
        assert_eq!(config.store.lock_retries, 20);
        assert_eq!(config.rules.limits.max_loss_per_trade, Usd::new(dec!(8.5)));
        assert_eq!(config.terminal.args, vec!["/portable".to_string()]);
        assert_eq!(config.news.events.len(), 1);
        assert_eq!(config.sizing.value_per_point, Usd::new(dec!(10)));
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        config.rules.validate().unwrap();
        assert_eq!(config.rules.limits.max_daily_loss, Usd::new(dec!(24)));
        assert_eq!(config.rules.schedule.daily_break.duration_minutes, 30);
        assert_eq!(
            config.rules.loss_break,
            guard_rules::LossBreakPolicy::Break { minutes: 60 }
        );
    }

    #[test]
    fn test_parse_error_is_config_error() {
        assert!(matches!(
            AppConfig::from_toml("[rules"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_cli_path_wins() {
        assert_eq!(
            AppConfig::resolve_path(Some("custom.toml".to_string())),
            "custom.toml"
        );
    }
}
