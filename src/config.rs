//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`SHOPMATE_API_URL`, `SHOPMATE_WS_URL`,
//!    `SHOPMATE_API_TIMEOUT_SECS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./shopmate.toml in the current directory
//! 4. $XDG_CONFIG_HOME/shopmate/shopmate.toml (or ~/.config/shopmate/shopmate.toml)
//! 5. Built-in defaults

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/v1";
const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_API_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1200;
const DEFAULT_HISTORY_LIMIT: u32 = 60;

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub chat: ChatConfig,
    pub display: DisplayConfig,
}

/// Resolved HTTP gateway settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

/// Realtime channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub ws_url: String,
    /// Delay before a reconnect attempt after an unintentional drop.
    pub reconnect_delay_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Chat behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How many history records to request on load/resync.
    pub history_limit: u32,
    /// Ask the backend to stream assistant responses incrementally.
    pub stream: bool,
    /// Ask the backend to emit typing indicators while it works.
    pub typing: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            stream: true,
            typing: true,
        }
    }
}

/// Terminal display settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

/// Raw file shape; sections are optional and default independently.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api: ApiConfig,
    realtime: RealtimeConfig,
    chat: ChatConfig,
    display: DisplayConfig,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration, merging file contents with environment overrides.
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    let config_text = if let Some(p) = path_override {
        // Explicit path — fail if it doesn't exist.
        std::fs::read_to_string(p)?
    } else if let Ok(text) = std::fs::read_to_string("shopmate.toml") {
        text
    } else if let Some(dir) = config_root_dir() {
        let global = dir.join("shopmate").join("shopmate.toml");
        std::fs::read_to_string(global).unwrap_or_default()
    } else {
        String::new()
    };

    let parsed: FileConfig = toml::from_str(&config_text)?;
    let mut config = Config {
        api: parsed.api,
        realtime: parsed.realtime,
        chat: parsed.chat,
        display: parsed.display,
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment overrides through an injected lookup so tests can run
/// without mutating process state.
fn apply_env_overrides(
    config: &mut Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(url) = env("SHOPMATE_API_URL") {
        config.api.base_url = url;
    }
    if let Some(url) = env("SHOPMATE_WS_URL") {
        config.realtime.ws_url = url;
    }
    if let Some(raw) = env("SHOPMATE_API_TIMEOUT_SECS") {
        config.api.timeout_secs = raw.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "SHOPMATE_API_TIMEOUT_SECS must be a positive integer, got `{raw}`"
            ))
        })?;
    }
    Ok(())
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
    }
    if config.realtime.ws_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "realtime.ws_url must not be empty".into(),
        ));
    }
    if config.api.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "api.timeout_secs must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Resolve the user config root (`$XDG_CONFIG_HOME` or `~/.config`).
pub fn config_root_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .or_else(dirs::config_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let c = Config::default();
        assert_eq!(c.api.base_url, "http://localhost:8000/v1");
        assert_eq!(c.realtime.ws_url, "ws://localhost:8000/ws");
        assert_eq!(c.realtime.reconnect_delay_ms, 1200);
        assert_eq!(c.chat.history_limit, 60);
        assert!(c.chat.stream);
        assert!(c.display.color);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let parsed: FileConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://shop.example.com/v1"

            [chat]
            stream = false
            "#,
        )
        .unwrap();
        assert_eq!(parsed.api.base_url, "https://shop.example.com/v1");
        assert_eq!(parsed.api.timeout_secs, DEFAULT_API_TIMEOUT_SECS);
        assert!(!parsed.chat.stream);
        assert_eq!(parsed.realtime.reconnect_delay_ms, 1200);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |name| match name {
            "SHOPMATE_API_URL" => Some("https://env.example.com/v1".to_string()),
            "SHOPMATE_WS_URL" => Some("wss://env.example.com/ws".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.api.base_url, "https://env.example.com/v1");
        assert_eq!(config.realtime.ws_url, "wss://env.example.com/ws");
    }

    #[test]
    fn bad_timeout_env_is_rejected() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, |name| {
            (name == "SHOPMATE_API_TIMEOUT_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("SHOPMATE_API_TIMEOUT_SECS"));
    }

    #[test]
    fn empty_urls_are_rejected() {
        let mut config = Config::default();
        config.realtime.ws_url = "  ".into();
        assert!(validate(&config).is_err());
    }
}
