//! Configuration management for the shell.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Custom URL scheme the shell registers with the OS.
pub const URL_SCHEME: &str = "appscheme";

/// Human-readable application name.
pub const APP_NAME: &str = "Lumen";

/// Reverse-DNS application identifier (bundle id, registry key, desktop file id).
pub const APP_ID: &str = "com.lumen.desktop";

/// Default identity-provider URL (can be overridden at compile time via LUMEN_SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("LUMEN_SUPABASE_URL") {
    Some(url) => url,
    None => "https://lumen-dev.supabase.co",
};

/// Default identity-provider publishable key (can be overridden at compile time
/// via LUMEN_SUPABASE_PUBLISHABLE_KEY env var). Public, safe to hand to the UI.
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str =
    match option_env!("LUMEN_SUPABASE_PUBLISHABLE_KEY") {
        Some(key) => key,
        None => "lumen-dev-publishable-key",
    };

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main shell configuration.
///
/// Holds only values that are safe to expose to the UI process. The
/// service-level identity secret is deliberately not part of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Identity-provider project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Identity-provider publishable API key.
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Port of the local application backend, if one must be up before the window loads.
    #[serde(default)]
    pub backend_port: Option<u16>,
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_publishable_key: DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string(),
            backend_port: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Empty values are ignored; an unparseable `LUMEN_BACKEND_PORT` is
    /// logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = get("LUMEN_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = get("LUMEN_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = get("LUMEN_SUPABASE_PUBLISHABLE_KEY") {
            self.supabase_publishable_key = key;
        }
        if let Some(raw) = get("LUMEN_BACKEND_PORT") {
            match raw.parse::<u16>() {
                Ok(port) if port != 0 => self.backend_port = Some(port),
                _ => tracing::warn!(value = %raw, "Ignoring invalid LUMEN_BACKEND_PORT"),
            }
        }
    }

    /// Get the identity-provider URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Health endpoint of the local backend, when a port is configured.
    pub fn backend_health_url(&self) -> Option<String> {
        self.backend_port
            .map(|port| format!("http://127.0.0.1:{}/api/health", port))
    }
}
