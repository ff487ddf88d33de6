//! Menu configuration loading.
//!
//! Every field has a default, so a missing file (or a partial one) is valid.
//! A file that exists but cannot be read or parsed is an error: silently
//! ignoring it would hide a typo in a TTL behind the defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MenuError, Result};

const CONFIG_DIR: &str = "admin-menu";
const CONFIG_FILE: &str = "menu.toml";

/// Upper bounds for the duration fields. Larger values would overflow the
/// clock arithmetic the cache and toggle cooldown rely on.
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;
pub const MAX_TOGGLE_COOLDOWN_MS: u64 = 10_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_toggle_cooldown_ms")]
    pub toggle_cooldown_ms: u64,
    #[serde(default)]
    pub home: HomeRoute,
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            toggle_cooldown_ms: default_toggle_cooldown_ms(),
            home: HomeRoute::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

impl MenuConfig {
    // The accessors clamp so a config built in code cannot overflow either.
    pub fn cache_ttl(&self) -> Duration {
        Duration::seconds(self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64)
    }

    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms.min(MAX_SETTLE_DELAY_MS))
    }

    pub fn toggle_cooldown(&self) -> Duration {
        Duration::milliseconds(self.toggle_cooldown_ms.min(MAX_TOGGLE_COOLDOWN_MS) as i64)
    }

    /// Rejects duration fields above their bounds, naming the first offender.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let fields = [
            ("cache_ttl_secs", self.cache_ttl_secs, MAX_CACHE_TTL_SECS),
            ("settle_delay_ms", self.settle_delay_ms, MAX_SETTLE_DELAY_MS),
            ("toggle_cooldown_ms", self.toggle_cooldown_ms, MAX_TOGGLE_COOLDOWN_MS),
            ("endpoint.timeout_ms", self.endpoint.timeout_ms, MAX_TIMEOUT_MS),
        ];
        for (name, value, max) in fields {
            if value > max {
                return Err(format!("{} = {} exceeds the maximum of {}", name, value, max));
            }
        }
        Ok(())
    }
}

/// The single location treated as "home".
///
/// Several backend entries may point at the home path; only the designated
/// node is ever highlighted for it. With no slug configured, the first node
/// in tree order carrying the path is designated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeRoute {
    #[serde(default = "default_home_path")]
    pub path: String,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Default for HomeRoute {
    fn default() -> Self {
        Self {
            path: default_home_path(),
            slug: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms.min(MAX_TIMEOUT_MS))
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_settle_delay_ms() -> u64 {
    800
}

fn default_toggle_cooldown_ms() -> u64 {
    200
}

fn default_home_path() -> String {
    "/dashboard".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Returns `~/.config/admin-menu/menu.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| MenuError::Io {
        context: "resolving config path".to_string(),
        message: "Home directory not found".to_string(),
    })?;
    Ok(home.join(".config").join(CONFIG_DIR).join(CONFIG_FILE))
}

pub fn load_menu_config(path: Option<PathBuf>) -> Result<MenuConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(MenuConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| MenuError::Io {
        context: format!("reading {}", config_path.display()),
        message: err.to_string(),
    })?;
    let config =
        toml::from_str::<MenuConfig>(&content).map_err(|err| MenuError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;
    config
        .validate()
        .map_err(|details| MenuError::ConfigMalformed {
            path: config_path,
            details,
        })?;
    Ok(config)
}
