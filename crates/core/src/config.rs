//! Client configuration.
//!
//! Defaults mirror the admin application; `from_env` overlays `NOVA_*`
//! environment variables on top of them.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Appended to page titles (`"<title> - <app_name>"`).
    pub app_name: String,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub routes: RouteConfig,
    /// Validate a restored token against `GET /auth/user` during start-up.
    pub validate_on_start: bool,
    /// Backend path serving the menu tree. `None` keeps the built-in menu.
    pub menu_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Append a `_t=<millis>` query parameter to every request.
    pub cache_bust: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key prefix for persisted entries (`<prefix>token`, `<prefix>user_info`).
    pub prefix: String,
    /// Directory for file-backed storage. `None` resolves to the OS data dir.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub login_path: String,
    pub home_path: String,
    pub forbidden_path: String,
    /// Paths that need no session when a route leaves `requires_auth` unset.
    pub public_paths: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_name: "Nova Admin".to_string(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            routes: RouteConfig::default(),
            validate_on_start: true,
            menu_endpoint: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api".to_string(),
            timeout_ms: 10_000,
            cache_bust: false,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: "nova_admin_".to_string(),
            dir: None,
        }
    }
}

impl StorageConfig {
    pub fn token_key(&self) -> String {
        format!("{}token", self.prefix)
    }

    pub fn profile_key(&self) -> String {
        format!("{}user_info", self.prefix)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
            forbidden_path: "/403".to_string(),
            public_paths: vec![
                "/login".to_string(),
                "/register".to_string(),
                "/forgot-password".to_string(),
            ],
        }
    }
}

impl RouteConfig {
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }
}

impl ClientConfig {
    /// Defaults overlaid with `NOVA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup.
    ///
    /// Unparsable values are logged and skipped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("NOVA_APP_NAME") {
            config.app_name = name;
        }
        if let Some(url) = lookup("NOVA_API_BASE_URL") {
            config.api.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("NOVA_API_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.api.timeout_ms = ms,
                Err(e) => tracing::warn!("ignoring NOVA_API_TIMEOUT_MS={raw:?}: {e}"),
            }
        }
        if let Some(raw) = lookup("NOVA_API_CACHE_BUST") {
            match parse_flag(&raw) {
                Some(flag) => config.api.cache_bust = flag,
                None => tracing::warn!("ignoring NOVA_API_CACHE_BUST={raw:?}: expected a boolean"),
            }
        }
        if let Some(dir) = lookup("NOVA_STORAGE_DIR") {
            config.storage.dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("NOVA_VALIDATE_ON_START") {
            match parse_flag(&raw) {
                Some(flag) => config.validate_on_start = flag,
                None => {
                    tracing::warn!("ignoring NOVA_VALIDATE_ON_START={raw:?}: expected a boolean")
                }
            }
        }

        if let Some(path) = lookup("NOVA_MENU_ENDPOINT") {
            config.menu_endpoint = Some(path).filter(|p| !p.trim().is_empty());
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
