// Configuration: the client settings passed into `PrintClient`, and the
// small preferences file kept between runs.

use crate::error::PreferencesError;
use crate::options::{ColorMode, Sides};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_SERVER: &str = "https://print.lib.utexas.edu/PharosAPI";
pub const SERVER_ENV: &str = "UTPRINT_SERVER";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Settings for one `PrintClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    pub poll_interval: Duration,
    /// `None` waits for as long as the job takes.
    pub poll_timeout: Option<Duration>,
    /// `None` lets requests block for as long as the server does.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_SERVER.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: Some(DEFAULT_POLL_TIMEOUT),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Defaults, with the server taken from `UTPRINT_SERVER` when it is set.
    pub fn from_env() -> Self {
        let mut config = ClientConfig::default();
        if let Ok(server) = std::env::var(SERVER_ENV) {
            if !server.trim().is_empty() {
                config = config.with_server(&server);
            }
        }
        config
    }

    pub fn with_server(mut self, server: &str) -> Self {
        self.base_url = server.trim().trim_end_matches('/').to_string();
        self
    }
}

const COLOR_KEY_FULL: &str = "full";
const COLOR_KEY_MONO: &str = "mono";

/// Defaults remembered between runs plus the saved session token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Preferences {
    pub color: ColorMode,
    pub sides: Sides,
    pub token: Option<String>,
}

/// On-disk layout. Values are read loosely so one bad entry only resets
/// that entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(rename = "PrintDefaults", default)]
    print_defaults: PrintDefaultsSection,
    #[serde(rename = "PersistentAuth", default)]
    persistent_auth: PersistentAuthSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PrintDefaultsSection {
    #[serde(rename = "Color", skip_serializing_if = "Option::is_none")]
    color: Option<toml::Value>,
    #[serde(rename = "Sides", skip_serializing_if = "Option::is_none")]
    sides: Option<toml::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistentAuthSection {
    #[serde(rename = "Cookie", skip_serializing_if = "Option::is_none")]
    cookie: Option<toml::Value>,
}

impl Preferences {
    /// `<config dir>/utprint/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("utprint")
            .join("config.toml")
    }

    /// Read preferences, falling back to defaults for anything missing or
    /// unreadable.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No preferences file, using defaults");
                return Preferences::default();
            }
        };
        match toml::from_str::<PreferencesFile>(&content) {
            Ok(file) => {
                debug!(path = %path.display(), "Loaded preferences");
                Preferences::from_file(file)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed preferences file, using defaults");
                Preferences::default()
            }
        }
    }

    fn from_file(file: PreferencesFile) -> Self {
        let color = match file.print_defaults.color.as_ref().and_then(|v| v.as_str()) {
            Some(COLOR_KEY_FULL) => ColorMode::Full,
            Some(COLOR_KEY_MONO) => ColorMode::Mono,
            _ => ColorMode::default(),
        };
        let sides = file
            .print_defaults
            .sides
            .as_ref()
            .and_then(|v| match v {
                toml::Value::Integer(n) => Some(*n),
                toml::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .and_then(Sides::from_count)
            .unwrap_or_default();
        let token = file
            .persistent_auth
            .cookie
            .as_ref()
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Preferences { color, sides, token }
    }

    /// Write preferences, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), PreferencesError> {
        let file = PreferencesFile {
            print_defaults: PrintDefaultsSection {
                color: Some(toml::Value::String(
                    match self.color {
                        ColorMode::Full => COLOR_KEY_FULL,
                        ColorMode::Mono => COLOR_KEY_MONO,
                    }
                    .to_string(),
                )),
                sides: Some(toml::Value::Integer(i64::from(self.sides.count()))),
            },
            persistent_auth: PersistentAuthSection {
                cookie: self.token.clone().map(toml::Value::String),
            },
        };
        let content = toml::to_string(&file)?;

        let io_err = |source: std::io::Error| PreferencesError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;

        info!(path = %path.display(), "Saved preferences");
        Ok(())
    }
}
