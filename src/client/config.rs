// Configuration module for the live quiz client

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::color::{parse_hex_color, Rgb};
use crate::core::constants::{
    DEFAULT_BAR_WIDTH, DEFAULT_FALLBACK_GRACE_MS, DEFAULT_FRAME_INTERVAL_MS,
    DEFAULT_MAX_RECONNECT_DELAY_SECS, DEFAULT_PING_TIMEOUT_SECS,
};
use crate::core::countdown::{CountdownThresholds, Urgency};
use crate::core::session::EngineSettings;

// =============================================================================
// CONFIGURATION STRUCTURES
// =============================================================================

/// Quiz server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Server base URL (ws://, wss://, http:// or https://)
    #[serde(default)]
    pub url: String,
    /// Quiz session to join
    #[serde(default)]
    pub session_id: String,
    /// Name shown to other participants
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Reconnect backoff ceiling in seconds
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
    /// Drop the connection after this long without a server ping
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

fn default_auto_reconnect() -> bool {
    true
}
fn default_max_reconnect_delay_secs() -> u64 {
    DEFAULT_MAX_RECONNECT_DELAY_SECS
}
fn default_ping_timeout_secs() -> u64 {
    DEFAULT_PING_TIMEOUT_SECS
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            session_id: String::new(),
            display_name: String::new(),
            auto_reconnect: default_auto_reconnect(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

impl ServerSettings {
    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay_secs.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs.max(1))
    }
}

/// Session engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grace window after the deadline before locking locally
    #[serde(default = "default_fallback_grace_ms")]
    pub fallback_grace_ms: u64,
    /// Render-loop cadence in milliseconds
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_fallback_grace_ms() -> u64 {
    DEFAULT_FALLBACK_GRACE_MS
}
fn default_frame_interval_ms() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_grace_ms: default_fallback_grace_ms(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            fallback_grace_ms: self.fallback_grace_ms,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

/// Countdown display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownSettings {
    /// Bar width in cells
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
    /// Remaining fraction at or below which the bar turns to warning
    #[serde(default = "default_warning_fraction")]
    pub warning_fraction: f64,
    /// Remaining fraction at or below which the bar turns critical
    #[serde(default = "default_critical_fraction")]
    pub critical_fraction: f64,
    /// Colors as hex strings "#RRGGBB"
    #[serde(default = "default_calm_color")]
    pub calm_color: String,
    #[serde(default = "default_warning_color")]
    pub warning_color: String,
    #[serde(default = "default_critical_color")]
    pub critical_color: String,
    #[serde(default = "default_expired_color")]
    pub expired_color: String,
}

fn default_bar_width() -> usize {
    DEFAULT_BAR_WIDTH
}
fn default_warning_fraction() -> f64 {
    0.5
}
fn default_critical_fraction() -> f64 {
    0.2
}
fn default_calm_color() -> String {
    "#80FF80".to_string()
}
fn default_warning_color() -> String {
    "#FFB347".to_string()
}
fn default_critical_color() -> String {
    "#FF5050".to_string()
}
fn default_expired_color() -> String {
    "#808080".to_string()
}

impl Default for CountdownSettings {
    fn default() -> Self {
        Self {
            bar_width: default_bar_width(),
            warning_fraction: default_warning_fraction(),
            critical_fraction: default_critical_fraction(),
            calm_color: default_calm_color(),
            warning_color: default_warning_color(),
            critical_color: default_critical_color(),
            expired_color: default_expired_color(),
        }
    }
}

impl CountdownSettings {
    pub fn thresholds(&self) -> CountdownThresholds {
        CountdownThresholds {
            warning_fraction: self.warning_fraction,
            critical_fraction: self.critical_fraction,
        }
    }

    pub fn color_for(&self, urgency: Urgency) -> Rgb {
        let hex = match urgency {
            Urgency::Calm => &self.calm_color,
            Urgency::Warning => &self.warning_color,
            Urgency::Critical => &self.critical_color,
            Urgency::Expired => &self.expired_color,
        };
        parse_hex_color(hex)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSettings {
    /// Mirror logs to stderr
    #[serde(default)]
    pub console: bool,
    /// Log file path (relative to the config file or absolute). Empty = no file logging.
    #[serde(default)]
    pub log_file: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub countdown: CountdownSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

// =============================================================================
// CONFIG LOADING
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: missing {0}")]
    Missing(&'static str),
}

impl Config {
    pub const CONFIG_FILENAME: &'static str = "live_quiz.toml";

    /// Default config location: next to the executable, else the working directory
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(Self::CONFIG_FILENAME)))
            .unwrap_or_else(|| PathBuf::from(Self::CONFIG_FILENAME))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a file that must exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "[CONFIG] Loaded config");
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "[CONFIG] No config found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply_overrides(&mut self, session_id: Option<String>, display_name: Option<String>) {
        if let Some(session_id) = session_id.filter(|s| !s.trim().is_empty()) {
            self.server.session_id = session_id;
        }
        if let Some(display_name) = display_name.filter(|s| !s.trim().is_empty()) {
            self.server.display_name = display_name;
        }
    }

    /// Check that everything needed to join a session is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::Missing("server.url"));
        }
        if self.server.session_id.trim().is_empty() {
            return Err(ConfigError::Missing("server.session_id"));
        }
        if self.server.display_name.trim().is_empty() {
            return Err(ConfigError::Missing("server.display_name"));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Resolve the log file path against `base_dir`; `None` when file logging is off
    pub fn log_file_path(&self, base_dir: &Path) -> Option<PathBuf> {
        let log_file = self.logging.log_file.trim();
        if log_file.is_empty() {
            return None;
        }
        let path = Path::new(log_file);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(base_dir.join(path))
        }
    }
}
