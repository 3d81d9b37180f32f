//! Runtime configuration.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `LATCHKEY_*` environment variables. The merged result is validated once
//! at load time; invalid values are rejected, never coerced.
//!
//! # Example
//!
//! ```
//! use latchkey_core::config::Config;
//!
//! let config = Config::from_toml_str(r#"
//!     badge_unlock_secs = 8
//!     remote_base_url = "https://sheets.example.org/door"
//! "#).unwrap();
//!
//! assert_eq!(config.badge_unlock_duration().as_secs(), 8);
//! assert_eq!(config.manual_unlock_duration().as_secs(), 3600);
//! ```

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "LATCHKEY_";

/// What to do with the relay when the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupRelayPolicy {
    /// Drive the relay de-energized so the door is physically locked.
    #[default]
    ForceLocked,
    /// Leave the output untouched until the first transition.
    LeaveAsIs,
}

impl FromStr for StartupRelayPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "force_locked" => Ok(Self::ForceLocked),
            "leave_as_is" => Ok(Self::LeaveAsIs),
            other => Err(Error::invalid_value(
                "startup_relay_policy",
                format!("expected force_locked or leave_as_is, got {other}"),
            )),
        }
    }
}

/// Door controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// GPIO pin driving the lock relay (BCM numbering).
    pub relay_pin: u8,
    pub unlock_button_pin: u8,
    pub lock_button_pin: u8,

    pub badge_unlock_secs: u64,
    pub manual_unlock_secs: u64,
    pub debounce_ms: u64,
    pub button_poll_ms: u64,
    pub reader_poll_timeout_ms: u64,
    pub scan_cooldown_ms: u64,
    pub reader_error_backoff_ms: u64,

    pub badge_refresh_secs: u64,
    pub manual_refresh_cooldown_secs: u64,
    /// Remote responses with fewer entries are treated as malformed.
    pub min_remote_badges: usize,

    pub remote_timeout_secs: u64,
    pub aggregate_timeout_secs: u64,

    pub watchdog_interval_secs: u64,

    pub log_dir: PathBuf,
    pub log_file_stem: String,
    pub log_retention_days: u32,
    pub recent_events: usize,

    pub fallback_file: PathBuf,
    pub heartbeat_file: PathBuf,

    /// Base URL of the remote authorization and log service.
    pub remote_base_url: Option<String>,
    pub remote_api_token: Option<String>,

    pub aggregate_enabled: bool,
    pub aggregate_dir: PathBuf,

    pub startup_relay_policy: StartupRelayPolicy,

    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_pin: DEFAULT_RELAY_PIN,
            unlock_button_pin: DEFAULT_UNLOCK_BUTTON_PIN,
            lock_button_pin: DEFAULT_LOCK_BUTTON_PIN,
            badge_unlock_secs: DEFAULT_BADGE_UNLOCK_SECS,
            manual_unlock_secs: DEFAULT_MANUAL_UNLOCK_SECS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            button_poll_ms: DEFAULT_BUTTON_POLL_MS,
            reader_poll_timeout_ms: DEFAULT_READER_POLL_TIMEOUT_MS,
            scan_cooldown_ms: DEFAULT_SCAN_COOLDOWN_MS,
            reader_error_backoff_ms: DEFAULT_READER_ERROR_BACKOFF_MS,
            badge_refresh_secs: DEFAULT_BADGE_REFRESH_SECS,
            manual_refresh_cooldown_secs: DEFAULT_MANUAL_REFRESH_COOLDOWN_SECS,
            min_remote_badges: DEFAULT_MIN_REMOTE_BADGES,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            aggregate_timeout_secs: DEFAULT_AGGREGATE_TIMEOUT_SECS,
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            log_dir: PathBuf::from("logs"),
            log_file_stem: "door_controller_action".to_string(),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            recent_events: DEFAULT_RECENT_EVENTS,
            fallback_file: PathBuf::from("data/authorized_badges.txt"),
            heartbeat_file: PathBuf::from("logs/door_controller_watchdog.txt"),
            remote_base_url: None,
            remote_api_token: None,
            aggregate_enabled: true,
            aggregate_dir: PathBuf::from("data/metrics"),
            startup_relay_policy: StartupRelayPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, if an environment
    /// override has an invalid value, or if the merged configuration fails
    /// [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LATCHKEY_<FIELD>` overrides using `lookup` to read variables.
    ///
    /// Taking a lookup function keeps tests away from the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_parsed(&get, "RELAY_PIN", &mut self.relay_pin)?;
        override_parsed(&get, "UNLOCK_BUTTON_PIN", &mut self.unlock_button_pin)?;
        override_parsed(&get, "LOCK_BUTTON_PIN", &mut self.lock_button_pin)?;
        override_parsed(&get, "BADGE_UNLOCK_SECS", &mut self.badge_unlock_secs)?;
        override_parsed(&get, "MANUAL_UNLOCK_SECS", &mut self.manual_unlock_secs)?;
        override_parsed(&get, "DEBOUNCE_MS", &mut self.debounce_ms)?;
        override_parsed(&get, "BUTTON_POLL_MS", &mut self.button_poll_ms)?;
        override_parsed(&get, "READER_POLL_TIMEOUT_MS", &mut self.reader_poll_timeout_ms)?;
        override_parsed(&get, "SCAN_COOLDOWN_MS", &mut self.scan_cooldown_ms)?;
        override_parsed(&get, "READER_ERROR_BACKOFF_MS", &mut self.reader_error_backoff_ms)?;
        override_parsed(&get, "BADGE_REFRESH_SECS", &mut self.badge_refresh_secs)?;
        override_parsed(
            &get,
            "MANUAL_REFRESH_COOLDOWN_SECS",
            &mut self.manual_refresh_cooldown_secs,
        )?;
        override_parsed(&get, "MIN_REMOTE_BADGES", &mut self.min_remote_badges)?;
        override_parsed(&get, "REMOTE_TIMEOUT_SECS", &mut self.remote_timeout_secs)?;
        override_parsed(&get, "AGGREGATE_TIMEOUT_SECS", &mut self.aggregate_timeout_secs)?;
        override_parsed(&get, "WATCHDOG_INTERVAL_SECS", &mut self.watchdog_interval_secs)?;
        override_parsed(&get, "LOG_DIR", &mut self.log_dir)?;
        override_parsed(&get, "LOG_FILE_STEM", &mut self.log_file_stem)?;
        override_parsed(&get, "LOG_RETENTION_DAYS", &mut self.log_retention_days)?;
        override_parsed(&get, "RECENT_EVENTS", &mut self.recent_events)?;
        override_parsed(&get, "FALLBACK_FILE", &mut self.fallback_file)?;
        override_parsed(&get, "HEARTBEAT_FILE", &mut self.heartbeat_file)?;
        override_parsed(&get, "AGGREGATE_ENABLED", &mut self.aggregate_enabled)?;
        override_parsed(&get, "AGGREGATE_DIR", &mut self.aggregate_dir)?;
        override_parsed(&get, "STARTUP_RELAY_POLICY", &mut self.startup_relay_policy)?;
        override_parsed(&get, "LOG_LEVEL", &mut self.log_level)?;

        if let Some(url) = get("REMOTE_BASE_URL") {
            self.remote_base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(token) = get("REMOTE_API_TOKEN") {
            self.remote_api_token = Some(token).filter(|t| !t.is_empty());
        }

        Ok(())
    }

    /// Check the configuration for values the runtime cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfigValue` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("badge_unlock_secs", self.badge_unlock_secs),
            ("manual_unlock_secs", self.manual_unlock_secs),
            ("button_poll_ms", self.button_poll_ms),
            ("reader_poll_timeout_ms", self.reader_poll_timeout_ms),
            ("badge_refresh_secs", self.badge_refresh_secs),
            ("remote_timeout_secs", self.remote_timeout_secs),
            ("aggregate_timeout_secs", self.aggregate_timeout_secs),
            ("watchdog_interval_secs", self.watchdog_interval_secs),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(Error::invalid_value(key, "must be greater than zero"));
            }
        }

        if self.log_retention_days == 0 {
            return Err(Error::invalid_value("log_retention_days", "must be at least 1"));
        }
        if self.recent_events == 0 {
            return Err(Error::invalid_value("recent_events", "must be at least 1"));
        }
        if self.min_remote_badges == 0 {
            return Err(Error::invalid_value("min_remote_badges", "must be at least 1"));
        }

        if self.relay_pin == self.unlock_button_pin
            || self.relay_pin == self.lock_button_pin
            || self.unlock_button_pin == self.lock_button_pin
        {
            return Err(Error::invalid_value(
                "relay_pin",
                "relay and button pins must all be distinct",
            ));
        }

        let paths = [
            ("log_dir", &self.log_dir),
            ("fallback_file", &self.fallback_file),
            ("heartbeat_file", &self.heartbeat_file),
            ("aggregate_dir", &self.aggregate_dir),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(Error::invalid_value(key, "path must not be empty"));
            }
        }

        if self.log_file_stem.trim().is_empty() || self.log_file_stem.contains('/') {
            return Err(Error::invalid_value(
                "log_file_stem",
                "must be a non-empty file name without separators",
            ));
        }

        if let Some(base) = &self.remote_base_url {
            let parsed = url::Url::parse(base)
                .map_err(|e| Error::invalid_value("remote_base_url", e.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::invalid_value(
                    "remote_base_url",
                    format!("unsupported scheme {}", parsed.scheme()),
                ));
            }
        }

        Ok(())
    }

    pub fn badge_unlock_duration(&self) -> Duration {
        Duration::from_secs(self.badge_unlock_secs)
    }

    pub fn manual_unlock_duration(&self) -> Duration {
        Duration::from_secs(self.manual_unlock_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn button_poll_interval(&self) -> Duration {
        Duration::from_millis(self.button_poll_ms)
    }

    pub fn reader_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_poll_timeout_ms)
    }

    pub fn scan_cooldown(&self) -> Duration {
        Duration::from_millis(self.scan_cooldown_ms)
    }

    pub fn reader_error_backoff(&self) -> Duration {
        Duration::from_millis(self.reader_error_backoff_ms)
    }

    pub fn badge_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.badge_refresh_secs)
    }

    pub fn manual_refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.manual_refresh_cooldown_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregate_timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    /// Set the badge dwell time in seconds.
    pub fn with_badge_unlock_secs(mut self, secs: u64) -> Self {
        self.badge_unlock_secs = secs;
        self
    }

    /// Set the manual unlock dwell time in seconds.
    pub fn with_manual_unlock_secs(mut self, secs: u64) -> Self {
        self.manual_unlock_secs = secs;
        self
    }

    /// Point every on-disk artifact under `root`.
    pub fn with_data_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.log_dir = root.join("logs");
        self.fallback_file = root.join("data").join("authorized_badges.txt");
        self.heartbeat_file = root.join("logs").join("door_controller_watchdog.txt");
        self.aggregate_dir = root.join("data").join("metrics");
        self
    }

    pub fn with_remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.remote_base_url = Some(url.into());
        self
    }

    pub fn with_aggregate_enabled(mut self, enabled: bool) -> Self {
        self.aggregate_enabled = enabled;
        self
    }

    pub fn with_min_remote_badges(mut self, min: usize) -> Self {
        self.min_remote_badges = min;
        self
    }

    pub fn with_startup_relay_policy(mut self, policy: StartupRelayPolicy) -> Self {
        self.startup_relay_policy = policy;
        self
    }
}

fn override_parsed<T, G>(get: &G, name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *target = raw.trim().parse().map_err(|e: T::Err| {
            Error::invalid_value(format!("{ENV_PREFIX}{name}"), e.to_string())
        })?;
    }
    Ok(())
}
