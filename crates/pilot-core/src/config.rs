//! Configuration parsing for the orchestrator.
//!
//! Uses a `key=value` file format with `#` comments and optional quotes.
//! Precedence: CLI flags > `--config` file > `~/.config/pilot/config` > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

/// Package managers probed for missing-tool installation, in priority order.
pub const DEFAULT_PACKAGE_MANAGERS: &[&str] = &["apt-get", "yum", "dnf", "pacman", "zypper", "brew"];

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Process launching
    pub shell: String,
    pub working_dir: Option<PathBuf>,
    pub terminate_grace_ms: u64,
    /// Bounded wait for trailing output once the process exited.
    pub drain_timeout_ms: u64,
    pub max_output_bytes: usize,

    // Retry policy
    pub max_attempts: u32,
    /// Local fixes (installs, escalation) allowed per step.
    pub max_local_fixes: u32,

    // Recovery hook
    pub auto_install: bool,
    pub escalation_prefix: String,
    pub package_managers: Vec<String>,

    // Event sink
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: None,
            terminate_grace_ms: 5000,
            drain_timeout_ms: 5000,
            max_output_bytes: 10 * 1024 * 1024,
            max_attempts: 3,
            max_local_fixes: 3,
            auto_install: true,
            escalation_prefix: "sudo ".to_string(),
            package_managers: DEFAULT_PACKAGE_MANAGERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            event_buffer: 1024,
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load the user config file if it exists, otherwise defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "shell" => self.shell = value.to_string(),
            "working_dir" => {
                self.working_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "terminate_grace_ms" => self.terminate_grace_ms = Self::parse_int(key, value)?,
            "drain_timeout_ms" => self.drain_timeout_ms = Self::parse_int(key, value)?,
            "max_output_bytes" => self.max_output_bytes = Self::parse_int(key, value)?,
            "max_attempts" => {
                let attempts: u32 = Self::parse_int(key, value)?;
                if attempts == 0 {
                    return Err(ConfigError::InvalidInt {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.max_attempts = attempts;
            }
            "max_local_fixes" => self.max_local_fixes = Self::parse_int(key, value)?,
            "auto_install" => self.auto_install = Self::parse_bool(key, value)?,
            "escalation_prefix" => {
                // Always separated from the command by one space.
                let prefix = value.trim_end();
                self.escalation_prefix = format!("{prefix} ");
            }
            "package_managers" => {
                self.package_managers = value.split_whitespace().map(ToString::to_string).collect();
            }
            "event_buffer" => {
                let buffer: usize = Self::parse_int(key, value)?;
                if buffer == 0 {
                    return Err(ConfigError::InvalidInt {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.event_buffer = buffer;
            }
            _ => {
                // Warn but don't fail for unknown keys.
                eprintln!("Warning: unknown config key: {key}");
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Resolve a relative working directory against a base path.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(ref dir) = self.working_dir {
            if dir.is_relative() {
                self.working_dir = Some(base.join(dir));
            }
        }
    }
}

/// `~/.config/pilot/config` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pilot").join("config"))
}
