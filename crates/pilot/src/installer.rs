//! Missing-tool installation through the host package manager.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pilot_core::Config;
use regex::Regex;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("no supported package manager found")]
    NoPackageManager,
    #[error("unsupported package manager: {0}")]
    UnsupportedManager(String),
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },
}

pub type Result<T> = std::result::Result<T, InstallerError>;

/// Shell error shapes naming a missing program, most specific first.
static TOOL_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"bash: (\S+): command not found",
        r": (\S+): command not found",
        r": (\S+): not found",
        r"(\S+): command not found",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid tool name regex"))
    .collect()
});

/// Name of the missing program in a shell "not found" error.
pub fn extract_tool_name(failure: &str) -> Option<String> {
    TOOL_NAME_PATTERNS.iter().find_map(|re| {
        re.captures(failure)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    AptGet,
    Yum,
    Dnf,
    Pacman,
    Zypper,
    Brew,
}

impl PackageManager {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "apt-get" => Some(Self::AptGet),
            "yum" => Some(Self::Yum),
            "dnf" => Some(Self::Dnf),
            "pacman" => Some(Self::Pacman),
            "zypper" => Some(Self::Zypper),
            "brew" => Some(Self::Brew),
            _ => None,
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            Self::AptGet => "apt-get",
            Self::Yum => "yum",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Brew => "brew",
        }
    }

    /// Arguments that refresh the package index.
    pub fn update_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::AptGet => &["update", "-qq"],
            Self::Yum | Self::Dnf => &["makecache"],
            Self::Pacman => &["-Sy"],
            Self::Zypper => &["refresh"],
            Self::Brew => &["update"],
        };
        args.iter().map(ToString::to_string).collect()
    }

    /// Arguments that install `tool` non-interactively.
    pub fn install_args(&self, tool: &str) -> Vec<String> {
        let args: Vec<&str> = match self {
            Self::AptGet => vec!["install", "-y", tool, "-qq"],
            Self::Yum | Self::Dnf | Self::Zypper => vec!["install", "-y", tool],
            Self::Pacman => vec!["-S", "--noconfirm", tool],
            Self::Brew => vec!["install", tool],
        };
        args.into_iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Install `tool`, returning once it is available or installation failed.
    async fn install(&self, tool: &str) -> Result<()>;
}

/// Installs through the first configured package manager found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemInstaller {
    package_managers: Vec<String>,
}

impl SystemInstaller {
    pub fn new(package_managers: Vec<String>) -> Self {
        Self { package_managers }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.package_managers.clone())
    }

    pub fn detect(&self) -> Result<PackageManager> {
        for name in &self.package_managers {
            if which::which(name).is_err() {
                continue;
            }
            return PackageManager::from_name(name)
                .ok_or_else(|| InstallerError::UnsupportedManager(name.clone()));
        }
        Err(InstallerError::NoPackageManager)
    }

    async fn run(manager: PackageManager, args: Vec<String>) -> Result<()> {
        let command = format!("{} {}", manager.binary(), args.join(" "));
        debug!(command = %command, "running package manager");

        let status = Command::new(manager.binary())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| InstallerError::Spawn {
                command: command.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(InstallerError::CommandFailed {
                command,
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl ToolInstaller for SystemInstaller {
    async fn install(&self, tool: &str) -> Result<()> {
        let manager = self.detect()?;
        Self::run(manager, manager.update_args()).await?;
        if let Err(err) = Self::run(manager, manager.install_args(tool)).await {
            warn!(tool, manager = manager.binary(), error = %err, "tool installation failed");
            return Err(err);
        }
        info!(tool, manager = manager.binary(), "installed missing tool");
        Ok(())
    }
}
