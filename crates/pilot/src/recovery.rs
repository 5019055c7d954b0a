//! Local error recovery.
//!
//! Tried before the advisor is consulted. Handles two failure shapes locally:
//! a missing program (installed through the package manager) and a
//! permission error (command retried with the escalation prefix).

use async_trait::async_trait;
use pilot_core::Config;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::installer::{extract_tool_name, SystemInstaller, ToolInstaller};

/// What the hook did about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remedy {
    /// Fixed in place; re-run the same command.
    Handled,
    /// Not handled; defer to the advisor.
    Unhandled,
    /// Re-run with this command instead.
    ModifiedCommand(String),
}

impl Remedy {
    pub fn describe(&self) -> String {
        match self {
            Self::Handled => "handled".to_string(),
            Self::Unhandled => "unhandled".to_string(),
            Self::ModifiedCommand(command) => format!("modified command: {command}"),
        }
    }
}

#[async_trait]
pub trait RecoveryHook: Send + Sync {
    async fn handle(&self, failure: &str, command: &str) -> Remedy;
}

/// Recovery hook backed by a tool installer and privilege escalation.
pub struct LocalRecovery {
    installer: Arc<dyn ToolInstaller>,
    auto_install: bool,
    escalation_prefix: String,
}

impl std::fmt::Debug for LocalRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRecovery")
            .field("auto_install", &self.auto_install)
            .field("escalation_prefix", &self.escalation_prefix)
            .finish_non_exhaustive()
    }
}

impl LocalRecovery {
    pub fn new(
        installer: Arc<dyn ToolInstaller>,
        auto_install: bool,
        escalation_prefix: impl Into<String>,
    ) -> Self {
        Self {
            installer,
            auto_install,
            escalation_prefix: escalation_prefix.into(),
        }
    }

    /// Hook using the host package manager.
    pub fn from_config(config: &Config) -> Self {
        Self::with_installer(config, Arc::new(SystemInstaller::from_config(config)))
    }

    pub fn with_installer(config: &Config, installer: Arc<dyn ToolInstaller>) -> Self {
        Self::new(installer, config.auto_install, config.escalation_prefix.clone())
    }

    async fn install_missing(&self, failure: &str) -> Remedy {
        if !self.auto_install {
            debug!("auto install disabled");
            return Remedy::Unhandled;
        }
        let Some(tool) = extract_tool_name(failure) else {
            info!("could not determine missing tool name");
            return Remedy::Unhandled;
        };
        match self.installer.install(&tool).await {
            Ok(()) => Remedy::Handled,
            Err(err) => {
                warn!(tool = %tool, error = %err, "failed to install missing tool");
                Remedy::Unhandled
            }
        }
    }
}

#[async_trait]
impl RecoveryHook for LocalRecovery {
    async fn handle(&self, failure: &str, command: &str) -> Remedy {
        // "not found" also covers "command not found".
        if failure.contains("not found") {
            return self.install_missing(failure).await;
        }

        if failure.to_lowercase().contains("permission denied") {
            if command.starts_with(&self.escalation_prefix) {
                warn!(command, "permission denied, command already escalated");
                return Remedy::Unhandled;
            }
            info!(command, "permission denied, escalating");
            return Remedy::ModifiedCommand(format!("{}{command}", self.escalation_prefix));
        }

        Remedy::Unhandled
    }
}

/// Hook that never handles anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecovery;

#[async_trait]
impl RecoveryHook for NoRecovery {
    async fn handle(&self, _failure: &str, _command: &str) -> Remedy {
        Remedy::Unhandled
    }
}
