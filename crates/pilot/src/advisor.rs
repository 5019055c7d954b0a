//! External collaborators: command generation, error advice, summaries,
//! and the host probe.
//!
//! Collaborators return free-form reply text; commands are pulled out of
//! `<COMMAND>` tags by the session, never by the collaborator.

use async_trait::async_trait;
use pilot_core::reply::extract_commands;
use pilot_core::SystemInfo;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("no commands found in reply")]
    NoCommandsExtracted,
    #[error("collaborator request failed: {0}")]
    Request(String),
}

pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// Commands in `reply`, or `NoCommandsExtracted` if it has none.
pub fn commands_from_reply(reply: &str) -> Result<Vec<String>> {
    let commands = extract_commands(reply);
    if commands.is_empty() {
        Err(CollaboratorError::NoCommandsExtracted)
    } else {
        Ok(commands)
    }
}

/// Generates commands, diagnoses failures, and revises command lists.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Propose commands for a natural-language job description.
    async fn generate(&self, description: &str, system: &SystemInfo) -> Result<String>;

    /// Propose patch commands for a failing command.
    async fn analyze_error(
        &self,
        failure: &str,
        command: &str,
        system: &SystemInfo,
    ) -> Result<String>;

    /// Discuss the current command list; may propose a replacement list.
    async fn discuss(
        &self,
        message: &str,
        commands: &[String],
        system: &SystemInfo,
    ) -> Result<String>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, result: &str) -> Result<String>;
}

pub trait SystemProbe: Send + Sync {
    fn probe(&self) -> SystemInfo;
}

/// Advisor for running without any backend. Every call is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAdvisor;

#[async_trait]
impl Advisor for OfflineAdvisor {
    async fn generate(&self, _description: &str, _system: &SystemInfo) -> Result<String> {
        Err(CollaboratorError::Unavailable("offline".to_string()))
    }

    async fn analyze_error(
        &self,
        _failure: &str,
        _command: &str,
        _system: &SystemInfo,
    ) -> Result<String> {
        Err(CollaboratorError::Unavailable("offline".to_string()))
    }

    async fn discuss(
        &self,
        _message: &str,
        _commands: &[String],
        _system: &SystemInfo,
    ) -> Result<String> {
        Err(CollaboratorError::Unavailable("offline".to_string()))
    }
}

/// Returns the result text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSummarizer;

#[async_trait]
impl Summarizer for PassthroughSummarizer {
    async fn summarize(&self, result: &str) -> Result<String> {
        Ok(result.to_string())
    }
}

/// Probes the local host with `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn probe(&self) -> SystemInfo {
        SystemInfo {
            os: sysinfo::System::long_os_version()
                .or_else(sysinfo::System::name)
                .unwrap_or_else(|| std::env::consts::OS.to_string()),
            runtime_version: sysinfo::System::kernel_version().unwrap_or_default(),
            architecture: std::env::consts::ARCH.to_string(),
        }
    }
}
