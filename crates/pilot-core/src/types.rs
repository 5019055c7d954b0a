//! Core types for the command orchestrator.
//!
//! Commands, tasks, pending revisions, and the outcome of a single step.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for tasks and events.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Package-manager invocations that install or refresh software.
static INSTALLATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(sudo\s+)?(apt(-get)?|aptitude|yum|dnf|pacman|zypper|brew|pip3?)\s+(install|update|upgrade)\b",
    )
    .expect("valid installation regex")
});

/// Command classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    #[default]
    Ordinary,
    /// Output is never accumulated into the task result.
    Installation,
}

impl CommandKind {
    pub fn classify(command: &str) -> Self {
        if INSTALLATION_RE.is_match(command.trim()) {
            Self::Installation
        } else {
            Self::Ordinary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Installation => "installation",
        }
    }
}

/// A shell command plus its derived classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = CommandKind::classify(&text);
        Self { text, kind }
    }

    pub fn is_installation(&self) -> bool {
        self.kind == CommandKind::Installation
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// One job's ordered command list plus execution progress.
///
/// Invariant: `current_index <= commands.len()`, and `completed` implies
/// `current_index == commands.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub commands: Vec<Command>,
    pub current_index: usize,
    pub completed: bool,
    pub result: String,
    /// Bumped every time the command list is replaced wholesale.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            id: Id::new(),
            commands,
            current_index: 0,
            completed: false,
            result: String::new(),
            generation: 0,
            created_at: Utc::now(),
        }
    }

    /// The command under the cursor, if any remain.
    pub fn current(&self) -> Option<&Command> {
        self.commands.get(self.current_index)
    }

    pub fn remaining(&self) -> usize {
        self.commands.len().saturating_sub(self.current_index)
    }

    /// Move the cursor forward one step, saturating at the end of the list.
    pub fn advance(&mut self) {
        if self.current_index < self.commands.len() {
            self.current_index += 1;
        }
    }

    /// Append the output of a successful command to the result.
    ///
    /// Installation commands are skipped.
    pub fn accumulate(&mut self, command: &Command, output: &str) {
        if !command.is_installation() {
            self.result.push_str(output);
        }
    }

    /// Swap in a new command list, resetting cursor and result.
    pub fn replace(&mut self, commands: Vec<Command>) {
        self.commands = commands;
        self.current_index = 0;
        self.completed = false;
        self.result.clear();
        self.generation += 1;
    }

    /// Mark the task complete if the cursor reached the end.
    pub fn mark_completed_if_done(&mut self) -> bool {
        if self.current_index >= self.commands.len() {
            self.completed = true;
        }
        self.completed
    }

    pub fn command_texts(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.text.clone()).collect()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// A staged command list awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRevision {
    pub commands: Vec<Command>,
    /// Set when the controller confirmed while a step was in flight.
    pub confirmed: bool,
}

impl PendingRevision {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            confirmed: false,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Initialized,
    Running,
    Paused,
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Initialized => "INITIALIZED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
        }
    }
}

/// Why a step did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    #[error("failed to launch command: {0}")]
    LaunchFailed(String),
    #[error("command rejected by safety filter: {0}")]
    UnsafeCommand(String),
    #[error("command exited with code {0}")]
    NonZeroExit(i32),
    #[error("no remedy found for failing command")]
    RecoveryUnhandled,
    #[error("advisor unavailable: {0}")]
    AdvisorUnavailable(String),
}

/// Result of one `execute_next` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded {
        command: String,
        output: String,
    },
    /// Abandoned after the retry budget or with no remedy available.
    Failed {
        command: String,
        output: String,
        attempts: u32,
        error: StepError,
    },
    /// Skipped on the controller's request.
    Skipped { command: String },
    /// Refused by the safety filter; never launched.
    Rejected { command: String, error: StepError },
    /// No commands remained.
    Completed,
}

/// Sentinel output reported once the task has no commands left.
pub const COMPLETED_SENTINEL: &str = "Task completed";

/// Output reported for a skipped step.
pub const SKIPPED_SENTINEL: &str = "skipped";

impl StepOutcome {
    /// The `success` half of the `(success, output)` pair.
    pub fn success(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Skipped { .. } | Self::Completed
        )
    }

    /// The `output` half of the `(success, output)` pair.
    pub fn output(&self) -> &str {
        match self {
            Self::Succeeded { output, .. } | Self::Failed { output, .. } => output,
            Self::Skipped { .. } => SKIPPED_SENTINEL,
            Self::Rejected {
                error: StepError::UnsafeCommand(rule),
                ..
            } => rule,
            Self::Rejected { .. } => "command rejected by safety filter",
            Self::Completed => COMPLETED_SENTINEL,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Succeeded { command, .. }
            | Self::Failed { command, .. }
            | Self::Skipped { command }
            | Self::Rejected { command, .. } => Some(command),
            Self::Completed => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Host description handed to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub runtime_version: String,
    pub architecture: String,
}

impl SystemInfo {
    /// Short multi-line summary used when talking to collaborators.
    pub fn summary(&self) -> String {
        format!(
            "OS: {}\nRuntime Version: {}\nArchitecture: {}\n",
            self.os, self.runtime_version, self.architecture
        )
    }
}
