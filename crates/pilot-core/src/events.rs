//! Event types published to observers.
//!
//! Every event is tagged with the command it belongs to; task-level events
//! (completion, summary) carry no command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    CommandStarted,
    OutputLine,
    CommandFinished,
    CommandSkipped,
    CommandRejected,
    RecoveryApplied,
    TaskCompleted,
    Summary,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandStarted => "COMMAND_STARTED",
            Self::OutputLine => "OUTPUT_LINE",
            Self::CommandFinished => "COMMAND_FINISHED",
            Self::CommandSkipped => "COMMAND_SKIPPED",
            Self::CommandRejected => "COMMAND_REJECTED",
            Self::RecoveryApplied => "RECOVERY_APPLIED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::Summary => "SUMMARY",
        }
    }
}

/// Event payloads, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    CommandStarted {
        /// 1-based position in the task, absent for advisor patch commands.
        position: Option<usize>,
        total: usize,
        attempt: u32,
    },
    OutputLine {
        line: String,
    },
    CommandFinished {
        exit_code: i32,
        duration_ms: u64,
    },
    CommandSkipped,
    CommandRejected {
        rule: String,
    },
    RecoveryApplied {
        remedy: String,
    },
    TaskCompleted {
        result_bytes: usize,
    },
    Summary {
        summary: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::CommandStarted { .. } => EventType::CommandStarted,
            Self::OutputLine { .. } => EventType::OutputLine,
            Self::CommandFinished { .. } => EventType::CommandFinished,
            Self::CommandSkipped => EventType::CommandSkipped,
            Self::CommandRejected { .. } => EventType::CommandRejected,
            Self::RecoveryApplied { .. } => EventType::RecoveryApplied,
            Self::TaskCompleted { .. } => EventType::TaskCompleted,
            Self::Summary { .. } => EventType::Summary,
        }
    }
}

/// One event as delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub command: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub emitted_at: DateTime<Utc>,
}

impl Event {
    pub fn for_command(command: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            command: Some(command.into()),
            payload,
            emitted_at: Utc::now(),
        }
    }

    pub fn for_task(payload: EventPayload) -> Self {
        Self {
            command: None,
            payload,
            emitted_at: Utc::now(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// The line text for `OUTPUT_LINE` events.
    pub fn line(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::OutputLine { line } => Some(line),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
