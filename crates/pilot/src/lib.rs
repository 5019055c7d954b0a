//! pilot - sequential shell command orchestrator
//!
//! Runs an ordered command list one process at a time, streaming output to
//! observers, while a controller pauses, resumes, skips, or revises the
//! remaining list.

pub mod advisor;
pub mod installer;
pub mod recovery;
pub mod runner;
pub mod session;
pub mod sink;

pub use advisor::{
    Advisor, CollaboratorError, HostProbe, OfflineAdvisor, PassthroughSummarizer, Summarizer,
    SystemProbe,
};
pub use recovery::{LocalRecovery, NoRecovery, RecoveryHook, Remedy};
pub use runner::{ProcessHandle, ProcessRunner, ProcessStatus, RunnerConfig, RunnerError};
pub use session::{spawn_worker, Discussion, Session, SessionError};
pub use sink::{EventSink, Observer};
