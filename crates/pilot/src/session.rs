//! Execution session: the task manager driving one command list.
//!
//! Key responsibilities:
//! - Own the task (command list, cursor, accumulated result)
//! - Gate execution on pause/resume
//! - Route skip requests to the running process
//! - Retry failing commands through local recovery and the advisor
//! - Stage and apply command-list revisions at step boundaries
//!
//! Only the worker calling `execute_next` advances the cursor or appends to
//! the result. Controller operations never wait on a running process.

use once_cell::sync::OnceCell;
use pilot_core::reply::extract_commands;
use pilot_core::{
    safety, Command, Config, EventPayload, PendingRevision, SessionState, StepError, StepOutcome,
    SystemInfo, Task,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::advisor::{
    commands_from_reply, Advisor, CollaboratorError, HostProbe, OfflineAdvisor,
    PassthroughSummarizer, Summarizer, SystemProbe,
};
use crate::recovery::{LocalRecovery, RecoveryHook, Remedy};
use crate::runner::{ProcessRunner, RunOutput, RunStatus, RunnerConfig, RunnerError};
use crate::sink::{EventSink, Observer};

/// Reply returned by `discuss` when the advisor fails.
pub const DISCUSSION_UNAVAILABLE_REPLY: &str =
    "The advisor could not be reached; the command list is unchanged.";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a step is in progress")]
    StepInProgress,
    #[error("resource exhausted while launching a command: {0}")]
    Resource(#[source] RunnerError),
    #[error("command generation failed: {0}")]
    Generation(#[from] CollaboratorError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Result of `discuss`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discussion {
    /// Commands staged as a pending revision, awaiting `confirm_revision`.
    Revision(Vec<String>),
    /// Plain reply text; nothing staged.
    Reply(String),
}

#[derive(Debug, Default)]
struct Inner {
    task: Task,
    revision: Option<PendingRevision>,
    initialized: bool,
    started: bool,
}

/// The running process and the skip flag. Always locked together.
#[derive(Debug, Default)]
struct ActiveStep {
    skip_requested: bool,
    cancel: Option<CancellationToken>,
}

/// One attempt at running a command.
enum Attempt {
    Finished(RunOutput),
    Skipped,
    LaunchFailed(RunnerError),
}

/// Position of the step being executed.
#[derive(Debug, Clone, Copy)]
struct StepContext {
    generation: u64,
    position: usize,
    total: usize,
}

pub struct Session {
    config: Config,
    runner: ProcessRunner,
    sink: EventSink,
    advisor: Arc<dyn Advisor>,
    summarizer: Arc<dyn Summarizer>,
    recovery: Arc<dyn RecoveryHook>,
    probe: Arc<dyn SystemProbe>,
    system_info: OnceCell<SystemInfo>,
    inner: Mutex<Inner>,
    active: Mutex<ActiveStep>,
    paused: watch::Sender<bool>,
    step_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("current_index", &self.current_index())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session with the offline advisor, passthrough summarizer, and local
    /// recovery through the host package manager.
    pub fn new(config: Config) -> Self {
        let sink = EventSink::new(config.event_buffer);
        let runner = ProcessRunner::new(RunnerConfig::from_config(&config), sink.clone());
        let (paused, _) = watch::channel(false);
        Self {
            recovery: Arc::new(LocalRecovery::from_config(&config)),
            config,
            runner,
            sink,
            advisor: Arc::new(OfflineAdvisor),
            summarizer: Arc::new(PassthroughSummarizer),
            probe: Arc::new(HostProbe),
            system_info: OnceCell::new(),
            inner: Mutex::new(Inner::default()),
            active: Mutex::new(ActiveStep::default()),
            paused,
            step_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn RecoveryHook>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn subscribe(&self) -> Observer {
        self.sink.subscribe()
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveStep> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Host description, probed once per session.
    pub fn system_info(&self) -> &SystemInfo {
        self.system_info.get_or_init(|| self.probe.probe())
    }

    // ------------------------------------------------------------------
    // Controller surface
    // ------------------------------------------------------------------

    /// Generate commands for `description` and start a new task with them.
    pub async fn initialize(&self, description: &str) -> Result<Vec<String>> {
        info!(description, "generating commands");
        let reply = self.advisor.generate(description, self.system_info()).await?;
        let commands = commands_from_reply(&reply)?;
        self.initialize_commands(commands.clone());
        Ok(commands)
    }

    /// Start a new task, discarding the current one.
    ///
    /// Any running process is cancelled; the step executing it discards its
    /// result instead of touching the new task.
    pub fn initialize_commands<I, S>(&self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands: Vec<Command> = commands.into_iter().map(Command::new).collect();
        let total = commands.len();

        // Bump the generation before cancelling so a step racing with us
        // either sees the new generation or gets cancelled.
        {
            let mut inner = self.lock_inner();
            let generation = inner.task.generation + 1;
            inner.task = Task::new(commands);
            inner.task.generation = generation;
            inner.revision = None;
            inner.initialized = true;
            inner.started = false;
        }
        {
            let mut active = self.lock_active();
            active.skip_requested = false;
            if let Some(token) = &active.cancel {
                token.cancel();
            }
        }
        info!(total, "task initialized");
    }

    pub fn list_commands(&self) -> Vec<String> {
        self.lock_inner().task.command_texts()
    }

    /// Replace the command list wholesale, resetting cursor and result.
    pub fn replace_commands<I, S>(&self, commands: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _step = self
            .step_lock
            .try_lock()
            .map_err(|_| SessionError::StepInProgress)?;
        let commands: Vec<Command> = commands.into_iter().map(Command::new).collect();
        let mut inner = self.lock_inner();
        inner.task.replace(commands);
        inner.initialized = true;
        info!(total = inner.task.commands.len(), "command list replaced");
        Ok(())
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
        info!("session paused");
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        info!("session resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Skip the running command, or the next one if none is running.
    pub fn skip(&self) {
        let mut active = self.lock_active();
        active.skip_requested = true;
        if let Some(token) = &active.cancel {
            info!("cancelling running command");
            token.cancel();
        } else {
            info!("next command will be skipped");
        }
    }

    pub fn is_complete(&self) -> bool {
        self.lock_inner().task.completed
    }

    pub fn result(&self) -> String {
        self.lock_inner().task.result.clone()
    }

    pub fn current_index(&self) -> usize {
        self.lock_inner().task.current_index
    }

    pub fn pending_revision(&self) -> Option<PendingRevision> {
        self.lock_inner().revision.clone()
    }

    pub fn state(&self) -> SessionState {
        let inner = self.lock_inner();
        if !inner.initialized {
            SessionState::Idle
        } else if inner.task.completed {
            SessionState::Completed
        } else if self.is_paused() {
            SessionState::Paused
        } else if inner.started {
            SessionState::Running
        } else {
            SessionState::Initialized
        }
    }

    /// Ask the advisor about the current command list.
    ///
    /// Proposed commands are staged, not applied. A confirmed revision still
    /// waiting on the current step is never replaced; the reply is returned
    /// as plain text instead. Never fails: an advisor error becomes a fixed
    /// reply.
    pub async fn discuss(&self, message: &str) -> Discussion {
        let commands = self.list_commands();
        let reply = match self
            .advisor
            .discuss(message, &commands, self.system_info())
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "discussion failed");
                return Discussion::Reply(DISCUSSION_UNAVAILABLE_REPLY.to_string());
            }
        };

        let proposed = extract_commands(&reply);
        if proposed.is_empty() {
            return Discussion::Reply(reply);
        }

        let mut inner = self.lock_inner();
        if inner.revision.as_ref().is_some_and(|r| r.confirmed) {
            info!("confirmed revision pending, proposal not staged");
            return Discussion::Reply(reply);
        }
        info!(count = proposed.len(), "revision staged");
        inner.revision = Some(PendingRevision::new(
            proposed.iter().map(Command::new).collect(),
        ));
        Discussion::Revision(proposed)
    }

    /// Install the staged revision. Returns false if nothing is staged.
    ///
    /// While a step is in flight the revision is marked confirmed and applied
    /// as soon as that step returns.
    pub fn confirm_revision(&self) -> bool {
        let mut inner = self.lock_inner();
        let Some(mut revision) = inner.revision.take() else {
            warn!("no revision to confirm");
            return false;
        };

        match self.step_lock.try_lock() {
            Ok(_step) => {
                inner.task.replace(revision.commands);
                inner.initialized = true;
                info!(total = inner.task.commands.len(), "revision confirmed");
            }
            Err(_) => {
                revision.confirmed = true;
                inner.revision = Some(revision);
                info!("revision confirmed; applying after current step");
            }
        }
        true
    }

    /// Summary of the accumulated result; the raw result if summarizing fails.
    pub async fn summarize(&self) -> String {
        let result = self.result();
        match self.summarizer.summarize(&result).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "summarizer failed, returning raw result");
                result
            }
        }
    }

    // ------------------------------------------------------------------
    // Worker
    // ------------------------------------------------------------------

    /// Alias for `execute_next`.
    pub async fn step(&self) -> Result<StepOutcome> {
        self.execute_next().await
    }

    /// Execute the command under the cursor, retrying and recovering as
    /// configured.
    ///
    /// Only resource exhaustion when spawning is an error; every other
    /// failure is reported through the outcome.
    pub async fn execute_next(&self) -> Result<StepOutcome> {
        self.wait_until_resumed().await;
        let outcome = {
            let _step = self.step_lock.lock().await;
            self.apply_confirmed_revision();
            let outcome = self.run_step().await;
            self.apply_confirmed_revision();
            outcome
        };

        // A confirm that landed after the last apply but before the guard
        // dropped is still pending; a step already in flight applies it instead.
        if let Ok(_step) = self.step_lock.try_lock() {
            self.apply_confirmed_revision();
        }
        outcome
    }

    async fn wait_until_resumed(&self) {
        let mut rx = self.paused.subscribe();
        if *rx.borrow() {
            debug!("waiting for resume");
        }
        // The sender lives in `self`, so this only ends on resume.
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    fn apply_confirmed_revision(&self) {
        let mut inner = self.lock_inner();
        if !inner.revision.as_ref().is_some_and(|r| r.confirmed) {
            return;
        }
        if let Some(revision) = inner.revision.take() {
            inner.task.replace(revision.commands);
            info!(total = inner.task.commands.len(), "confirmed revision applied");
        }
    }

    fn take_skip_request(&self) -> bool {
        std::mem::take(&mut self.lock_active().skip_requested)
    }

    async fn run_step(&self) -> Result<StepOutcome> {
        let (command, ctx) = {
            let mut inner = self.lock_inner();
            inner.started = true;
            let Some(command) = inner.task.current().cloned() else {
                let newly_completed = !inner.task.completed;
                inner.task.mark_completed_if_done();
                if newly_completed {
                    let result_bytes = inner.task.result.len();
                    drop(inner);
                    info!(result_bytes, "all commands executed, task completed");
                    self.sink
                        .task_event(EventPayload::TaskCompleted { result_bytes });
                }
                return Ok(StepOutcome::Completed);
            };
            let ctx = StepContext {
                generation: inner.task.generation,
                position: inner.task.current_index + 1,
                total: inner.task.commands.len(),
            };
            (command, ctx)
        };

        if self.take_skip_request() {
            info!(command = %command, "skipping command before launch");
            return Ok(self.finish_skipped(&command, &ctx));
        }

        if let Err(rejection) = safety::check(command.as_str()) {
            warn!(command = %command, rule = rejection.rule, "command rejected as unsafe");
            self.sink.command_event(
                command.as_str(),
                EventPayload::CommandRejected {
                    rule: rejection.rule.to_string(),
                },
            );
            self.advance(&ctx);
            return Ok(StepOutcome::Rejected {
                command: command.text,
                error: StepError::UnsafeCommand(rejection.rule.to_string()),
            });
        }

        self.retry_loop(command, ctx).await
    }

    async fn retry_loop(&self, command: Command, ctx: StepContext) -> Result<StepOutcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut running = command.text.clone();
        let mut attempts: u32 = 0;
        let mut local_fixes: u32 = 0;
        let mut last_output;
        let mut last_error;

        loop {
            self.wait_until_resumed().await;

            let attempt = attempts + 1;
            info!(
                command = %running,
                position = ctx.position,
                total = ctx.total,
                attempt,
                "executing command"
            );
            self.sink.command_event(
                &running,
                EventPayload::CommandStarted {
                    position: Some(ctx.position),
                    total: ctx.total,
                    attempt,
                },
            );

            match self.launch(&running, &ctx).await {
                Attempt::Skipped => return Ok(self.finish_skipped(&command, &ctx)),
                Attempt::LaunchFailed(err) => {
                    if err.is_resource_exhaustion() {
                        warn!(command = %running, error = %err, "resource exhaustion, aborting task");
                        return Err(SessionError::Resource(err));
                    }
                    warn!(command = %running, attempt, error = %err, "launch failed");
                    last_output = err.to_string();
                    last_error = StepError::LaunchFailed(err.to_string());
                }
                Attempt::Finished(run) => {
                    let RunStatus::Exited(exit_code) = run.status else {
                        return Ok(self.finish_skipped(&command, &ctx));
                    };
                    if self.take_skip_request() {
                        return Ok(self.finish_skipped(&command, &ctx));
                    }
                    if exit_code == 0 {
                        return Ok(self.finish_succeeded(&command, run.output, &ctx));
                    }

                    warn!(command = %running, attempt, exit_code, "command failed");
                    last_output = run.output;
                    last_error = StepError::NonZeroExit(exit_code);

                    if local_fixes < self.config.max_local_fixes {
                        match self.recovery.handle(&last_output, &running).await {
                            Remedy::Handled => {
                                local_fixes += 1;
                                self.recovery_applied(&running, &Remedy::Handled);
                                continue;
                            }
                            Remedy::ModifiedCommand(modified) if safety::is_safe(&modified) => {
                                local_fixes += 1;
                                self.recovery_applied(
                                    &running,
                                    &Remedy::ModifiedCommand(modified.clone()),
                                );
                                running = modified;
                                continue;
                            }
                            Remedy::ModifiedCommand(modified) => {
                                warn!(command = %modified, "modified command rejected as unsafe");
                            }
                            Remedy::Unhandled => {}
                        }
                    }
                }
            }

            attempts += 1;
            if attempts >= max_attempts {
                warn!(command = %command, attempts, "retry budget exhausted");
                break;
            }

            let Some(patch) = self.request_patch(&last_output, &running).await else {
                last_error = StepError::RecoveryUnhandled;
                break;
            };
            match self.run_patch(&patch, &ctx).await? {
                PatchResult::Skipped => return Ok(self.finish_skipped(&command, &ctx)),
                PatchResult::Applied => info!(command = %command, "patch applied, retrying"),
                PatchResult::Failed => info!(command = %command, "patch failed, retrying"),
            }
        }

        // A skip that landed while recovering belongs to this step.
        if self.take_skip_request() {
            return Ok(self.finish_skipped(&command, &ctx));
        }

        self.advance(&ctx);
        Ok(StepOutcome::Failed {
            command: command.text,
            output: last_output,
            attempts,
            error: last_error,
        })
    }

    /// Run one command, registering it so `skip` can cancel it.
    async fn launch(&self, command: &str, ctx: &StepContext) -> Attempt {
        let token = {
            let mut active = self.lock_active();
            if active.skip_requested {
                active.skip_requested = false;
                return Attempt::Skipped;
            }
            let token = CancellationToken::new();
            active.cancel = Some(token.clone());
            token
        };

        if self.lock_inner().task.generation != ctx.generation {
            self.lock_active().cancel = None;
            return Attempt::Skipped;
        }

        let result = self.runner.run(command, &token).await;

        let mut active = self.lock_active();
        active.cancel = None;
        match result {
            Ok(run) if run.status == RunStatus::Cancelled => {
                active.skip_requested = false;
                Attempt::Skipped
            }
            Ok(run) => Attempt::Finished(run),
            Err(err) => Attempt::LaunchFailed(err),
        }
    }

    async fn request_patch(&self, failure: &str, command: &str) -> Option<Vec<String>> {
        let reply = match self
            .advisor
            .analyze_error(failure, command, self.system_info())
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                let error = StepError::AdvisorUnavailable(err.to_string());
                warn!(command, error = %error, "no patch available");
                return None;
            }
        };
        match commands_from_reply(&reply) {
            Ok(patch) => Some(patch),
            Err(err) => {
                info!(command, error = %err, "advisor proposed no commands");
                None
            }
        }
    }

    /// Run advisor patch commands in order, stopping at the first failure.
    async fn run_patch(&self, patch: &[String], ctx: &StepContext) -> Result<PatchResult> {
        for command in patch {
            if let Err(rejection) = safety::check(command) {
                warn!(command = %command, rule = rejection.rule, "patch command rejected as unsafe");
                self.sink.command_event(
                    command,
                    EventPayload::CommandRejected {
                        rule: rejection.rule.to_string(),
                    },
                );
                return Ok(PatchResult::Failed);
            }

            info!(command = %command, "executing patch command");
            self.sink.command_event(
                command,
                EventPayload::CommandStarted {
                    position: None,
                    total: ctx.total,
                    attempt: 1,
                },
            );
            match self.launch(command, ctx).await {
                Attempt::Skipped => return Ok(PatchResult::Skipped),
                Attempt::LaunchFailed(err) if err.is_resource_exhaustion() => {
                    return Err(SessionError::Resource(err));
                }
                Attempt::LaunchFailed(err) => {
                    warn!(command = %command, error = %err, "patch command failed to launch");
                    return Ok(PatchResult::Failed);
                }
                Attempt::Finished(run) if run.succeeded() => {}
                Attempt::Finished(run) => {
                    warn!(command = %command, status = ?run.status, "patch command failed");
                    return Ok(PatchResult::Failed);
                }
            }
        }
        Ok(PatchResult::Applied)
    }

    fn recovery_applied(&self, command: &str, remedy: &Remedy) {
        info!(command, remedy = %remedy.describe(), "local recovery applied");
        self.sink.command_event(
            command,
            EventPayload::RecoveryApplied {
                remedy: remedy.describe(),
            },
        );
    }

    /// Advance the cursor unless the task was replaced mid-step.
    fn advance(&self, ctx: &StepContext) {
        let mut inner = self.lock_inner();
        if inner.task.generation == ctx.generation {
            inner.task.advance();
        } else {
            debug!("command list replaced during step; cursor untouched");
        }
    }

    fn finish_succeeded(&self, command: &Command, output: String, ctx: &StepContext) -> StepOutcome {
        {
            let mut inner = self.lock_inner();
            if inner.task.generation == ctx.generation {
                inner.task.accumulate(command, &output);
                inner.task.advance();
            } else {
                debug!(command = %command, "command list replaced during step; output discarded");
            }
        }
        StepOutcome::Succeeded {
            command: command.text.clone(),
            output,
        }
    }

    fn finish_skipped(&self, command: &Command, ctx: &StepContext) -> StepOutcome {
        info!(command = %command, "command skipped");
        self.sink
            .command_event(command.as_str(), EventPayload::CommandSkipped);
        self.advance(ctx);
        StepOutcome::Skipped {
            command: command.text.clone(),
        }
    }
}

enum PatchResult {
    Applied,
    Failed,
    Skipped,
}

/// Run `session` to completion on a background task, then summarize.
///
/// The summary is also published as a `SUMMARY` event.
pub fn spawn_worker(session: Arc<Session>) -> JoinHandle<Result<String>> {
    tokio::spawn(async move {
        while !session.is_complete() {
            let outcome = session.execute_next().await?;
            debug!(
                success = outcome.success(),
                command = outcome.command().unwrap_or_default(),
                "step finished"
            );
        }
        let summary = session.summarize().await;
        session.sink.task_event(EventPayload::Summary {
            summary: summary.clone(),
        });
        Ok::<_, SessionError>(summary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::NoRecovery;
    use std::time::Duration;

    fn session() -> Session {
        let config = Config {
            terminate_grace_ms: 500,
            drain_timeout_ms: 500,
            ..Config::default()
        };
        Session::new(config).with_recovery(Arc::new(NoRecovery))
    }

    #[test]
    fn new_session_is_idle() {
        let session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_complete());
        assert!(session.list_commands().is_empty());
    }

    #[tokio::test]
    async fn state_follows_lifecycle() {
        let session = session();
        session.initialize_commands(["echo one"]);
        assert_eq!(session.state(), SessionState::Initialized);

        session.pause();
        assert_eq!(session.state(), SessionState::Paused);
        session.resume();

        session.execute_next().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);

        let outcome = session.execute_next().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn empty_task_completes_immediately() {
        let session = session();
        session.initialize_commands(Vec::<String>::new());
        let outcome = session.execute_next().await.unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
        assert!(outcome.success());
        assert_eq!(outcome.output(), "Task completed");
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn skip_between_steps_skips_next_without_launch() {
        let session = session();
        session.initialize_commands(["echo never", "echo after"]);
        session.skip();

        let outcome = session.execute_next().await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Skipped {
                command: "echo never".to_string()
            }
        );
        assert_eq!(session.current_index(), 1);

        // The request was consumed.
        let next = session.execute_next().await.unwrap();
        assert!(matches!(next, StepOutcome::Succeeded { .. }));
        assert_eq!(session.result(), "after\n");
    }

    #[tokio::test]
    async fn initialize_clears_stale_skip_and_revision() {
        let session = session();
        session.initialize_commands(["echo a"]);
        session.skip();
        session.initialize_commands(["echo b"]);
        assert!(session.pending_revision().is_none());

        let outcome = session.execute_next().await.unwrap();
        assert_eq!(outcome.output(), "b\n");
    }

    #[tokio::test]
    async fn replace_commands_resets_progress() {
        let session = session();
        session.initialize_commands(["echo a", "echo b"]);
        session.execute_next().await.unwrap();
        session.replace_commands(["echo c"]).unwrap();
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.result(), "");
        assert_eq!(session.list_commands(), vec!["echo c"]);
    }

    #[tokio::test]
    async fn confirm_without_revision_returns_false() {
        let session = session();
        session.initialize_commands(["echo a"]);
        assert!(!session.confirm_revision());
    }

    #[tokio::test]
    async fn offline_discussion_returns_fixed_reply() {
        let session = session();
        session.initialize_commands(["echo a"]);
        let discussion = session.discuss("use printf instead").await;
        assert_eq!(
            discussion,
            Discussion::Reply(DISCUSSION_UNAVAILABLE_REPLY.to_string())
        );
        assert!(session.pending_revision().is_none());
    }

    #[tokio::test]
    async fn offline_initialize_fails() {
        let session = session();
        let err = session.initialize("scan the network").await.unwrap_err();
        assert!(matches!(err, SessionError::Generation(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn pause_blocks_next_step_until_resume() {
        let session = Arc::new(session());
        session.initialize_commands(["echo paused"]);
        session.pause();

        let worker = {
            let session = session.clone();
            tokio::spawn(async move { session.execute_next().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!worker.is_finished());
        assert_eq!(session.current_index(), 0);

        session.resume();
        let outcome = worker.await.unwrap().unwrap();
        assert_eq!(outcome.output(), "paused\n");
    }

    #[tokio::test]
    async fn spawn_worker_runs_to_completion_and_summarizes() {
        let session = Arc::new(session());
        session.initialize_commands(["echo one", "echo two"]);
        let mut observer = session.subscribe();

        let summary = spawn_worker(session.clone()).await.unwrap().unwrap();
        assert_eq!(summary, "one\ntwo\n");
        assert!(session.is_complete());

        let events = observer.drain();
        let last = events.last().unwrap();
        assert_eq!(last.event_type(), pilot_core::EventType::Summary);
    }
}
