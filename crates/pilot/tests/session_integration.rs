//! Integration tests for the execution session.
//!
//! Drives real `sh` processes through the session with scripted
//! collaborators: retries, recovery, skip/pause, and revisions.

use async_trait::async_trait;
use pilot::advisor::{self, Advisor, CollaboratorError, Summarizer, SystemProbe};
use pilot::installer::{self, ToolInstaller};
use pilot::{
    spawn_worker, Discussion, LocalRecovery, NoRecovery, Observer, RecoveryHook, Remedy, Session,
    SessionError,
};
use pilot_core::{Config, Event, EventType, SessionState, StepError, StepOutcome, SystemInfo};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// --- Fakes ---

struct FixedProbe;

impl SystemProbe for FixedProbe {
    fn probe(&self) -> SystemInfo {
        SystemInfo {
            os: "TestOS".to_string(),
            runtime_version: "1.0".to_string(),
            architecture: "test64".to_string(),
        }
    }
}

/// Advisor replying from a script.
#[derive(Default)]
struct ScriptedAdvisor {
    generated: Option<String>,
    discussion: Option<String>,
    /// Replies to `analyze_error`, consumed in order.
    patches: Mutex<VecDeque<String>>,
    /// Reply to `analyze_error` once `patches` runs dry.
    repeat_patch: Option<String>,
    analyze_calls: AtomicUsize,
}

impl ScriptedAdvisor {
    fn unavailable() -> advisor::Result<String> {
        Err(CollaboratorError::Unavailable("scripted".to_string()))
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn generate(&self, _description: &str, _system: &SystemInfo) -> advisor::Result<String> {
        self.generated.clone().map_or_else(Self::unavailable, Ok)
    }

    async fn analyze_error(
        &self,
        _failure: &str,
        _command: &str,
        _system: &SystemInfo,
    ) -> advisor::Result<String> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.patches.lock().unwrap().pop_front();
        next.or_else(|| self.repeat_patch.clone())
            .map_or_else(Self::unavailable, Ok)
    }

    async fn discuss(
        &self,
        _message: &str,
        _commands: &[String],
        _system: &SystemInfo,
    ) -> advisor::Result<String> {
        self.discussion.clone().map_or_else(Self::unavailable, Ok)
    }
}

struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _result: &str) -> advisor::Result<String> {
        Err(CollaboratorError::Request("backend down".to_string()))
    }
}

/// Installer that "installs" by creating a marker file.
struct MarkerInstaller {
    marker: PathBuf,
    installed: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolInstaller for MarkerInstaller {
    async fn install(&self, tool: &str) -> installer::Result<()> {
        self.installed.lock().unwrap().push(tool.to_string());
        std::fs::write(&self.marker, tool).map_err(|source| installer::InstallerError::Spawn {
            command: format!("install {tool}"),
            source,
        })
    }
}

/// Recovery hook that always answers the same remedy, counting calls.
struct FixedRemedy {
    remedy: Remedy,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedRemedy {
    fn new(remedy: Remedy) -> Self {
        Self {
            remedy,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(remedy: Remedy, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(remedy)
        }
    }
}

#[async_trait]
impl RecoveryHook for FixedRemedy {
    async fn handle(&self, _failure: &str, _command: &str) -> Remedy {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.remedy.clone()
    }
}

// --- Helpers ---

fn test_config() -> Config {
    Config {
        terminate_grace_ms: 5000,
        drain_timeout_ms: 500,
        ..Config::default()
    }
}

fn session_with(config: Config) -> Session {
    Session::new(config)
        .with_recovery(Arc::new(NoRecovery))
        .with_probe(Arc::new(FixedProbe))
}

fn session() -> Session {
    session_with(test_config())
}

fn started_commands(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.event_type() == EventType::CommandStarted)
        .filter_map(|e| e.command.clone())
        .collect()
}

async fn wait_for_line(observer: &mut Observer, wanted: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = observer.recv().await {
            if event.line() == Some(wanted) {
                return;
            }
        }
    })
    .await
    .expect("line never arrived");
}

fn marker_in(dir: &Path) -> PathBuf {
    dir.join("marker")
}

// --- Sequencing ---

#[tokio::test]
async fn failing_command_is_abandoned_and_later_commands_run() {
    let session = session();
    session.initialize_commands(["echo A", "false", "echo B"]);

    let mut outcomes = Vec::new();
    let mut last_index = session.current_index();
    loop {
        let outcome = session.execute_next().await.unwrap();
        let index = session.current_index();
        assert!(index >= last_index);
        assert!(index <= 3);
        last_index = index;
        if outcome.is_completed() {
            break;
        }
        outcomes.push(outcome);
    }

    assert!(matches!(&outcomes[0], StepOutcome::Succeeded { output, .. } if output == "A\n"));
    assert!(matches!(
        &outcomes[1],
        StepOutcome::Failed {
            attempts: 1,
            error: StepError::RecoveryUnhandled,
            ..
        }
    ));
    assert!(!outcomes[1].success());
    assert!(outcomes[2].success());
    assert_eq!(session.result(), "A\nB\n");
    assert!(session.is_complete());
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn retries_are_bounded_by_max_attempts() {
    let advisor = Arc::new(ScriptedAdvisor {
        repeat_patch: Some("<COMMAND>true</COMMAND>".to_string()),
        ..Default::default()
    });
    let session = session().with_advisor(advisor.clone());
    session.initialize_commands(["echo boom; exit 4"]);

    let outcome = session.execute_next().await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Failed {
            command: "echo boom; exit 4".to_string(),
            output: "boom\n".to_string(),
            attempts: 3,
            error: StepError::NonZeroExit(4),
        }
    );
    // Asked for a patch after each attempt but the last.
    assert_eq!(advisor.analyze_calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.current_index(), 1);
    assert_eq!(session.result(), "");
}

#[tokio::test]
async fn output_events_keep_order_between_start_and_finish() {
    let session = session();
    let mut observer = session.subscribe();
    session.initialize_commands(["echo one; echo two; echo three"]);
    session.execute_next().await.unwrap();

    let kinds: Vec<EventType> = observer.drain().iter().map(Event::event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::CommandStarted,
            EventType::OutputLine,
            EventType::OutputLine,
            EventType::OutputLine,
            EventType::CommandFinished,
        ]
    );
}

#[tokio::test]
async fn installation_output_is_not_accumulated() {
    let session = session();
    session.initialize_commands([
        "apt-get install --version >/dev/null 2>&1; echo installed",
        "echo done",
    ]);

    let install = session.execute_next().await.unwrap();
    assert!(matches!(install, StepOutcome::Succeeded { ref output, .. } if output == "installed\n"));
    session.execute_next().await.unwrap();
    assert_eq!(session.result(), "done\n");
}

// --- Safety ---

#[tokio::test]
async fn unsafe_command_is_rejected_without_launch() {
    let session = session();
    let mut observer = session.subscribe();
    session.initialize_commands(["reboot", "echo ok"]);

    let outcome = session.execute_next().await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Rejected {
            command: "reboot".to_string(),
            error: StepError::UnsafeCommand("system reboot".to_string()),
        }
    );
    assert!(!outcome.success());
    assert_eq!(outcome.output(), "system reboot");
    assert_eq!(session.current_index(), 1);

    let events = observer.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), EventType::CommandRejected);

    session.execute_next().await.unwrap();
    assert_eq!(session.result(), "ok\n");
}

#[tokio::test]
async fn unsafe_patch_commands_are_not_run() {
    let advisor = Arc::new(ScriptedAdvisor {
        repeat_patch: Some("<COMMAND>reboot</COMMAND>".to_string()),
        ..Default::default()
    });
    let config = Config {
        max_attempts: 2,
        ..test_config()
    };
    let session = session_with(config).with_advisor(advisor);
    let mut observer = session.subscribe();
    session.initialize_commands(["exit 1"]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            attempts: 2,
            error: StepError::NonZeroExit(1),
            ..
        }
    ));

    let events = observer.drain();
    assert_eq!(started_commands(&events), vec!["exit 1", "exit 1"]);
    assert!(events
        .iter()
        .any(|e| e.event_type() == EventType::CommandRejected
            && e.command.as_deref() == Some("reboot")));
}

// --- Recovery ---

#[tokio::test]
async fn advisor_patch_fixes_failure() {
    let dir = TempDir::new().unwrap();
    let marker = marker_in(dir.path());
    let advisor = Arc::new(ScriptedAdvisor {
        patches: Mutex::new(VecDeque::from([format!(
            "Create the file first:\n<COMMAND>echo patching; touch {}</COMMAND>",
            marker.display()
        )])),
        ..Default::default()
    });
    let session = session().with_advisor(advisor);
    let mut observer = session.subscribe();
    session.initialize_commands([format!("test -f {} && echo ok", marker.display())]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(outcome, StepOutcome::Succeeded { ref output, .. } if output == "ok\n"));
    assert_eq!(session.result(), "ok\n");

    let patch_started = observer.drain().into_iter().any(|e| {
        matches!(
            e.payload,
            pilot_core::EventPayload::CommandStarted { position: None, .. }
        )
    });
    assert!(patch_started);
}

#[tokio::test]
async fn missing_tool_is_installed_without_consuming_an_attempt() {
    let dir = TempDir::new().unwrap();
    let marker = marker_in(dir.path());
    let installer = Arc::new(MarkerInstaller {
        marker: marker.clone(),
        installed: Mutex::new(Vec::new()),
    });
    let config = Config {
        max_attempts: 1,
        ..test_config()
    };
    let recovery = LocalRecovery::with_installer(&config, installer.clone());
    let session = session_with(config).with_recovery(Arc::new(recovery));
    let mut observer = session.subscribe();

    let command = format!(
        "test -f {} || {{ echo 'bash: mytool: command not found'; exit 127; }}; echo ready",
        marker.display()
    );
    session.initialize_commands([command.clone()]);

    let outcome = session.execute_next().await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Succeeded {
            command: command.clone(),
            output: "ready\n".to_string(),
        }
    );
    assert_eq!(*installer.installed.lock().unwrap(), vec!["mytool"]);

    let events = observer.drain();
    assert_eq!(started_commands(&events), vec![command.clone(), command]);
    assert!(events
        .iter()
        .any(|e| e.event_type() == EventType::RecoveryApplied));
}

#[tokio::test]
async fn permission_denied_retries_with_escalation_prefix() {
    let config = Config {
        max_attempts: 1,
        auto_install: false,
        escalation_prefix: "PILOT_ESCALATED=1 ".to_string(),
        ..test_config()
    };
    let session = session_with(config.clone())
        .with_recovery(Arc::new(LocalRecovery::from_config(&config)));
    let mut observer = session.subscribe();

    let command =
        r#"sh -c 'test "$PILOT_ESCALATED" = 1 || { echo "Permission denied"; exit 1; }; echo escalated'"#;
    session.initialize_commands([command]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(outcome, StepOutcome::Succeeded { ref output, .. } if output == "escalated\n"));
    assert_eq!(
        started_commands(&observer.drain()),
        vec![command.to_string(), format!("PILOT_ESCALATED=1 {command}")]
    );
}

#[tokio::test]
async fn escalation_prefix_is_applied_once() {
    let config = Config {
        auto_install: false,
        escalation_prefix: "env ".to_string(),
        ..test_config()
    };
    let session = session_with(config.clone())
        .with_recovery(Arc::new(LocalRecovery::from_config(&config)));
    let mut observer = session.subscribe();
    session.initialize_commands(["echo Permission denied; exit 1"]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            attempts: 1,
            error: StepError::RecoveryUnhandled,
            ..
        }
    ));
    assert_eq!(
        started_commands(&observer.drain()),
        vec![
            "echo Permission denied; exit 1",
            "env echo Permission denied; exit 1"
        ]
    );
}

#[tokio::test]
async fn local_fixes_are_bounded_per_step() {
    let hook = Arc::new(FixedRemedy::new(Remedy::Handled));
    let session = session().with_recovery(hook.clone());
    let mut observer = session.subscribe();
    session.initialize_commands(["exit 1"]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            attempts: 1,
            error: StepError::RecoveryUnhandled,
            ..
        }
    ));
    assert_eq!(hook.calls.load(Ordering::SeqCst), 3);
    // The original launch plus one relaunch per local fix.
    assert_eq!(started_commands(&observer.drain()).len(), 4);
    assert_eq!(session.current_index(), 1);
}

#[tokio::test]
async fn unsafe_modified_command_is_never_launched() {
    let hook = Arc::new(FixedRemedy::new(Remedy::ModifiedCommand(
        "reboot".to_string(),
    )));
    let session = session().with_recovery(hook.clone());
    let mut observer = session.subscribe();
    session.initialize_commands(["exit 2"]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            attempts: 1,
            error: StepError::RecoveryUnhandled,
            ..
        }
    ));
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    let events = observer.drain();
    assert_eq!(started_commands(&events), vec!["exit 2"]);
    assert!(!events
        .iter()
        .any(|e| e.event_type() == EventType::RecoveryApplied));
}

#[tokio::test]
async fn launch_failures_count_as_attempts() {
    let advisor = Arc::new(ScriptedAdvisor {
        repeat_patch: Some("<COMMAND>true</COMMAND>".to_string()),
        ..Default::default()
    });
    let config = Config {
        shell: "/nonexistent/pilot-shell".to_string(),
        max_attempts: 2,
        ..test_config()
    };
    let session = session_with(config).with_advisor(advisor);
    session.initialize_commands(["echo unreachable"]);

    let outcome = session.execute_next().await.unwrap();
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            attempts: 2,
            error: StepError::LaunchFailed(_),
            ..
        }
    ));
    assert_eq!(session.current_index(), 1);
}

// --- Skip & pause ---

#[tokio::test]
async fn skip_terminates_running_command() {
    let session = Arc::new(session());
    session.initialize_commands(["sleep 10", "echo after"]);

    let started = Instant::now();
    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.skip();

    let outcome = step.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Skipped {
            command: "sleep 10".to_string()
        }
    );
    assert!(outcome.success());
    assert_eq!(outcome.output(), "skipped");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.result(), "");
    assert_eq!(session.current_index(), 1);

    session.execute_next().await.unwrap();
    assert_eq!(session.result(), "after\n");
}

#[tokio::test]
async fn skip_force_kills_process_ignoring_sigterm() {
    let config = Config {
        terminate_grace_ms: 300,
        ..test_config()
    };
    let session = Arc::new(session_with(config));
    let mut observer = session.subscribe();
    session.initialize_commands(["trap '' TERM; echo ready; sleep 10"]);

    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    wait_for_line(&mut observer, "ready").await;

    let skipped_at = Instant::now();
    session.skip();
    let outcome = step.await.unwrap().unwrap();
    assert!(matches!(outcome, StepOutcome::Skipped { .. }));
    assert!(skipped_at.elapsed() < Duration::from_secs(3));
    assert_eq!(session.result(), "");
}

#[tokio::test]
async fn skip_during_recovery_skips_failing_step_only() {
    let hook = Arc::new(FixedRemedy::slow(
        Remedy::Unhandled,
        Duration::from_millis(300),
    ));
    let session = Arc::new(session().with_recovery(hook));
    session.initialize_commands(["echo x; exit 1", "echo b"]);

    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!step.is_finished());
    session.skip();

    let first = step.await.unwrap().unwrap();
    assert_eq!(
        first,
        StepOutcome::Skipped {
            command: "echo x; exit 1".to_string()
        }
    );
    assert_eq!(session.current_index(), 1);

    let second = session.execute_next().await.unwrap();
    assert!(matches!(second, StepOutcome::Succeeded { ref output, .. } if output == "b\n"));
    assert_eq!(session.result(), "b\n");
}

#[tokio::test]
async fn pause_and_resume_leave_same_final_state() {
    let commands = ["echo 1", "echo 2", "echo 3"];

    let plain = session();
    plain.initialize_commands(commands);
    while !plain.is_complete() {
        plain.execute_next().await.unwrap();
    }

    let paused = Arc::new(session());
    paused.initialize_commands(commands);
    while !paused.is_complete() {
        paused.pause();
        assert_eq!(paused.state(), SessionState::Paused);
        let resumer = {
            let session = Arc::clone(&paused);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                session.resume();
            })
        };
        paused.execute_next().await.unwrap();
        resumer.await.unwrap();
    }

    assert_eq!(paused.result(), plain.result());
    assert_eq!(paused.current_index(), plain.current_index());
    assert_eq!(paused.state(), SessionState::Completed);
}

// --- Revisions ---

#[tokio::test]
async fn confirming_revision_resets_cursor_and_result() {
    let advisor = Arc::new(ScriptedAdvisor {
        discussion: Some("Use this instead:\n<COMMAND>echo new</COMMAND>".to_string()),
        ..Default::default()
    });
    let session = session().with_advisor(advisor);
    session.initialize_commands(["echo old", "echo more"]);
    session.execute_next().await.unwrap();
    assert_eq!(session.result(), "old\n");

    let discussion = session.discuss("print new instead").await;
    assert_eq!(discussion, Discussion::Revision(vec!["echo new".to_string()]));
    // Staged only.
    assert_eq!(session.list_commands(), vec!["echo old", "echo more"]);

    assert!(session.confirm_revision());
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.result(), "");
    assert_eq!(session.list_commands(), vec!["echo new"]);
    assert!(!session.confirm_revision());

    session.execute_next().await.unwrap();
    assert_eq!(session.result(), "new\n");
}

#[tokio::test]
async fn revision_confirmed_mid_step_applies_after_step() {
    let advisor = Arc::new(ScriptedAdvisor {
        discussion: Some("<COMMAND>echo new</COMMAND>".to_string()),
        ..Default::default()
    });
    let session = Arc::new(session().with_advisor(advisor));
    let mut observer = session.subscribe();
    session.initialize_commands(["echo started; sleep 0.5; echo old"]);

    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    wait_for_line(&mut observer, "started").await;

    assert!(matches!(
        session.discuss("replace it").await,
        Discussion::Revision(_)
    ));
    assert!(session.confirm_revision());
    assert_eq!(session.list_commands(), vec!["echo started; sleep 0.5; echo old"]);

    let outcome = step.await.unwrap().unwrap();
    assert!(matches!(outcome, StepOutcome::Succeeded { .. }));
    assert_eq!(session.list_commands(), vec!["echo new"]);
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.result(), "");
}

#[tokio::test]
async fn confirmed_revision_survives_later_discussion() {
    let advisor = Arc::new(ScriptedAdvisor {
        discussion: Some("<COMMAND>echo new</COMMAND>".to_string()),
        ..Default::default()
    });
    let session = Arc::new(session().with_advisor(advisor));
    let mut observer = session.subscribe();
    session.initialize_commands(["echo started; sleep 0.5; echo old"]);

    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    wait_for_line(&mut observer, "started").await;

    assert!(matches!(
        session.discuss("replace it").await,
        Discussion::Revision(_)
    ));
    assert!(session.confirm_revision());

    // A second proposal cannot displace the confirmed one.
    assert!(matches!(
        session.discuss("something else").await,
        Discussion::Reply(_)
    ));
    assert!(session.pending_revision().is_some_and(|r| r.confirmed));

    step.await.unwrap().unwrap();
    assert_eq!(session.list_commands(), vec!["echo new"]);
    assert!(session.pending_revision().is_none());
}

#[tokio::test]
async fn discussion_without_commands_returns_reply() {
    let advisor = Arc::new(ScriptedAdvisor {
        discussion: Some("The list looks fine to me.".to_string()),
        ..Default::default()
    });
    let session = session().with_advisor(advisor);
    session.initialize_commands(["echo a"]);

    let discussion = session.discuss("is this right?").await;
    assert_eq!(
        discussion,
        Discussion::Reply("The list looks fine to me.".to_string())
    );
    assert!(session.pending_revision().is_none());
    assert!(!session.confirm_revision());
}

#[tokio::test]
async fn replace_commands_fails_while_step_in_flight() {
    let session = Arc::new(session());
    let mut observer = session.subscribe();
    session.initialize_commands(["echo started; sleep 0.3"]);

    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    wait_for_line(&mut observer, "started").await;

    assert!(matches!(
        session.replace_commands(["echo other"]),
        Err(SessionError::StepInProgress)
    ));
    step.await.unwrap().unwrap();

    session.replace_commands(["echo other"]).unwrap();
    assert_eq!(session.list_commands(), vec!["echo other"]);
}

#[tokio::test]
async fn initialize_mid_step_discards_stale_result() {
    let session = Arc::new(session());
    let mut observer = session.subscribe();
    session.initialize_commands(["echo started; sleep 10"]);

    let step = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute_next().await })
    };
    wait_for_line(&mut observer, "started").await;

    session.initialize_commands(["echo fresh"]);
    let outcome = step.await.unwrap().unwrap();
    assert!(matches!(outcome, StepOutcome::Skipped { .. }));
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.list_commands(), vec!["echo fresh"]);

    session.execute_next().await.unwrap();
    assert_eq!(session.result(), "fresh\n");
}

// --- Collaborators ---

#[tokio::test]
async fn initialize_generates_commands_from_description() {
    let advisor = Arc::new(ScriptedAdvisor {
        generated: Some("<COMMAND>echo generated</COMMAND>".to_string()),
        ..Default::default()
    });
    let session = session().with_advisor(advisor);

    let commands = session.initialize("say something").await.unwrap();
    assert_eq!(commands, vec!["echo generated"]);
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.system_info().os, "TestOS");
}

#[tokio::test]
async fn initialize_without_tagged_commands_fails() {
    let advisor = Arc::new(ScriptedAdvisor {
        generated: Some("I cannot help with that.".to_string()),
        ..Default::default()
    });
    let session = session().with_advisor(advisor);

    let err = session.initialize("anything").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Generation(CollaboratorError::NoCommandsExtracted)
    ));
}

#[tokio::test]
async fn summarize_falls_back_to_raw_result() {
    let session = session().with_summarizer(Arc::new(FailingSummarizer));
    session.initialize_commands(["echo raw"]);
    session.execute_next().await.unwrap();
    assert_eq!(session.summarize().await, "raw\n");
}

#[tokio::test]
async fn worker_publishes_completion_then_summary() {
    let session = Arc::new(session());
    let mut observer = session.subscribe();
    session.initialize_commands(["echo x", "false", "echo y"]);

    let summary = spawn_worker(Arc::clone(&session)).await.unwrap().unwrap();
    assert_eq!(summary, "x\ny\n");

    let tail: Vec<EventType> = observer
        .drain()
        .iter()
        .rev()
        .take(2)
        .map(Event::event_type)
        .collect();
    assert_eq!(tail, vec![EventType::Summary, EventType::TaskCompleted]);
}
