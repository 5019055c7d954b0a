//! Process runner for executing one shell command at a time.
//!
//! Key responsibilities:
//! - Launch a command through the configured shell in its own process group
//! - Merge stdout and stderr into one ordered line stream
//! - Publish every line to the event sink before handing it to the caller
//! - Terminate cooperatively (SIGTERM), escalating to SIGKILL after a grace period

use pilot_core::{Config, EventPayload};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sink::EventSink;

/// Lines buffered between the pipe readers and the consumer.
const LINE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Whether the OS refused the spawn for lack of resources.
    ///
    /// These are the only launch failures that abort a task.
    pub fn is_resource_exhaustion(&self) -> bool {
        let Self::Launch { source, .. } = self;
        if source.kind() == std::io::ErrorKind::OutOfMemory {
            return true;
        }
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            if let Some(code) = source.raw_os_error() {
                return [Errno::EAGAIN, Errno::ENOMEM, Errno::ENFILE, Errno::EMFILE]
                    .iter()
                    .any(|errno| *errno as i32 == code);
            }
        }
        false
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell used as `<shell> -c <command>`.
    pub shell: String,
    pub working_dir: Option<PathBuf>,
    /// Time between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    /// Bounded wait for trailing output after the process exited.
    pub drain_timeout: Duration,
    /// Output kept in memory per command; lines past it still stream to the sink.
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shell: config.shell.clone(),
            working_dir: config.working_dir.clone(),
            grace_period: config.terminate_grace(),
            drain_timeout: config.drain_timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// Liveness as reported by `ProcessHandle::poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(i32),
}

/// How `terminate` brought the process down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Graceful,
    Forced,
}

/// How a streamed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(i32),
    Cancelled,
}

/// Result of streaming a command to the end.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: RunStatus,
    /// Merged output, one `\n`-terminated entry per line.
    pub output: String,
    pub truncated: bool,
    pub duration_ms: u64,
}

impl RunOutput {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Exited(0)
    }
}

/// Copy lines from one pipe into the shared channel.
///
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn pump_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                debug!(error = %err, "pipe read failed");
                break;
            }
        }
    }
}

/// Live handle on one launched command.
#[derive(Debug)]
pub struct ProcessHandle {
    command: String,
    child: Child,
    lines: mpsc::Receiver<String>,
    sink: EventSink,
    drain_timeout: Duration,
    exit_code: Option<i32>,
    eof: bool,
}

impl ProcessHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn record_exit(&mut self, status: std::io::Result<std::process::ExitStatus>) -> i32 {
        let code = match status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(err) => {
                warn!(command = %self.command, error = %err, "failed to collect exit status");
                -1
            }
        };
        self.exit_code = Some(code);
        code
    }

    /// Next merged output line, or `None` at end of output.
    ///
    /// After the process exits, buffered output is drained with a bounded
    /// wait so a lingering grandchild holding the pipe cannot stall us.
    pub async fn read_line(&mut self) -> Option<String> {
        if self.eof {
            return None;
        }
        loop {
            let line = if self.exit_code.is_some() {
                match timeout(self.drain_timeout, self.lines.recv()).await {
                    Ok(line) => line,
                    Err(_) => {
                        warn!(command = %self.command, "output drain timed out");
                        None
                    }
                }
            } else {
                tokio::select! {
                    line = self.lines.recv() => line,
                    status = self.child.wait() => {
                        self.record_exit(status);
                        continue;
                    }
                }
            };

            return match line {
                Some(line) => {
                    self.sink.command_event(
                        &self.command,
                        EventPayload::OutputLine { line: line.clone() },
                    );
                    Some(line)
                }
                None => {
                    self.eof = true;
                    None
                }
            };
        }
    }

    pub fn poll(&mut self) -> ProcessStatus {
        if let Some(code) = self.exit_code {
            return ProcessStatus::Exited(code);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => ProcessStatus::Exited(self.record_exit(Ok(status))),
            Ok(None) => ProcessStatus::Running,
            Err(err) => ProcessStatus::Exited(self.record_exit(Err(err))),
        }
    }

    /// Wait for the process to exit and return its code (`-1` for signal deaths).
    pub async fn wait(&mut self) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        let status = self.child.wait().await;
        self.record_exit(status)
    }

    /// SIGTERM the process group, then SIGKILL once `grace_period` elapses.
    ///
    /// Terminating an exited process is a no-op.
    pub async fn terminate(&mut self, grace_period: Duration) -> Termination {
        if let ProcessStatus::Exited(_) = self.poll() {
            return Termination::AlreadyExited;
        }

        debug!(command = %self.command, pid = ?self.pid(), "sending SIGTERM");
        self.signal_group(false);

        match timeout(grace_period, self.child.wait()).await {
            Ok(status) => {
                self.record_exit(status);
                Termination::Graceful
            }
            Err(_) => {
                warn!(
                    command = %self.command,
                    grace_ms = grace_period.as_millis() as u64,
                    "process ignored SIGTERM; killing"
                );
                self.signal_group(true);
                if let Err(err) = self.child.kill().await {
                    warn!(command = %self.command, error = %err, "failed to kill process");
                }
                let status = self.child.wait().await;
                self.record_exit(status);
                Termination::Forced
            }
        }
    }

    #[cfg(unix)]
    fn signal_group(&mut self, force: bool) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return;
        };
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        if let Err(err) = killpg(Pid::from_raw(pid as i32), signal) {
            debug!(command = %self.command, error = %err, "signal delivery failed");
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _force: bool) {
        if let Err(err) = self.child.start_kill() {
            debug!(command = %self.command, error = %err, "kill failed");
        }
    }
}

/// Accumulates output lines up to a byte limit.
#[derive(Debug)]
struct BoundedOutput {
    buf: String,
    max_bytes: usize,
    truncated: bool,
}

impl BoundedOutput {
    fn new(max_bytes: usize) -> Self {
        Self {
            buf: String::new(),
            max_bytes,
            truncated: false,
        }
    }

    fn push_line(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        if self.buf.len() + line.len() + 1 > self.max_bytes {
            warn!(max_bytes = self.max_bytes, "output exceeded limit, truncating");
            self.truncated = true;
            return;
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }
}

/// Launches commands and streams their output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
    sink: EventSink,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig, sink: EventSink) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Launch `command` with stdout and stderr merged into one line stream.
    pub fn start(&self, command: &str) -> Result<ProcessHandle> {
        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Launch {
            command: command.to_string(),
            source,
        })?;

        debug!(command, pid = ?child.id(), "spawned process");

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx));
        }

        Ok(ProcessHandle {
            command: command.to_string(),
            child,
            lines,
            sink: self.sink.clone(),
            drain_timeout: self.config.drain_timeout,
            exit_code: None,
            eof: false,
        })
    }

    /// Run `command` to completion, or until `cancel` fires.
    ///
    /// Cancellation terminates the process with the configured grace period.
    pub async fn run(&self, command: &str, cancel: &CancellationToken) -> Result<RunOutput> {
        let started = Instant::now();
        let mut handle = self.start(command)?;
        let mut output = BoundedOutput::new(self.config.max_output_bytes);

        let mut streaming = true;
        let status = loop {
            if streaming {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break self.cancel(&mut handle).await,
                    line = handle.read_line() => match line {
                        Some(line) => output.push_line(&line),
                        None => streaming = false,
                    },
                }
            } else {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break self.cancel(&mut handle).await,
                    code = handle.wait() => break RunStatus::Exited(code),
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if let RunStatus::Exited(exit_code) = status {
            info!(
                command,
                exit_code,
                duration_ms,
                output_bytes = output.buf.len(),
                "command finished"
            );
            self.sink.command_event(
                command,
                EventPayload::CommandFinished {
                    exit_code,
                    duration_ms,
                },
            );
        }

        Ok(RunOutput {
            status,
            output: output.buf,
            truncated: output.truncated,
            duration_ms,
        })
    }

    async fn cancel(&self, handle: &mut ProcessHandle) -> RunStatus {
        let termination = handle.terminate(self.config.grace_period).await;
        info!(command = %handle.command(), ?termination, "command cancelled");
        RunStatus::Cancelled
    }
}
