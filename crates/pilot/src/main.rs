//! pilot - command orchestrator CLI
//!
//! Runs a command file to completion with the offline advisor.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use pilot::{spawn_worker, Observer, Session};
use pilot_core::reply::parse_command_list;
use pilot_core::{safety, CommandKind, Config, Event, EventPayload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Two interrupts within this window exit instead of skipping.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "pilot", about = "Sequential shell command orchestrator", version)]
struct Cli {
    /// Config file path (overrides ~/.config/pilot/config)
    #[arg(long, global = true, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the commands listed in a file
    Run {
        /// One command per line, or `<COMMAND>` tagged commands
        file: PathBuf,

        /// Do not install missing tools
        #[arg(long)]
        no_install: bool,

        /// Attempts per command before giving up
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Shell used to run each command
        #[arg(long)]
        shell: Option<String>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List the commands in a file with their classification
    Check {
        file: PathBuf,
    },
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            file,
            no_install,
            max_attempts,
            shell,
            json,
        } => {
            let mut config = config;
            if no_install {
                config.auto_install = false;
            }
            if let Some(attempts) = max_attempts {
                eyre::ensure!(attempts > 0, "--max-attempts must be at least 1");
                config.max_attempts = attempts;
            }
            if let Some(shell) = shell {
                config.shell = shell;
            }

            let commands = read_commands(&file)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .wrap_err("failed to create tokio runtime")?;
            let code = runtime.block_on(run(config, commands, json))?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Command::Check { file } => {
            for (i, command) in read_commands(&file)?.iter().enumerate() {
                let status = match safety::check(command) {
                    Ok(()) => CommandKind::classify(command).as_str().to_string(),
                    Err(rejection) => format!("unsafe ({})", rejection.rule),
                };
                println!("{:>3}. [{status}] {command}", i + 1);
            }
            Ok(())
        }
    }
}

/// CLI `--config` file, else the user config, else defaults.
fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default().wrap_err("failed to load user config")?,
    };
    if let Ok(cwd) = std::env::current_dir() {
        config.resolve_paths(&cwd);
    }
    Ok(config)
}

fn read_commands(file: &Path) -> eyre::Result<Vec<String>> {
    let content = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let commands = parse_command_list(&content);
    eyre::ensure!(!commands.is_empty(), "no commands in {}", file.display());
    Ok(commands)
}

async fn run(config: Config, commands: Vec<String>, json: bool) -> eyre::Result<i32> {
    let grace = config.terminate_grace();
    let session = Arc::new(Session::new(config));
    session.initialize_commands(commands);

    let printer = tokio::spawn(print_events(session.subscribe(), json));
    let exit = CancellationToken::new();
    let interrupts = tokio::spawn(handle_interrupts(session.clone(), exit.clone()));

    let mut worker = spawn_worker(session.clone());
    let code = tokio::select! {
        joined = &mut worker => {
            let summary = joined.wrap_err("worker panicked")??;
            // The summary event is the last one; let the printer reach it.
            let _ = printer.await;
            if !json {
                println!("\n--- summary ---\n{summary}");
            }
            0
        }
        () = exit.cancelled() => {
            // An empty task cancels the running command and lets the worker finish.
            session.initialize_commands(Vec::<String>::new());
            if tokio::time::timeout(grace + Duration::from_secs(1), worker).await.is_err() {
                warn!("worker did not stop in time");
            }
            printer.abort();
            130
        }
    };

    interrupts.abort();
    Ok(code)
}

/// First Ctrl-C skips the running command; a second one shortly after exits.
async fn handle_interrupts(session: Arc<Session>, exit: CancellationToken) {
    let mut last: Option<Instant> = None;
    while tokio::signal::ctrl_c().await.is_ok() {
        if last.is_some_and(|at| at.elapsed() < DOUBLE_INTERRUPT_WINDOW) {
            info!("interrupted twice, exiting");
            exit.cancel();
            return;
        }
        last = Some(Instant::now());
        info!("interrupt received, skipping current command (press again to exit)");
        session.skip();
    }
}

async fn print_events(mut observer: Observer, json: bool) {
    while let Some(event) = observer.recv().await {
        let done = matches!(event.payload, EventPayload::Summary { .. });
        if json {
            match event.to_json() {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to encode event"),
            }
        } else {
            print_event(&event);
        }
        if done {
            break;
        }
    }
}

fn print_event(event: &Event) {
    let command = event.command.as_deref().unwrap_or_default();
    let at = event.emitted_at.format("%H:%M:%S");
    match &event.payload {
        EventPayload::CommandStarted {
            position: Some(position),
            total,
            attempt,
        } => {
            if *attempt > 1 {
                println!("[{at}] ==> ({position}/{total}) {command} [attempt {attempt}]");
            } else {
                println!("[{at}] ==> ({position}/{total}) {command}");
            }
        }
        EventPayload::CommandStarted { position: None, .. } => {
            println!("[{at}] ==> patch: {command}");
        }
        EventPayload::OutputLine { line } => println!("{line}"),
        EventPayload::CommandFinished {
            exit_code,
            duration_ms,
        } => {
            if *exit_code != 0 {
                println!("[{at}] <== exit {exit_code} after {duration_ms}ms");
            }
        }
        EventPayload::CommandSkipped => println!("[{at}] --- skipped: {command}"),
        EventPayload::CommandRejected { rule } => {
            println!("[{at}] !!! rejected ({rule}): {command}");
        }
        EventPayload::RecoveryApplied { remedy } => println!("[{at}] +++ {remedy}"),
        EventPayload::TaskCompleted { result_bytes } => {
            println!("[{at}] task completed ({result_bytes} bytes of output)");
        }
        EventPayload::Summary { .. } => {}
    }
}
