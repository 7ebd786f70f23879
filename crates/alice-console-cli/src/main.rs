//! Alice console - terminal front end for the Alice agent server.
//!
//! This is the entry point for the `alice` binary.

mod commands;
mod transcript;

use std::io::Write;
use std::sync::Arc;

use alice_console_core::{
    AgentClient, ConsoleConfig, ConsoleError, Diagnostics, ExchangeOutcome, History,
    InterruptOutcome, StatusPoller, StatusSnapshot, StreamController,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use commands::{Command, HELP};
use transcript::Transcript;

type Controller = StreamController<AgentClient>;

/// Alice console - chat with the Alice agent from a terminal.
#[derive(Parser, Debug)]
#[command(name = "alice")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent server URL.
    #[arg(long, env = "ALICE_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Sidebar status refresh interval in seconds.
    #[arg(long, env = "ALICE_STATUS_POLL_SECONDS", default_value_t = 5)]
    status_poll_seconds: u64,

    /// Skip loading the persisted conversation on startup.
    #[arg(long, default_value = "false")]
    fresh: bool,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "alice_console=debug,warn"
    } else {
        "alice_console=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ConsoleConfig {
        base_url: args.api_url,
        status_poll_seconds: args.status_poll_seconds,
        ..ConsoleConfig::default()
    };

    let client = Arc::new(AgentClient::new(&config)?);
    let diagnostics = Diagnostics::new(config.diagnostics_capacity);
    let controller = Arc::new(StreamController::with_diagnostics(
        Arc::clone(&client),
        diagnostics.clone(),
    ));

    let poller = StatusPoller::new(
        Arc::clone(&client),
        config.status_poll_interval(),
        controller.finished_signal(),
        diagnostics,
    );
    let status = poller.subscribe();
    let shutdown = CancellationToken::new();
    let poller_task = tokio::spawn(poller.run(shutdown.clone()));

    if !args.fresh {
        if let Err(e) = controller.load_history().await {
            tracing::warn!(error = %e, "Failed to load history");
        }
    }

    let printer = tokio::spawn(print_transcript(controller.subscribe(), shutdown.clone()));

    println!("Connected to {}. Type /help for commands.", client.base_url());
    let result = run_repl(&controller, &client, &status).await;

    controller.interrupt().await;
    shutdown.cancel();
    let _ = printer.await;
    let _ = poller_task.await;

    result
}

/// Print every history snapshot change until shutdown.
async fn print_transcript(mut history: watch::Receiver<History>, shutdown: CancellationToken) {
    let mut transcript = Transcript::default();
    loop {
        let snapshot = history.borrow_and_update().clone();
        emit(&transcript.render(&snapshot));

        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = history.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn emit(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// Read input lines until `/quit` or end of input.
async fn run_repl(
    controller: &Arc<Controller>,
    client: &AgentClient,
    status: &watch::Receiver<Option<StatusSnapshot>>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_command(Command::parse(&line), controller, client, status).await {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                match controller.interrupt().await {
                    InterruptOutcome::NotActive => println!("(nothing to interrupt, /quit to leave)"),
                    InterruptOutcome::AlreadyRequested => {}
                    InterruptOutcome::Cancelled { notice_delivered } => {
                        if !notice_delivered {
                            println!("(stopped locally, the server did not acknowledge)");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Handle one command. Returns `false` to leave the console.
async fn handle_command(
    command: Command,
    controller: &Arc<Controller>,
    client: &AgentClient,
    status: &watch::Receiver<Option<StatusSnapshot>>,
) -> bool {
    match command {
        Command::Empty => {}
        Command::Quit => return false,
        Command::Help => println!("{HELP}"),
        Command::Unknown(name) => println!("Unknown command /{name}. Type /help."),
        Command::Message(text) => {
            if controller.state().is_active() {
                println!("(still answering, press Ctrl-C to interrupt)");
            } else {
                start_exchange(Arc::clone(controller), text);
            }
        }
        Command::History => {
            emit(&Transcript::default().render(&controller.history()));
        }
        Command::Clear => match controller.clear_history().await {
            Ok(()) => {}
            Err(ConsoleError::Busy) => println!("(cannot clear while answering)"),
            Err(e) => println!("Failed to clear history: {e}"),
        },
        Command::Status => match status.borrow().as_ref() {
            Some(snapshot) => emit(&commands::render_status(snapshot, |p| client.resolve(p))),
            None => println!("(status not loaded yet)"),
        },
        Command::Memory => match client.memory().await {
            Ok(memory) => emit(&commands::render_memory(&memory)),
            Err(e) => println!("Failed to load memory: {e}"),
        },
        Command::Diagnostics => {
            emit(&commands::render_diagnostics(
                &controller.diagnostics().snapshot(),
            ));
        }
    }
    true
}

/// Run one exchange in the background so Ctrl-C stays responsive.
fn start_exchange(controller: Arc<Controller>, text: String) {
    tokio::spawn(async move {
        match controller.send(&text).await {
            Ok(ExchangeOutcome::Completed { .. }) => {}
            Ok(ExchangeOutcome::Cancelled) => println!("-- interrupted --"),
            Ok(ExchangeOutcome::Failed { message }) => println!("-- request failed: {message} --"),
            Err(ConsoleError::Busy) => println!("(still answering, press Ctrl-C to interrupt)"),
            Err(e) => println!("{e}"),
        }
    });
}
