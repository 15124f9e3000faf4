//! dockhand - Entry Point
//!
//! Provisions a Linux host over SSH and deploys a containerized application
//! from a Git repository behind an Nginx reverse proxy.

use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

use dockhand::app::options::Cli;
use dockhand::app::run::prepare;

/// Exit status after an interrupt, as a shell would report it
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Prompts block the thread, so they finish before signals are watched
    let session = match prepare(cli).await {
        Ok(session) => session,
        Err(code) => return exit_code(code),
    };

    // Dropping the run future kills child processes and flushes the log
    tokio::select! {
        code = session.run() => exit_code(code),
        _ = await_shutdown_signal() => ExitCode::from(EXIT_INTERRUPTED),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                warn!("SIGTERM received, aborting deployment...");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl+C received, aborting deployment...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        warn!("Ctrl+C received, aborting deployment...");
    }
}
