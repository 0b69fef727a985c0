//! px-console CLI
//!
//! Opens a termproxy console tunnel and relays the local terminal
//! through it until the user detaches with Ctrl+].

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use px_console::args::Cli;
use px_console::output::{print_error, print_info, print_success, print_warning};
use px_console::terminal::{run_console, CrosstermSize, ExitReason};
use px_relay::{ConsoleRelay, WebSocketConnector};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Console output owns stdout; logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = cli.load_config()?;
    let request = cli.into_request(config)?;

    let connector = WebSocketConnector::from_config(&request.config);
    let relay = ConsoleRelay::new(connector, request.config.relay.clone())
        .with_size_source(Arc::new(CrosstermSize));

    print_info(&format!("Connecting to {}...", request.target));
    let session = match relay
        .open_with_retry(&request.target, &request.credential, &request.config.backoff)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            // Reported here; returning the error would print it again
            print_error(&format!("Failed to open console: {}", e));
            return Ok(ExitCode::FAILURE);
        }
    };
    print_success("Connected (Press Ctrl+] to detach)");

    match run_console(session).await? {
        ExitReason::Detached => print_success("Detached from console"),
        ExitReason::ConsoleClosed => print_info("Console closed"),
        ExitReason::InputClosed => print_warning("Terminal input closed"),
    }

    Ok(ExitCode::SUCCESS)
}
