//! alpha-count: send a file over TCP and count its alphabetic characters
//!
//! Two modes share one binary:
//! - `serve`: accept connections, read each payload until the peer
//!   half-closes, reply with the count of alphabetic characters
//! - `send`: stream a file to a server and print the reply
//!
//! Configuration via CLI arguments or TOML file. Diagnostics go to stderr;
//! only the server's reply is written to stdout.

mod client;
mod config;
mod error;
mod net;
mod server;
mod transport;
mod worker;

use client::Client;
use config::{ClientConfig, Config, Mode, ServerConfig};
use error::{ClientError, ConfigError, EXIT_INTERRUPTED, EXIT_OK};
use server::Server;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            let code = e.exit_code();
            match e {
                // clap formats its own usage and help output
                ConfigError::Cli(e) => {
                    let _ = e.print();
                }
                e => eprintln!("Error: {e}"),
            }
            return ExitCode::from(code);
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::from(error::EXIT_IO);
        }
    };

    let code = match config.mode {
        Mode::Serve(server) => runtime.block_on(run_server(server)),
        Mode::Send {
            target,
            file,
            client,
        } => runtime.block_on(run_client(target, file, client)),
    };

    // Abandon in-flight workers instead of waiting for them.
    runtime.shutdown_background();
    ExitCode::from(code)
}

async fn run_server(config: ServerConfig) -> u8 {
    match net::local_ip() {
        Some(ip) => info!(ip = %ip, "Server IP address"),
        None => warn!("Unable to retrieve local IP address"),
    }

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            return e.exit_code();
        }
    };
    info!(address = %server.local_addr(), "Accepting connections");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    match server.run(shutdown_rx).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!(error = %e, "Server failed");
            e.exit_code()
        }
    }
}

async fn run_client(target: String, file: PathBuf, config: ClientConfig) -> u8 {
    info!(
        server = %target,
        file = %file.display(),
        chunk_size = config.chunk_size,
        "Sending file"
    );

    let client = Client::new(config);
    let result = tokio::select! {
        result = client.send_file(&target, &file) => result,
        _ = shutdown_signal() => Err(ClientError::Interrupted),
    };

    match result {
        Ok(reply) => {
            println!("Server response: {reply}");
            EXIT_OK
        }
        Err(ClientError::Interrupted) => {
            warn!("Interrupted, connection closed");
            EXIT_INTERRUPTED
        }
        Err(e) => {
            error!(error = %e, "Transfer failed");
            e.exit_code()
        }
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}
