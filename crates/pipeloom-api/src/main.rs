//! pipeloom CLI and REST API entry point.
//!
//! Binary name: `ploom`
//!
//! Parses CLI arguments, initializes tracing and application state, then
//! dispatches to the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use clap::Parser;
use clap_complete::generate;
use dashmap::DashMap;
use uuid::Uuid;

use pipeloom_core::workflow::engine::StopHandle;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = pipeloom_observe::verbosity_filter(cli.verbose, cli.quiet);
    pipeloom_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let outcome = dispatch(cli).await;
    pipeloom_observe::shutdown_tracing();
    outcome
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Neither needs app state (or an API key)
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "ploom", &mut std::io::stdout());
        }

        Commands::Validate { file } => {
            cli::validate::validate_workflow(&file, cli.json, cli.quiet)?;
        }

        Commands::Run {
            file,
            input,
            stream,
        } => {
            let state = AppState::init().await?;
            let opts = cli::run::RunOptions {
                stream,
                json: cli.json,
                quiet: cli.quiet,
            };
            cli::run::run_workflow(&state, &file, input, opts).await?;
        }

        Commands::Serve { port, host } => {
            let state = AppState::init().await?;
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} pipeloom API listening on {}",
                    console::style("*").bold(),
                    console::style(format!("http://{addr}/api/v1")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }
            tracing::info!(
                %addr,
                provider = %state.config.llm.provider,
                data_dir = %state.data_dir.display(),
                "server started"
            );

            let runs = state.runs.clone();
            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(runs))
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then ask every active run to stop.
async fn shutdown_signal(runs: Arc<DashMap<Uuid, StopHandle>>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    for entry in runs.iter() {
        entry.value().stop();
    }
    tracing::info!(active_runs = runs.len(), "shutdown requested, stopping active runs");
}
