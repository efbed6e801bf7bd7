//! CLI command definitions for the `ploom` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Validate and run streaming LLM workflow graphs.
#[derive(Parser)]
#[command(name = "ploom", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "PIPELOOM_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a workflow file for structural errors without running it.
    Validate {
        /// Path to a `.json`, `.yaml` or `.yml` workflow file.
        file: PathBuf,
    },

    /// Run a workflow file.
    Run {
        /// Path to a `.json`, `.yaml` or `.yml` workflow file.
        file: PathBuf,

        /// Text handed to every input node.
        #[arg(short, long)]
        input: Option<String>,

        /// Print node output fragments as they are generated.
        #[arg(short, long)]
        stream: bool,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `[server] port` in pipeloom.toml).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `[server] host` in pipeloom.toml).
        #[arg(long)]
        host: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ploom", "run", "flow.yaml", "--input", "hi", "--stream", "-vv", "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                file,
                input,
                stream,
            } => {
                assert_eq!(file, PathBuf::from("flow.yaml"));
                assert_eq!(input.as_deref(), Some("hi"));
                assert!(stream);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn serve_overrides_are_optional() {
        let cli = Cli::try_parse_from(["ploom", "serve"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve {
                port: None,
                host: None
            }
        ));
    }
}
