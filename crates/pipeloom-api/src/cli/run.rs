//! `ploom run <file>`.
//!
//! Ctrl+C requests a graceful stop: active nodes finish, nothing new starts.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use futures_util::StreamExt;

use pipeloom_core::workflow::definition::load_workflow_file;
use pipeloom_core::workflow::engine::EngineError;
use pipeloom_core::workflow::graph::Graph;
use pipeloom_types::event::ExecutionEvent;
use pipeloom_types::execution::WorkflowExecutionResult;

use crate::cli::validate::print_report;
use crate::state::AppState;

/// Output switches for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub stream: bool,
    pub json: bool,
    pub quiet: bool,
}

pub async fn run_workflow(
    state: &AppState,
    path: &Path,
    input: Option<String>,
    opts: RunOptions,
) -> Result<()> {
    let doc = load_workflow_file(path)
        .with_context(|| format!("failed to load workflow from {}", path.display()))?;
    let graph = Arc::new(Graph::from_document(&doc)?);

    let engine = state.engine();
    let handle = match engine.execute_stream(graph, input.unwrap_or_default()) {
        Ok(handle) => handle,
        Err(EngineError::Validation(report)) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(path, &report);
            }
            bail!("workflow is invalid; nothing was run");
        }
        Err(e) => return Err(e.into()),
    };

    let stop = handle.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n  {} stopping: waiting for active nodes to finish...",
                style("!").yellow().bold()
            );
            stop.stop();
        }
    });

    let (mut events, outcome) = handle.into_parts();
    let mut printer = StreamPrinter::default();
    while let Some(event) = events.next().await {
        if opts.stream && opts.json {
            println!("{}", serde_json::to_string(&event)?);
        } else if opts.stream && !opts.quiet {
            printer.print(&event);
        }
    }
    interrupt.abort();

    let result = outcome.wait().await?;

    if opts.json && !opts.stream {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !opts.json && !opts.quiet {
        print_summary(&result, opts.stream);
    }

    if !result.success {
        bail!(
            "{}",
            result.error.as_deref().unwrap_or("workflow run failed")
        );
    }
    Ok(())
}

/// Renders live events for `--stream`: fragments to stdout, lifecycle to stderr.
#[derive(Default)]
struct StreamPrinter {
    /// Node whose fragments are currently being written.
    current: Option<String>,
}

impl StreamPrinter {
    fn print(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::NodeStart { node_id, node_type } => {
                self.end_fragment_line();
                eprintln!("  {} {} ({})", style(">").dim(), style(node_id).cyan(), node_type);
            }
            ExecutionEvent::Stream { node_id, content } => {
                if self.current.as_deref() != Some(node_id.as_str()) {
                    self.end_fragment_line();
                    print!("  {} ", style(format!("[{node_id}]")).dim());
                    self.current = Some(node_id.clone());
                }
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            ExecutionEvent::NodeComplete {
                node_id,
                success,
                error,
                execution_time_ms,
                ..
            } => {
                self.end_fragment_line();
                if *success {
                    eprintln!(
                        "  {} {} {}",
                        style("*").green(),
                        node_id,
                        style(format!("{execution_time_ms}ms")).dim()
                    );
                } else {
                    eprintln!(
                        "  {} {} {}",
                        style("x").red(),
                        node_id,
                        style(error.as_deref().unwrap_or("failed")).red()
                    );
                }
            }
            ExecutionEvent::StopRequested { message } => {
                self.end_fragment_line();
                eprintln!("  {} {}", style("!").yellow(), message);
            }
            ExecutionEvent::Start { .. }
            | ExecutionEvent::Complete { .. }
            | ExecutionEvent::Error { .. } => self.end_fragment_line(),
        }
    }

    fn end_fragment_line(&mut self) {
        if self.current.take().is_some() {
            println!();
        }
    }
}

fn print_summary(result: &WorkflowExecutionResult, streamed: bool) {
    println!();
    if result.success && result.was_stopped {
        println!(
            "  {} Run stopped after {} node(s) in {}ms",
            style("!").yellow().bold(),
            result.execution_order.len(),
            result.total_execution_time_ms
        );
    } else if result.success {
        println!(
            "  {} Run completed in {}ms",
            style("*").green().bold(),
            result.total_execution_time_ms
        );
    } else {
        println!(
            "  {} Run failed: {}",
            style("x").red().bold(),
            style(result.error.as_deref().unwrap_or("unknown error")).red()
        );
    }
    println!("  Run ID: {}", style(result.run_id).dim());
    println!();
    println!("{}", results_table(result));

    if let Some(output) = result.final_output.as_deref().filter(|_| !streamed) {
        println!();
        println!("  {}", style("Output:").bold());
        println!();
        println!("{output}");
    }
    println!();
}

fn results_table(result: &WorkflowExecutionResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Time"),
            Cell::new("Detail"),
        ]);

    for r in &result.results {
        let (status, color) = if r.success {
            ("ok", Color::Green)
        } else {
            ("failed", Color::Red)
        };
        let detail = match (&r.output, &r.error) {
            (_, Some(err)) => err.clone(),
            (Some(out), None) => preview(out, 60),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(&r.node_id),
            Cell::new(status).fg(color),
            Cell::new(format!("{}ms", r.execution_time_ms)),
            Cell::new(detail),
        ]);
    }
    table
}

/// First line of `text`, cut to `max` characters.
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max || text.lines().nth(1).is_some() {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
