//! `ploom validate <file>`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;

use pipeloom_core::workflow::definition::load_workflow_file;
use pipeloom_core::workflow::graph::Graph;
use pipeloom_core::workflow::validator::validate;
use pipeloom_types::execution::ValidationReport;

/// Load and structurally validate a workflow file.
///
/// Config that does not match its node type counts as a validation error.
pub fn check_file(path: &Path) -> Result<ValidationReport> {
    let doc = load_workflow_file(path)
        .with_context(|| format!("failed to load workflow from {}", path.display()))?;

    Ok(match Graph::from_document(&doc) {
        Ok(graph) => validate(&graph),
        Err(e) => ValidationReport::new(vec![e.to_string()], Vec::new()),
    })
}

/// Print the report; fails when the workflow is invalid.
pub fn validate_workflow(path: &Path, json: bool, quiet: bool) -> Result<()> {
    let report = check_file(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet || !report.valid {
        print_report(path, &report);
    }

    if !report.valid {
        bail!(
            "workflow is invalid ({} error{})",
            report.errors.len(),
            if report.errors.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

pub(crate) fn print_report(path: &Path, report: &ValidationReport) {
    println!();
    if report.valid {
        println!(
            "  {} {} is valid",
            style("*").green().bold(),
            style(path.display()).cyan()
        );
    } else {
        println!(
            "  {} {} is invalid",
            style("x").red().bold(),
            style(path.display()).cyan()
        );
    }
    for error in &report.errors {
        println!("    {} {}", style("error:").red(), error);
    }
    for warning in &report.warnings {
        println!("    {} {}", style("warning:").yellow(), warning);
    }
    println!();
}
