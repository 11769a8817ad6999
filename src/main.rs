//! Storage Grid Reconciler CLI
//!
//! Reconciles one desired-state request against a storage grid simulated
//! from a state file, then prints the outcome as JSON.
//!
//! ```text
//!   grid-reconcile --state grid.yaml --request volume.yaml [--check] [--write-state]
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_grid_reconciler::config::{load_document, save_document};
use storage_grid_reconciler::{
    DesiredState, GridState, InMemoryController, JsonReporter, MemoryControllerConfig,
    Reconciler, ReconcilerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Grid Reconciler - converge one grid resource to a desired state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Grid state file (YAML or JSON)
    #[arg(long, env = "GRID_STATE")]
    state: PathBuf,

    /// Desired-state request file (YAML or JSON)
    #[arg(long, env = "GRID_REQUEST")]
    request: PathBuf,

    /// Plan only; report what would change without mutating
    #[arg(long, env = "CHECK_MODE")]
    check: bool,

    /// Write the resulting grid state back to the state file
    #[arg(long)]
    write_state: bool,

    /// Controller name used in log lines
    #[arg(long, env = "GRID_CONTROLLER", default_value = "grid-sim")]
    controller: String,

    /// Pretty-print the JSON outcome
    #[arg(long)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Storage Grid Reconciler");
    info!("  Version: {}", storage_grid_reconciler::VERSION);
    info!("  State: {}", args.state.display());
    info!("  Request: {}", args.request.display());
    info!("  Check mode: {}", args.check);

    let state: GridState = load_document(&args.state)
        .with_context(|| format!("loading grid state from {}", args.state.display()))?;
    let desired: DesiredState = load_document(&args.request)
        .with_context(|| format!("loading request from {}", args.request.display()))?;

    let controller = Arc::new(InMemoryController::new(
        MemoryControllerConfig {
            name: args.controller.clone(),
        },
        state,
    ));
    let reconciler = Reconciler::new(
        controller.clone(),
        ReconcilerConfig {
            check_mode: args.check,
        },
    );

    let reporter = JsonReporter::new(std::io::stdout()).pretty(args.pretty);
    let outcome = reconciler.run(&desired, reporter).await;

    // Partial failures still changed the grid, so the state is written either way
    if args.write_state && !args.check {
        save_document(&args.state, &controller.snapshot())
            .with_context(|| format!("writing grid state to {}", args.state.display()))?;
        info!("Grid state written to {}", args.state.display());
    }

    Ok(if outcome.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries the outcome document; logs go to stderr
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
