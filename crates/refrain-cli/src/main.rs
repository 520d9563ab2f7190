//! Refrain CLI - Command-line interface for pattern-indexed music generation
//!
//! This binary provides commands for building oracles from feature corpora,
//! selecting merge thresholds, and generating single-voice and synchronized
//! multi-voice sequences.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use refrain_cli::commands;
use refrain_oracle::{GenerationBudget, SelectionPolicy};

mod cli_args;

use cli_args::{Cli, Commands, WalkArgs};

/// Installs the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn budget(walk: &WalkArgs) -> GenerationBudget {
    let budget = GenerationBudget::attempts(walk.max_attempts);
    match walk.timeout_ms {
        Some(ms) => budget.with_timeout(Duration::from_millis(ms)),
        None => budget,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            corpus,
            threshold,
            distance,
            sweep,
            output,
            json,
        } => commands::build::run(
            &commands::build::BuildOptions {
                corpus,
                threshold,
                distance,
                sweep: sweep.to_sweep(),
                output,
            },
            json,
        ),
        Commands::Threshold {
            corpus,
            distance,
            sweep,
            top,
            json,
        } => commands::threshold::run(
            &commands::threshold::ThresholdOptions {
                corpus,
                distance,
                sweep: sweep.to_sweep(),
                top,
            },
            json,
        ),
        Commands::Generate {
            corpus,
            threshold,
            length,
            count,
            p,
            min_lrs,
            walk,
            output,
            json,
        } => commands::generate::run(
            &commands::generate::GenerateOptions {
                corpus,
                threshold,
                length,
                count,
                seed: walk.seed,
                p,
                min_lrs,
                start: walk.start,
                policy: walk.policy.unwrap_or(SelectionPolicy::Uniform),
                budget: budget(&walk),
                output,
            },
            json,
        ),
        Commands::Sync {
            corpus,
            threshold,
            length,
            count,
            max_fallbacks,
            walk,
            output,
            json,
        } => commands::sync::run(
            &commands::sync::SyncOptions {
                corpus,
                threshold,
                length,
                count,
                seed: walk.seed,
                start: walk.start,
                policy: walk.policy.unwrap_or(SelectionPolicy::MaxLrs),
                max_fallbacks,
                budget: budget(&walk),
                output,
            },
            json,
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
