//! maf CLI - incremental builds for C and C++ source trees

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use maf::recipe::RecipeError;
use maf::util::config::ConfigError;
use maf::util::diagnostic;

mod cli;
mod commands;

use cli::Cli;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            report(&e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("maf=debug")
    } else {
        EnvFilter::new("maf=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    commands::build::execute(cli)
}

/// Configuration errors get a full diagnostic, everything else one line.
fn report(err: &anyhow::Error) {
    let color = std::io::stderr().is_terminal();
    if let Some(e) = err.downcast_ref::<RecipeError>() {
        diagnostic::emit(&e.to_diagnostic(), color);
    } else if let Some(e) = err.downcast_ref::<ConfigError>() {
        diagnostic::emit(&e.to_diagnostic(), color);
    } else {
        eprintln!("error: {:#}", err);
    }
}
