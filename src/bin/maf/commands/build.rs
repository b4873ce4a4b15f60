//! `maf <target>`

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::Cli;
use maf::ops::{build, BuildOptions};
use maf::util::shell::{ColorChoice, Shell, Verbosity};

/// Returns whether the last build attempt succeeded.
pub fn execute(cli: Cli) -> Result<bool> {
    let root = match cli.directory {
        Some(dir) => dir
            .canonicalize()
            .with_context(|| format!("cannot use {} as the project root", dir.display()))?,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let verbosity = if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let shell = Arc::new(Shell::new(verbosity, color));

    let opts = BuildOptions {
        target: cli.target,
        fresh: cli.fresh,
        live: cli.live,
        verbose: cli.verbose,
        extra_args: cli.extra_args,
        jobs: cli.jobs,
    };

    let outcome = build(&root, &opts, &shell)?;
    Ok(outcome.is_success())
}
