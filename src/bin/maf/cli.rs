//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

/// maf - incremental builds for C and C++ source trees
///
/// Scans the source directory, works out which objects and binaries exist,
/// and brings TARGET up to date. Every step has a shortcut: `foo.o`,
/// `link foo`, `foo` (runs the binary), `compile_commands.json`, plus
/// whatever extensions add.
#[derive(Parser)]
#[command(name = "maf")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Shortcut of the step to build
    pub target: String,

    /// Remove generated files before building
    #[arg(long)]
    pub fresh: bool,

    /// Rebuild whenever a source file changes
    #[arg(long)]
    pub live: bool,

    /// Print the build graph and every command line
    #[arg(short, long)]
    pub verbose: bool,

    /// Argument passed to the target (repeatable)
    #[arg(short = 'x', value_name = "ARG", allow_hyphen_values = true)]
    pub extra_args: Vec<String>,

    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long = "directory", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Maximum number of steps running at once
    #[arg(short, long, env = "MAF_JOBS")]
    pub jobs: Option<usize>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
