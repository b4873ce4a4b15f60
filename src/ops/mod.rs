//! High-level operations behind the `maf` command.

pub mod build;

pub use build::{build, BuildOptions};
