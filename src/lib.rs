//! maf - an incremental build orchestrator for C and C++ projects
//!
//! maf scans a source tree, derives compile, link and run steps from
//! `#include` edges and `#pragma maf` annotations, and executes the steps
//! needed for one target with bounded parallelism. Steps are skipped when
//! their inputs' content is unchanged, and live mode rebuilds whenever the
//! sources change.

pub mod builder;
pub mod core;
pub mod extension;
pub mod ops;
pub mod recipe;
pub mod scanner;
pub mod util;

pub use builder::{build_recipe, BuildContext};
pub use core::{BuildType, File, SourceSet};
pub use recipe::{BuildOutcome, Recipe, RecipeError, Step};
pub use util::context::GlobalContext;
