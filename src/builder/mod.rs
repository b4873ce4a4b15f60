//! Turning a scanned source tree into a recipe.
//!
//! [`BuildContext`] carries the resolved toolchain and build types,
//! [`plan`] decides which objects and binaries exist, and [`graph`] turns
//! the plan into compile, link and run steps.

pub mod compdb;
pub mod context;
pub mod graph;
pub mod plan;
pub mod toolchain;

pub use context::BuildContext;
pub use graph::build_recipe;
pub use plan::{Binary, BuildPlan, ObjectFile};
pub use toolchain::Toolchain;
