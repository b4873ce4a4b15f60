//! Core data structures for maf.
//!
//! - [`File`]: one scanned source or header
//! - [`SourceSet`]: every file of a scan, indexed by [`FileId`]
//! - [`BuildType`]: a named compilation profile

pub mod build_type;
pub mod file;
pub mod source_set;

pub use build_type::{BuildType, BuildTypes};
pub use file::{ArgBuckets, ArgKind, File, FileId, Language};
pub use source_set::SourceSet;
