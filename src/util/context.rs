//! Global context for maf operations.
//!
//! Owns the project root and the directory layout derived from it. Step
//! inputs and outputs are plain strings relative to the root, so every
//! conversion between those strings and real paths goes through here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::Config;
use crate::util::fs::{normalize_lexically, relative_path, to_slash};

/// Global context containing the project layout.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Absolute project root
    root: PathBuf,

    /// Source directory, relative to root
    src_dir: PathBuf,

    /// Build directory, relative to root
    build_dir: PathBuf,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a context rooted at the current working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_root(cwd))
    }

    /// Create a context with a specific project root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        GlobalContext {
            root,
            src_dir: PathBuf::from("src"),
            build_dir: PathBuf::from("build"),
            verbose: false,
        }
    }

    /// Apply directory settings from `maf.toml`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.src_dir = config.src_dir.clone();
        self.build_dir = config.build_dir.clone();
        self
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Absolute project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute source directory.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join(&self.src_dir)
    }

    /// Build directory relative to the root.
    pub fn build_dir_rel(&self) -> &Path {
        &self.build_dir
    }

    /// Absolute build directory.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(&self.build_dir)
    }

    /// Directory holding per-step input hash records.
    pub fn hash_dir(&self) -> PathBuf {
        self.build_dir().join("hashes")
    }

    /// Resolve a root-relative path string.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    /// Turn an absolute or root-relative path into the normalized
    /// root-relative string used for step inputs and outputs.
    pub fn relative(&self, path: &Path) -> String {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        to_slash(&relative_path(&self.root, &normalize_lexically(&abs)))
    }
}
