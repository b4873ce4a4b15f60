//! Scanned source and header records.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

/// Index of a [`File`] within its [`SourceSet`](super::SourceSet).
///
/// Identity is by index, not by path string, so two spellings of the same
/// include never produce two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileId(pub(crate) usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Source language of a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    /// Get the language name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "c++",
        }
    }
}

/// What an annotated argument is passed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArgKind {
    Compile,
    Link,
    Run,
}

impl FromStr for ArgKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(ArgKind::Compile),
            "link" => Ok(ArgKind::Link),
            "run" => Ok(ArgKind::Run),
            other => Err(format!("unknown argument kind `{}`", other)),
        }
    }
}

/// Arguments keyed by build type name.
///
/// The empty key holds arguments that apply to every build type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArgBuckets(BTreeMap<String, Vec<String>>);

impl ArgBuckets {
    /// Register `arg` for `build_type`, or for all build types if empty.
    pub fn push(&mut self, build_type: &str, arg: impl Into<String>) {
        self.0
            .entry(build_type.to_string())
            .or_default()
            .push(arg.into());
    }

    /// Arguments for one build type: its own bucket, then the shared one.
    pub fn for_build_type<'a>(&'a self, build_type: &str) -> impl Iterator<Item = &'a String> {
        let own = self.0.get(build_type).into_iter().flatten();
        let shared = if build_type.is_empty() {
            None
        } else {
            self.0.get("")
        };
        own.chain(shared.into_iter().flatten())
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// One scanned source or header file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct File {
    /// Path relative to the project root, `/`-separated.
    pub path: String,

    /// Names from `#include <...>`, deduplicated, including those of
    /// every transitively included header once resolved.
    pub system_includes: Vec<String>,

    /// Libraries from `#pragma comment(lib, "...")`.
    pub comment_libs: Vec<String>,

    /// Root-relative paths from `#include "..."`, as written.
    pub direct_includes: Vec<String>,

    /// Every file reachable through includes, in breadth-first order.
    pub transitive_includes: Vec<FileId>,

    pub compile_args: ArgBuckets,
    pub link_args: ArgBuckets,
    pub run_args: ArgBuckets,

    /// Defines a program entry point (`int main(` or `#pragma maf main`).
    pub main: bool,

    /// Declares tests (`TEST(` or `TEST_F(`).
    pub test: bool,
}

impl File {
    /// Create an empty record for a root-relative path.
    pub fn new(path: impl Into<String>) -> Self {
        File {
            path: path.into(),
            ..File::default()
        }
    }

    fn extension(&self) -> Option<&str> {
        Path::new(&self.path).extension().and_then(|e| e.to_str())
    }

    /// File name without directory and extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.path)
    }

    pub fn is_header(&self) -> bool {
        matches!(self.extension(), Some("h" | "hh"))
    }

    /// Whether this file is compiled into an object.
    pub fn is_source(&self) -> bool {
        matches!(self.extension(), Some("c" | "cc"))
    }

    /// Language of a translation unit, `None` for headers.
    pub fn language(&self) -> Option<Language> {
        match self.extension() {
            Some("c") => Some(Language::C),
            Some("cc") => Some(Language::Cxx),
            _ => None,
        }
    }

    /// Whether this file gets its own binary.
    pub fn is_entry_point(&self) -> bool {
        self.main || self.test
    }

    /// Argument buckets of one kind.
    pub fn args(&self, kind: ArgKind) -> &ArgBuckets {
        match kind {
            ArgKind::Compile => &self.compile_args,
            ArgKind::Link => &self.link_args,
            ArgKind::Run => &self.run_args,
        }
    }

    pub fn args_mut(&mut self, kind: ArgKind) -> &mut ArgBuckets {
        match kind {
            ArgKind::Compile => &mut self.compile_args,
            ArgKind::Link => &mut self.link_args,
            ArgKind::Run => &mut self.run_args,
        }
    }

    /// Root-relative paths of same-stem implementation files a header may
    /// have, in lookup order.
    pub fn sibling_candidates(&self) -> Vec<String> {
        if !self.is_header() {
            return Vec::new();
        }
        let base = &self.path[..self.path.len() - self.extension().map_or(0, |e| e.len() + 1)];
        vec![format!("{}.cc", base), format!("{}.c", base)]
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
