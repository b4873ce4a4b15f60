//! Project configuration (`maf.toml`).
//!
//! Every key is optional. A project without a `maf.toml` builds every
//! `.c`/`.cc` file under `src/` with clang in three build types: `fast`
//! (the default), `debug` and `release`.
//!
//! ```toml
//! src_dir = "src"
//! defines = ["__linux__"]
//! extensions = ["test-suite", "command"]
//!
//! [toolchain]
//! cxx = "clang++"
//! cxx_flags = ["-std=c++20"]
//!
//! [[build_type]]
//! name = "asan"
//! compile_flags = ["-fsanitize=address"]
//! link_flags = ["-fsanitize=address"]
//!
//! [[command]]
//! shortcut = "embed assets"
//! program = "python3"
//! args = ["tools/embed.py"]
//! inputs = ["static/*"]
//! outputs = ["build/generated/embedded.hh"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "maf.toml";

/// Project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned for sources and watched in live mode.
    pub src_dir: PathBuf,

    /// Directory receiving objects, binaries and hash records.
    pub build_dir: PathBuf,

    /// Compiler selection and flags shared by all build types.
    pub toolchain: ToolchainSettings,

    /// Project macros treated as defined when scanning `#if` blocks and
    /// passed to the compiler as `-D` flags.
    pub defines: Vec<String>,

    /// Build type variants. Replaces the default set when non-empty.
    #[serde(rename = "build_type")]
    pub build_types: Vec<BuildTypeSettings>,

    /// Built-in extensions to load, by name.
    pub extensions: Vec<String>,

    /// Custom command steps (requires the `command` extension).
    #[serde(rename = "command")]
    pub commands: Vec<CommandSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            src_dir: PathBuf::from("src"),
            build_dir: PathBuf::from("build"),
            toolchain: ToolchainSettings::default(),
            defines: Vec::new(),
            build_types: BuildTypeSettings::defaults(),
            extensions: vec!["test-suite".to_string()],
            commands: Vec::new(),
        }
    }
}

/// Compiler selection and shared flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// C compiler. `CC` in the environment takes precedence.
    pub cc: Option<String>,

    /// C++ compiler, also used as the linker. `CXX` takes precedence.
    pub cxx: Option<String>,

    /// Flags passed to every compilation.
    pub common_flags: Vec<String>,

    /// Flags passed only when compiling C.
    pub c_flags: Vec<String>,

    /// Flags passed only when compiling C++.
    pub cxx_flags: Vec<String>,

    /// Flags passed to every link.
    pub link_flags: Vec<String>,

    /// Ask the C compiler for its predefined macros (`-dM -E -`).
    pub query_defines: bool,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        ToolchainSettings {
            cc: None,
            cxx: None,
            common_flags: [
                "-ffunction-sections",
                "-fdata-sections",
                "-funsigned-char",
                "-Wformat",
                "-Wformat-security",
                "-Werror=format-security",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            c_flags: vec!["-std=c11".to_string()],
            cxx_flags: vec!["-std=c++20".to_string()],
            link_flags: Vec::new(),
            query_defines: true,
        }
    }
}

/// One build type variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildTypeSettings {
    /// Lowercase name, used as output prefix and pragma qualifier.
    pub name: String,

    /// Whether outputs of this build type carry no name prefix.
    pub default: bool,

    /// Extra compile flags.
    pub compile_flags: Vec<String>,

    /// Extra link flags.
    pub link_flags: Vec<String>,

    /// Installation prefix for third-party libraries built for this
    /// variant. Defaults to `<build_dir>/prefix-<name>`.
    pub prefix: Option<PathBuf>,
}

impl BuildTypeSettings {
    fn new(name: &str, default: bool, compile_flags: &[&str], link_flags: &[&str]) -> Self {
        BuildTypeSettings {
            name: name.to_string(),
            default,
            compile_flags: compile_flags.iter().map(|s| s.to_string()).collect(),
            link_flags: link_flags.iter().map(|s| s.to_string()).collect(),
            prefix: None,
        }
    }

    /// The `fast`, `debug` and `release` variants.
    pub fn defaults() -> Vec<BuildTypeSettings> {
        vec![
            BuildTypeSettings::new("fast", true, &[], &[]),
            BuildTypeSettings::new("debug", false, &["-O0", "-g", "-gdwarf-4", "-D_DEBUG"], &[]),
            BuildTypeSettings::new(
                "release",
                false,
                &["-O3", "-DNDEBUG", "-flto", "-fstack-protector"],
                &["-flto"],
            ),
        ]
    }
}

/// A custom command step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Unique step name, usable as a CLI target.
    pub shortcut: String,

    /// Progress line; defaults to `Running <shortcut>`.
    pub description: Option<String>,

    /// Program to execute
    pub program: String,

    /// Arguments
    pub args: Vec<String>,

    /// Working directory relative to the project root.
    pub cwd: Option<PathBuf>,

    /// Environment variables to set
    pub env: BTreeMap<String, String>,

    /// Input paths or glob patterns, relative to the project root.
    pub inputs: Vec<String>,

    /// Output paths, relative to the project root.
    pub outputs: Vec<String>,
}

/// Errors in `maf.toml` that parse fine but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no build types configured")]
    NoBuildTypes,

    #[error("{count} build types are marked as default, expected exactly one")]
    DefaultCount { count: usize },

    #[error("invalid build type name `{name}`")]
    InvalidBuildTypeName { name: String },

    #[error("build type `{name}` is configured twice")]
    DuplicateBuildType { name: String },

    #[error("unknown extension `{name}`")]
    UnknownExtension { name: String, available: Vec<String> },
}

impl ConfigError {
    /// Convert to a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string()).with_location(CONFIG_FILE);
        match self {
            ConfigError::NoBuildTypes => {
                diag.with_suggestion("remove the empty `build_type` list to use the defaults")
            }
            ConfigError::DefaultCount { .. } => {
                diag.with_suggestion("set `default = true` on exactly one `[[build_type]]`")
            }
            ConfigError::InvalidBuildTypeName { .. } => diag
                .with_context("names are used as file prefixes and pragma qualifiers")
                .with_suggestion("use lowercase letters, digits and underscores only"),
            ConfigError::DuplicateBuildType { .. } => {
                diag.with_suggestion("give every `[[build_type]]` a distinct name")
            }
            ConfigError::UnknownExtension { available, .. } => {
                diag.with_context(format!("available extensions: {}", available.join(", ")))
            }
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load `maf.toml` from the project root, or defaults if it doesn't exist.
    pub fn load_from_root(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            tracing::debug!("loading config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check build type invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_types.is_empty() {
            return Err(ConfigError::NoBuildTypes);
        }

        let defaults = self.build_types.iter().filter(|bt| bt.default).count();
        if defaults != 1 {
            return Err(ConfigError::DefaultCount { count: defaults });
        }

        for (i, bt) in self.build_types.iter().enumerate() {
            let valid = !bt.name.is_empty()
                && bt
                    .name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                return Err(ConfigError::InvalidBuildTypeName {
                    name: bt.name.clone(),
                });
            }
            if self.build_types[..i].iter().any(|other| other.name == bt.name) {
                return Err(ConfigError::DuplicateBuildType {
                    name: bt.name.clone(),
                });
            }
        }

        Ok(())
    }
}
