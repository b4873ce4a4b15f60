//! Build type variants (profiles).

use std::path::PathBuf;

use serde::Serialize;

use crate::util::config::{Config, ConfigError};

/// A named compilation profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildType {
    /// Lowercase name, stable across runs.
    pub name: String,
    /// Outputs of the default build type carry no name prefix.
    pub default: bool,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
    /// Installation prefix for third-party libraries, root-relative.
    pub prefix: PathBuf,
}

impl BuildType {
    /// File name for an output of this build type: `stem` for the default
    /// build type, `<name>_<stem>` otherwise.
    pub fn output_name(&self, stem: &str) -> String {
        if self.default {
            stem.to_string()
        } else {
            format!("{}_{}", self.name, stem)
        }
    }
}

/// The configured build types, in configuration order.
#[derive(Debug, Clone, Serialize)]
pub struct BuildTypes(Vec<BuildType>);

impl BuildTypes {
    /// Build the validated list from `maf.toml` settings.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let types = config
            .build_types
            .iter()
            .map(|bt| BuildType {
                name: bt.name.clone(),
                default: bt.default,
                compile_flags: bt.compile_flags.clone(),
                link_flags: bt.link_flags.clone(),
                prefix: bt
                    .prefix
                    .clone()
                    .unwrap_or_else(|| config.build_dir.join(format!("prefix-{}", bt.name))),
            })
            .collect();
        Ok(BuildTypes(types))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildType> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&BuildType> {
        self.0.iter().find(|bt| bt.name == name)
    }

    /// The build type whose outputs are unprefixed.
    pub fn default_type(&self) -> &BuildType {
        self.0.iter().find(|bt| bt.default).unwrap_or(&self.0[0])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|bt| bt.name.as_str())
    }
}
