//! Build context - project layout, toolchain and build types.

use std::path::Path;

use anyhow::{Context, Result};

use crate::builder::toolchain::Toolchain;
use crate::core::BuildTypes;
use crate::scanner::DirectiveScanner;
use crate::util::config::Config;
use crate::util::context::GlobalContext;

/// Immutable configuration for one graph construction.
///
/// Loaded once per build attempt and threaded through scanning, planning
/// and extension hooks.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub gctx: GlobalContext,
    pub config: Config,
    pub toolchain: Toolchain,
    pub build_types: BuildTypes,
}

impl BuildContext {
    /// Load `maf.toml` from `root` and resolve the toolchain.
    pub fn load(root: &Path, verbose: bool) -> Result<Self> {
        let config = Config::load_from_root(root)?;
        let mut gctx = GlobalContext::with_root(root).with_config(&config);
        gctx.set_verbose(verbose);
        Self::new(gctx, config)
    }

    /// Build a context from an already loaded configuration.
    pub fn new(gctx: GlobalContext, config: Config) -> Result<Self> {
        let build_types = BuildTypes::from_config(&config)?;
        let toolchain = Toolchain::from_config(&config.toolchain, &config.defines);
        toolchain.check_compilers();

        tracing::debug!(
            "toolchain: cc={} cxx={}, {} predefined macros",
            toolchain.cc,
            toolchain.cxx,
            toolchain.builtin_macros.len()
        );

        Ok(BuildContext {
            gctx,
            config,
            toolchain,
            build_types,
        })
    }

    pub fn root(&self) -> &Path {
        self.gctx.root()
    }

    /// A scanner for the default macro environment and the configured
    /// build type names.
    pub fn directive_scanner(&self) -> Result<DirectiveScanner> {
        DirectiveScanner::new(self.toolchain.scan_defines(), self.build_types.names())
            .context("failed to compile directive patterns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_with_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("maf.toml"),
            r#"
build_dir = "out"

[toolchain]
cc = "my-cc"
cxx = "my-c++"
query_defines = false
"#,
        )
        .unwrap();

        let bcx = BuildContext::load(tmp.path(), true).unwrap();
        assert!(bcx.gctx.is_verbose());
        assert_eq!(bcx.gctx.build_dir(), bcx.root().join("out"));
        assert_eq!(bcx.build_types.default_type().name, "fast");
        assert!(bcx.toolchain.builtin_macros.is_empty());
    }

    #[test]
    fn test_invalid_build_types_fail() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("maf.toml"),
            "[[build_type]]\nname = \"Fast\"\ndefault = true\n[toolchain]\nquery_defines = false\n",
        )
        .unwrap();

        let err = BuildContext::load(tmp.path(), false).unwrap_err();
        assert!(err.downcast_ref::<crate::util::config::ConfigError>().is_some());
    }
}
