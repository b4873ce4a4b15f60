//! Extensions - optional behavior hooked into graph construction.
//!
//! An extension declares which hook points it implements through
//! [`Hooks`]; the registry calls only those. Built-in extensions are
//! enabled by name in `maf.toml`:
//!
//! ```toml
//! extensions = ["test-suite", "command"]
//! ```

pub mod command;
pub mod test_suite;

use anyhow::{Context, Result};

use crate::builder::context::BuildContext;
use crate::builder::plan::BuildPlan;
use crate::core::SourceSet;
use crate::recipe::{ExecuteReport, Recipe};
use crate::util::config::ConfigError;

pub use command::CommandExtension;
pub use test_suite::TestSuiteExtension;

/// Names of the built-in extensions.
pub const BUILTIN: &[&str] = &[TestSuiteExtension::NAME, CommandExtension::NAME];

/// The hook points an extension implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hooks {
    /// Before sources are scanned.
    pub pre_graph: bool,
    /// After scanning, before include closures are resolved.
    pub post_scan: bool,
    /// After compile, link and run steps were added.
    pub post_plan: bool,
    /// After each build attempt.
    pub post_build: bool,
}

/// An optional behavior participating in graph construction.
///
/// Every hook defaults to doing nothing.
pub trait Extension {
    fn name(&self) -> &'static str;

    fn hooks(&self) -> Hooks;

    fn pre_graph(&self, _bcx: &BuildContext, _recipe: &mut Recipe) -> Result<()> {
        Ok(())
    }

    fn post_scan(
        &self,
        _bcx: &BuildContext,
        _sources: &mut SourceSet,
        _recipe: &mut Recipe,
    ) -> Result<()> {
        Ok(())
    }

    fn post_plan(
        &self,
        _bcx: &BuildContext,
        _sources: &SourceSet,
        _plan: &BuildPlan,
        _recipe: &mut Recipe,
    ) -> Result<()> {
        Ok(())
    }

    fn post_build(&self, _bcx: &BuildContext, _target: &str, _report: &ExecuteReport) -> Result<()> {
        Ok(())
    }
}

/// Enabled extensions, in configuration order.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        ExtensionRegistry::default()
    }

    /// Enable built-in extensions by name.
    pub fn from_names(names: &[String]) -> Result<Self, ConfigError> {
        let mut registry = ExtensionRegistry::new();
        for name in names {
            let extension = builtin(name).ok_or_else(|| ConfigError::UnknownExtension {
                name: name.clone(),
                available: BUILTIN.iter().map(|s| s.to_string()).collect(),
            })?;
            if registry.names().any(|n| n == extension.name()) {
                tracing::warn!("extension `{}` is enabled twice", name);
                continue;
            }
            registry.register(extension);
        }
        Ok(registry)
    }

    pub fn register(&mut self, extension: Box<dyn Extension>) {
        tracing::debug!("enabled extension `{}`", extension.name());
        self.extensions.push(extension);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions.iter().map(|e| e.name())
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    fn with_hook(&self, hook: fn(&Hooks) -> bool) -> impl Iterator<Item = &dyn Extension> {
        self.extensions
            .iter()
            .map(|e| e.as_ref())
            .filter(move |e| hook(&e.hooks()))
    }

    pub fn pre_graph(&self, bcx: &BuildContext, recipe: &mut Recipe) -> Result<()> {
        for ext in self.with_hook(|h| h.pre_graph) {
            ext.pre_graph(bcx, recipe)
                .with_context(|| format!("extension `{}` failed", ext.name()))?;
        }
        Ok(())
    }

    pub fn post_scan(
        &self,
        bcx: &BuildContext,
        sources: &mut SourceSet,
        recipe: &mut Recipe,
    ) -> Result<()> {
        for ext in self.with_hook(|h| h.post_scan) {
            ext.post_scan(bcx, sources, recipe)
                .with_context(|| format!("extension `{}` failed", ext.name()))?;
        }
        Ok(())
    }

    pub fn post_plan(
        &self,
        bcx: &BuildContext,
        sources: &SourceSet,
        plan: &BuildPlan,
        recipe: &mut Recipe,
    ) -> Result<()> {
        for ext in self.with_hook(|h| h.post_plan) {
            ext.post_plan(bcx, sources, plan, recipe)
                .with_context(|| format!("extension `{}` failed", ext.name()))?;
        }
        Ok(())
    }

    pub fn post_build(&self, bcx: &BuildContext, target: &str, report: &ExecuteReport) -> Result<()> {
        for ext in self.with_hook(|h| h.post_build) {
            ext.post_build(bcx, target, report)
                .with_context(|| format!("extension `{}` failed", ext.name()))?;
        }
        Ok(())
    }
}

fn builtin(name: &str) -> Option<Box<dyn Extension>> {
    match name {
        TestSuiteExtension::NAME => Some(Box::new(TestSuiteExtension)),
        CommandExtension::NAME => Some(Box::new(CommandExtension)),
        _ => None,
    }
}
