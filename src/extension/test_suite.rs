//! The `tests` step: every test binary of the default build type.

use anyhow::Result;

use crate::builder::context::BuildContext;
use crate::builder::plan::BuildPlan;
use crate::core::SourceSet;
use crate::extension::{Extension, Hooks};
use crate::recipe::{Action, BuildOutcome, ExecuteReport, Recipe, Step};
use crate::util::process::ProcessBuilder;

/// Shortcut of the aggregate test step.
pub const TESTS_SHORTCUT: &str = "tests";

/// Adds a `tests` step running every test binary in sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestSuiteExtension;

impl TestSuiteExtension {
    pub const NAME: &'static str = "test-suite";
}

impl Extension for TestSuiteExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> Hooks {
        Hooks {
            post_plan: true,
            post_build: true,
            ..Hooks::default()
        }
    }

    fn post_plan(
        &self,
        bcx: &BuildContext,
        _sources: &SourceSet,
        plan: &BuildPlan,
        recipe: &mut Recipe,
    ) -> Result<()> {
        let default = &bcx.build_types.default_type().name;
        let tests: Vec<_> = plan.binaries_for(default).filter(|b| b.test).collect();
        if tests.is_empty() {
            return Ok(());
        }
        if recipe.step(TESTS_SHORTCUT).is_some() {
            tracing::warn!("a step named `{}` already exists, not adding the test suite", TESTS_SHORTCUT);
            return Ok(());
        }

        let commands = tests
            .iter()
            .map(|bin| {
                ProcessBuilder::new(bcx.gctx.resolve(&bin.path))
                    .args(&bin.run_args)
                    .cwd(bcx.root())
            })
            .collect();

        recipe.add_step(
            Step::new(TESTS_SHORTCUT, "Running tests", Action::RunAll(commands))
                .inputs(tests.iter().map(|bin| bin.path.clone())),
        )?;
        tracing::debug!("test suite with {} binaries", tests.len());
        Ok(())
    }

    fn post_build(&self, _bcx: &BuildContext, target: &str, report: &ExecuteReport) -> Result<()> {
        if target != TESTS_SHORTCUT || !report.executed.iter().any(|s| s == TESTS_SHORTCUT) {
            return Ok(());
        }
        match report.outcome {
            BuildOutcome::Success => tracing::info!("all tests passed"),
            BuildOutcome::Failed => tracing::info!("test suite failed"),
            BuildOutcome::Interrupted => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::plan::Binary;
    use crate::util::config::Config;
    use crate::util::context::GlobalContext;

    fn binary(path: &str, build_type: &str, test: bool) -> Binary {
        Binary {
            path: path.into(),
            entry: "src/x.cc".into(),
            objects: vec![],
            link_args: vec![],
            run_args: vec!["--gtest_brief=1".into()],
            build_type: build_type.into(),
            test,
        }
    }

    #[test]
    fn test_adds_tests_step_for_default_build_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.toolchain.query_defines = false;
        let bcx = BuildContext::new(GlobalContext::with_root(tmp.path()), config).unwrap();

        let plan = BuildPlan {
            objects: vec![],
            binaries: vec![
                binary("build/net_test", "fast", true),
                binary("build/release_net_test", "release", true),
                binary("build/server", "fast", false),
            ],
        };
        let mut recipe = Recipe::new(bcx.root(), bcx.gctx.hash_dir());
        TestSuiteExtension
            .post_plan(&bcx, &SourceSet::new(), &plan, &mut recipe)
            .unwrap();

        let step = recipe.step("tests").unwrap();
        assert_eq!(step.inputs.iter().collect::<Vec<_>>(), ["build/net_test"]);
        assert!(step.outputs.is_empty());
        match &step.action {
            Action::RunAll(cmds) => {
                assert_eq!(cmds.len(), 1);
                assert_eq!(cmds[0].get_program(), bcx.root().join("build/net_test"));
                assert_eq!(cmds[0].get_args(), ["--gtest_brief=1"]);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_no_tests_no_step() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.toolchain.query_defines = false;
        let bcx = BuildContext::new(GlobalContext::with_root(tmp.path()), config).unwrap();

        let mut recipe = Recipe::new(bcx.root(), bcx.gctx.hash_dir());
        TestSuiteExtension
            .post_plan(&bcx, &SourceSet::new(), &BuildPlan::default(), &mut recipe)
            .unwrap();
        assert!(recipe.is_empty());
    }
}
