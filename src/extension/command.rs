//! Custom command steps from `[[command]]` tables.
//!
//! Outputs that are C or C++ sources or headers join the scanned file set,
//! so they are compiled and linked like hand-written ones and every object
//! including them waits for the command.

use std::path::Path;

use anyhow::{bail, Result};

use crate::builder::context::BuildContext;
use crate::core::SourceSet;
use crate::extension::{Extension, Hooks};
use crate::recipe::{Action, Recipe, Step};
use crate::scanner::add_generated;
use crate::util::config::CommandSettings;
use crate::util::fs::{expand_globs, normalize_lexically, to_slash};
use crate::util::process::ProcessBuilder;

/// Turns every `[[command]]` of `maf.toml` into a step.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExtension;

impl CommandExtension {
    pub const NAME: &'static str = "command";
}

impl Extension for CommandExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> Hooks {
        Hooks {
            pre_graph: true,
            post_scan: true,
            ..Hooks::default()
        }
    }

    fn pre_graph(&self, bcx: &BuildContext, recipe: &mut Recipe) -> Result<()> {
        for settings in &bcx.config.commands {
            let step = command_step(bcx.root(), settings)?;
            for output in &step.outputs {
                recipe.mark_generated(output.clone());
            }
            recipe.add_step(step)?;
        }
        Ok(())
    }

    fn post_scan(
        &self,
        bcx: &BuildContext,
        sources: &mut SourceSet,
        _recipe: &mut Recipe,
    ) -> Result<()> {
        let outputs: Vec<&String> = bcx
            .config
            .commands
            .iter()
            .flat_map(|c| &c.outputs)
            .collect();
        if outputs.is_empty() {
            return Ok(());
        }

        let scanner = bcx.directive_scanner()?;
        for output in outputs {
            if let Some(id) = add_generated(&bcx.gctx, &scanner, sources, output)? {
                tracing::debug!("{} is generated by a command", sources[id].path);
            }
        }
        Ok(())
    }
}

fn command_step(root: &Path, settings: &CommandSettings) -> Result<Step> {
    if settings.program.trim().is_empty() {
        bail!("command `{}` has no program", settings.shortcut);
    }

    // programs given by relative path are relative to the project root
    let program = Path::new(&settings.program);
    let program = if program.is_relative() && program.components().count() > 1 {
        root.join(program)
    } else {
        program.to_path_buf()
    };

    let cwd = match &settings.cwd {
        Some(dir) => root.join(dir),
        None => root.to_path_buf(),
    };
    let mut cmd = ProcessBuilder::new(program).args(&settings.args).cwd(cwd);
    for (key, value) in &settings.env {
        cmd = cmd.env(key, value);
    }

    let description = settings
        .description
        .clone()
        .unwrap_or_else(|| format!("Running {}", settings.shortcut));

    Ok(Step::new(&settings.shortcut, description, Action::Spawn(cmd))
        .inputs(expand_globs(root, &settings.inputs)?)
        .outputs(
            settings
                .outputs
                .iter()
                .map(|o| to_slash(&normalize_lexically(Path::new(o)))),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::graph::build_recipe;
    use crate::extension::ExtensionRegistry;
    use crate::util::config::Config;
    use crate::util::context::GlobalContext;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn embed() -> CommandSettings {
        CommandSettings {
            shortcut: "embed".into(),
            description: Some("Writing embedded.hh".into()),
            program: "tools/embed.sh".into(),
            args: vec!["static".into()],
            cwd: None,
            env: BTreeMap::from([("LANG".to_string(), "C".to_string())]),
            inputs: vec!["static/*.css".into(), "tools/embed.sh".into()],
            outputs: vec!["build/generated/embedded.hh".into()],
        }
    }

    #[test]
    fn test_command_step() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("static")).unwrap();
        std::fs::write(root.join("static/a.css"), "").unwrap();
        std::fs::write(root.join("static/b.css"), "").unwrap();
        std::fs::write(root.join("static/c.js"), "").unwrap();

        let step = command_step(root, &embed()).unwrap();
        assert_eq!(step.shortcut, "embed");
        assert_eq!(step.description, "Writing embedded.hh");
        assert_eq!(
            step.inputs.iter().collect::<Vec<_>>(),
            ["static/a.css", "static/b.css", "tools/embed.sh"]
        );
        let Action::Spawn(cmd) = &step.action else {
            panic!("expected a spawn action");
        };
        assert_eq!(cmd.get_program(), root.join("tools/embed.sh"));
        assert_eq!(cmd.get_env()["LANG"], "C");
    }

    #[test]
    fn test_plain_program_name_stays_on_path() {
        let tmp = TempDir::new().unwrap();
        let settings = CommandSettings {
            shortcut: "version".into(),
            program: "git".into(),
            args: vec!["describe".into()],
            ..CommandSettings::default()
        };
        let step = command_step(tmp.path(), &settings).unwrap();
        assert_eq!(step.description, "Running version");
        let Action::Spawn(cmd) = &step.action else {
            panic!("expected a spawn action");
        };
        assert_eq!(cmd.get_program(), Path::new("git"));
    }

    #[test]
    fn test_pre_graph_marks_outputs_generated() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.toolchain.query_defines = false;
        config.commands.push(embed());
        let bcx = BuildContext::new(GlobalContext::with_root(tmp.path()), config).unwrap();

        let mut recipe = Recipe::new(bcx.root(), bcx.gctx.hash_dir());
        CommandExtension.pre_graph(&bcx, &mut recipe).unwrap();
        assert!(recipe.step("embed").is_some());
        assert_eq!(
            recipe.generated().collect::<Vec<_>>(),
            ["build/generated/embedded.hh"]
        );
    }

    #[test]
    fn test_generated_header_orders_its_includers() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(
            root.join("src/main.cc"),
            "#include \"gen.hh\"\nint main() {}\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.toolchain.query_defines = false;
        config.commands.push(CommandSettings {
            shortcut: "gen".into(),
            program: "sh".into(),
            args: vec!["-c".into(), "echo '#define GEN 1' > src/gen.hh".into()],
            outputs: vec!["src/gen.hh".into()],
            ..CommandSettings::default()
        });
        let bcx = BuildContext::new(GlobalContext::with_root(root), config).unwrap();
        let registry = ExtensionRegistry::from_names(&["command".into()]).unwrap();

        let mut recipe = build_recipe(&bcx, &registry).unwrap();
        assert!(recipe.step("main.o").unwrap().inputs.contains("src/gen.hh"));

        recipe.set_target("link main").unwrap();
        assert_eq!(
            recipe.shortcuts().collect::<Vec<_>>(),
            ["gen", "main.o", "link main", "compile_commands.json"]
        );
    }

    #[test]
    fn test_generated_source_is_linked_through_its_header() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(
            root.join("src/main.cc"),
            "#include \"embedded.hh\"\nint main() {}\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.toolchain.query_defines = false;
        config.commands.push(CommandSettings {
            shortcut: "embed".into(),
            program: "tools/embed.sh".into(),
            outputs: vec!["src/embedded.hh".into(), "src/embedded.cc".into()],
            ..CommandSettings::default()
        });
        let bcx = BuildContext::new(GlobalContext::with_root(root), config).unwrap();
        let registry = ExtensionRegistry::from_names(&["command".into()]).unwrap();

        let mut recipe = build_recipe(&bcx, &registry).unwrap();
        let link = recipe.step("link main").unwrap();
        assert!(link.inputs.contains("build/obj/embedded.o"));
        assert!(recipe
            .step("embedded.o")
            .unwrap()
            .inputs
            .contains("src/embedded.cc"));

        recipe.set_target("link main").unwrap();
        assert!(recipe.step("embed").is_some());
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let settings = CommandSettings {
            shortcut: "x".into(),
            ..CommandSettings::default()
        };
        assert!(command_step(tmp.path(), &settings).is_err());
    }
}
