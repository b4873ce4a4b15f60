//! Step graph construction.
//!
//! Scans the source tree, plans objects and binaries, and turns them into
//! compile, link and run steps plus the compilation database. Extensions get
//! their turn before scanning, after scanning and after planning.

use anyhow::{Context, Result};

use crate::builder::compdb::{self, CompileCommand, COMPDB_FILE};
use crate::builder::context::BuildContext;
use crate::builder::plan::{plan, BuildPlan};
use crate::extension::ExtensionRegistry;
use crate::recipe::{Action, Recipe, Step};
use crate::scanner::{resolve_includes, scan_sources};
use crate::util::config::CONFIG_FILE;
use crate::util::process::ProcessBuilder;

/// Build the full, unpruned recipe for the project.
pub fn build_recipe(bcx: &BuildContext, extensions: &ExtensionRegistry) -> Result<Recipe> {
    let gctx = &bcx.gctx;
    let mut recipe = Recipe::new(gctx.root(), gctx.hash_dir());

    extensions.pre_graph(bcx, &mut recipe)?;

    let scanner = bcx.directive_scanner()?;
    let mut sources = scan_sources(gctx, &scanner)?;

    extensions.post_scan(bcx, &mut sources, &mut recipe)?;
    resolve_includes(&mut sources);

    let plan = plan(&sources, &bcx.build_types, gctx.build_dir_rel());
    add_plan_steps(bcx, &plan, &mut recipe)?;

    extensions.post_plan(bcx, &sources, &plan, &mut recipe)?;

    tracing::debug!("recipe has {} steps", recipe.len());
    Ok(recipe)
}

fn add_plan_steps(bcx: &BuildContext, plan: &BuildPlan, recipe: &mut Recipe) -> Result<()> {
    let gctx = &bcx.gctx;
    let mut database = Vec::with_capacity(plan.objects.len());

    for object in &plan.objects {
        let build_type = bcx
            .build_types
            .get(&object.build_type)
            .with_context(|| format!("unknown build type `{}`", object.build_type))?;
        let cmd = bcx.toolchain.compile_command(gctx, object, build_type);
        database.push(CompileCommand::new(
            gctx.root(),
            &object.source,
            &object.path,
            &cmd,
        ));

        recipe.add_step(
            Step::new(
                object.name(),
                format!("Compiling {}", object.name()),
                Action::Spawn(cmd),
            )
            .inputs(object.deps.iter().cloned())
            .input(COMPDB_FILE)
            .output(object.path.clone()),
        )?;
        recipe.mark_generated(object.path.clone());
    }

    for binary in &plan.binaries {
        let build_type = bcx
            .build_types
            .get(&binary.build_type)
            .with_context(|| format!("unknown build type `{}`", binary.build_type))?;
        let name = binary.name();

        recipe.add_step(
            Step::new(
                format!("link {}", name),
                format!("Linking {}", name),
                Action::Spawn(bcx.toolchain.link_command(gctx, binary, build_type)),
            )
            .inputs(binary.objects.iter().cloned())
            .output(binary.path.clone()),
        )?;
        recipe.mark_generated(binary.path.clone());

        let run = ProcessBuilder::new(gctx.resolve(&binary.path))
            .args(&binary.run_args)
            .cwd(gctx.root());
        recipe.add_step(
            Step::new(name, format!("Running {}", name), Action::Spawn(run))
                .input(binary.path.clone()),
        )?;
    }

    let mut db_step = Step::new(
        COMPDB_FILE,
        "Writing JSON Compilation Database",
        Action::WriteFile {
            path: COMPDB_FILE.to_string(),
            contents: compdb::render(&database)?,
        },
    )
    .output(COMPDB_FILE);
    if gctx.resolve(CONFIG_FILE).exists() {
        // flag changes in maf.toml rewrite the database, which rebuilds objects
        db_step = db_step.input(CONFIG_FILE);
    }
    recipe.add_step(db_step)?;
    recipe.mark_generated(COMPDB_FILE);

    Ok(())
}
