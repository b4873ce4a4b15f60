//! Implementation of `maf <target>`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::{build_recipe, BuildContext};
use crate::extension::ExtensionRegistry;
use crate::recipe::{platform_waiter, BuildOutcome, ExecuteOptions, Waiter, Watcher};
use crate::util::fs::ensure_dir;
use crate::util::shell::{Shell, Status};

/// Options for one `maf` invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Shortcut of the step to bring up to date
    pub target: String,

    /// Remove generated files before the first attempt
    pub fresh: bool,

    /// Keep rebuilding whenever the sources change
    pub live: bool,

    /// Print the build graph and every command line
    pub verbose: bool,

    /// Extra arguments appended to the target's command
    pub extra_args: Vec<String>,

    /// Maximum number of concurrent steps (None = logical CPU count)
    pub jobs: Option<usize>,
}

/// Build `opts.target` in the project at `root`.
///
/// In live mode this only returns on error; each source change starts a
/// new attempt with a freshly scanned recipe.
pub fn build(root: &Path, opts: &BuildOptions, shell: &Arc<Shell>) -> Result<BuildOutcome> {
    build_with(root, opts, shell, platform_waiter().as_ref(), &Watcher::spawn)
}

/// [`build`] with an explicit way of waiting for child processes and of
/// watching the source directory.
pub fn build_with(
    root: &Path,
    opts: &BuildOptions,
    shell: &Arc<Shell>,
    waiter: &dyn Waiter,
    watch: &dyn Fn(&Path) -> Result<Watcher>,
) -> Result<BuildOutcome> {
    let mut exec_opts = ExecuteOptions {
        live: opts.live,
        ..ExecuteOptions::default()
    };
    if let Some(jobs) = opts.jobs {
        exec_opts.jobs = jobs.max(1);
    }

    let mut first_attempt = true;
    loop {
        let bcx = BuildContext::load(root, opts.verbose)?;
        let extensions = ExtensionRegistry::from_names(&bcx.config.extensions)?;
        let src_dir = bcx.gctx.src_dir();

        let mut recipe = build_recipe(&bcx, &extensions)?;
        if opts.verbose {
            shell.verbose(recipe.describe().trim_end());
        }

        if first_attempt && opts.fresh {
            shell.status(Status::Info, "cleaning old build results");
            recipe.clean(shell)?;
        }
        first_attempt = false;

        recipe.set_target(&opts.target)?;
        if !opts.extra_args.is_empty() {
            recipe.append_args(&opts.target, &opts.extra_args)?;
        }

        let obj_dir = bcx.gctx.build_dir().join("obj");
        ensure_dir(&obj_dir)
            .with_context(|| format!("failed to create {}", obj_dir.display()))?;

        let mut watcher = start_watcher(watch, &src_dir, opts.live)?;
        let report = recipe.execute(shell, waiter, watcher.as_mut(), &exec_opts)?;
        extensions.post_build(&bcx, &opts.target, &report)?;

        let Some(mut watcher) = watcher.filter(|_| opts.live) else {
            return Ok(report.outcome);
        };

        if !watcher.has_fired() {
            shell.status(
                Status::Waiting,
                format!("for changes in {}", bcx.gctx.relative(&src_dir)),
            );
            watcher.wait_for_change()?;
        }
        tracing::debug!("sources changed, rebuilding the recipe");
    }
}

fn start_watcher(
    watch: &dyn Fn(&Path) -> Result<Watcher>,
    src_dir: &Path,
    live: bool,
) -> Result<Option<Watcher>> {
    match watch(src_dir) {
        Ok(watcher) => Ok(Some(watcher)),
        Err(e) if live => Err(e.context("live mode needs a working file watcher")),
        Err(e) => {
            tracing::debug!("building without a file watcher: {:#}", e);
            Ok(None)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::recipe::PollingWaiter;
    use crate::util::process::ProcessBuilder;
    use anyhow::bail;
    use std::cell::Cell;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A project whose compiler logs its `-o` argument to `cc.log` and
    /// writes a script there that saves its arguments to `<itself>.args`.
    fn project_with(config: &str, files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let cc = root.join("fake-cc");
        fs::write(
            &cc,
            "#!/bin/sh\nout=\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = -o ]; then out=$2; fi\n  shift\ndone\n\
             echo \"$out\" >> \"$(dirname \"$0\")/cc.log\"\n\
             printf '#!/bin/sh\\necho \"$@\" > \"$0.args\"\\n' > \"$out\"\nchmod +x \"$out\"\n",
        )
        .unwrap();
        fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(
            root.join("maf.toml"),
            format!(
                "{1}\n[toolchain]\ncc = \"{0}\"\ncxx = \"{0}\"\nquery_defines = false\n",
                cc.display(),
                config
            ),
        )
        .unwrap();
        for (path, contents) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        tmp
    }

    fn project(files: &[(&str, &str)]) -> TempDir {
        project_with("", files)
    }

    fn no_watcher(_: &Path) -> Result<Watcher> {
        bail!("no file watcher in tests")
    }

    /// `waitpid(-1)` would reap children of concurrently running tests.
    fn run(root: &Path, opts: &BuildOptions, shell: &Arc<Shell>) -> Result<BuildOutcome> {
        build_with(root, opts, shell, &PollingWaiter::default(), &no_watcher)
    }

    fn opts(target: &str) -> BuildOptions {
        BuildOptions {
            target: target.into(),
            ..BuildOptions::default()
        }
    }

    fn compiled(root: &Path, object: &str) -> usize {
        fs::read_to_string(root.join("cc.log"))
            .unwrap_or_default()
            .lines()
            .filter(|line| line.ends_with(&format!("obj/{}", object)))
            .count()
    }

    #[test]
    fn test_builds_and_links_a_binary() {
        let tmp = project(&[("src/hello.cc", "int main() {}\n")]);
        let shell = Arc::new(Shell::quiet());

        let outcome = run(tmp.path(), &opts("link hello"), &shell).unwrap();
        assert_eq!(outcome, BuildOutcome::Success);
        assert!(tmp.path().join("build/obj/hello.o").exists());
        assert!(tmp.path().join("build/hello").exists());
        assert!(tmp.path().join("compile_commands.json").exists());
        assert_eq!(compiled(tmp.path(), "hello.o"), 1);
    }

    #[test]
    fn test_fresh_removes_generated_files_first() {
        let tmp = project(&[("src/hello.cc", "int main() {}\n")]);
        let shell = Arc::new(Shell::quiet());
        run(tmp.path(), &opts("link hello"), &shell).unwrap();

        let stale = tmp.path().join("build/debug_hello");
        fs::write(&stale, "stale").unwrap();
        let fresh = BuildOptions {
            fresh: true,
            ..opts("link hello")
        };
        run(tmp.path(), &fresh, &shell).unwrap();
        assert!(!stale.exists());
        assert!(tmp.path().join("build/hello").exists());
        assert_eq!(compiled(tmp.path(), "hello.o"), 2);
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let tmp = project(&[("src/hello.cc", "int main() {}\n")]);
        let shell = Arc::new(Shell::quiet());
        let err = run(tmp.path(), &opts("helo"), &shell).unwrap_err();
        assert!(err.to_string().contains("helo"));
    }

    #[test]
    fn test_unknown_target_starts_no_watcher() {
        let tmp = project(&[("src/hello.cc", "int main() {}\n")]);
        let shell = Arc::new(Shell::quiet());
        let watched = Cell::new(false);
        let watch = |_: &Path| -> Result<Watcher> {
            watched.set(true);
            bail!("no file watcher in tests")
        };

        let live = BuildOptions {
            live: true,
            ..opts("helo")
        };
        let err = build_with(tmp.path(), &live, &shell, &PollingWaiter::default(), &watch)
            .unwrap_err();
        assert!(err.to_string().contains("helo"));
        assert!(!watched.get());
        assert_eq!(compiled(tmp.path(), "hello.o"), 0);
    }

    #[test]
    fn test_extra_args_reach_the_target() {
        let tmp = project(&[(
            "src/hello.cc",
            "#pragma maf add run argument \"--verbose\"\nint main() {}\n",
        )]);
        let shell = Arc::new(Shell::quiet());
        let serve = BuildOptions {
            extra_args: vec!["--port=8080".into()],
            ..opts("hello")
        };
        assert_eq!(run(tmp.path(), &serve, &shell).unwrap(), BuildOutcome::Success);
        assert_eq!(
            fs::read_to_string(tmp.path().join("build/hello.args")).unwrap(),
            "--verbose --port=8080\n"
        );
    }

    #[test]
    fn test_command_output_is_built_before_its_includer() {
        let tmp = project_with(
            r#"extensions = ["command"]

[[command]]
shortcut = "gen"
program = "sh"
args = ["-c", "echo '#define GEN 1' > src/gen.hh"]
outputs = ["src/gen.hh"]
"#,
            &[("src/main.cc", "#include \"gen.hh\"\nint main() {}\n")],
        );
        let shell = Arc::new(Shell::quiet());

        let outcome = run(tmp.path(), &opts("link main"), &shell).unwrap();
        assert_eq!(outcome, BuildOutcome::Success);
        assert!(tmp.path().join("src/gen.hh").exists());
        assert_eq!(compiled(tmp.path(), "main.o"), 1);

        // the header now exists and is found by the scan itself
        let outcome = run(tmp.path(), &opts("link main"), &shell).unwrap();
        assert_eq!(outcome, BuildOutcome::Success);
        assert_eq!(compiled(tmp.path(), "main.o"), 1);
    }

    #[test]
    fn test_live_mode_rebuilds_after_a_change() {
        let tmp = project(&[("src/hello.cc", "int main() {}\n")]);
        let shell = Arc::new(Shell::quiet());
        let source = tmp.path().join("src/hello.cc");
        let attempts = Cell::new(0);
        let watch = |_: &Path| -> Result<Watcher> {
            attempts.set(attempts.get() + 1);
            let script = if attempts.get() == 1 {
                format!("sleep 1; echo '// edited' >> '{}'", source.display())
            } else {
                "sleep 1; echo 'watches exhausted' >&2; exit 3".to_string()
            };
            let process = ProcessBuilder::new("sh").args(["-c", script.as_str()]).spawn()?;
            Ok(Watcher::from_process(process))
        };

        let live = BuildOptions {
            live: true,
            ..opts("link hello")
        };
        let err = build_with(tmp.path(), &live, &shell, &PollingWaiter::default(), &watch)
            .unwrap_err();
        assert!(
            format!("{:#}", err).contains("file watcher exited"),
            "{:#}",
            err
        );
        assert_eq!(attempts.get(), 2);
        assert_eq!(compiled(tmp.path(), "hello.o"), 2);
        assert!(fs::read_to_string(&source).unwrap().contains("// edited"));
    }
}
