//! CLI integration tests for maf.
//!
//! The projects use a fake compiler script that writes a tiny shell
//! program to whatever `-o` names, so these run without a C toolchain.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const FAKE_CC: &str = r##"#!/bin/sh
out=
src=
for arg in "$@"; do
  case "$arg" in
    *.cc|*.c)
      src=$arg
      if grep -q BROKEN "$arg"; then
        echo "$arg: error: source is broken" >&2
        exit 1
      fi
      ;;
  esac
done
while [ $# -gt 0 ]; do
  if [ "$1" = -o ]; then out=$2; fi
  shift
done
printf '#!/bin/sh\necho ran "$@"\n' > "$out"
if [ -n "$src" ]; then echo "# $(cksum < "$src")" >> "$out"; fi
chmod +x "$out"
"##;

/// Get the maf binary command, isolated from the caller's toolchain env.
fn maf(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("maf").unwrap();
    cmd.current_dir(root)
        .env_remove("CC")
        .env_remove("CXX")
        .env_remove("CXXFLAGS")
        .env_remove("LDFLAGS")
        .env_remove("MAF_JOBS");
    cmd
}

/// A project with `files` and a `maf.toml` pointing at the fake compiler.
fn project(files: &[(&str, &str)], extra_config: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let cc = root.join("fake-cc");
    fs::write(&cc, FAKE_CC).unwrap();
    fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(
        root.join("maf.toml"),
        format!(
            "{1}\n[toolchain]\ncc = \"{0}\"\ncxx = \"{0}\"\nquery_defines = false\n",
            cc.display(),
            extra_config
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

fn hello() -> TempDir {
    project(
        &[
            ("src/hello.cc", "#include \"greet.hh\"\nint main() {}\n"),
            ("src/greet.hh", "#pragma once\n"),
            ("src/greet.cc", "#include \"greet.hh\"\n"),
        ],
        "",
    )
}

// ============================================================================
// maf --help
// ============================================================================

#[test]
fn test_help_lists_flags() {
    let tmp = TempDir::new().unwrap();
    maf(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--fresh"))
        .stdout(predicate::str::contains("--live"))
        .stdout(predicate::str::contains("<TARGET>"));
}

#[test]
fn test_target_is_required() {
    let tmp = TempDir::new().unwrap();
    maf(tmp.path()).assert().failure();
}

// ============================================================================
// building
// ============================================================================

#[test]
fn test_link_builds_objects_and_binary() {
    let tmp = hello();
    maf(tmp.path())
        .arg("link hello")
        .assert()
        .success()
        .stderr(predicate::str::contains("Compiling hello.o"))
        .stderr(predicate::str::contains("Compiling greet.o"))
        .stderr(predicate::str::contains("Linking hello"))
        .stderr(predicate::str::contains("Finished"));

    let root = tmp.path();
    assert!(root.join("build/obj/hello.o").exists());
    assert!(root.join("build/obj/greet.o").exists());
    assert!(root.join("build/hello").exists());
    assert!(!root.join("build/release_hello").exists());

    let db = fs::read_to_string(root.join("compile_commands.json")).unwrap();
    assert!(db.contains("src/greet.cc"));
}

#[test]
fn test_second_build_does_nothing() {
    let tmp = hello();
    maf(tmp.path()).arg("link hello").assert().success();
    maf(tmp.path())
        .arg("link hello")
        .assert()
        .success()
        .stderr(predicate::str::contains("Compiling").not())
        .stderr(predicate::str::contains("Linking").not());
}

#[test]
fn test_changed_source_rebuilds_only_its_object() {
    let tmp = hello();
    maf(tmp.path()).arg("link hello").assert().success();

    let greet = tmp.path().join("src/greet.cc");
    fs::write(&greet, "#include \"greet.hh\"\nint greet() { return 1; }\n").unwrap();
    let later = filetime::FileTime::from_unix_time(4_000_000_000, 0);
    filetime::set_file_mtime(&greet, later).unwrap();

    maf(tmp.path())
        .arg("link hello")
        .assert()
        .success()
        .stderr(predicate::str::contains("Compiling greet.o"))
        .stderr(predicate::str::contains("Compiling hello.o").not())
        .stderr(predicate::str::contains("Linking hello"));
}

#[test]
fn test_run_target_passes_extra_args() {
    let tmp = hello();
    maf(tmp.path())
        .args(["hello", "-x", "--port=8080", "-x", "verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ran --port=8080 verbose"));
}

#[test]
fn test_directory_flag_selects_project() {
    let tmp = hello();
    let elsewhere = TempDir::new().unwrap();
    maf(elsewhere.path())
        .args(["-C", tmp.path().to_str().unwrap(), "link hello"])
        .assert()
        .success();
    assert!(tmp.path().join("build/hello").exists());
}

#[test]
fn test_fresh_rebuilds_everything() {
    let tmp = hello();
    maf(tmp.path()).arg("link hello").assert().success();
    maf(tmp.path())
        .args(["--fresh", "link hello"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed"))
        .stderr(predicate::str::contains("Compiling hello.o"));
}

#[test]
fn test_compile_failure_exits_non_zero() {
    let tmp = project(&[("src/bad.cc", "BROKEN\nint main() {}\n")], "");
    maf(tmp.path())
        .arg("link bad")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Compiling bad.o"))
        .stderr(predicate::str::contains("source is broken"));
    assert!(!tmp.path().join("build/bad").exists());
}

// ============================================================================
// targets
// ============================================================================

#[test]
fn test_unknown_target_suggests_close_match() {
    let tmp = project(
        &[("src/hello.cc", "int main() {}\n")],
        "extensions = [\"command\"]\n\n[[command]]\nshortcut = \"build\"\nprogram = \"true\"\n",
    );
    maf(tmp.path())
        .arg("buidl")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no step named `buidl`"))
        .stderr(predicate::str::contains("did you mean `build`?"));
}

#[test]
fn test_unknown_extension_is_a_config_error() {
    let tmp = project(&[], "extensions = [\"gtest\"]\n");
    maf(tmp.path())
        .arg("tests")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown extension `gtest`"));
}

#[test]
fn test_test_suite_runs_test_binaries() {
    let tmp = project(
        &[
            ("src/net_test.cc", "TEST(Net, Works) {}\n"),
            ("src/server.cc", "int main() {}\n"),
        ],
        "",
    );
    maf(tmp.path())
        .arg("tests")
        .assert()
        .success()
        .stdout(predicate::str::contains("ran"));
    assert!(tmp.path().join("build/net_test").exists());
    assert!(!tmp.path().join("build/server").exists());
}
