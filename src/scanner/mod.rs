//! Source discovery and dependency scanning.
//!
//! [`scan_sources`] finds every `.c`, `.cc`, `.h` and `.hh` file under the
//! source directory and runs the [`DirectiveScanner`] over it.
//! Files that other steps generate are added with [`add_generated`].
//! [`resolve_includes`] then computes include closures once every file is
//! known.

pub mod directive;
pub mod includes;

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::core::{File, FileId, SourceSet};
use crate::util::context::GlobalContext;
use crate::util::fs::read_to_string_lossy;

pub use directive::DirectiveScanner;
pub use includes::{resolve_includes, UnresolvedInclude};

const EXTENSIONS: &[&str] = &["c", "cc", "h", "hh"];

fn is_scannable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.contains(&e))
}

/// List scannable files under the source directory, root-relative and sorted.
pub fn discover(ctx: &GlobalContext) -> Result<Vec<String>> {
    let src_dir = ctx.src_dir();
    if !src_dir.is_dir() {
        tracing::warn!("source directory {} does not exist", src_dir.display());
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(&src_dir).follow_links(true) {
        let entry =
            entry.with_context(|| format!("failed to walk {}", src_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_scannable(entry.path()) {
            paths.push(ctx.relative(entry.path()));
        }
    }

    paths.sort();
    Ok(paths)
}

/// Discover and scan every source file. Include closures are not resolved.
pub fn scan_sources(ctx: &GlobalContext, scanner: &DirectiveScanner) -> Result<SourceSet> {
    let mut set = SourceSet::new();
    for path in discover(ctx)? {
        let contents = read_to_string_lossy(&ctx.resolve(&path))?;
        let mut file = File::new(path);
        scanner.scan(ctx, &mut file, &contents);
        set.insert(file);
    }
    tracing::debug!("scanned {} files", set.len());
    Ok(set)
}

/// Register a source or header that a step produces during the build.
///
/// The file is scanned if it already exists from an earlier build. Local
/// includes that fell back to a root-relative path because the file was
/// missing at scan time are pointed at it, so their objects depend on it.
/// Returns `None` for paths that are not C or C++ sources.
pub fn add_generated(
    ctx: &GlobalContext,
    scanner: &DirectiveScanner,
    set: &mut SourceSet,
    path: &str,
) -> Result<Option<FileId>> {
    let path = ctx.relative(Path::new(path));
    if !is_scannable(Path::new(&path)) {
        return Ok(None);
    }
    if let Some(id) = set.lookup(&path) {
        return Ok(Some(id));
    }

    let mut file = File::new(path.clone());
    let abs = ctx.resolve(&path);
    if abs.is_file() {
        let contents = read_to_string_lossy(&abs)?;
        scanner.scan(ctx, &mut file, &contents);
    }

    let retarget: Vec<(FileId, usize)> = set
        .iter()
        .flat_map(|(id, including)| {
            let dir = Path::new(&including.path).parent().unwrap_or(Path::new(""));
            including
                .direct_includes
                .iter()
                .enumerate()
                .filter(|(_, include)| {
                    set.lookup(include).is_none() && ctx.relative(&dir.join(include)) == path
                })
                .map(move |(index, _)| (id, index))
                .collect::<Vec<_>>()
        })
        .collect();

    let id = set.insert(file);
    for (including, index) in retarget {
        tracing::debug!(
            "{} includes generated {}",
            set[including].path,
            path
        );
        set.get_mut(including).direct_includes[index] = path.clone();
    }
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("net")).unwrap();
        fs::write(src.join("main.cc"), "").unwrap();
        fs::write(src.join("net/tcp.hh"), "").unwrap();
        fs::write(src.join("zlib.c"), "").unwrap();
        fs::write(src.join("embed.py"), "").unwrap();
        fs::write(src.join("notes.txt"), "").unwrap();

        let ctx = GlobalContext::with_root(tmp.path());
        assert_eq!(
            discover(&ctx).unwrap(),
            ["src/main.cc", "src/net/tcp.hh", "src/zlib.c"]
        );
    }

    #[test]
    fn test_missing_src_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_root(tmp.path());
        assert!(discover(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_scan_sources() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.cc"), "#include \"b.hh\"\nint main() {}\n").unwrap();
        fs::write(src.join("b.hh"), "#include <string>\n").unwrap();

        let ctx = GlobalContext::with_root(tmp.path());
        let scanner = DirectiveScanner::new(Default::default(), ["fast"]).unwrap();
        let mut set = scan_sources(&ctx, &scanner).unwrap();
        resolve_includes(&mut set);

        let a = set.lookup("src/a.cc").unwrap();
        let b = set.lookup("src/b.hh").unwrap();
        assert!(set[a].main);
        assert_eq!(set[a].direct_includes, ["src/b.hh"]);
        assert_eq!(set[a].transitive_includes, [b]);
        assert_eq!(set[a].system_includes, ["string"]);
    }

    #[test]
    fn test_generated_header_joins_the_set() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.cc"), "#include \"version.hh\"\nint main() {}\n").unwrap();

        let ctx = GlobalContext::with_root(tmp.path());
        let scanner = DirectiveScanner::new(Default::default(), ["fast"]).unwrap();
        let mut set = scan_sources(&ctx, &scanner).unwrap();
        let main = set.lookup("src/main.cc").unwrap();
        // not on disk yet, so the include fell back to the root
        assert_eq!(set[main].direct_includes, ["version.hh"]);

        let version = add_generated(&ctx, &scanner, &mut set, "./src/version.hh")
            .unwrap()
            .unwrap();
        assert_eq!(set[version].path, "src/version.hh");
        assert_eq!(set[main].direct_includes, ["src/version.hh"]);

        assert!(resolve_includes(&mut set).is_empty());
        assert_eq!(set[main].transitive_includes, [version]);
    }

    #[test]
    fn test_existing_generated_file_is_scanned() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("build/gen")).unwrap();
        fs::write(
            tmp.path().join("build/gen/embedded.cc"),
            "#pragma maf add link argument \"-lz\"\n",
        )
        .unwrap();

        let ctx = GlobalContext::with_root(tmp.path());
        let scanner = DirectiveScanner::new(Default::default(), ["fast"]).unwrap();
        let mut set = SourceSet::new();
        let id = add_generated(&ctx, &scanner, &mut set, "build/gen/embedded.cc")
            .unwrap()
            .unwrap();
        assert_eq!(
            set[id].link_args.for_build_type("fast").collect::<Vec<_>>(),
            ["-lz"]
        );

        assert!(add_generated(&ctx, &scanner, &mut set, "build/gen/data.bin")
            .unwrap()
            .is_none());
        assert_eq!(set.len(), 1);
    }
}
