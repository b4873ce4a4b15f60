//! Filesystem utilities.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Remove a file or a directory tree. Returns whether anything was removed.
pub fn remove_path(path: &Path) -> Result<bool> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(false);
    };
    if meta.is_dir() {
        remove_dir_all_if_exists(path)?;
    } else {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove file: {}", path.display()))?;
    }
    Ok(true)
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, replacing invalid UTF-8 sequences.
pub fn read_to_string_lossy(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Expand glob patterns relative to a base directory.
///
/// Patterns without glob metacharacters are returned as-is so that paths
/// which do not exist yet (outputs of other steps) survive expansion.
pub fn expand_globs(base: &Path, patterns: &[String]) -> Result<Vec<String>> {
    let mut results = Vec::new();

    for pattern in patterns {
        if !pattern.contains(|c| matches!(c, '*' | '?' | '[')) {
            results.push(pattern.clone());
            continue;
        }

        let full_pattern = base.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        for entry in
            glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))?
        {
            match entry {
                Ok(path) => results.push(to_slash(&relative_path(base, &path))),
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                }
            }
        }
    }

    results.sort();
    results.dedup();
    Ok(results)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Render a relative path with `/` separators on every platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_globs() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("a.png"), "a").unwrap();
        fs::write(assets.join("b.png"), "b").unwrap();
        fs::write(assets.join("notes.txt"), "n").unwrap();

        let files = expand_globs(
            tmp.path(),
            &["assets/*.png".to_string(), "build/gen.h".to_string()],
        )
        .unwrap();
        assert_eq!(files, vec!["assets/a.png", "assets/b.png", "build/gen.h"]);
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("src/net/../util/./x.hh")),
            PathBuf::from("src/util/x.hh")
        );
        assert_eq!(
            normalize_lexically(Path::new("../a.h")),
            PathBuf::from("../a.h")
        );
    }

    #[test]
    fn test_remove_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("out.o");
        let dir = tmp.path().join("gen");
        fs::write(&file, "obj").unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();

        assert!(remove_path(&file).unwrap());
        assert!(remove_path(&dir).unwrap());
        assert!(!remove_path(&file).unwrap());
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_to_slash() {
        let path: PathBuf = ["src", "net", "tcp.cc"].iter().collect();
        assert_eq!(to_slash(&path), "src/net/tcp.cc");
    }
}
