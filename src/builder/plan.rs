//! Build planning - object files and binaries from a resolved source set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::Serialize;

use crate::core::{BuildType, BuildTypes, FileId, Language, SourceSet};

/// Extension of linked binaries on this platform.
pub const EXE_SUFFIX: &str = std::env::consts::EXE_SUFFIX;

/// One compilation of a translation unit for one build type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectFile {
    /// Output path, root-relative.
    pub path: String,
    /// Translation unit, root-relative.
    pub source: String,
    pub language: Language,
    /// The source followed by its transitive includes.
    pub deps: Vec<String>,
    pub compile_args: Vec<String>,
    pub build_type: String,
}

impl ObjectFile {
    /// File name of the output, used as step shortcut.
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

/// One linked program for one build type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binary {
    /// Output path, root-relative.
    pub path: String,
    /// Entry-point file the binary is named after.
    pub entry: String,
    /// Object paths in link order.
    pub objects: Vec<String>,
    pub link_args: Vec<String>,
    pub run_args: Vec<String>,
    pub build_type: String,
    /// Built from a file declaring tests.
    pub test: bool,
}

impl Binary {
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Everything to compile and link.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildPlan {
    pub objects: Vec<ObjectFile>,
    pub binaries: Vec<Binary>,
}

impl BuildPlan {
    /// Binaries of one build type.
    pub fn binaries_for<'a>(&'a self, build_type: &'a str) -> impl Iterator<Item = &'a Binary> {
        self.binaries
            .iter()
            .filter(move |b| b.build_type == build_type)
    }
}

/// Plan objects and binaries for every build type.
///
/// `set` must have its include closures resolved. Objects go to
/// `<build_dir>/obj/[<bt>_]<stem>.o` and binaries to
/// `<build_dir>/[<bt>_]<stem>`.
pub fn plan(set: &SourceSet, build_types: &BuildTypes, build_dir: &Path) -> BuildPlan {
    let build_dir = crate::util::fs::to_slash(build_dir);
    let mut plan = BuildPlan::default();
    let mut object_index: HashMap<(FileId, &str), usize> = HashMap::new();
    let mut owners: HashMap<String, FileId> = HashMap::new();

    for (id, file) in set.iter() {
        let Some(language) = file.language() else {
            continue;
        };
        for bt in build_types.iter() {
            let path = format!("{}/obj/{}.o", build_dir, bt.output_name(file.stem()));
            if let Some(&owner) = owners.get(&path) {
                if owner != id {
                    tracing::warn!(
                        "{} and {} both compile to {}, skipping {}",
                        set[owner].path,
                        file.path,
                        path,
                        file.path
                    );
                }
                continue;
            }
            owners.insert(path.clone(), id);

            let mut deps = vec![file.path.clone()];
            deps.extend(file.transitive_includes.iter().map(|&i| set[i].path.clone()));

            object_index.insert((id, bt.name.as_str()), plan.objects.len());
            plan.objects.push(ObjectFile {
                path,
                source: file.path.clone(),
                language,
                deps,
                compile_args: compile_args(set, id, bt),
                build_type: bt.name.clone(),
            });
        }
    }

    for (id, file) in set.iter() {
        if !file.is_source() || !file.is_entry_point() {
            continue;
        }
        for bt in build_types.iter() {
            plan.binaries
                .push(binary(set, id, bt, &build_dir, &plan.objects, &object_index));
        }
    }

    tracing::debug!(
        "planned {} objects and {} binaries",
        plan.objects.len(),
        plan.binaries.len()
    );
    plan
}

/// The file's own compile arguments, then those of each transitive include.
fn compile_args(set: &SourceSet, id: FileId, bt: &BuildType) -> Vec<String> {
    let file = &set[id];
    let mut args: Vec<String> = file.compile_args.for_build_type(&bt.name).cloned().collect();
    for &include in &file.transitive_includes {
        args.extend(set[include].compile_args.for_build_type(&bt.name).cloned());
    }
    args
}

fn binary(
    set: &SourceSet,
    entry: FileId,
    bt: &BuildType,
    build_dir: &str,
    objects: &[ObjectFile],
    object_index: &HashMap<(FileId, &str), usize>,
) -> Binary {
    let file = &set[entry];
    let mut bin = Binary {
        path: format!("{}/{}{}", build_dir, bt.output_name(file.stem()), EXE_SUFFIX),
        entry: file.path.clone(),
        objects: Vec::new(),
        link_args: Vec::new(),
        run_args: Vec::new(),
        build_type: bt.name.clone(),
        test: file.test,
    };

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([entry]);
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let file = &set[id];
        bin.link_args
            .extend(file.link_args.for_build_type(&bt.name).cloned());
        bin.run_args
            .extend(file.run_args.for_build_type(&bt.name).cloned());
        bin.link_args.extend(
            file.comment_libs
                .iter()
                .map(|lib| format!("-l{}", lib.strip_suffix(".lib").unwrap_or(lib))),
        );
        if let Some(&index) = object_index.get(&(id, bt.name.as_str())) {
            bin.objects.push(objects[index].path.clone());
        }

        queue.extend(file.transitive_includes.iter().copied());
        if let Some(sibling) = set.sibling_of(id) {
            queue.push_back(sibling);
        }
    }

    bin
}
