//! Transitive include resolution.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::core::{FileId, SourceSet};

/// An `#include "..."` that names no scanned file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnresolvedInclude {
    /// File containing the directive.
    pub from: String,
    /// Root-relative path it resolved to.
    pub include: String,
}

struct Closure {
    includes: Vec<FileId>,
    system_includes: Vec<String>,
    main: bool,
    test: bool,
}

/// Compute every file's transitive includes.
///
/// Each file gets the headers reachable through its include edges in
/// breadth-first order, the system includes of all of them merged into its
/// own list, and their entry-point flags OR-ed into its own. Includes that
/// do not name a scanned file are dropped with a warning and returned, since
/// they may be generated later in the same build.
pub fn resolve_includes(set: &mut SourceSet) -> Vec<UnresolvedInclude> {
    let mut unresolved = BTreeSet::new();

    let closures: Vec<(FileId, Closure)> = set
        .ids()
        .map(|id| (id, closure(set, id, &mut unresolved)))
        .collect();

    for (id, closure) in closures {
        let file = set.get_mut(id);
        file.transitive_includes = closure.includes;
        file.system_includes = closure.system_includes;
        file.main |= closure.main;
        file.test |= closure.test;
    }

    for missing in &unresolved {
        tracing::warn!(
            "{} includes non-existent \"{}\"",
            missing.from,
            missing.include
        );
    }

    unresolved.into_iter().collect()
}

fn closure(set: &SourceSet, root: FileId, unresolved: &mut BTreeSet<UnresolvedInclude>) -> Closure {
    let mut seen = HashSet::from([root]);
    let mut result = Closure {
        includes: Vec::new(),
        system_includes: set[root].system_includes.clone(),
        main: false,
        test: false,
    };

    let mut queue: VecDeque<(FileId, &str)> = set[root]
        .direct_includes
        .iter()
        .map(|path| (root, path.as_str()))
        .collect();

    while let Some((from, path)) = queue.pop_front() {
        let Some(id) = set.lookup(path) else {
            unresolved.insert(UnresolvedInclude {
                from: set[from].path.clone(),
                include: path.to_string(),
            });
            continue;
        };
        if !seen.insert(id) {
            continue;
        }

        let header = &set[id];
        result.includes.push(id);
        for name in &header.system_includes {
            if !result.system_includes.contains(name) {
                result.system_includes.push(name.clone());
            }
        }
        result.main |= header.main;
        result.test |= header.test;
        queue.extend(header.direct_includes.iter().map(|p| (id, p.as_str())));
    }

    result
}
