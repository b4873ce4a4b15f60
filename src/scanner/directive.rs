//! Line-oriented directive scanner.
//!
//! This is not a preprocessor. It keeps a stack of branch conditions to skip
//! platform-specific regions, then pattern-matches the handful of
//! directives the planner cares about. Conditions are evaluated on a single
//! identifier with optional negation: `#if defined(A) && defined(B)` tests
//! only `A`.
//!
//! Each stack entry is the condition of its own branch only. A nested
//! `#if` does not inherit the enclosing region's state, and `#else` flips
//! the innermost entry, so a branch nested in a skipped region can still be
//! read.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;

use crate::core::{ArgKind, File};
use crate::util::context::GlobalContext;

/// Compiled directive patterns plus the macro environment.
#[derive(Debug)]
pub struct DirectiveScanner {
    defines: HashSet<String>,
    conditional: Regex,
    system_include: Regex,
    comment_lib: Regex,
    local_include: Regex,
    add_argument: Regex,
    main_pragma: Regex,
    main_function: Regex,
    test_macro: Regex,
}

impl DirectiveScanner {
    /// Create a scanner for the given macro set.
    ///
    /// `build_types` lists the names accepted as qualifier in
    /// `#pragma maf add <build type> <kind> argument "<value>"`.
    pub fn new<'a>(
        defines: HashSet<String>,
        build_types: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, regex::Error> {
        let qualifiers = build_types
            .into_iter()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");

        Ok(DirectiveScanner {
            defines,
            conditional: Regex::new(concat!(
                r"^\s*#\s*(?:(?P<else>else)\b|(?P<end>endif)\b|(?P<el>el)?if(?P<neg1>n)?(?:def)?\b",
                r"\s*(?P<neg2>!)?\s*(?:defined\b)?\s*\(?\s*(?P<id>[A-Za-z0-9_]+)?)"
            ))?,
            system_include: Regex::new(r"^#include <([a-zA-Z0-9_/\.+-]+)>")?,
            comment_lib: Regex::new(r#"^#pragma comment\(lib, "([a-zA-Z0-9_/\.-]+)"\)"#)?,
            local_include: Regex::new(r#"^#include "([a-zA-Z0-9_/\.-]+\.hh?)""#)?,
            add_argument: Regex::new(&format!(
                r#"^#pragma maf add (?P<build_type>{}|) ?(?P<kind>link|compile|run) argument "(?P<arg>.+)""#,
                qualifiers
            ))?,
            main_pragma: Regex::new(r"^#pragma maf main\b")?,
            main_function: Regex::new(r"^int main\(")?,
            test_macro: Regex::new(r"^TEST(?:_F)?\(")?,
        })
    }

    /// Whether `name` counts as defined.
    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains(name)
    }

    /// Fill `file` from its contents.
    ///
    /// Clears everything derived from a previous scan first.
    pub fn scan(&self, ctx: &GlobalContext, file: &mut File, contents: &str) {
        file.system_includes.clear();
        file.comment_libs.clear();
        file.direct_includes.clear();
        file.transitive_includes.clear();
        file.compile_args.clear();
        file.link_args.clear();
        file.run_args.clear();
        file.main = false;
        file.test = false;

        let mut stack = vec![true];

        for (lineno, line) in contents.lines().enumerate() {
            if let Some(caps) = self.conditional.captures(line) {
                if caps.name("end").is_some() {
                    if stack.len() > 1 {
                        stack.pop();
                    } else {
                        tracing::warn!("{}:{}: unbalanced #endif", file.path, lineno + 1);
                    }
                    continue;
                }

                if caps.name("else").is_some() {
                    if let Some(top) = stack.last_mut() {
                        *top = !*top;
                    }
                    continue;
                }

                let mut test = caps
                    .name("id")
                    .is_some_and(|id| self.is_defined(id.as_str()));
                if caps.name("neg1").is_some() || caps.name("neg2").is_some() {
                    test = !test;
                }

                if caps.name("el").is_some() {
                    if let Some(top) = stack.last_mut() {
                        *top = test;
                    }
                } else {
                    stack.push(test);
                }
                continue;
            }

            if stack.last() == Some(&false) {
                continue;
            }

            if let Some(caps) = self.system_include.captures(line) {
                let name = &caps[1];
                if !file.system_includes.iter().any(|s| s == name) {
                    file.system_includes.push(name.to_string());
                }
                continue;
            }

            if let Some(caps) = self.comment_lib.captures(line) {
                file.comment_libs.push(caps[1].to_string());
                continue;
            }

            if let Some(caps) = self.local_include.captures(line) {
                let include = resolve_local_include(ctx, &file.path, &caps[1]);
                file.direct_includes.push(include);
                continue;
            }

            if let Some(caps) = self.add_argument.captures(line) {
                // the pattern only admits the three kinds
                if let Ok(kind) = caps["kind"].parse::<ArgKind>() {
                    file.args_mut(kind).push(&caps["build_type"], &caps["arg"]);
                }
                continue;
            }

            if self.main_pragma.is_match(line) || self.main_function.is_match(line) {
                file.main = true;
            } else if self.test_macro.is_match(line) {
                file.test = true;
            }
        }

        if stack.len() > 1 {
            tracing::debug!("{}: {} unterminated #if block(s)", file.path, stack.len() - 1);
        }
    }
}

/// Resolve `#include "name"` relative to the including file, falling back
/// to the project root when that doesn't exist.
fn resolve_local_include(ctx: &GlobalContext, including: &str, name: &str) -> String {
    let dir = Path::new(including).parent().unwrap_or(Path::new(""));
    let beside = dir.join(name);
    if ctx.resolve(&beside).exists() {
        ctx.relative(&beside)
    } else {
        ctx.relative(Path::new(name))
    }
}
