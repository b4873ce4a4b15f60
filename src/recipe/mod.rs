//! Generic step graph with incremental, parallel execution.
//!
//! A [`Recipe`] knows nothing about compilers. It holds [`Step`]s with
//! declared inputs and outputs, prunes them to what a target needs, decides
//! what is dirty, and runs the rest with bounded parallelism.

pub mod dirty;
pub mod error;
pub mod execute;
pub mod step;
pub mod waiter;
pub mod watcher;

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::fs::remove_path;
use crate::util::shell::{Shell, Status};

pub use dirty::HashStore;
pub use error::RecipeError;
pub use execute::{BuildOutcome, ExecuteOptions, ExecuteReport};
pub use step::{Action, Step};
pub use waiter::{platform_waiter, PollingWaiter, Waiter};
pub use watcher::Watcher;

/// Minimum normalized similarity for a target suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Ordered steps plus the paths they generate.
#[derive(Debug, Clone)]
pub struct Recipe {
    root: PathBuf,
    hashes: HashStore,
    steps: Vec<Step>,
    generated: BTreeSet<String>,
}

impl Recipe {
    /// Create an empty recipe. Relative paths resolve against `root`.
    pub fn new(root: impl Into<PathBuf>, hash_dir: impl Into<PathBuf>) -> Self {
        Recipe {
            root: root.into(),
            hashes: HashStore::new(hash_dir),
            steps: Vec::new(),
            generated: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hashes(&self) -> &HashStore {
        &self.hashes
    }

    /// Append a step.
    ///
    /// Shortcuts must be valid and unique, and no two steps may declare the
    /// same output.
    pub fn add_step(&mut self, step: Step) -> Result<(), RecipeError> {
        step::validate_shortcut(&step.shortcut)?;
        if self.step(&step.shortcut).is_some() {
            return Err(RecipeError::DuplicateShortcut {
                shortcut: step.shortcut,
            });
        }
        for output in &step.outputs {
            if let Some(other) = self.steps.iter().find(|s| s.outputs.contains(output)) {
                return Err(RecipeError::DuplicateOutput {
                    output: output.clone(),
                    first: other.shortcut.clone(),
                    second: step.shortcut.clone(),
                });
            }
        }
        self.steps.push(step);
        Ok(())
    }

    /// Remember a root-relative path for [`Recipe::clean`].
    pub fn mark_generated(&mut self, path: impl Into<String>) {
        self.generated.insert(path.into());
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, shortcut: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.shortcut == shortcut)
    }

    pub fn step_mut(&mut self, shortcut: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.shortcut == shortcut)
    }

    pub fn generated(&self) -> impl Iterator<Item = &str> {
        self.generated.iter().map(String::as_str)
    }

    pub fn shortcuts(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.shortcut.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Delete every generated path that exists. Returns how many were removed.
    pub fn clean(&self, shell: &Shell) -> Result<usize> {
        let mut removed = 0;
        for path in &self.generated {
            if remove_path(&self.root.join(path))? {
                shell.status(Status::Removed, path);
                removed += 1;
            }
        }
        tracing::debug!("removed {} generated paths", removed);
        Ok(removed)
    }

    /// Keep only `target` and the steps producing its inputs, transitively.
    ///
    /// Retained steps keep their relative order. An input that no step
    /// produces must already exist.
    pub fn set_target(&mut self, target: &str) -> Result<(), RecipeError> {
        let Some(start) = self.steps.iter().position(|s| s.shortcut == target) else {
            let available: Vec<String> = self.shortcuts().map(str::to_string).collect();
            return Err(RecipeError::UnknownTarget {
                target: target.to_string(),
                suggestions: suggest(target, &available),
                available,
            });
        };

        let producers: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.outputs.iter().map(move |o| (o.as_str(), i)))
            .collect();

        let mut keep = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            if !keep.insert(i) {
                continue;
            }
            let step = &self.steps[i];
            for input in &step.inputs {
                match producers.get(input.as_str()) {
                    Some(&producer) => stack.push(producer),
                    None if self.root.join(input).exists() => {}
                    None => {
                        return Err(RecipeError::MissingInput {
                            step: step.shortcut.clone(),
                            input: input.clone(),
                        })
                    }
                }
            }
        }

        let mut index = 0;
        self.steps.retain(|_| {
            let kept = keep.contains(&index);
            index += 1;
            kept
        });
        tracing::debug!("target `{}` needs {} steps", target, self.steps.len());
        Ok(())
    }

    /// Append arguments to the commands of one step.
    pub fn append_args(&mut self, shortcut: &str, args: &[String]) -> Result<(), RecipeError> {
        let Some(step) = self.step_mut(shortcut) else {
            return Err(RecipeError::UnknownTarget {
                target: shortcut.to_string(),
                suggestions: Vec::new(),
                available: Vec::new(),
            });
        };
        step.action.append_args(args);
        Ok(())
    }

    /// Human-readable listing of every step, for `--verbose`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let _ = writeln!(out, "{} ({})", step.shortcut, step.description);
            for input in &step.inputs {
                let _ = writeln!(out, "  < {}", input);
            }
            for output in &step.outputs {
                let _ = writeln!(out, "  > {}", output);
            }
            for line in step.action.command_lines() {
                let _ = writeln!(out, "  $ {}", line);
            }
        }
        out
    }
}

/// Up to three shortcuts close to `target`, best first.
fn suggest(target: &str, shortcuts: &[String]) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = shortcuts
        .iter()
        .map(|s| (strsim::normalized_damerau_levenshtein(target, s), s))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(3).map(|(_, s)| s.clone()).collect()
}
