//! Steps and their actions.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::recipe::error::RecipeError;
use crate::util::process::ProcessBuilder;

/// What a step does when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    /// Launch a process and let the executor wait for it.
    Spawn(ProcessBuilder),
    /// Run processes one after another, stopping at the first failure.
    /// Each is waited on like a `Spawn`.
    RunAll(Vec<ProcessBuilder>),
    /// Write a root-relative file, leaving it untouched when unchanged.
    WriteFile { path: String, contents: String },
    /// Do nothing; the step only groups its inputs.
    Nothing,
}

impl Action {
    /// Append arguments to every command of the action.
    pub fn append_args(&mut self, args: &[String]) {
        match self {
            Action::Spawn(cmd) => cmd.push_args(args),
            Action::RunAll(cmds) => cmds.iter_mut().for_each(|cmd| cmd.push_args(args)),
            Action::WriteFile { .. } | Action::Nothing => {}
        }
    }

    /// Command lines for logs.
    pub fn command_lines(&self) -> Vec<String> {
        match self {
            Action::Spawn(cmd) => vec![cmd.display_command()],
            Action::RunAll(cmds) => cmds.iter().map(ProcessBuilder::display_command).collect(),
            Action::WriteFile { path, .. } => vec![format!("write {}", path)],
            Action::Nothing => Vec::new(),
        }
    }
}

/// A unit of work with declared inputs and outputs.
///
/// Paths are root-relative strings. A step depends on every step that
/// outputs one of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Human-readable progress line, e.g. `Compiling main.o`.
    pub description: String,
    /// Unique name, usable as CLI target and hash record key.
    pub shortcut: String,
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
    pub action: Action,
}

impl Step {
    pub fn new(shortcut: impl Into<String>, description: impl Into<String>, action: Action) -> Self {
        Step {
            description: description.into(),
            shortcut: shortcut.into(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            action,
        }
    }

    pub fn input(mut self, path: impl Into<String>) -> Self {
        self.inputs.insert(path.into());
        self
    }

    pub fn inputs<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, path: impl Into<String>) -> Self {
        self.outputs.insert(path.into());
        self
    }

    pub fn outputs<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Whether any of this step's outputs is one of `other`'s inputs.
    pub fn feeds(&self, other: &Step) -> bool {
        self.outputs.iter().any(|o| other.inputs.contains(o))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shortcut)
    }
}

/// Check that a shortcut can be typed on the command line and used as a
/// file name.
pub fn validate_shortcut(shortcut: &str) -> Result<(), RecipeError> {
    let valid = !shortcut.trim().is_empty()
        && !shortcut.contains(|c| matches!(c, '/' | '\\'))
        && shortcut != "."
        && shortcut != "..";
    if valid {
        Ok(())
    } else {
        Err(RecipeError::InvalidShortcut {
            shortcut: shortcut.to_string(),
        })
    }
}
