//! Actionable messages for configuration errors.
//!
//! A diagnostic names the problem, where it comes from, and what to do
//! about it:
//!
//! ```text
//! error: no step named `buidl`
//!   = did you mean `build`?
//! help: run `maf --verbose <target>` to print the full step graph
//! ```

use std::fmt;
use std::path::PathBuf;

/// Shared `help:` lines.
pub mod suggestions {
    pub const LIST_TARGETS: &str = "run `maf --verbose <target>` to print the full step graph";

    pub const MISSING_INPUT: &str =
        "create the file, or add a step that produces it to the build";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self, color: bool) -> &'static str {
        match (self, color) {
            (Severity::Error, true) => "\x1b[1;31merror\x1b[0m",
            (Severity::Error, false) => "error",
            (Severity::Warning, true) => "\x1b[1;33mwarning\x1b[0m",
            (Severity::Warning, false) => "warning",
        }
    }
}

/// A message plus the notes and fixes that go with it.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// File the problem was found in.
    pub location: Option<PathBuf>,
    /// `= ...` lines under the message.
    pub context: Vec<String>,
    /// `help: ...` lines at the end.
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            location: None,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Render for a terminal, with ANSI colors when `color` is set.
    pub fn format(&self, color: bool) -> String {
        let mut lines = vec![format!("{}: {}", self.severity.label(color), self.message)];
        if let Some(path) = &self.location {
            lines.push(format!("  --> {}", path.display()));
        }
        lines.extend(self.context.iter().map(|c| format!("  = {}", c)));

        let help = if color { "\x1b[1;32mhelp\x1b[0m" } else { "help" };
        lines.extend(self.suggestions.iter().map(|s| format!("{}: {}", help, s)));

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
