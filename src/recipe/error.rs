//! Recipe configuration errors.

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Errors detected before any step runs.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("no step named `{target}`")]
    UnknownTarget {
        target: String,
        /// Close matches, best first.
        suggestions: Vec<String>,
        /// Every shortcut, in recipe order.
        available: Vec<String>,
    },

    #[error("step `{step}` needs `{input}`, which doesn't exist and no step produces")]
    MissingInput { step: String, input: String },

    #[error("file watching is not supported on {platform}")]
    UnsupportedPlatform { platform: String },

    #[error("two steps share the shortcut `{shortcut}`")]
    DuplicateShortcut { shortcut: String },

    #[error("invalid step shortcut `{shortcut}`")]
    InvalidShortcut { shortcut: String },

    #[error("`{output}` is produced by both `{first}` and `{second}`")]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },

    #[error("steps depend on each other in a cycle: {}", steps.join(", "))]
    Cycle { steps: Vec<String> },
}

impl RecipeError {
    /// Convert to a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            RecipeError::UnknownTarget {
                suggestions: close,
                available,
                ..
            } => {
                if close.is_empty() {
                    diag.with_context(format!("available steps: {}", available.join(", ")))
                        .with_suggestion(suggestions::LIST_TARGETS)
                } else {
                    let quoted: Vec<String> = close.iter().map(|s| format!("`{}`", s)).collect();
                    diag.with_context(format!("did you mean {}?", quoted.join(" or ")))
                }
            }
            RecipeError::MissingInput { input, .. } => diag
                .with_location(input)
                .with_suggestion(suggestions::MISSING_INPUT),
            RecipeError::UnsupportedPlatform { .. } => diag
                .with_context("live mode relies on inotifywait (Linux) or inotify-win (Windows)")
                .with_suggestion("run without `--live`"),
            RecipeError::DuplicateShortcut { .. } | RecipeError::InvalidShortcut { .. } => diag
                .with_context("shortcuts name build targets and hash records")
                .with_suggestion("use a unique, non-empty name without `/` or `\\`"),
            RecipeError::DuplicateOutput { .. } => {
                diag.with_suggestion("let exactly one step write each output")
            }
            RecipeError::Cycle { .. } => {
                diag.with_suggestion("break the cycle between these steps' inputs and outputs")
            }
        }
    }
}
