//! Centralized shell output and progress management.
//!
//! Every user-facing line goes through [`Shell`] so that status words line
//! up in a right-aligned column:
//!
//! ```text
//!    Compiling main.o
//!      Linking main
//!     Finished 3 steps in 0.42s
//! ```

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    #[default]
    Normal,
    /// Command lines and the step graph.
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    Always,
    Never,
}

/// The word in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Compiling,
    Linking,
    Running,
    Writing,
    Finished,
    Removed,
    Info,
    Waiting,
    Interrupted,
    Failed,
}

impl Status {
    fn word(self) -> &'static str {
        match self {
            Status::Compiling => "Compiling",
            Status::Linking => "Linking",
            Status::Running => "Running",
            Status::Writing => "Writing",
            Status::Finished => "Finished",
            Status::Removed => "Removed",
            Status::Info => "Info",
            Status::Waiting => "Waiting",
            Status::Interrupted => "Interrupted",
            Status::Failed => "Failed",
        }
    }

    /// Bold ANSI color: cyan while working, green when done.
    fn ansi(self) -> &'static str {
        match self {
            Status::Compiling | Status::Linking | Status::Running | Status::Writing => "\x1b[1;36m",
            Status::Finished | Status::Removed => "\x1b[1;32m",
            Status::Info | Status::Waiting => "\x1b[1;34m",
            Status::Interrupted => "\x1b[1;33m",
            Status::Failed => "\x1b[1;31m",
        }
    }

    /// Split a step description such as `Compiling x.o` into a status and
    /// the rest. Unknown verbs keep the whole description under `Running`.
    pub fn for_description(description: &str) -> (Status, &str) {
        let (verb, rest) = description.split_once(' ').unwrap_or((description, ""));
        let status = match verb {
            "Compiling" => Status::Compiling,
            "Linking" => Status::Linking,
            "Running" => Status::Running,
            "Writing" => Status::Writing,
            _ => return (Status::Running, description),
        };
        (status, rest)
    }
}

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
}

impl Shell {
    /// Create a new shell.
    pub fn new(verbosity: Verbosity, color: ColorChoice) -> Self {
        let use_color = match color {
            ColorChoice::Auto => io::stderr().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };
        Shell {
            verbosity,
            use_color,
        }
    }

    /// A shell that prints nothing but errors. Used by tests.
    pub fn quiet() -> Self {
        Shell::new(Verbosity::Quiet, ColorChoice::Never)
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print `{status:>12} {msg}` to stderr. A quiet shell only prints
    /// failures.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && status != Status::Failed {
            return;
        }
        eprintln!("{} {}", self.format_status(status), msg);
    }

    /// Print a raw line when verbose.
    pub fn verbose(&self, msg: impl Display) {
        if self.is_verbose() {
            eprintln!("{}", msg);
        }
    }

    /// Print a raw line dimmed, e.g. a failing command line.
    pub fn dimmed(&self, msg: impl Display) {
        if self.use_color {
            eprintln!("\x1b[90m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    fn format_status(&self, status: Status) -> String {
        if self.use_color {
            format!("{}{:>12}\x1b[0m", status.ansi(), status.word())
        } else {
            format!("{:>12}", status.word())
        }
    }

    /// Create a step counter.
    ///
    /// A bar is only drawn on an interactive terminal in normal verbosity.
    pub fn progress(self: &Arc<Self>, total: u64) -> Progress {
        let pb = if self.verbosity == Verbosity::Normal
            && total > 1
            && io::stderr().is_terminal()
        {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        Progress {
            shell: Arc::clone(self),
            pb,
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal, ColorChoice::Auto)
    }
}

/// Step counter that keeps status lines above its bar.
pub struct Progress {
    shell: Arc<Shell>,
    pb: Option<ProgressBar>,
}

impl Progress {
    /// Print a status line without tearing the bar.
    pub fn status(&self, status: Status, msg: impl Display) {
        match &self.pb {
            Some(pb) => pb.suspend(|| self.shell.status(status, msg)),
            None => self.shell.status(status, msg),
        }
    }

    /// Run `f` with the bar hidden.
    pub fn suspend<R>(&self, f: impl FnOnce(&Shell) -> R) -> R {
        match &self.pb {
            Some(pb) => pb.suspend(|| f(&self.shell)),
            None => f(&self.shell),
        }
    }

    /// Update the message shown next to the bar.
    pub fn set_message(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.set_message(msg.into());
        }
    }

    pub fn inc(&self) {
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "0.50s");
        assert_eq!(format_duration(Duration::from_secs(2)), "2.00s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_status_formatting() {
        let shell = Shell::new(Verbosity::Normal, ColorChoice::Never);
        let formatted = shell.format_status(Status::Linking);
        assert_eq!(formatted.trim(), "Linking");
        assert_eq!(formatted.len(), 12);
    }

    #[test]
    fn test_status_for_description() {
        assert_eq!(
            Status::for_description("Compiling main.o"),
            (Status::Compiling, "main.o")
        );
        assert_eq!(
            Status::for_description("Embedding assets"),
            (Status::Running, "Embedding assets")
        );
    }

    #[test]
    fn test_quiet_shell() {
        let shell = Shell::quiet();
        assert!(shell.is_quiet());
        assert!(!shell.is_verbose());
        assert!(!shell.use_color());
    }
}
