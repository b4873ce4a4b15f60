//! Source directory watcher.
//!
//! The watcher is an `inotifywait` child process that exits on the first
//! change. Being a plain child lets the executor wait for "a step finished
//! or a source changed" with a single wait-for-any-child call.

use std::path::Path;

use anyhow::{bail, Result};

use crate::recipe::error::RecipeError;
use crate::util::process::{ProcessBuilder, Running};

/// Command that blocks until something under `dir` changes.
pub fn watch_command(dir: &Path) -> Result<ProcessBuilder, RecipeError> {
    let events = if cfg!(target_os = "linux") {
        "close_write"
    } else if cfg!(windows) {
        "create,modify,delete,move"
    } else {
        return Err(RecipeError::UnsupportedPlatform {
            platform: std::env::consts::OS.to_string(),
        });
    };

    Ok(ProcessBuilder::new("inotifywait")
        .args(["-q", "-e", events, "-r"])
        .arg(dir)
        .discard_stdout())
}

/// A running `inotifywait`.
#[derive(Debug)]
pub struct Watcher {
    process: Running,
}

impl Watcher {
    /// Start watching `dir`.
    pub fn spawn(dir: &Path) -> Result<Self> {
        let cmd = watch_command(dir)?;
        let process = cmd.spawn()?;
        tracing::debug!("watching {} (pid {})", dir.display(), process.id());
        Ok(Watcher { process })
    }

    /// Wrap an already running process that exits when something changes.
    pub fn from_process(process: Running) -> Self {
        Watcher { process }
    }

    pub fn process_mut(&mut self) -> &mut Running {
        &mut self.process
    }

    /// Whether a change was already reported.
    pub fn has_fired(&self) -> bool {
        self.process.exit_status().is_some()
    }

    /// Interpret the watcher's exit: a change, or a watcher failure.
    pub fn check_event(&mut self) -> Result<()> {
        let status = self.process.wait()?;
        if !status.success() {
            let stderr = self.process.stderr().unwrap_or_default();
            bail!("file watcher exited with {}: {}", status, stderr.trim());
        }
        Ok(())
    }

    /// Block until a change is reported.
    pub fn wait_for_change(&mut self) -> Result<()> {
        self.check_event()
    }

    /// Stop watching.
    pub fn stop(&mut self) {
        if !self.has_fired() {
            self.process.kill();
            if let Err(e) = self.process.wait() {
                tracing::debug!("{:#}", e);
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}
