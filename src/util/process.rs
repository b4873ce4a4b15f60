//! Subprocess execution utilities.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Builder for subprocess execution.
///
/// A `ProcessBuilder` is plain data: it can be logged, compared, and
/// serialized before anything is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    #[serde(default)]
    discard_stdout: bool,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            discard_stdout: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Append arguments in place.
    pub fn push_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Send stdout to the null device instead of inheriting it.
    pub fn discard_stdout(mut self) -> Self {
        self.discard_stdout = true;
        self
    }

    /// Set the working directory if none was configured.
    pub fn default_cwd(&mut self, cwd: &Path) {
        if self.cwd.is_none() {
            self.cwd = Some(cwd.to_path_buf());
        }
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the environment overlay.
    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory, if set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        if self.discard_stdout {
            cmd.stdout(Stdio::null());
        }

        cmd
    }

    /// Execute with empty stdin and capture both output streams.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd.output()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// Launch the process without waiting for it.
    ///
    /// Stdout is inherited. Stderr goes to an anonymous scratch file that
    /// can be read back with [`Running::stderr`] once the process exits.
    pub fn spawn(&self) -> Result<Running> {
        let scratch = tempfile::tempfile().context("failed to create stderr scratch file")?;
        let stderr = scratch
            .try_clone()
            .context("failed to duplicate stderr scratch file")?;

        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::from(stderr));

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        tracing::debug!("spawned pid {}: {}", child.id(), self.display_command());

        Ok(Running {
            child,
            stderr: scratch,
            exit: None,
        })
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![quote(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | '$' | '`'))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// A launched process.
#[derive(Debug)]
pub struct Running {
    child: Child,
    stderr: File,
    exit: Option<ExitStatus>,
}

impl Running {
    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Exit status, if the process is known to have exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Record an exit status collected outside of this handle.
    ///
    /// Used when a wait-for-any-child primitive reaps the process, after which
    /// the child can no longer be waited on through `std`.
    pub fn mark_reaped(&mut self, status: ExitStatus) {
        self.exit = Some(status);
    }

    /// Poll for exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let status = self
            .child
            .try_wait()
            .with_context(|| format!("failed to poll pid {}", self.child.id()))?;
        self.exit = status;
        Ok(status)
    }

    /// Block until the process exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self
            .child
            .wait()
            .with_context(|| format!("failed to wait for pid {}", self.child.id()))?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Ask the process to stop: SIGINT on Unix, termination elsewhere.
    pub fn interrupt(&mut self) {
        if self.exit.is_some() {
            return;
        }
        #[cfg(unix)]
        {
            // SAFETY: kill(2) has no memory-safety preconditions.
            let rc = unsafe { libc::kill(self.child.id() as libc::pid_t, libc::SIGINT) };
            if rc != 0 {
                tracing::debug!(
                    "failed to interrupt pid {}: {}",
                    self.child.id(),
                    std::io::Error::last_os_error()
                );
            }
        }
        #[cfg(not(unix))]
        self.kill();
    }

    /// Forcefully terminate the process.
    pub fn kill(&mut self) {
        if self.exit.is_some() {
            return;
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!("failed to kill pid {}: {}", self.child.id(), e);
        }
    }

    /// Everything the process wrote to stderr so far.
    pub fn stderr(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        self.stderr
            .seek(SeekFrom::Start(0))
            .context("failed to rewind stderr scratch file")?;
        self.stderr
            .read_to_end(&mut bytes)
            .context("failed to read stderr scratch file")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Interrupt every process, give them `grace` to exit, then kill survivors.
pub fn interrupt_all(procs: &mut [&mut Running], grace: Duration) {
    for proc in procs.iter_mut() {
        proc.interrupt();
    }

    let deadline = Instant::now() + grace;
    loop {
        let mut alive = 0;
        for proc in procs.iter_mut() {
            match proc.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) => alive += 1,
                Err(e) => tracing::debug!("{:#}", e),
            }
        }
        if alive == 0 || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    for proc in procs.iter_mut() {
        if proc.exit_status().is_none() {
            tracing::warn!("pid {} ignored interrupt, killing it", proc.id());
            proc.kill();
            if let Err(e) = proc.wait() {
                tracing::debug!("{:#}", e);
            }
        }
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("clang++").args(["-Wall", "-o", "build/a", "src/a.cc"]);
        assert_eq!(pb.display_command(), "clang++ -Wall -o build/a src/a.cc");

        let pb = ProcessBuilder::new("sh").args(["-c", "echo hi"]);
        assert_eq!(pb.display_command(), "sh -c 'echo hi'");
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_captures_stderr() {
        let mut running = ProcessBuilder::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .spawn()
            .unwrap();

        let status = running.wait().unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(running.stderr().unwrap(), "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_all_stops_sleepers() {
        let mut a = ProcessBuilder::new("sleep").arg("30").spawn().unwrap();
        let mut b = ProcessBuilder::new("sleep").arg("30").spawn().unwrap();

        let start = Instant::now();
        interrupt_all(&mut [&mut a, &mut b], Duration::from_secs(3));

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!a.exit_status().unwrap().success());
        assert!(!b.exit_status().unwrap().success());
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let err = ProcessBuilder::new("definitely-not-a-real-program-maf")
            .spawn()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to spawn"));
    }
}
