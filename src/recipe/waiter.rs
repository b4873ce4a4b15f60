//! Blocking until one of several child processes exits.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::process::Running;

/// Waits for the first of a set of processes to exit.
pub trait Waiter {
    /// Block until one of `procs` has exited and return its index.
    ///
    /// The returned process has its exit status recorded. `procs` must not
    /// be empty.
    fn wait_any(&self, procs: &mut [&mut Running]) -> Result<usize>;
}

/// Polls every process with `try_wait` until one exits.
///
/// Works everywhere and only reaps the processes it is given.
#[derive(Debug, Clone)]
pub struct PollingWaiter {
    interval: Duration,
}

impl PollingWaiter {
    pub fn new(interval: Duration) -> Self {
        PollingWaiter { interval }
    }
}

impl Default for PollingWaiter {
    fn default() -> Self {
        PollingWaiter::new(Duration::from_millis(10))
    }
}

impl Waiter for PollingWaiter {
    fn wait_any(&self, procs: &mut [&mut Running]) -> Result<usize> {
        if procs.is_empty() {
            bail!("nothing to wait for");
        }
        loop {
            for (i, proc) in procs.iter_mut().enumerate() {
                if proc.try_wait()?.is_some() {
                    return Ok(i);
                }
            }
            thread::sleep(self.interval);
        }
    }
}

/// Blocks in `waitpid(-1)` until any child of this process exits.
///
/// Children the caller did not pass in are reaped too and ignored, so this
/// must only be used when every child belongs to the build.
#[cfg(unix)]
#[derive(Debug, Clone, Default)]
pub struct WaitAnyWaiter;

#[cfg(unix)]
impl Waiter for WaitAnyWaiter {
    fn wait_any(&self, procs: &mut [&mut Running]) -> Result<usize> {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        if procs.is_empty() {
            bail!("nothing to wait for");
        }
        // A process may have been reaped through another handle already.
        if let Some(i) = procs.iter().position(|p| p.exit_status().is_some()) {
            return Ok(i);
        }

        loop {
            let mut status: libc::c_int = 0;
            // SAFETY: `status` is a valid, writable c_int for the call.
            let pid = unsafe { libc::waitpid(-1, &mut status, 0) };
            if pid < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }

            match procs.iter().position(|p| p.id() as libc::pid_t == pid) {
                Some(i) => {
                    procs[i].mark_reaped(ExitStatus::from_raw(status));
                    return Ok(i);
                }
                None => tracing::debug!("reaped unrelated child {}", pid),
            }
        }
    }
}

/// The waiter best suited to this platform.
pub fn platform_waiter() -> Box<dyn Waiter> {
    #[cfg(unix)]
    {
        Box::new(WaitAnyWaiter)
    }
    #[cfg(not(unix))]
    {
        Box::new(PollingWaiter::default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::util::process::ProcessBuilder;

    #[test]
    fn test_polling_returns_first_exit() {
        let mut slow = ProcessBuilder::new("sleep").arg("5").spawn().unwrap();
        let mut fast = ProcessBuilder::new("sh")
            .args(["-c", "exit 4"])
            .spawn()
            .unwrap();

        let waiter = PollingWaiter::default();
        let idx = waiter.wait_any(&mut [&mut slow, &mut fast]).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(fast.exit_status().unwrap().code(), Some(4));

        slow.kill();
        slow.wait().unwrap();
    }

    #[test]
    fn test_empty_set_is_an_error() {
        assert!(PollingWaiter::default().wait_any(&mut []).is_err());
    }
}
