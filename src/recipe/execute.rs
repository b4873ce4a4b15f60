//! The execution loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::recipe::dirty::run_reason;
use crate::recipe::step::{Action, Step};
use crate::recipe::waiter::Waiter;
use crate::recipe::watcher::Watcher;
use crate::recipe::Recipe;
use crate::util::fs::write_string;
use crate::util::process::{interrupt_all, ProcessBuilder, Running};
use crate::util::shell::{format_duration, Progress, Shell, Status};

/// How long interrupted processes get before they are killed.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// Result of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    /// A step failed and the rest was interrupted.
    Failed,
    /// Sources changed mid-build in live mode.
    Interrupted,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        *self == BuildOutcome::Success
    }
}

/// Execution settings.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Abort on source changes instead of ignoring them.
    pub live: bool,
    /// Maximum number of concurrently running steps.
    pub jobs: usize,
    pub grace: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            live: false,
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            grace: INTERRUPT_GRACE,
        }
    }
}

/// What an execution did.
#[derive(Debug, Clone)]
pub struct ExecuteReport {
    pub outcome: BuildOutcome,
    /// Shortcuts whose action was invoked, in start order.
    pub executed: Vec<String>,
    pub elapsed: Duration,
}

/// A step's commands, run one after another in the background.
struct Job {
    proc: Running,
    /// Command `proc` is running.
    current: ProcessBuilder,
    rest: VecDeque<ProcessBuilder>,
}

enum Started {
    /// The action is running in the background.
    Spawned(Job),
    /// Finished in the foreground, or skipped when `ran` is false.
    Done { ran: bool },
    /// Failed to start or failed in the foreground.
    Failed,
}

/// Dependency bookkeeping for one execution.
struct Schedule {
    blockers: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    ready: VecDeque<usize>,
}

impl Schedule {
    fn new(steps: &[Step]) -> Self {
        let producers: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.outputs.iter().map(move |o| (o.as_str(), i)))
            .collect();

        let mut blockers = vec![0; steps.len()];
        let mut dependents = vec![Vec::new(); steps.len()];
        for (consumer, step) in steps.iter().enumerate() {
            let feeding: HashSet<usize> = step
                .inputs
                .iter()
                .filter_map(|input| producers.get(input.as_str()).copied())
                .filter(|&producer| producer != consumer)
                .collect();
            blockers[consumer] = feeding.len();
            for producer in feeding {
                dependents[producer].push(consumer);
            }
        }
        for list in &mut dependents {
            list.sort_unstable();
        }

        let ready = (0..steps.len()).filter(|&i| blockers[i] == 0).collect();
        Schedule {
            blockers,
            dependents,
            ready,
        }
    }

    /// Unblock the dependents of a finished step.
    fn finish(&mut self, step: usize) {
        for &dependent in &self.dependents[step] {
            self.blockers[dependent] -= 1;
            if self.blockers[dependent] == 0 {
                self.ready.push_back(dependent);
            }
        }
    }
}

/// Mutable state of one execution.
struct Attempt {
    schedule: Schedule,
    running: Vec<(usize, Job)>,
    executed: Vec<String>,
    finished: usize,
}

impl Recipe {
    /// Run every step whose inputs changed, respecting dependencies.
    ///
    /// A `watcher` that fires aborts the build in live mode and is ignored
    /// otherwise. Configuration problems are errors; step failures are
    /// reported on `shell` and returned as [`BuildOutcome::Failed`]. No
    /// child process outlives this call, whichever way it returns.
    pub fn execute(
        &self,
        shell: &Arc<Shell>,
        waiter: &dyn Waiter,
        watcher: Option<&mut Watcher>,
        opts: &ExecuteOptions,
    ) -> Result<ExecuteReport> {
        let start = Instant::now();
        let progress = shell.progress(self.steps.len() as u64);
        let mut attempt = Attempt {
            schedule: Schedule::new(&self.steps),
            running: Vec::new(),
            executed: Vec::new(),
            finished: 0,
        };

        let result = self.run_steps(&mut attempt, waiter, watcher, opts, &progress);
        abort(&mut attempt.running, opts.grace);
        progress.finish();
        let outcome = result?;

        let elapsed = start.elapsed();
        match outcome {
            BuildOutcome::Success => {
                shell.status(
                    Status::Finished,
                    format!("{} steps in {}", self.steps.len(), format_duration(elapsed)),
                );
                tracing::debug!("{} of {} steps ran", attempt.executed.len(), self.steps.len());
            }
            BuildOutcome::Interrupted => {
                shell.status(Status::Interrupted, "sources changed, stale build aborted")
            }
            BuildOutcome::Failed => {}
        }

        Ok(ExecuteReport {
            outcome,
            executed: attempt.executed,
            elapsed,
        })
    }

    /// The scheduling loop. Whatever is still in `attempt.running` when it
    /// returns has to be stopped by the caller.
    fn run_steps(
        &self,
        attempt: &mut Attempt,
        waiter: &dyn Waiter,
        mut watcher: Option<&mut Watcher>,
        opts: &ExecuteOptions,
        progress: &Progress,
    ) -> Result<BuildOutcome> {
        let jobs = opts.jobs.max(1);

        while !attempt.schedule.ready.is_empty() || !attempt.running.is_empty() {
            if attempt.running.len() < jobs {
                if let Some(i) = attempt.schedule.ready.pop_front() {
                    let step = &self.steps[i];
                    match self.start_step(step, progress)? {
                        Started::Spawned(job) => {
                            attempt.executed.push(step.shortcut.clone());
                            attempt.running.push((i, job));
                        }
                        Started::Done { ran } => {
                            if ran {
                                attempt.executed.push(step.shortcut.clone());
                            }
                            self.complete(attempt, i, progress)?;
                        }
                        Started::Failed => {
                            attempt.executed.push(step.shortcut.clone());
                            return Ok(BuildOutcome::Failed);
                        }
                    }
                    continue;
                }
            }

            let names: Vec<&str> = attempt
                .running
                .iter()
                .map(|(i, _)| self.steps[*i].shortcut.as_str())
                .collect();
            tracing::debug!(
                "waiting for one of {} running steps ({})",
                attempt.running.len(),
                names.join(", ")
            );

            let watching = watcher.as_ref().is_some_and(|w| !w.has_fired());
            let mut handles: Vec<&mut Running> =
                attempt.running.iter_mut().map(|(_, job)| &mut job.proc).collect();
            let watcher_slot = match watcher.as_deref_mut() {
                Some(w) if watching => {
                    handles.push(w.process_mut());
                    Some(handles.len() - 1)
                }
                _ => None,
            };
            let idx = waiter.wait_any(&mut handles)?;
            drop(handles);

            if Some(idx) == watcher_slot {
                let event = watcher.as_deref_mut().map(Watcher::check_event);
                if opts.live {
                    if let Some(Err(e)) = event {
                        return Err(e);
                    }
                    return Ok(BuildOutcome::Interrupted);
                }
                match event {
                    Some(Err(e)) => tracing::warn!("{:#}", e),
                    _ => tracing::debug!("source change ignored outside live mode"),
                }
                continue;
            }

            let (i, mut job) = attempt.running.remove(idx);
            let step = &self.steps[i];
            let status = job.proc.wait()?;
            let stderr = job.proc.stderr().unwrap_or_default();
            if !status.success() {
                progress.suspend(|shell| {
                    report_failure(shell, step, Some(&job.current), Some(status), &stderr)
                });
                return Ok(BuildOutcome::Failed);
            }
            if !stderr.trim().is_empty() {
                progress.suspend(|_| eprint!("{}", indent(&stderr)));
            }

            if let Some(next) = job.rest.pop_front() {
                match self.launch(step, next, job.rest, progress) {
                    Started::Spawned(job) => attempt.running.push((i, job)),
                    _ => return Ok(BuildOutcome::Failed),
                }
                continue;
            }
            self.complete(attempt, i, progress)?;
        }

        if attempt.finished < self.steps.len() {
            let stuck = (0..self.steps.len())
                .filter(|&i| attempt.schedule.blockers[i] > 0)
                .map(|i| self.steps[i].shortcut.clone())
                .collect();
            return Err(super::RecipeError::Cycle { steps: stuck }.into());
        }
        Ok(BuildOutcome::Success)
    }

    /// Record a finished step and unblock its dependents.
    fn complete(&self, attempt: &mut Attempt, step: usize, progress: &Progress) -> Result<()> {
        self.hashes.record(&self.root, &self.steps[step])?;
        attempt.schedule.finish(step);
        attempt.finished += 1;
        progress.inc();
        Ok(())
    }

    /// Invoke a step's action if it needs to run.
    fn start_step(&self, step: &Step, progress: &Progress) -> Result<Started> {
        let Some(reason) = run_reason(&self.root, &self.hashes, step)? else {
            tracing::debug!("{} is up to date", step.shortcut);
            return Ok(Started::Done { ran: false });
        };
        tracing::debug!("{} runs: {}", step.shortcut, reason);

        let (status, rest) = Status::for_description(&step.description);
        progress.status(status, rest);
        progress.set_message(step.shortcut.clone());
        progress.suspend(|shell| {
            for line in step.action.command_lines() {
                shell.verbose(format!(" > {}", line));
            }
        });

        match &step.action {
            Action::Spawn(cmd) => Ok(self.launch(step, cmd.clone(), VecDeque::new(), progress)),
            Action::RunAll(cmds) => {
                let mut cmds: VecDeque<ProcessBuilder> = cmds.iter().cloned().collect();
                match cmds.pop_front() {
                    Some(first) => Ok(self.launch(step, first, cmds, progress)),
                    None => Ok(Started::Done { ran: true }),
                }
            }
            Action::WriteFile { path, contents } => {
                let target = self.root.join(path);
                let unchanged = std::fs::read_to_string(&target).is_ok_and(|c| &c == contents);
                if unchanged {
                    tracing::debug!("{} is unchanged", path);
                } else if let Err(e) = write_string(&target, contents) {
                    progress.suspend(|shell| {
                        report_failure(shell, step, None, None, &format!("{:#}", e))
                    });
                    return Ok(Started::Failed);
                }
                Ok(Started::Done { ran: true })
            }
            Action::Nothing => Ok(Started::Done { ran: true }),
        }
    }

    /// Spawn one of a step's commands, with `rest` to follow it.
    fn launch(
        &self,
        step: &Step,
        mut cmd: ProcessBuilder,
        rest: VecDeque<ProcessBuilder>,
        progress: &Progress,
    ) -> Started {
        cmd.default_cwd(&self.root);
        match cmd.spawn() {
            Ok(proc) => Started::Spawned(Job {
                proc,
                current: cmd,
                rest,
            }),
            Err(e) => {
                progress.suspend(|shell| {
                    report_failure(shell, step, Some(&cmd), None, &format!("{:#}", e))
                });
                Started::Failed
            }
        }
    }
}

/// Print a failed step: description, command line, captured stderr.
fn report_failure(
    shell: &Shell,
    step: &Step,
    cmd: Option<&ProcessBuilder>,
    status: Option<ExitStatus>,
    stderr: &str,
) {
    match status {
        Some(status) => shell.status(
            Status::Failed,
            format!("{} ({})", step.description, status),
        ),
        None => shell.status(Status::Failed, &step.description),
    }
    if let Some(cmd) = cmd {
        shell.dimmed(format!(" > {}", cmd.display_command()));
    }
    if !stderr.trim().is_empty() {
        eprint!("{}", indent(stderr));
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  | {}\n", line)).collect()
}

/// Interrupt every running step and forget about it.
fn abort(running: &mut Vec<(usize, Job)>, grace: Duration) {
    if running.is_empty() {
        return;
    }
    tracing::info!("interrupting {} running steps", running.len());
    let mut handles: Vec<&mut Running> = running.iter_mut().map(|(_, job)| &mut job.proc).collect();
    interrupt_all(&mut handles, grace);
    running.clear();
}
