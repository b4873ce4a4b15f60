//! Dirty checking: modification times first, content hashes second.
//!
//! Every completed step leaves a record at `<hash dir>/<shortcut>` with one
//! `path hash` line per input. A touched input whose contents did not
//! change is therefore not rebuilt once a record exists.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::recipe::step::Step;
use crate::util::fs::write_string;
use crate::util::hash::input_digest;

/// Per-step input hash records.
#[derive(Debug, Clone)]
pub struct HashStore {
    dir: PathBuf,
}

impl HashStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        HashStore { dir: dir.into() }
    }

    pub fn record_path(&self, shortcut: &str) -> PathBuf {
        self.dir.join(shortcut)
    }

    /// Recorded hashes of a step's inputs, `None` if it never completed.
    pub fn load(&self, shortcut: &str) -> Result<Option<HashMap<String, String>>> {
        let path = self.record_path(shortcut);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read hash record {}", path.display()))
            }
        };

        let hashes = contents
            .lines()
            .filter_map(|line| line.rsplit_once(' '))
            .map(|(input, hash)| (input.to_string(), hash.to_string()))
            .collect();
        Ok(Some(hashes))
    }

    pub fn save(&self, shortcut: &str, hashes: &BTreeMap<String, String>) -> Result<()> {
        let mut contents = String::new();
        for (input, hash) in hashes {
            contents.push_str(input);
            contents.push(' ');
            contents.push_str(hash);
            contents.push('\n');
        }
        write_string(&self.record_path(shortcut), &contents)
    }

    /// Hash the step's inputs as they are now and save the record.
    pub fn record(&self, root: &Path, step: &Step) -> Result<()> {
        let hashes = step
            .inputs
            .iter()
            .map(|input| Ok((input.clone(), input_digest(&root.join(input))?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        self.save(&step.shortcut, &hashes)
    }
}

fn mtime(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => meta
            .modified()
            .map(Some)
            .with_context(|| format!("failed to read mtime of {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Inputs that changed since the step last completed.
///
/// If any output is missing, every input is dirty. Otherwise only inputs
/// modified no earlier than the oldest output are candidates, and a
/// candidate is dirty when its hash differs from the step's record (or no
/// record exists).
pub fn dirty_inputs(root: &Path, store: &HashStore, step: &Step) -> Result<Vec<String>> {
    let mut oldest_output: Option<SystemTime> = None;
    for output in &step.outputs {
        match mtime(&root.join(output))? {
            None => return Ok(step.inputs.iter().cloned().collect()),
            Some(t) => oldest_output = Some(oldest_output.map_or(t, |o| o.min(t))),
        }
    }

    let mut candidates = Vec::new();
    for input in &step.inputs {
        let Some(modified) = mtime(&root.join(input))? else {
            continue;
        };
        if oldest_output.map_or(true, |built| modified >= built) {
            candidates.push(input.clone());
        }
    }
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let Some(record) = store.load(&step.shortcut)? else {
        return Ok(candidates);
    };

    let mut dirty = Vec::new();
    for input in candidates {
        let current = input_digest(&root.join(&input))?;
        if record.get(&input) != Some(&current) {
            dirty.push(input);
        }
    }
    Ok(dirty)
}

/// Why a step has to run, or `None` if it is up to date.
pub fn run_reason(root: &Path, store: &HashStore, step: &Step) -> Result<Option<String>> {
    if step.inputs.is_empty() {
        if let Some(missing) = step.outputs.iter().find(|o| !root.join(o).exists()) {
            return Ok(Some(format!("`{}` is missing", missing)));
        }
    }

    let dirty = dirty_inputs(root, store, step)?;
    if !dirty.is_empty() {
        return Ok(Some(format!("changed: {}", dirty.join(", "))));
    }

    if step.outputs.is_empty() {
        return Ok(Some("no outputs".to_string()));
    }

    Ok(None)
}

/// Whether the step's action must be invoked.
pub fn needs_run(root: &Path, store: &HashStore, step: &Step) -> Result<bool> {
    Ok(run_reason(root, store, step)?.is_some())
}
