//! JSON compilation database (`compile_commands.json`).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::process::ProcessBuilder;

/// Path of the database, relative to the project root.
pub const COMPDB_FILE: &str = "compile_commands.json";

/// One entry of the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// Absolute directory the command runs in.
    pub directory: String,
    pub file: String,
    pub output: String,
    pub arguments: Vec<String>,
}

impl CompileCommand {
    pub fn new(root: &Path, source: &str, output: &str, cmd: &ProcessBuilder) -> Self {
        let mut arguments = vec![cmd.get_program().to_string_lossy().into_owned()];
        arguments.extend(cmd.get_args().iter().cloned());
        CompileCommand {
            directory: root.to_string_lossy().into_owned(),
            file: source.to_string(),
            output: output.to_string(),
            arguments,
        }
    }
}

/// Serialize entries as a pretty-printed JSON array.
pub fn render(commands: &[CompileCommand]) -> Result<String> {
    let mut json =
        serde_json::to_string_pretty(commands).context("failed to serialize compile commands")?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let cmd = ProcessBuilder::new("clang++").args(["-c", "-o", "build/obj/a.o", "src/a.cc"]);
        let entry = CompileCommand::new(Path::new("/work"), "src/a.cc", "build/obj/a.o", &cmd);
        let json = render(&[entry.clone()]).unwrap();

        let parsed: Vec<CompileCommand> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, [entry]);
        assert_eq!(parsed[0].arguments[0], "clang++");
        assert!(json.contains("\"directory\": \"/work\""));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]).unwrap(), "[]\n");
    }
}
