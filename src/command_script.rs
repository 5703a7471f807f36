use anyhow::Result;
use serde::Deserialize;
use std::{collections::VecDeque, fs, path::Path};

#[derive(Debug, Deserialize)]
struct CommandScriptFile {
    steps: Vec<CommandScriptStep>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommandScriptStep {
    /// Milliseconds after the driver started.
    at_ms: u64,
    command: String,
}

/// Timed command script.
///
/// Scripts are a list of `{at_ms, command}` steps, executed in file order.
#[derive(Debug)]
pub struct CommandScriptPlayer {
    pending: VecDeque<CommandScriptStep>,
}

impl CommandScriptPlayer {
    /// Load a command script from a JSON file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load a command script from an in-memory JSON string.
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: CommandScriptFile = serde_json::from_str(contents)?;
        if file.steps.is_empty() {
            anyhow::bail!("command script contains no steps");
        }

        let mut pending = VecDeque::with_capacity(file.steps.len());
        let mut last_at: Option<u64> = None;
        for step in file.steps {
            let command = step.command.trim().to_string();
            if command.is_empty() {
                anyhow::bail!("command script contains an empty command");
            }
            if last_at.is_some_and(|prev| step.at_ms < prev) {
                anyhow::bail!("command script steps must be sorted by at_ms");
            }
            last_at = Some(step.at_ms);
            pending.push_back(CommandScriptStep {
                at_ms: step.at_ms,
                command,
            });
        }

        Ok(Self { pending })
    }

    /// Time of the next pending step.
    pub fn next_at_ms(&self) -> Option<u64> {
        self.pending.front().map(|step| step.at_ms)
    }

    /// Drain and return all commands scheduled at or before `elapsed_ms`.
    pub fn drain_ready_commands(&mut self, elapsed_ms: u64) -> Vec<String> {
        let mut commands = Vec::new();
        while self
            .pending
            .front()
            .is_some_and(|step| step.at_ms <= elapsed_ms)
        {
            if let Some(step) = self.pending.pop_front() {
                commands.push(step.command);
            }
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_script_rejects_unsorted_steps() {
        let json = r#"{
            "steps": [
                {"at_ms": 20, "command": "/mine fill a"},
                {"at_ms": 10, "command": "/mine fill b"}
            ]
        }"#;
        let err = CommandScriptPlayer::from_json(json).unwrap_err();
        assert!(
            err.to_string().contains("sorted by at_ms"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn command_script_rejects_empty_scripts_and_commands() {
        assert!(CommandScriptPlayer::from_json(r#"{"steps": []}"#).is_err());
        assert!(
            CommandScriptPlayer::from_json(r#"{"steps": [{"at_ms": 0, "command": "  "}]}"#)
                .is_err()
        );
    }

    #[test]
    fn command_script_drains_in_order() {
        let json = r#"{
            "steps": [
                {"at_ms": 0, "command": "/claim pit 0 0 0 4 4 4"},
                {"at_ms": 0, "command": "/mine create pit"},
                {"at_ms": 500, "command": "/break 1 2 2 2"}
            ]
        }"#;
        let mut script = CommandScriptPlayer::from_json(json).expect("script should parse");

        assert_eq!(script.next_at_ms(), Some(0));
        assert_eq!(
            script.drain_ready_commands(0),
            vec![
                "/claim pit 0 0 0 4 4 4".to_string(),
                "/mine create pit".to_string()
            ]
        );
        assert_eq!(script.drain_ready_commands(499), Vec::<String>::new());
        assert_eq!(script.next_at_ms(), Some(500));
        assert_eq!(
            script.drain_ready_commands(10_000),
            vec!["/break 1 2 2 2".to_string()]
        );
        assert_eq!(script.next_at_ms(), None);
    }
}
