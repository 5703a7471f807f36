#![warn(missing_docs)]
//! Test surfaces: a recording player gateway and a JSONL event log.

mod gateway;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quarry_core::CoreEvent;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub use gateway::*;

/// One line of the event log.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    /// Wall-clock time the event was recorded.
    pub at: DateTime<Utc>,
    /// Short kind label, e.g. `level_up`.
    pub kind: &'a str,
    /// The event itself.
    pub event: &'a CoreEvent,
}

impl<'a> EventRecord<'a> {
    /// Stamp `event` with the current time.
    pub fn now(event: &'a CoreEvent) -> Self {
        Self {
            at: Utc::now(),
            kind: event.label(),
            event,
        }
    }
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    file: BufWriter<File>,
}

impl JsonlSink {
    /// Create a new sink at `path`, creating parent dirs if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create event log {}", path.display()))?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Append an event to the log.
    pub fn write(&mut self, event: &EventRecord<'_>) -> Result<()> {
        let line = serde_json::to_string(event)?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        Ok(())
    }

    /// Push buffered lines to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{PlayerId, ToolUid};

    #[test]
    fn jsonl_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/events.jsonl");
        let mut sink = JsonlSink::create(&path).expect("sink create");
        let event = CoreEvent::LevelUp {
            player: PlayerId(1),
            tool: ToolUid(2),
            level: 3,
        };
        sink.write(&EventRecord::now(&event)).expect("write succeeds");
        sink.write(&EventRecord::now(&event)).expect("write succeeds");
        sink.flush().unwrap();

        let contents = fs::read_to_string(&path).expect("file readable");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["kind"], "level_up");
        assert_eq!(parsed["event"]["level"], 3);
    }
}
