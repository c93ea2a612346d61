//! Append-only JSONL event journal.
//!
//! Every event lands in the global journal. Events that belong to a run or
//! a rollout additionally land in a per-id file under `runs/` or
//! `rollouts/`, so one run or one canary can be replayed without scanning
//! the whole journal. Each event is encoded once and the line is fanned
//! out to every journal it belongs to.

use qc_core::events::Event;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which journal an append was headed for. Carried in errors so a failed
/// write names the stream, not just a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Global,
    Run,
    Rollout,
}

impl LogStream {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStream::Global => "global",
            LogStream::Run => "run",
            LogStream::Rollout => "rollout",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("cannot prepare journal directory {path}: {source}")]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("event {event_id} is not encodable: {source}")]
    Encode {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("append to {stream} journal {path} failed: {source}")]
    Append {
        stream: LogStream,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// JSONL journal rooted at one directory. Directories are created lazily
/// on first write so an idle daemon leaves no empty layout behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlEventLog {
    root: PathBuf,
}

impl JsonlEventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Append one event to the global journal and to every scoped journal
    /// it belongs to.
    pub fn append(&self, event: &Event) -> Result<(), EventLogError> {
        let mut line =
            serde_json::to_string(event).map_err(|source| EventLogError::Encode {
                event_id: event.id.0.clone(),
                source,
            })?;
        line.push('\n');

        for (stream, path) in self.targets(event) {
            append_line(stream, &path, line.as_bytes())?;
        }
        Ok(())
    }

    /// Global journal first, then run and rollout scopes when present.
    fn targets(&self, event: &Event) -> Vec<(LogStream, PathBuf)> {
        let mut targets = vec![(LogStream::Global, self.global_log_path())];
        if let Some(run_id) = &event.run_id {
            targets.push((LogStream::Run, self.run_log_path(&run_id.0)));
        }
        if let Some(rollout_id) = &event.rollout_id {
            targets.push((LogStream::Rollout, self.rollout_log_path(&rollout_id.0)));
        }
        targets
    }

    pub fn global_log_path(&self) -> PathBuf {
        self.root.join("global.jsonl")
    }

    pub fn run_log_path(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(format!("{run_id}.jsonl"))
    }

    pub fn rollout_log_path(&self, rollout_id: &str) -> PathBuf {
        self.root.join("rollouts").join(format!("{rollout_id}.jsonl"))
    }
}

fn append_line(stream: LogStream, path: &Path, line: &[u8]) -> Result<(), EventLogError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| EventLogError::Layout {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| EventLogError::Append {
            stream,
            path: path.to_path_buf(),
            source,
        })?;

    file.write_all(line).map_err(|source| EventLogError::Append {
        stream,
        path: path.to_path_buf(),
        source,
    })
}
