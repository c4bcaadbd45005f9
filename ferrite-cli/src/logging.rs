//! Structured JSONL logging of the command session.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde_json::json;

#[derive(Debug)]
pub enum LogEvent<'a> {
    CommandStart { line: &'a str },
    CommandResult { line: &'a str, status: &'static str },
    Info { message: String },
}

pub struct StructuredLogger {
    writer: Option<BufWriter<File>>,
}

impl StructuredLogger {
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let writer = match path {
            Some(p) => {
                let file = File::create(p)
                    .wrap_err_with(|| format!("cannot create log file {}", p.display()))?;
                Some(BufWriter::new(file))
            }
            None => None,
        };
        Ok(Self { writer })
    }

    pub fn log(&mut self, event: LogEvent<'_>) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let timestamp = chrono::Utc::now().to_rfc3339();
        let value = match event {
            LogEvent::CommandStart { line } => json!({
                "timestamp": timestamp,
                "event": "command_start",
                "line": line,
            }),
            LogEvent::CommandResult { line, status } => json!({
                "timestamp": timestamp,
                "event": "command_result",
                "line": line,
                "status": status,
            }),
            LogEvent::Info { message } => json!({
                "timestamp": timestamp,
                "event": "info",
                "message": message,
            }),
        };
        // a failed log write must not kill the session
        let _ = writeln!(writer, "{value}");
        let _ = writer.flush();
    }
}
