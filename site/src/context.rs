use crate::error::{ErrorCategory, SiteError};
use log::{debug, error, info, log_enabled, warn, Level};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::time::{Duration, Instant};

/// State carried through one operation: the message log, the structured data
/// returned to the caller and the clock used for the elapsed time.
#[derive(Debug)]
pub struct OperationContext {
    operation: String,
    verbose: bool,
    started: Instant,
    messages: Vec<String>,
    data: Map<String, Value>,
    keep_alive_ticks: u64,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>, verbose: bool) -> Self {
        Self {
            operation: operation.into(),
            verbose,
            started: Instant::now(),
            messages: Vec::new(),
            data: Map::new(),
            keep_alive_ticks: 0,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn msg(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.messages.push(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.messages.push(format!("WARNING: {message}"));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.messages.push(format!("ERROR: {message}"));
    }

    /// Command output lines: always logged at debug level, kept in the
    /// message log only in verbose mode.
    pub fn output(&mut self, line: &str) {
        debug!("  {line}");
        if self.verbose {
            self.messages.push(format!("  {line}"));
        }
    }

    /// Signals that a long-running command is still alive. The tick goes to
    /// the log when info logging is on and straight to stderr otherwise.
    pub fn keep_alive(&mut self, command: &str) {
        self.keep_alive_ticks += 1;
        if log_enabled!(Level::Info) {
            info!("{}", self.keep_alive_line(command));
        } else if let Err(e) = self.write_keep_alive(&mut std::io::stderr().lock(), command) {
            debug!("Could not write keep-alive: {e}");
        }
    }

    fn keep_alive_line(&self, command: &str) -> String {
        format!(
            "Still running ({}s): {command}",
            self.started.elapsed().as_secs()
        )
    }

    fn write_keep_alive(&self, out: &mut impl Write, command: &str) -> std::io::Result<()> {
        writeln!(out, "{}", self.keep_alive_line(command))?;
        out.flush()
    }

    pub fn keep_alive_ticks(&self) -> u64 {
        self.keep_alive_ticks
    }

    /// Adds a value to the structured result. Values that cannot be
    /// serialized are dropped with a warning.
    pub fn data(&mut self, key: &str, value: impl Serialize) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key.to_string(), value);
            }
            Err(e) => self.warn(format!("Could not record {key}: {e}")),
        }
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_elapsed(&mut self) {
        let secs = self.elapsed().as_secs();
        self.msg(format!(
            "Elapsed execution time is {:02}:{:02}:{:02}.",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        ));
    }

    /// Consumes the context into the structured result printed at the end of
    /// an operation.
    pub fn into_report(self, outcome: Result<(), &SiteError>) -> Report {
        let (status, error, category) = match outcome {
            Ok(()) => ("ok", None, None),
            Err(e) => ("error", Some(e.to_string()), Some(e.category())),
        };
        Report {
            status,
            data: self.data,
            error,
            category,
            messages: self.verbose.then_some(self.messages),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub status: &'static str,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<String>>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.status == "ok"
    }
}
