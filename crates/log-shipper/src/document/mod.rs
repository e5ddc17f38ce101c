// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turning log events into wire documents.
//!
//! A document is a flat JSON object:
//!
//! ```json
//! {
//!   "dt": "2025-01-01T12:00:00.000000+00:00",
//!   "level": "error",
//!   "severity": 4,
//!   "message": "payment failed",
//!   "context": {
//!     "runtime": {"function": null, "file": "src/pay.rs", "line": 42,
//!                 "thread_id": 1, "thread_name": "main", "logger_name": "billing"},
//!     "system": {"pid": 4242, "process_name": "billing"},
//!     "order": {"id": "1234"}
//!   },
//!   "order_total": 200
//! }
//! ```

pub mod value;

use crate::context::ContextStack;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use value::FieldValue;

/// One structured log record as it travels through the queue and over the wire.
pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }

    /// Numeric severity, 1 (debug) through 5 (critical).
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Level::Debug => 1,
            Level::Info => 2,
            Level::Warning => 3,
            Level::Error => 4,
            Level::Critical => 5,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" | "fatal" => Ok(Level::Critical),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// A log record before it is rendered into a [`Document`].
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub logger_name: String,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub thread_id: Value,
    pub thread_name: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl LogEvent {
    /// Creates an event stamped with the current time, thread, and call site.
    #[must_use]
    #[track_caller]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        let caller = Location::caller();
        let thread = std::thread::current();
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            logger_name: String::from("root"),
            function: None,
            file: Some(caller.file().to_string()),
            line: Some(caller.line()),
            thread_id: thread_id_value(thread.id()),
            thread_name: thread.name().map(str::to_string),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, name: impl Into<String>) -> Self {
        self.logger_name = name.into();
        self
    }

    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches an auxiliary field, replacing any field of the same name.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Renders events into documents.
#[derive(Debug, Clone, Copy)]
pub struct DocumentBuilder {
    include_extra_fields: bool,
}

impl DocumentBuilder {
    /// With `include_extra_fields` off, only mapping-valued fields of an event
    /// make it into the document.
    #[must_use]
    pub fn new(include_extra_fields: bool) -> Self {
        Self {
            include_extra_fields,
        }
    }

    #[must_use]
    pub fn build(&self, event: &LogEvent, contexts: &ContextStack) -> Document {
        let mut document = Document::new();
        document.insert(
            "dt".to_string(),
            Value::String(event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        document.insert("level".to_string(), Value::from(event.level.as_str()));
        document.insert("severity".to_string(), Value::from(event.level.severity()));
        document.insert("message".to_string(), Value::from(event.message.as_str()));

        let mut context = Map::new();
        context.insert("runtime".to_string(), runtime_context(event));
        context.insert("system".to_string(), system_context());
        if contexts.exists() {
            context.extend(contexts.collapse());
        }
        document.insert("context".to_string(), Value::Object(context));

        for (key, value) in &event.fields {
            if self.include_extra_fields || value.is_mapping() {
                document.insert(key.clone(), value.to_json());
            }
        }

        document
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new(true)
    }
}

fn runtime_context(event: &LogEvent) -> Value {
    let mut runtime = Map::new();
    runtime.insert("function".to_string(), Value::from(event.function.clone()));
    runtime.insert(
        "file".to_string(),
        Value::from(event.file.as_deref().map(relative_to_cwd)),
    );
    runtime.insert("line".to_string(), Value::from(event.line));
    runtime.insert("thread_id".to_string(), event.thread_id.clone());
    runtime.insert("thread_name".to_string(), Value::from(event.thread_name.clone()));
    runtime.insert(
        "logger_name".to_string(),
        Value::from(event.logger_name.as_str()),
    );
    Value::Object(runtime)
}

fn system_context() -> Value {
    let mut system = Map::new();
    system.insert("pid".to_string(), Value::from(std::process::id()));
    system.insert("process_name".to_string(), Value::from(process_name()));
    Value::Object(system)
}

fn process_name() -> Option<&'static str> {
    static PROCESS_NAME: OnceLock<Option<String>> = OnceLock::new();
    PROCESS_NAME
        .get_or_init(|| {
            std::env::current_exe().ok().and_then(|exe| {
                exe.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
        })
        .as_deref()
}

/// `ThreadId` only exposes its number through `Debug`, e.g. `ThreadId(7)`.
fn thread_id_value(id: std::thread::ThreadId) -> Value {
    let repr = format!("{id:?}");
    repr.strip_prefix("ThreadId(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|number| number.parse::<u64>().ok())
        .map_or_else(|| Value::String(repr.clone()), Value::from)
}

fn relative_to_cwd(file: &str) -> String {
    let path = Path::new(file);
    if !path.is_absolute() {
        return file.to_string();
    }
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(|p| p.display().to_string()))
        .unwrap_or_else(|| file.to_string())
}
