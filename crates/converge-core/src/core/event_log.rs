// converge-core/src/core/event_log.rs
// ============================================================================
// Module: Event Log
// Description: Ordered, leveled event records collected during a run.
// Purpose: Let recursive resolution and action application return log
//          fragments that callers merge and later forward to tracing.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! An [`EventLog`] is a plain vector of [`Event`] values. Resolution steps
//! build their own fragment and return it to the caller, which appends it in
//! order; nothing is written to a shared sink during recursion. When a run
//! completes, [`EventLog::emit`] forwards every event to `tracing` at its
//! recorded level.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Levels
// ============================================================================

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Severity.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
    /// Structured fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl Event {
    /// Attaches a structured field.
    pub fn field(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    /// Renders fields as `name=value` pairs separated by spaces.
    fn rendered_fields(&self) -> String {
        let pairs: Vec<String> =
            self.fields.iter().map(|(name, value)| format!("{name}={value}")).collect();
        pairs.join(" ")
    }
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Ordered collection of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    /// Events in recording order.
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event and returns it for field chaining.
    pub fn record(&mut self, level: Level, message: impl Into<String>) -> &mut Event {
        let index = self.events.len();
        self.events.push(Event {
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        });
        &mut self.events[index]
    }

    /// Records a debug event.
    pub fn debug(&mut self, message: impl Into<String>) -> &mut Event {
        self.record(Level::Debug, message)
    }

    /// Records an info event.
    pub fn info(&mut self, message: impl Into<String>) -> &mut Event {
        self.record(Level::Info, message)
    }

    /// Records a warning event.
    pub fn warn(&mut self, message: impl Into<String>) -> &mut Event {
        self.record(Level::Warn, message)
    }

    /// Records an error event.
    pub fn error(&mut self, message: impl Into<String>) -> &mut Event {
        self.record(Level::Error, message)
    }

    /// Appends every event of `other`, preserving order.
    pub fn append(&mut self, other: Self) {
        self.events.extend(other.events);
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Counts events recorded at exactly `level`.
    #[must_use]
    pub fn count_at(&self, level: Level) -> usize {
        self.events.iter().filter(|event| event.level == level).count()
    }

    /// Returns true when any error event was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.count_at(Level::Error) > 0
    }

    /// Forwards every event to `tracing`.
    pub fn emit(&self) {
        for event in &self.events {
            let fields = event.rendered_fields();
            match event.level {
                Level::Debug => debug!(target: "converge", fields = %fields, "{}", event.message),
                Level::Info => info!(target: "converge", fields = %fields, "{}", event.message),
                Level::Warn => warn!(target: "converge", fields = %fields, "{}", event.message),
                Level::Error => error!(target: "converge", fields = %fields, "{}", event.message),
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
