//! Structured audit trail: one record per executed transaction.
//!
//! Records carry the block timestamp rather than wall-clock time, so replaying the same
//! transactions yields the same trail on every node. Format: JSON with timestamp, actor,
//! action, resource, outcome. Sink: stdout or pluggable (e.g. test mock).

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Single audit record: one line of JSON per event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEvent {
    /// Block timestamp of the transaction (seconds since epoch).
    pub timestamp_secs: u64,
    /// Transaction sender.
    pub actor: String,
    /// Contract action: buy, sell, marketBuy, marketSell, cancel.
    pub action: String,
    /// Transaction id plus action-specific identifiers (symbol, order id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
    /// `success`, or the error kind the action was rejected with.
    pub outcome: String,
}

impl AuditEvent {
    pub fn at(
        timestamp_secs: u64,
        actor: impl Into<String>,
        action: impl Into<String>,
        resource: Option<serde_json::Value>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_secs,
            actor: actor.into(),
            action: action.into(),
            resource,
            outcome: outcome.into(),
        }
    }
}

/// Sink for audit events. Implementations write to stdout, file, or in-memory (tests).
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Writes one JSON line per event to stderr, keeping stdout for replay results.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", line);
        }
    }
}

/// In-memory sink that stores events for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
