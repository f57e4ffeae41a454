//! Specdb Streaming Events
//!
//! Change events emitted after every committed mutation.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use serde::{Deserialize, Serialize};
use specdb_common::Value;
use std::fmt;

// =============================================================================
// Event Op
// =============================================================================

/// Kind of mutation an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOp {
    Insert,
    Update,
    Delete,
}

impl EventOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EventOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event
// =============================================================================

/// A change event: which document was touched and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub op: EventOp,
    pub id: Value,
}

impl Event {
    pub fn new(op: EventOp, id: impl Into<Value>) -> Self {
        Self { op, id: id.into() }
    }

    pub fn insert(id: impl Into<Value>) -> Self {
        Self::new(EventOp::Insert, id)
    }

    pub fn update(id: impl Into<Value>) -> Self {
        Self::new(EventOp::Update, id)
    }

    pub fn delete(id: impl Into<Value>) -> Self {
        Self::new(EventOp::Delete, id)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.id)
    }
}

// =============================================================================
// Tests
// =============================================================================
