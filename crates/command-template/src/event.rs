//! Lifecycle events recorded on a running command

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle event from a process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The type of event
    pub event_type: ProcessEventType,
}

impl ProcessEvent {
    /// Create a new process event stamped with the current time
    pub fn new(event_type: ProcessEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
        }
    }
}

/// Types of lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessEventType {
    /// Process has started
    Started {
        /// OS process id
        pid: u32,
    },
    /// Process has exited
    Exited {
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Terminating signal, if any
        signal: Option<i32>,
    },
}
