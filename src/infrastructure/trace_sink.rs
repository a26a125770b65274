//! In-memory trace sink with bounded retention

use crate::infrastructure::log_messages::trace as messages;
use crate::proxy::trace::{RequestTrace, SharedTrace, TraceSink};
use crate::proxy::types::*;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

/// A stored trace and when it was appended
#[derive(Clone, Debug)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub trace: SharedTrace,
}

/// Point-in-time copy of a [`TraceEntry`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub info: RequestTrace,
}

/// Keeps the most recent traces in memory.
///
/// Once `capacity` traces are held, each append drops the oldest one.
#[derive(Debug)]
pub struct InMemoryTraceSink {
    entries: Mutex<VecDeque<TraceEntry>>,
    capacity: usize,
}

impl InMemoryTraceSink {
    pub fn new(capacity: TraceCapacity) -> Self {
        let capacity = *capacity.as_ref();
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Stored entries, newest first
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Copies of every stored trace, newest first
    pub fn find_all(&self) -> Vec<TraceSnapshot> {
        self.entries
            .lock()
            .iter()
            .map(|entry| TraceSnapshot {
                timestamp: entry.timestamp,
                info: entry.trace.read().clone(),
            })
            .collect()
    }

    /// Render [`Self::find_all`] as JSON
    pub fn to_json(&self) -> ProxyResult<String> {
        Ok(serde_json::to_string(&self.find_all())?)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for InMemoryTraceSink {
    fn default() -> Self {
        Self::new(TraceCapacity::default())
    }
}

impl TraceSink for InMemoryTraceSink {
    fn append(&self, trace: SharedTrace) {
        let entry = TraceEntry {
            timestamp: Utc::now(),
            trace,
        };

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_back();
            trace!(capacity = self.capacity, "{}", messages::TRACE_EVICTED);
        }
        entries.push_front(entry);
    }
}
