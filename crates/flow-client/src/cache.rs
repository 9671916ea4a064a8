//! In-memory flow cache.

use chrono::NaiveDate;
use dashmap::DashMap;

use scan_core::{FlowCache, FlowRecord};

/// Process-local cache keyed by (code, session date). A record is a pure
/// function of its key once the session has closed, so concurrent
/// last-write-wins puts are safe.
#[derive(Default)]
pub struct MemoryFlowCache {
    entries: DashMap<(String, NaiveDate), FlowRecord>,
}

impl MemoryFlowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FlowCache for MemoryFlowCache {
    fn get(&self, code: &str, date: NaiveDate) -> Option<FlowRecord> {
        self.entries
            .get(&(code.to_string(), date))
            .map(|entry| entry.value().clone())
    }

    fn put(&self, code: &str, date: NaiveDate, record: FlowRecord) {
        self.entries.insert((code.to_string(), date), record);
    }
}
