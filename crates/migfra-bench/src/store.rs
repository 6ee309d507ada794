//! Correlation Store - shared map from correlation id to timing record.
//!
//! The Requester inserts a record right before publishing, the Receiver
//! completes it when the matching response arrives, the Evaluator reads the
//! snapshot once everything has stopped. DashMap shards its locks, so an
//! insert for a new id never waits on an update of an unrelated one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use migfra_common::{CorrelationId, Direction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Timing and result of one dispatched request.
#[derive(Debug, Clone)]
pub struct CorrelationRecord {
    pub id: CorrelationId,
    pub vm_name: String,
    pub direction: Option<Direction>,
    pub round: u32,
    pub started_at: Instant,
    pub stopped_at: Option<Instant>,
    /// Raw response payload
    pub response: Option<String>,
}

impl CorrelationRecord {
    pub fn new(id: CorrelationId, vm_name: impl Into<String>, started_at: Instant) -> Self {
        Self {
            id,
            vm_name: vm_name.into(),
            direction: None,
            round: 0,
            started_at,
            stopped_at: None,
            response: None,
        }
    }

    pub fn in_round(mut self, round: u32, direction: Direction) -> Self {
        self.round = round;
        self.direction = Some(direction);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.stopped_at.is_some() && self.response.is_some()
    }

    /// Round-trip time, once the response has arrived.
    pub fn elapsed(&self) -> Option<Duration> {
        self.stopped_at
            .map(|stop| stop.saturating_duration_since(self.started_at))
    }
}

/// Concurrent correlation id -> record map. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CorrelationStore {
    records: Arc<DashMap<CorrelationId, CorrelationRecord>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record. Returns false (and keeps the existing record)
    /// if the id is already present.
    pub fn insert(&self, record: CorrelationRecord) -> bool {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Mark the record for `id` as answered now. Returns false for unknown ids.
    ///
    /// A repeated response for the same id overwrites the earlier one.
    pub fn complete(&self, id: &CorrelationId, payload: String) -> bool {
        self.complete_at(id, payload, Instant::now())
    }

    pub fn complete_at(&self, id: &CorrelationId, payload: String, at: Instant) -> bool {
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.stopped_at = Some(at.max(record.started_at));
                record.response = Some(payload);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &CorrelationId) -> Option<CorrelationRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_complete()).count()
    }

    /// Records still waiting for a response. Counted in one pass, so
    /// concurrent inserts can never make it underflow.
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_complete()).count()
    }

    /// Copy of every record, ordered by dispatch time.
    pub fn snapshot(&self) -> Vec<CorrelationRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.started_at);
        records
    }
}
