use std::collections::VecDeque;

use crate::collectors::record::ClassifiedRecord;

/// Records kept by the frame analyzer before the oldest are evicted.
pub const HISTORY_CAPACITY: usize = 1000;

/// Fixed-capacity, arrival-ordered record store with oldest-first eviction.
#[derive(Debug)]
pub struct HistoryBuffer {
    records: VecDeque<ClassifiedRecord>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends at the tail. Returns the evicted head when the buffer was full.
    pub fn append(&mut self, record: ClassifiedRecord) -> Option<ClassifiedRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn get(&self, index: usize) -> Option<&ClassifiedRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassifiedRecord> + '_ {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
