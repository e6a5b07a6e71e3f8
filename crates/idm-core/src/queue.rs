//! Staging queue of records awaiting admission.
//!
//! Plain FIFO over `Pending`; no priorities. All operations are O(n) and
//! serialized behind one lock, which is fine at queue scale.

use crate::store::{DownloadRecord, DownloadStatus};
use std::sync::Mutex;

#[derive(Default)]
pub struct Queue {
    items: Mutex<Vec<DownloadRecord>>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the back of the queue.
    pub fn add(&self, record: DownloadRecord) {
        self.items.lock().unwrap().push(record);
    }

    /// Remove and return the first `Pending` record; entries in other
    /// states are skipped in place.
    pub fn next(&self) -> Option<DownloadRecord> {
        let mut items = self.items.lock().unwrap();
        let pos = items
            .iter()
            .position(|r| r.status == DownloadStatus::Pending)?;
        Some(items.remove(pos))
    }

    /// Drop the first entry with this id, if any.
    pub fn remove(&self, id: i64) {
        let mut items = self.items.lock().unwrap();
        if let Some(pos) = items.iter().position(|r| r.id == id) {
            items.remove(pos);
        }
    }

    /// Copy of the current contents, front first.
    pub fn snapshot(&self) -> Vec<DownloadRecord> {
        self.items.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
