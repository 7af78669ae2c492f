//! Shared target set
//!
//! The scan owns one list of target strings. The liveness sweeper is its only
//! writer and may rewrite individual slots (for example upgrading a bare host
//! to a URL); every other component gets a read-only view. Writes take the
//! lock for a single assignment only, never across a probe.

use std::sync::{Arc, PoisonError, RwLock};

/// Construction point for the shared target list
#[derive(Debug)]
pub struct TargetSet;

impl TargetSet {
    /// Create the set and split it into its single writer and a reader
    ///
    /// `TargetWriter` is not `Clone`; additional readers come
    /// from [`TargetReader::clone`] or [`TargetWriter::reader`].
    pub fn new(targets: Vec<String>) -> (TargetWriter, TargetReader) {
        let inner = Arc::new(RwLock::new(targets));
        (
            TargetWriter {
                inner: Arc::clone(&inner),
            },
            TargetReader { inner },
        )
    }
}

/// Exclusive write handle
#[derive(Debug)]
pub struct TargetWriter {
    inner: Arc<RwLock<Vec<String>>>,
}

/// Read-only view
#[derive(Debug, Clone)]
pub struct TargetReader {
    inner: Arc<RwLock<Vec<String>>>,
}

impl TargetWriter {
    /// Replace the entry at `index`; returns false if the index is out of range
    pub fn replace(&self, index: usize, target: String) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match guard.get_mut(index) {
            Some(slot) => {
                *slot = target;
                true
            }
            None => false,
        }
    }

    /// Another read-only view onto the same list
    pub fn reader(&self) -> TargetReader {
        TargetReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl TargetReader {
    /// Copy of the current list
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, index: usize) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
