//! Thread-safe handle around the allocation engine
//!
//! The bitmap and the extent list must move together, so the whole engine
//! sits behind one `parking_lot::Mutex`; each call holds the lock for its
//! full duration. There is no finer-grained locking to be had here given
//! the bounded block counts involved.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::engine::AllocationEngine;
use crate::core::stats::FragmentationStats;
use crate::core::{BlockState, Extent};
use crate::error::Result;

/// Cloneable, thread-safe wrapper over [`AllocationEngine`].
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<AllocationEngine>>,
}

impl SharedEngine {
    pub fn new(engine: AllocationEngine) -> Self {
        SharedEngine {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn allocate(&self, start: u64, length: u64) -> Result<()> {
        self.inner.lock().allocate(start, length)
    }

    pub fn deallocate(&self, start: u64, length: u64) -> Result<()> {
        self.inner.lock().deallocate(start, length)
    }

    pub fn query_block(&self, index: u64) -> Result<BlockState> {
        self.inner.lock().query_block(index)
    }

    pub fn statistics(&self) -> FragmentationStats {
        self.inner.lock().statistics()
    }

    pub fn list_extents(&self) -> Vec<Extent> {
        self.inner.lock().list_extents()
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Run a compound operation under one lock acquisition.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut AllocationEngine) -> T) -> T {
        f(&mut self.inner.lock())
    }
}
