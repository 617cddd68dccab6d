//! Core free-space management for a fixed-size block array
//!
//! The state of the disk is kept in two synchronized views:
//! - `BlockBitmap` for O(1) per-block status queries
//! - `ExtentList` for structural queries (runs, boundaries, merging)
//!
//! `AllocationEngine` is the single write path that keeps both views
//! consistent; neither view is mutable from outside the engine.

pub mod bitmap;
pub mod engine;
pub mod extents;
pub mod stats;

use serde::{Deserialize, Serialize};

/// State of a single disk block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    /// Block is available for allocation.
    Free,
    /// Block is owned by an allocation.
    Allocated,
}

impl BlockState {
    pub fn is_free(self) -> bool {
        self == BlockState::Free
    }
}

/// A maximal contiguous run of blocks sharing one state
///
/// The extent list guarantees maximality: two adjacent extents never
/// share a state, so every extent is as long as it can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// First block index covered by this extent.
    pub start: u64,
    /// Number of contiguous blocks (always >= 1).
    pub length: u64,
    /// Shared state of every block in the run.
    pub state: BlockState,
}

impl Extent {
    pub fn new(start: u64, length: u64, state: BlockState) -> Self {
        Extent {
            start,
            length,
            state,
        }
    }

    /// One past the last block index (exclusive end).
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Check if this extent contains a block index.
    pub fn contains(&self, index: u64) -> bool {
        index >= self.start && index < self.end()
    }

    /// Check if this extent directly precedes another.
    pub fn precedes(&self, other: &Extent) -> bool {
        self.end() == other.start
    }
}
