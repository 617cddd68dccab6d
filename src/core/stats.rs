//! Fragmentation statistics derived from the extent partition
//!
//! Pure reads over `ExtentList` state; nothing here mutates or caches.
//! Statistics are recomputed on every call, which is fine for the
//! bounded block counts this crate manages.

use serde::{Deserialize, Serialize};

use crate::core::extents::ExtentList;

/// Snapshot of free-space statistics at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FragmentationStats {
    /// Blocks currently free.
    pub free_blocks: u64,
    /// Blocks currently allocated.
    pub allocated_blocks: u64,
    /// Number of distinct free runs.
    pub free_extent_count: usize,
    /// Length of the longest free run.
    pub largest_free_extent_length: u64,
    /// 0.0 = all free space contiguous, approaching 1.0 = badly scattered.
    ///
    /// Defined as `1 - largest_free_extent / free_blocks` when the free
    /// space is split across more than one extent, otherwise 0.0.
    pub fragmentation_ratio: f64,
}

/// Compute statistics from the current extent partition.
pub fn analyze(extents: &ExtentList) -> FragmentationStats {
    let mut free_blocks = 0u64;
    let mut allocated_blocks = 0u64;
    let mut free_extent_count = 0usize;
    let mut largest_free_extent_length = 0u64;

    for extent in extents.iter() {
        if extent.state.is_free() {
            free_blocks += extent.length;
            free_extent_count += 1;
            largest_free_extent_length = largest_free_extent_length.max(extent.length);
        } else {
            allocated_blocks += extent.length;
        }
    }

    let fragmentation_ratio = if free_extent_count > 1 && free_blocks > 0 {
        1.0 - largest_free_extent_length as f64 / free_blocks as f64
    } else {
        0.0
    };

    FragmentationStats {
        free_blocks,
        allocated_blocks,
        free_extent_count,
        largest_free_extent_length,
        fragmentation_ratio,
    }
}
