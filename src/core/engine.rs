//! Allocation engine: the single write path over both disk views
//!
//! Every mutation goes through the extent list first (which performs all
//! validation) and is mirrored into the bitmap only after it succeeds, so
//! a failed call leaves both structures exactly as they were.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::bitmap::BlockBitmap;
use crate::core::extents::{ExtentList, MarkOutcome};
use crate::core::stats::{self, FragmentationStats};
use crate::core::{BlockState, Extent};
use crate::error::{FreemapError, Result};

/// Disk size used when the builder is given no explicit block count.
pub const DEFAULT_TOTAL_BLOCKS: u64 = 100;

/// Hybrid free-space manager over a fixed-size block array
///
/// Combines a per-block bitmap (O(1) point queries) with an ordered
/// extent list (structural queries, merge/split) and keeps the two in
/// sync across every allocate/deallocate.
///
/// # Examples
///
/// ```rust
/// use freemap_rs::{AllocationEngine, BlockState, Result};
///
/// # fn main() -> Result<()> {
/// let mut disk = AllocationEngine::new(100)?;
/// disk.allocate(10, 5)?;
/// assert_eq!(disk.query_block(12)?, BlockState::Allocated);
/// assert_eq!(disk.statistics().free_blocks, 95);
/// disk.deallocate(10, 5)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEngine {
    bitmap: BlockBitmap,
    extents: ExtentList,
    total_blocks: u64,
}

impl AllocationEngine {
    /// Create an engine with every block free.
    pub fn new(total_blocks: u64) -> Result<Self> {
        if total_blocks == 0 {
            return Err(FreemapError::ZeroBlocks);
        }
        Ok(AllocationEngine {
            bitmap: BlockBitmap::new(total_blocks),
            extents: ExtentList::new(total_blocks),
            total_blocks,
        })
    }

    /// Builder for engines with a custom size or pre-allocated ranges.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Allocate `length` blocks starting at `start`.
    ///
    /// The whole range must be free; the only exception is exactly
    /// re-applying a previous allocation (the range coincides with an
    /// allocated extent), which is an accepted no-op. Fails with
    /// `OutOfRange`, `InvalidLength`, or `AlreadyAllocated` before any
    /// mutation.
    pub fn allocate(&mut self, start: u64, length: u64) -> Result<()> {
        self.mark(start, length, BlockState::Allocated)
    }

    /// Deallocate `length` blocks starting at `start`.
    ///
    /// Symmetric to [`allocate`](Self::allocate); the whole range must be
    /// allocated, and fails with `NotAllocated` on mixed ranges.
    pub fn deallocate(&mut self, start: u64, length: u64) -> Result<()> {
        self.mark(start, length, BlockState::Free)
    }

    fn mark(&mut self, start: u64, length: u64, state: BlockState) -> Result<()> {
        match self.extents.mark_range(start, length, state) {
            Ok(MarkOutcome::Updated) => {
                // Cannot fail: mark_range validated the same range.
                self.bitmap.set_range(start, length, state)?;
                debug!("marked {} blocks at {} as {:?}", length, start, state);
                Ok(())
            }
            Ok(MarkOutcome::Unchanged) => Ok(()),
            Err(err) => {
                warn!("rejected request for {} blocks at {}: {}", length, start, err);
                Err(err)
            }
        }
    }

    /// O(1) point query through the bitmap.
    pub fn query_block(&self, index: u64) -> Result<BlockState> {
        self.bitmap.get(index)
    }

    /// The extent containing `index` (structural query).
    pub fn find_extent_at(&self, index: u64) -> Result<Extent> {
        self.extents.find_extent_at(index)
    }

    /// Current fragmentation statistics, recomputed on each call.
    pub fn statistics(&self) -> FragmentationStats {
        stats::analyze(&self.extents)
    }

    /// Iterate all extents in order.
    pub fn extents(&self) -> impl Iterator<Item = Extent> + '_ {
        self.extents.iter()
    }

    /// All extents in order, collected (renderer-facing).
    pub fn list_extents(&self) -> Vec<Extent> {
        self.extents.iter().collect()
    }

    /// Free extents only, in order (the linked-list view renderers draw
    /// arrows between).
    pub fn free_extents(&self) -> Vec<Extent> {
        self.extents.iter().filter(|e| e.state.is_free()).collect()
    }

    /// Free list rendered as `"[0:2] -> [5:10]"` (half-open block ranges),
    /// or `"Empty"` when the disk is full.
    pub fn free_list_display(&self) -> String {
        let parts: Vec<String> = self
            .extents
            .iter()
            .filter(|e| e.state.is_free())
            .map(|e| format!("[{}:{}]", e.start, e.end()))
            .collect();
        if parts.is_empty() {
            "Empty".to_string()
        } else {
            parts.join(" -> ")
        }
    }

    /// Return every block to the free state.
    pub fn reset(&mut self) {
        self.bitmap = BlockBitmap::new(self.total_blocks);
        self.extents = ExtentList::new(self.total_blocks);
        debug!("reset disk of {} blocks", self.total_blocks);
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn free_blocks(&self) -> u64 {
        self.bitmap.count_free()
    }

    pub fn allocated_blocks(&self) -> u64 {
        self.bitmap.count_allocated()
    }

    /// Capture the engine state for later restore.
    pub fn snapshot(&self) -> DiskSnapshot {
        DiskSnapshot {
            total_blocks: self.total_blocks,
            extents: self.list_extents(),
        }
    }

    /// Rebuild an engine from a snapshot, re-deriving the bitmap from the
    /// extent sequence and validating the partition invariant.
    pub fn restore(snapshot: &DiskSnapshot) -> Result<Self> {
        let extents = ExtentList::from_extents(snapshot.total_blocks, &snapshot.extents)?;
        let mut bitmap = BlockBitmap::new(snapshot.total_blocks);
        for extent in snapshot.extents.iter().filter(|e| !e.state.is_free()) {
            bitmap.set_range(extent.start, extent.length, BlockState::Allocated)?;
        }
        Ok(AllocationEngine {
            bitmap,
            extents,
            total_blocks: snapshot.total_blocks,
        })
    }
}

/// Serializable capture of the full engine state.
///
/// The bitmap is intentionally not stored; it is redundant with the
/// extent sequence and is rebuilt on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub total_blocks: u64,
    pub extents: Vec<Extent>,
}

impl DiskSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builder for pre-seeded engines
///
/// # Examples
///
/// ```rust
/// use freemap_rs::{AllocationEngine, Result};
///
/// # fn main() -> Result<()> {
/// let disk = AllocationEngine::builder()
///     .total_blocks(50)
///     .seed_allocated(0, 10)
///     .build()?;
/// assert_eq!(disk.free_blocks(), 40);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    total_blocks: Option<u64>,
    seeded: Vec<(u64, u64)>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder::default()
    }

    /// Disk size in blocks (default [`DEFAULT_TOTAL_BLOCKS`]).
    pub fn total_blocks(mut self, total_blocks: u64) -> Self {
        self.total_blocks = Some(total_blocks);
        self
    }

    /// Mark a range allocated before the engine is handed out. Ranges are
    /// applied in insertion order and must not overlap.
    pub fn seed_allocated(mut self, start: u64, length: u64) -> Self {
        self.seeded.push((start, length));
        self
    }

    pub fn build(self) -> Result<AllocationEngine> {
        let total = self.total_blocks.unwrap_or(DEFAULT_TOTAL_BLOCKS);
        let mut engine = AllocationEngine::new(total)?;
        for (start, length) in self.seeded {
            engine.allocate(start, length)?;
        }
        Ok(engine)
    }
}
