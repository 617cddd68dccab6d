//! Ordered extent list over the whole disk
//!
//! The list partitions `[0, total_blocks)` into maximal same-state runs:
//! no gaps, no overlaps, and no two adjacent extents with equal state.
//! Records live in an arena and are linked by explicit prev/next slot
//! indices instead of node references, so merges and splits never leave
//! a dangling link; vacated slots are recycled through a free-slot list.

use serde::{Deserialize, Serialize};

use crate::core::{BlockState, Extent};
use crate::error::{FreemapError, Result};

type SlotIndex = usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    extent: Extent,
    prev: Option<SlotIndex>,
    next: Option<SlotIndex>,
}

/// Whether `mark_range` changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The range was flipped to the requested state.
    Updated,
    /// The range already had the requested state (idempotent success).
    Unchanged,
}

/// Doubly-linked list of extents covering the full block range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtentList {
    arena: Vec<Option<Node>>,
    free_slots: Vec<SlotIndex>,
    head: Option<SlotIndex>,
    total_blocks: u64,
}

impl ExtentList {
    /// Create a list holding one free extent over the whole disk.
    pub fn new(total_blocks: u64) -> Self {
        let node = Node {
            extent: Extent::new(0, total_blocks, BlockState::Free),
            prev: None,
            next: None,
        };
        ExtentList {
            arena: vec![Some(node)],
            free_slots: Vec::new(),
            head: Some(0),
            total_blocks,
        }
    }

    /// Rebuild a list from an explicit extent sequence, validating the
    /// partition invariant (used when restoring snapshots).
    pub fn from_extents(total_blocks: u64, extents: &[Extent]) -> Result<Self> {
        if total_blocks == 0 {
            return Err(FreemapError::CorruptSnapshot(
                "disk has zero blocks".to_string(),
            ));
        }
        if extents.is_empty() {
            return Err(FreemapError::CorruptSnapshot("no extents".to_string()));
        }

        let mut covered = 0u64;
        let mut prev: Option<Extent> = None;
        for extent in extents {
            if extent.length == 0 {
                return Err(FreemapError::CorruptSnapshot(format!(
                    "zero-length extent at block {}",
                    extent.start
                )));
            }
            let end = extent.start.checked_add(extent.length).ok_or_else(|| {
                FreemapError::CorruptSnapshot("extent length overflow".to_string())
            })?;
            match prev {
                None => {
                    if extent.start != 0 {
                        return Err(FreemapError::CorruptSnapshot(format!(
                            "gap or overlap at block {}",
                            extent.start
                        )));
                    }
                }
                Some(p) => {
                    if !p.precedes(extent) {
                        return Err(FreemapError::CorruptSnapshot(format!(
                            "gap or overlap at block {}",
                            extent.start
                        )));
                    }
                    if p.state == extent.state {
                        return Err(FreemapError::CorruptSnapshot(format!(
                            "adjacent extents at block {} share a state",
                            extent.start
                        )));
                    }
                }
            }
            covered = end;
            prev = Some(*extent);
        }
        if covered != total_blocks {
            return Err(FreemapError::CorruptSnapshot(format!(
                "extents cover {} blocks, disk has {}",
                covered, total_blocks
            )));
        }

        let arena = extents
            .iter()
            .enumerate()
            .map(|(i, extent)| {
                Some(Node {
                    extent: *extent,
                    prev: if i == 0 { None } else { Some(i - 1) },
                    next: if i + 1 == extents.len() {
                        None
                    } else {
                        Some(i + 1)
                    },
                })
            })
            .collect();
        Ok(ExtentList {
            arena,
            free_slots: Vec::new(),
            head: Some(0),
            total_blocks,
        })
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Number of extents in the partition.
    pub fn extent_count(&self) -> usize {
        self.iter().count()
    }

    /// Iterate extents from lowest to highest start index.
    pub fn iter(&self) -> ExtentIter<'_> {
        ExtentIter {
            list: self,
            cursor: self.head,
        }
    }

    /// Return the extent containing `index`.
    pub fn find_extent_at(&self, index: u64) -> Result<Extent> {
        let slot = self.slot_at(index)?;
        Ok(self.node(slot).extent)
    }

    /// Flip `[start, start + length)` to `new_state`.
    ///
    /// All-or-nothing: the range must be fully inside one extent of the
    /// opposite state, which is then split at the range boundaries, the
    /// covered region flipped, and the result merged with any same-state
    /// neighbor (left neighbor first, then right). Exactly re-applying a
    /// previous mark (the range coincides with a `new_state` extent) is
    /// an idempotent no-op; any other overlap with `new_state` blocks is
    /// a conflict. A range crossing an extent boundary is necessarily
    /// mixed-state and fails without mutating anything.
    pub fn mark_range(
        &mut self,
        start: u64,
        length: u64,
        new_state: BlockState,
    ) -> Result<MarkOutcome> {
        self.check_range(start, length)?;
        let slot = self.slot_at(start)?;
        let extent = self.node(slot).extent;
        let end = start + length;

        if extent.state == new_state {
            // Idempotent only for an exact re-application; a sub-range
            // of an extent that already holds new_state is a conflict,
            // as is a range spilling into the next extent.
            if start == extent.start && end == extent.end() {
                return Ok(MarkOutcome::Unchanged);
            }
            return Err(conflict(start, length, new_state));
        }
        if end > extent.end() {
            // Crosses into a neighbor that already has new_state.
            return Err(conflict(start, length, new_state));
        }

        let old_state = extent.state;
        let left_len = start - extent.start;
        let right_len = extent.end() - end;

        self.node_mut(slot).extent = Extent::new(start, length, new_state);
        if left_len > 0 {
            self.insert_before(slot, Extent::new(extent.start, left_len, old_state));
        }
        if right_len > 0 {
            self.insert_after(slot, Extent::new(end, right_len, old_state));
        }

        // Left neighbor first, then right. The order is associative; it
        // is fixed only for determinism.
        let slot = self.merge_left(slot);
        self.merge_right(slot);
        Ok(MarkOutcome::Updated)
    }

    fn check_range(&self, start: u64, length: u64) -> Result<()> {
        if start >= self.total_blocks {
            return Err(FreemapError::OutOfRange {
                index: start,
                total: self.total_blocks,
            });
        }
        if length == 0 {
            return Err(FreemapError::InvalidLength { length });
        }
        match start.checked_add(length) {
            Some(end) if end <= self.total_blocks => Ok(()),
            _ => Err(FreemapError::InvalidLength { length }),
        }
    }

    fn slot_at(&self, index: u64) -> Result<SlotIndex> {
        if index >= self.total_blocks {
            return Err(FreemapError::OutOfRange {
                index,
                total: self.total_blocks,
            });
        }
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.node(slot);
            if node.extent.contains(index) {
                return Ok(slot);
            }
            cursor = node.next;
        }
        // The partition invariant guarantees every in-range index is
        // covered; reaching here means the list itself is broken.
        Err(FreemapError::OutOfRange {
            index,
            total: self.total_blocks,
        })
    }

    fn node(&self, slot: SlotIndex) -> &Node {
        self.arena[slot].as_ref().expect("vacant extent slot")
    }

    fn node_mut(&mut self, slot: SlotIndex) -> &mut Node {
        self.arena[slot].as_mut().expect("vacant extent slot")
    }

    fn claim_slot(&mut self, node: Node) -> SlotIndex {
        if let Some(slot) = self.free_slots.pop() {
            self.arena[slot] = Some(node);
            slot
        } else {
            self.arena.push(Some(node));
            self.arena.len() - 1
        }
    }

    fn release_slot(&mut self, slot: SlotIndex) {
        self.arena[slot] = None;
        self.free_slots.push(slot);
    }

    fn insert_before(&mut self, at: SlotIndex, extent: Extent) -> SlotIndex {
        let prev = self.node(at).prev;
        let slot = self.claim_slot(Node {
            extent,
            prev,
            next: Some(at),
        });
        self.node_mut(at).prev = Some(slot);
        match prev {
            Some(p) => self.node_mut(p).next = Some(slot),
            None => self.head = Some(slot),
        }
        slot
    }

    fn insert_after(&mut self, at: SlotIndex, extent: Extent) -> SlotIndex {
        let next = self.node(at).next;
        let slot = self.claim_slot(Node {
            extent,
            prev: Some(at),
            next,
        });
        self.node_mut(at).next = Some(slot);
        if let Some(n) = next {
            self.node_mut(n).prev = Some(slot);
        }
        slot
    }

    /// Merge `slot` into its left neighbor when states match; returns the
    /// slot holding the (possibly merged) extent.
    fn merge_left(&mut self, slot: SlotIndex) -> SlotIndex {
        let prev = match self.node(slot).prev {
            Some(p) => p,
            None => return slot,
        };
        if self.node(prev).extent.state != self.node(slot).extent.state {
            return slot;
        }
        let added = self.node(slot).extent.length;
        let next = self.node(slot).next;
        self.node_mut(prev).extent.length += added;
        self.node_mut(prev).next = next;
        if let Some(n) = next {
            self.node_mut(n).prev = Some(prev);
        }
        self.release_slot(slot);
        prev
    }

    /// Merge the right neighbor into `slot` when states match.
    fn merge_right(&mut self, slot: SlotIndex) {
        let next = match self.node(slot).next {
            Some(n) => n,
            None => return,
        };
        if self.node(next).extent.state != self.node(slot).extent.state {
            return;
        }
        let added = self.node(next).extent.length;
        let after = self.node(next).next;
        self.node_mut(slot).extent.length += added;
        self.node_mut(slot).next = after;
        if let Some(a) = after {
            self.node_mut(a).prev = Some(slot);
        }
        self.release_slot(next);
    }
}

fn conflict(start: u64, length: u64, new_state: BlockState) -> FreemapError {
    match new_state {
        BlockState::Allocated => FreemapError::AlreadyAllocated { start, length },
        BlockState::Free => FreemapError::NotAllocated { start, length },
    }
}

/// Lazy, restartable iterator over the extent partition in order.
pub struct ExtentIter<'a> {
    list: &'a ExtentList,
    cursor: Option<SlotIndex>,
}

impl Iterator for ExtentIter<'_> {
    type Item = Extent;

    fn next(&mut self) -> Option<Extent> {
        let slot = self.cursor?;
        let node = self.list.node(slot);
        self.cursor = node.next;
        Some(node.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extents(list: &ExtentList) -> Vec<(u64, u64, BlockState)> {
        list.iter().map(|e| (e.start, e.length, e.state)).collect()
    }

    /// Walk the list and assert the partition invariant.
    fn assert_partition(list: &ExtentList) {
        let all: Vec<Extent> = list.iter().collect();
        assert!(!all.is_empty());
        assert_eq!(all[0].start, 0);
        for pair in all.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start, "gap or overlap");
            assert_ne!(pair[0].state, pair[1].state, "unmerged neighbors");
        }
        assert_eq!(all.last().unwrap().end(), list.total_blocks());
    }

    #[test]
    fn test_new_list_single_free_extent() {
        let list = ExtentList::new(50);
        assert_eq!(extents(&list), vec![(0, 50, BlockState::Free)]);
        assert_eq!(list.extent_count(), 1);
        assert_partition(&list);
    }

    #[test]
    fn test_find_extent_at() {
        let mut list = ExtentList::new(10);
        list.mark_range(3, 4, BlockState::Allocated).unwrap();
        assert_eq!(list.find_extent_at(0).unwrap().start, 0);
        assert_eq!(list.find_extent_at(2).unwrap().start, 0);
        assert_eq!(list.find_extent_at(3).unwrap().start, 3);
        assert_eq!(list.find_extent_at(6).unwrap().start, 3);
        assert_eq!(list.find_extent_at(7).unwrap().start, 7);
        assert!(matches!(
            list.find_extent_at(10),
            Err(FreemapError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_split_inside_free_extent() {
        let mut list = ExtentList::new(10);
        let outcome = list.mark_range(2, 3, BlockState::Allocated).unwrap();
        assert_eq!(outcome, MarkOutcome::Updated);
        assert_eq!(
            extents(&list),
            vec![
                (0, 2, BlockState::Free),
                (2, 3, BlockState::Allocated),
                (5, 5, BlockState::Free),
            ]
        );
        assert_partition(&list);
    }

    #[test]
    fn test_mark_at_extent_start_and_end() {
        let mut list = ExtentList::new(10);
        list.mark_range(0, 4, BlockState::Allocated).unwrap();
        assert_eq!(
            extents(&list),
            vec![(0, 4, BlockState::Allocated), (4, 6, BlockState::Free)]
        );

        list.mark_range(4, 6, BlockState::Allocated).unwrap();
        // Whole disk allocated; the two runs must merge into one extent
        assert_eq!(extents(&list), vec![(0, 10, BlockState::Allocated)]);
        assert_partition(&list);
    }

    #[test]
    fn test_merge_both_neighbors() {
        let mut list = ExtentList::new(10);
        list.mark_range(2, 3, BlockState::Allocated).unwrap();
        // Freeing the allocated run must collapse free-alloc-free into
        // one free extent spanning all three regions
        list.mark_range(2, 3, BlockState::Free).unwrap();
        assert_eq!(extents(&list), vec![(0, 10, BlockState::Free)]);
        assert_eq!(list.extent_count(), 1);
        assert_partition(&list);
    }

    #[test]
    fn test_exact_remark_is_noop() {
        let mut list = ExtentList::new(10);
        list.mark_range(2, 3, BlockState::Allocated).unwrap();
        let before = extents(&list);

        assert_eq!(
            list.mark_range(2, 3, BlockState::Allocated).unwrap(),
            MarkOutcome::Unchanged
        );
        assert_eq!(extents(&list), before);
    }

    #[test]
    fn test_same_state_subrange_conflicts() {
        let mut list = ExtentList::new(10);
        list.mark_range(2, 3, BlockState::Allocated).unwrap();
        let before = extents(&list);

        // A strict sub-range of an allocated run is rejected, not
        // treated as idempotent
        assert!(matches!(
            list.mark_range(3, 1, BlockState::Allocated),
            Err(FreemapError::AlreadyAllocated { start: 3, length: 1 })
        ));
        // Same for freeing a sub-range of a free run
        assert!(matches!(
            list.mark_range(6, 2, BlockState::Free),
            Err(FreemapError::NotAllocated { start: 6, length: 2 })
        ));
        assert_eq!(extents(&list), before);
    }

    #[test]
    fn test_full_disk_rejects_further_marks() {
        let mut list = ExtentList::new(10);
        list.mark_range(0, 10, BlockState::Allocated).unwrap();

        assert!(matches!(
            list.mark_range(0, 1, BlockState::Allocated),
            Err(FreemapError::AlreadyAllocated { start: 0, length: 1 })
        ));
        // Re-applying the whole-disk mark stays a no-op
        assert_eq!(
            list.mark_range(0, 10, BlockState::Allocated).unwrap(),
            MarkOutcome::Unchanged
        );
    }

    #[test]
    fn test_mixed_range_fails_atomically() {
        let mut list = ExtentList::new(10);
        list.mark_range(4, 2, BlockState::Allocated).unwrap();
        let before = extents(&list);

        // [2, 8) covers free and allocated blocks
        assert!(matches!(
            list.mark_range(2, 6, BlockState::Allocated),
            Err(FreemapError::AlreadyAllocated { start: 2, length: 6 })
        ));
        assert!(matches!(
            list.mark_range(2, 6, BlockState::Free),
            Err(FreemapError::NotAllocated { start: 2, length: 6 })
        ));
        assert_eq!(extents(&list), before);
    }

    #[test]
    fn test_range_validation() {
        let mut list = ExtentList::new(10);
        assert!(matches!(
            list.mark_range(10, 1, BlockState::Allocated),
            Err(FreemapError::OutOfRange { index: 10, total: 10 })
        ));
        assert!(matches!(
            list.mark_range(0, 0, BlockState::Allocated),
            Err(FreemapError::InvalidLength { length: 0 })
        ));
        assert!(matches!(
            list.mark_range(5, 6, BlockState::Allocated),
            Err(FreemapError::InvalidLength { length: 6 })
        ));
        assert!(matches!(
            list.mark_range(1, u64::MAX, BlockState::Allocated),
            Err(FreemapError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_slot_recycling() {
        let mut list = ExtentList::new(10);
        // Churn the same range to force merge/split cycles; the arena
        // must reuse vacated slots instead of growing without bound.
        for _ in 0..100 {
            list.mark_range(2, 3, BlockState::Allocated).unwrap();
            list.mark_range(2, 3, BlockState::Free).unwrap();
        }
        assert!(list.arena.len() <= 4);
        assert_eq!(extents(&list), vec![(0, 10, BlockState::Free)]);
    }

    #[test]
    fn test_from_extents_valid() {
        let list = ExtentList::from_extents(
            10,
            &[
                Extent::new(0, 2, BlockState::Free),
                Extent::new(2, 3, BlockState::Allocated),
                Extent::new(5, 5, BlockState::Free),
            ],
        )
        .unwrap();
        assert_eq!(list.extent_count(), 3);
        assert_partition(&list);
        assert_eq!(list.find_extent_at(4).unwrap().state, BlockState::Allocated);
    }

    #[test]
    fn test_from_extents_rejects_bad_partitions() {
        // Gap
        assert!(matches!(
            ExtentList::from_extents(
                10,
                &[
                    Extent::new(0, 2, BlockState::Free),
                    Extent::new(3, 7, BlockState::Allocated),
                ],
            ),
            Err(FreemapError::CorruptSnapshot(_))
        ));
        // Unmerged neighbors
        assert!(matches!(
            ExtentList::from_extents(
                10,
                &[
                    Extent::new(0, 5, BlockState::Free),
                    Extent::new(5, 5, BlockState::Free),
                ],
            ),
            Err(FreemapError::CorruptSnapshot(_))
        ));
        // Short coverage
        assert!(matches!(
            ExtentList::from_extents(10, &[Extent::new(0, 9, BlockState::Free)]),
            Err(FreemapError::CorruptSnapshot(_))
        ));
        // Empty
        assert!(matches!(
            ExtentList::from_extents(10, &[]),
            Err(FreemapError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_iterator_is_restartable() {
        let mut list = ExtentList::new(10);
        list.mark_range(2, 3, BlockState::Allocated).unwrap();
        let first: Vec<Extent> = list.iter().collect();
        let second: Vec<Extent> = list.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
