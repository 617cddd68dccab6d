//! Per-block state bitmap
//!
//! One bit per block (0 = free, 1 = allocated), packed into 64-bit words.
//! The bitmap mirrors the extent list and is authoritative for point
//! queries only; structural queries (extent boundaries, runs) go through
//! `ExtentList`.

use serde::{Deserialize, Serialize};

use crate::core::BlockState;
use crate::error::{FreemapError, Result};

/// Bitmap over the full block range of the disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockBitmap {
    /// Bitmap words (each word = 64 bits = 64 blocks).
    words: Vec<u64>,

    /// Total number of blocks tracked.
    total_blocks: u64,
}

impl BlockBitmap {
    /// Create a bitmap with every block free.
    pub fn new(total_blocks: u64) -> Self {
        let num_words = ((total_blocks + 63) / 64) as usize;
        BlockBitmap {
            words: vec![0u64; num_words],
            total_blocks,
        }
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Read the state of one block.
    pub fn get(&self, index: u64) -> Result<BlockState> {
        self.check_index(index)?;
        let word = self.words[(index / 64) as usize];
        if word & (1u64 << (index % 64)) == 0 {
            Ok(BlockState::Free)
        } else {
            Ok(BlockState::Allocated)
        }
    }

    /// Write the state of one block.
    pub fn set(&mut self, index: u64, state: BlockState) -> Result<()> {
        self.check_index(index)?;
        let word = &mut self.words[(index / 64) as usize];
        let bit = 1u64 << (index % 64);
        match state {
            BlockState::Allocated => *word |= bit,
            BlockState::Free => *word &= !bit,
        }
        Ok(())
    }

    /// Write one state across `length` blocks starting at `start`.
    pub fn set_range(&mut self, start: u64, length: u64, state: BlockState) -> Result<()> {
        self.check_range(start, length)?;
        for index in start..start + length {
            let word = &mut self.words[(index / 64) as usize];
            let bit = 1u64 << (index % 64);
            match state {
                BlockState::Allocated => *word |= bit,
                BlockState::Free => *word &= !bit,
            }
        }
        Ok(())
    }

    /// Count free blocks via per-word popcount.
    pub fn count_free(&self) -> u64 {
        // Bits past total_blocks are never set, so counting ones over
        // whole words is exact.
        let allocated: u64 = self.words.iter().map(|w| u64::from(w.count_ones())).sum();
        self.total_blocks - allocated
    }

    pub fn count_allocated(&self) -> u64 {
        self.total_blocks - self.count_free()
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.total_blocks {
            return Err(FreemapError::OutOfRange {
                index,
                total: self.total_blocks,
            });
        }
        Ok(())
    }

    fn check_range(&self, start: u64, length: u64) -> Result<()> {
        self.check_index(start)?;
        if length == 0 {
            return Err(FreemapError::InvalidLength { length });
        }
        match start.checked_add(length) {
            Some(end) if end <= self.total_blocks => Ok(()),
            _ => Err(FreemapError::InvalidLength { length }),
        }
    }
}
