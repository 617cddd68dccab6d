//! # Freemap - Hybrid Disk Free-Space Manager
//!
//! `freemap-rs` models free-space management over a fixed-size array of
//! disk blocks with a hybrid allocator:
//!
//! - **Block bitmap** for O(1) per-block status queries
//! - **Extent list** (arena-backed doubly-linked list) tracking maximal
//!   free/allocated runs with merge and split semantics
//! - **Fragmentation analyzer** reporting free-space scattering
//!
//! All mutation goes through [`AllocationEngine`], which keeps the two
//! representations consistent: a failed call never leaves partial state.
//!
//! ## Quick Start
//!
//! ```rust
//! use freemap_rs::{AllocationEngine, BlockState, Result};
//!
//! # fn main() -> Result<()> {
//! let mut disk = AllocationEngine::new(100)?;
//!
//! // Allocate 5 blocks starting at block 10
//! disk.allocate(10, 5)?;
//! assert_eq!(disk.query_block(12)?, BlockState::Allocated);
//!
//! // Inspect fragmentation
//! let stats = disk.statistics();
//! assert_eq!(stats.free_blocks, 95);
//! assert_eq!(stats.free_extent_count, 2);
//!
//! // Deallocating merges back into one free run
//! disk.deallocate(10, 5)?;
//! assert_eq!(disk.statistics().free_extent_count, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Renderer-facing API
//!
//! ```rust
//! use freemap_rs::{AllocationEngine, Result};
//!
//! # fn main() -> Result<()> {
//! let mut disk = AllocationEngine::new(10)?;
//! disk.allocate(2, 3)?;
//!
//! // Ordered extents for drawing blocks and linked-list arrows
//! for extent in disk.list_extents() {
//!     println!("{}..{} {:?}", extent.start, extent.end(), extent.state);
//! }
//! assert_eq!(disk.free_list_display(), "[0:2] -> [5:10]");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod shared;

pub use crate::core::engine::{AllocationEngine, DiskSnapshot, EngineBuilder, DEFAULT_TOTAL_BLOCKS};
pub use crate::core::stats::FragmentationStats;
pub use crate::core::{BlockState, Extent};
pub use crate::error::{FreemapError, Result};
pub use crate::shared::SharedEngine;
