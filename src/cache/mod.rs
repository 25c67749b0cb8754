//! Circular patch-buffer caches
//!
//! Vertex and index arrays for terrain patches live in fixed-size circular
//! arenas. Allocations are never freed explicitly: the rover overwrites them
//! when it wraps around, and owners detect that through their [`SlotId`].

pub mod arena;
pub mod fence;

pub use arena::{Allocation, CacheStats, CircularCache, SlotId, ALLOC_HEADER_SIZE, PAGE_SIZE};
pub use fence::{FastMemoryBudget, FenceId, FenceStats, NoFastMemory, SimulatedFastMemory, SimulatedGpu};
