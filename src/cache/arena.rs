//! Circular arena allocator with owner slots
//!
//! The arena is a single run of 32-bit words tiled by blocks. Every block
//! starts with a 16-byte header:
//!
//! | word | meaning                                    |
//! |------|--------------------------------------------|
//! | 0    | block size in words, header included       |
//! | 1    | owner slot index, `u32::MAX` when free     |
//! | 2    | generation stamped at allocation           |
//! | 3    | fence id, `u32::MAX` when none             |
//!
//! A rover walks forward handing out blocks. When the space left before the
//! end is too small the rover wraps to the start. Blocks in the way are
//! coalesced into the new allocation and their owners are evicted, so each
//! allocation has at most one owner and an owner learns about eviction by
//! finding its slot empty.

use bytemuck::Pod;

use crate::core::{Error, Result};
use super::fence::{FastMemoryBudget, FenceId};

/// Arena sizes are rounded up to whole pages
pub const PAGE_SIZE: usize = 4096;
/// Bytes of bookkeeping in front of every allocation
pub const ALLOC_HEADER_SIZE: usize = 16;
/// Leftover space above this many bytes is split off as a free block
const SPLIT_THRESHOLD: usize = 63;

const HEADER_WORDS: usize = ALLOC_HEADER_SIZE / 4;
const NONE: u32 = u32::MAX;

const H_SIZE: usize = 0;
const H_OWNER: usize = 1;
const H_GENERATION: usize = 2;
const H_FENCE: usize = 3;

/// Owner slot handle. A patch (or any other consumer) keeps one per buffer it
/// caches; the cache keeps the slot's current allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

/// A live block handed out by [`CircularCache::alloc`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Word offset of the block header
    offset: u32,
    /// Requested payload size in bytes
    len: u32,
    generation: u32,
}

impl Allocation {
    /// Requested payload size in bytes
    pub fn len_bytes(&self) -> usize {
        self.len as usize
    }

    /// Byte offset of the payload inside the arena
    pub fn payload_offset(&self) -> usize {
        (self.offset as usize + HEADER_WORDS) * 4
    }

    fn payload_words(&self) -> usize {
        (self.len as usize).div_ceil(4)
    }
}

/// Cumulative allocator counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub allocations: u64,
    pub evictions: u64,
    pub wraps: u64,
    pub thrashed_frames: u64,
    pub fence_waits: u64,
}

/// Fixed-size circular cache for patch vertex and index arrays
pub struct CircularCache {
    label: String,
    words: Vec<u32>,
    /// Word offset of the next block to hand out; always on a block boundary
    rover: usize,
    frame_start: usize,
    wrapped: bool,
    thrashed: bool,
    generation: u32,
    slots: Vec<Option<Allocation>>,
    fast: Option<Box<dyn FastMemoryBudget>>,
    stats: CacheStats,
}

impl CircularCache {
    /// Create a cache of at least `size_bytes` (rounded up to whole pages).
    ///
    /// With `fast` supplied the arena is also reserved in fast memory; if that
    /// reservation fails the cache silently falls back to plain memory.
    pub fn new(
        label: impl Into<String>,
        size_bytes: usize,
        fast: Option<Box<dyn FastMemoryBudget>>,
    ) -> Result<Self> {
        let label = label.into();
        if size_bytes == 0 {
            return Err(Error::Allocation(format!("{}: zero-sized cache", label)));
        }
        let size_bytes = size_bytes.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let word_count = size_bytes / 4;

        let mut words = Vec::new();
        words.try_reserve_exact(word_count).map_err(|e| {
            Error::Allocation(format!("{}: cannot reserve {} bytes: {}", label, size_bytes, e))
        })?;
        words.resize(word_count, 0);

        let fast = match fast {
            Some(mut budget) => {
                if budget.try_allocate(size_bytes) {
                    Some(budget)
                } else {
                    log::warn!("{}: fast memory unavailable, using system memory", label);
                    None
                }
            }
            None => None,
        };

        log::info!(
            "Created cache '{}': {}KB{}",
            label,
            size_bytes / 1024,
            if fast.is_some() { " (fast)" } else { "" }
        );

        let mut cache = Self {
            label,
            words,
            rover: 0,
            frame_start: 0,
            wrapped: false,
            thrashed: false,
            generation: 0,
            slots: Vec::new(),
            fast,
            stats: CacheStats::default(),
        };
        cache.reset_blocks();
        Ok(cache)
    }

    /// Register a new owner slot
    pub fn register_slot(&mut self) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(None);
        id
    }

    /// Total arena size in bytes
    pub fn capacity_bytes(&self) -> usize {
        self.words.len() * 4
    }

    pub fn is_fast(&self) -> bool {
        self.fast.is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Did the rover wrap since the last [`init_frame`](Self::init_frame)?
    pub fn wrapped(&self) -> bool {
        self.wrapped
    }

    /// Did the cache cycle through its whole arena within this frame?
    pub fn thrashed(&self) -> bool {
        self.thrashed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Largest request that fits between the rover and the arena end without wrapping
    pub fn bytes_before_end(&self) -> usize {
        ((self.words.len() - self.rover) * 4).saturating_sub(ALLOC_HEADER_SIZE)
    }

    /// Start-of-frame bookkeeping for thrash detection
    pub fn init_frame(&mut self) {
        self.wrapped = false;
        self.thrashed = false;
        self.frame_start = self.rover;
    }

    /// Allocate `size` bytes for `slot`, evicting whatever the rover runs over.
    ///
    /// Fails with [`Error::CacheOverRequest`] if the request can never fit, or
    /// with [`Error::Fence`] if a region could not be reclaimed from the GPU.
    pub fn alloc(&mut self, size: usize, slot: SlotId) -> Result<Allocation> {
        let total = (size + ALLOC_HEADER_SIZE).next_multiple_of(4);
        if total > self.capacity_bytes() || size > u32::MAX as usize {
            log::warn!(
                "{}: request of {} bytes exceeds cache size {}",
                self.label,
                size,
                self.capacity_bytes()
            );
            return Err(Error::CacheOverRequest {
                requested: size,
                capacity: self.capacity_bytes(),
            });
        }
        let need = total / 4;

        if self.rover + need > self.words.len() {
            if self.wrapped {
                self.mark_thrashed();
            }
            self.wrapped = true;
            self.stats.wraps += 1;
            self.rover = 0;
        }

        let start = self.rover;
        let mut size_words = self.reclaim_block(start)?;
        while size_words < need {
            match self.reclaim_block(start + size_words) {
                Ok(next) => size_words += next,
                Err(e) => {
                    self.write_header(start, size_words, NONE, 0, NONE);
                    return Err(e);
                }
            }
        }

        if (size_words - need) * 4 > SPLIT_THRESHOLD {
            self.write_header(start + need, size_words - need, NONE, 0, NONE);
            size_words = need;
        }

        self.generation = self.generation.wrapping_add(1);
        let fence = match self.fast.as_mut() {
            Some(fast) => fast.insert_fence().0,
            None => NONE,
        };
        self.write_header(start, size_words, slot.0, self.generation, fence);

        let allocation = Allocation {
            offset: start as u32,
            len: size as u32,
            generation: self.generation,
        };
        if let Some(entry) = self.slots.get_mut(slot.0 as usize) {
            *entry = Some(allocation);
        }

        self.rover = start + size_words;
        if self.wrapped && self.rover > self.frame_start {
            self.mark_thrashed();
        }
        self.stats.allocations += 1;

        Ok(allocation)
    }

    /// Current allocation of `slot`, if it has not been overwritten.
    ///
    /// Valid only while the slot still holds the allocation and the block
    /// header still names this slot with the same generation.
    pub fn get(&self, slot: SlotId) -> Option<Allocation> {
        let allocation = (*self.slots.get(slot.0 as usize)?)?;
        let offset = allocation.offset as usize;
        let owner = self.words[offset + H_OWNER];
        let generation = self.words[offset + H_GENERATION];
        (owner == slot.0 && generation == allocation.generation).then_some(allocation)
    }

    /// Re-arm the fence of a live allocation after the GPU was handed its data
    pub fn refence(&mut self, allocation: &Allocation) {
        let Some(fast) = self.fast.as_mut() else {
            return;
        };
        let offset = allocation.offset as usize;
        if self.words[offset + H_GENERATION] != allocation.generation {
            return;
        }
        let old = self.words[offset + H_FENCE];
        if old != NONE {
            fast.delete_fence(FenceId(old));
        }
        self.words[offset + H_FENCE] = fast.insert_fence().0;
    }

    /// Payload of an allocation viewed as `T`
    pub fn slice<T: Pod>(&self, allocation: &Allocation) -> Option<&[T]> {
        let start = allocation.offset as usize + HEADER_WORDS;
        let words = self.words.get(start..start + allocation.payload_words())?;
        bytemuck::try_cast_slice(words).ok()
    }

    /// Mutable payload of an allocation viewed as `T`
    pub fn slice_mut<T: Pod>(&mut self, allocation: &Allocation) -> Option<&mut [T]> {
        let start = allocation.offset as usize + HEADER_WORDS;
        let words = self.words.get_mut(start..start + allocation.payload_words())?;
        bytemuck::try_cast_slice_mut(words).ok()
    }

    /// Evict every allocation, reclaim every fence, and reset to one free block.
    /// Reports the first fence failure after finishing the reset.
    pub fn flush(&mut self) -> Result<()> {
        let mut first_error = None;
        let mut offset = 0;
        while offset < self.words.len() {
            let size = self.words[offset + H_SIZE] as usize;
            let fence = self.words[offset + H_FENCE];
            if fence != NONE {
                if let Some(fast) = self.fast.as_mut() {
                    if let Err(e) = fast.wait_and_reclaim(FenceId(fence)) {
                        log::error!("{}: flush could not reclaim fence: {}", self.label, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            self.evict_owner(offset);
            offset += size.max(HEADER_WORDS);
        }

        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.reset_blocks();
        self.rover = 0;
        self.frame_start = 0;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Walk the block list: `(byte offset, byte size, in use)` per block
    pub fn blocks(&self) -> Vec<(usize, usize, bool)> {
        let mut blocks = Vec::new();
        let mut offset = 0;
        while offset < self.words.len() {
            let size = (self.words[offset + H_SIZE] as usize).max(HEADER_WORDS);
            blocks.push((offset * 4, size * 4, self.words[offset + H_OWNER] != NONE));
            offset += size;
        }
        blocks
    }

    fn reset_blocks(&mut self) {
        let len = self.words.len();
        self.write_header(0, len, NONE, 0, NONE);
    }

    fn write_header(&mut self, offset: usize, size: usize, owner: u32, generation: u32, fence: u32) {
        self.words[offset + H_SIZE] = size as u32;
        self.words[offset + H_OWNER] = owner;
        self.words[offset + H_GENERATION] = generation;
        self.words[offset + H_FENCE] = fence;
    }

    /// Make the block at `offset` reusable and return its size in words
    fn reclaim_block(&mut self, offset: usize) -> Result<usize> {
        let size = self.words[offset + H_SIZE] as usize;
        let fence = self.words[offset + H_FENCE];
        if fence != NONE {
            if let Some(fast) = self.fast.as_mut() {
                fast.wait_and_reclaim(FenceId(fence))?;
                self.stats.fence_waits += 1;
            }
            self.words[offset + H_FENCE] = NONE;
        }
        self.evict_owner(offset);
        Ok(size)
    }

    fn evict_owner(&mut self, offset: usize) {
        let owner = self.words[offset + H_OWNER];
        if owner == NONE {
            return;
        }
        let generation = self.words[offset + H_GENERATION];
        if let Some(slot) = self.slots.get_mut(owner as usize) {
            if matches!(slot, Some(a) if a.offset as usize == offset && a.generation == generation) {
                *slot = None;
                self.stats.evictions += 1;
            }
        }
        self.words[offset + H_OWNER] = NONE;
    }

    fn mark_thrashed(&mut self) {
        if !self.thrashed {
            self.thrashed = true;
            self.stats.thrashed_frames += 1;
            log::warn!("{}: cache thrashing, working set exceeds {}KB", self.label, self.capacity_bytes() / 1024);
        }
    }
}

impl std::fmt::Debug for CircularCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularCache")
            .field("label", &self.label)
            .field("capacity", &self.capacity_bytes())
            .field("rover", &(self.rover * 4))
            .field("fast", &self.fast.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}
