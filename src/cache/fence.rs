//! Fast (graphics-resident) memory capability and GPU fences
//!
//! A cache backed by fast memory tags every allocation with a fence. Before
//! the rover may reuse that region, the fence must be signalled: it is tested
//! first and, if still pending, finished with a blocking wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::{Error, Result};

/// Opaque GPU fence handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FenceId(pub u32);

/// Counters exposed by fast-memory implementations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FenceStats {
    /// Fences created and not yet deleted
    pub live: u32,
    /// Fences that were still pending when reclaimed and needed a blocking finish
    pub blocking_waits: u32,
    /// Fences deleted after reclaim
    pub deleted: u32,
}

/// Capability for backing a cache arena with graphics memory.
pub trait FastMemoryBudget: Send {
    /// Reserve `bytes` of fast memory for the arena. `false` means unavailable.
    fn try_allocate(&mut self, bytes: usize) -> bool;

    /// Issue a fence after the commands that read the most recent allocation
    fn insert_fence(&mut self) -> FenceId;

    /// Non-blocking check: has the GPU passed `fence`?
    fn test_fence(&mut self, fence: FenceId) -> bool;

    /// Block until the GPU passes `fence`
    fn finish_fence(&mut self, fence: FenceId) -> Result<()>;

    fn delete_fence(&mut self, fence: FenceId);

    fn stats(&self) -> FenceStats {
        FenceStats::default()
    }

    /// Poll, then block if needed, then delete. On failure the fence is kept
    /// so the region is not reused while the GPU may still read it.
    fn wait_and_reclaim(&mut self, fence: FenceId) -> Result<()> {
        if !self.test_fence(fence) {
            self.finish_fence(fence)?;
        }
        self.delete_fence(fence);
        Ok(())
    }
}

/// Plain system memory: fast allocation is never available.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFastMemory;

impl FastMemoryBudget for NoFastMemory {
    fn try_allocate(&mut self, _bytes: usize) -> bool {
        false
    }

    fn insert_fence(&mut self) -> FenceId {
        FenceId(0)
    }

    fn test_fence(&mut self, _fence: FenceId) -> bool {
        true
    }

    fn finish_fence(&mut self, _fence: FenceId) -> Result<()> {
        Ok(())
    }

    fn delete_fence(&mut self, _fence: FenceId) {}
}

#[derive(Debug, Default)]
struct GpuState {
    budget_bytes: usize,
    reserved_bytes: usize,
    next_fence: u32,
    /// fence -> signalled
    fences: HashMap<u32, bool>,
    stuck: Vec<u32>,
    stats: FenceStats,
}

/// Handle for driving a [`SimulatedFastMemory`] from outside the cache:
/// advance the simulated GPU, make fences hang, inspect counters.
#[derive(Clone, Debug)]
pub struct SimulatedGpu {
    state: Arc<Mutex<GpuState>>,
}

impl SimulatedGpu {
    /// Signal every outstanding fence (the GPU caught up)
    pub fn signal_all(&self) {
        if let Ok(mut state) = self.state.lock() {
            for signalled in state.fences.values_mut() {
                *signalled = true;
            }
        }
    }

    /// Make `fence` never signal; finishing it reports a timeout
    pub fn hang(&self, fence: FenceId) {
        if let Ok(mut state) = self.state.lock() {
            state.stuck.push(fence.0);
        }
    }

    /// Every fence currently alive, oldest first
    pub fn live_fences(&self) -> Vec<FenceId> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        let mut ids: Vec<u32> = state.fences.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(FenceId).collect()
    }

    pub fn stats(&self) -> FenceStats {
        self.state.lock().map(|s| s.stats).unwrap_or_default()
    }
}

/// CPU stand-in for graphics memory with fences that stay pending until
/// finished or signalled through [`SimulatedGpu`].
#[derive(Debug)]
pub struct SimulatedFastMemory {
    state: Arc<Mutex<GpuState>>,
}

impl SimulatedFastMemory {
    /// Fast memory with `budget_bytes` available
    pub fn new(budget_bytes: usize) -> (Self, SimulatedGpu) {
        let state = Arc::new(Mutex::new(GpuState {
            budget_bytes,
            next_fence: 1,
            ..Default::default()
        }));
        (Self { state: state.clone() }, SimulatedGpu { state })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, GpuState>> {
        self.state
            .lock()
            .map_err(|_| Error::Fence("simulated GPU state poisoned".to_string()))
    }
}

impl FastMemoryBudget for SimulatedFastMemory {
    fn try_allocate(&mut self, bytes: usize) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        if state.reserved_bytes + bytes > state.budget_bytes {
            return false;
        }
        state.reserved_bytes += bytes;
        true
    }

    fn insert_fence(&mut self) -> FenceId {
        let Ok(mut state) = self.lock() else {
            return FenceId(0);
        };
        let id = state.next_fence;
        state.next_fence = state.next_fence.wrapping_add(1).max(1);
        state.fences.insert(id, false);
        state.stats.live += 1;
        FenceId(id)
    }

    fn test_fence(&mut self, fence: FenceId) -> bool {
        self.lock()
            .map(|state| state.fences.get(&fence.0).copied().unwrap_or(true))
            .unwrap_or(false)
    }

    fn finish_fence(&mut self, fence: FenceId) -> Result<()> {
        let mut state = self.lock()?;
        if state.stuck.contains(&fence.0) {
            return Err(Error::Fence(format!("timed out waiting for fence {}", fence.0)));
        }
        state.stats.blocking_waits += 1;
        if let Some(signalled) = state.fences.get_mut(&fence.0) {
            *signalled = true;
        }
        Ok(())
    }

    fn delete_fence(&mut self, fence: FenceId) {
        if let Ok(mut state) = self.lock() {
            if state.fences.remove(&fence.0).is_some() {
                state.stats.live -= 1;
                state.stats.deleted += 1;
            }
        }
    }

    fn stats(&self) -> FenceStats {
        self.lock().map(|s| s.stats).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fast_memory_never_allocates() {
        let mut fast = NoFastMemory;
        assert!(!fast.try_allocate(4096));
        assert!(fast.wait_and_reclaim(FenceId(3)).is_ok());
    }

    #[test]
    fn test_simulated_budget() {
        let (mut fast, _gpu) = SimulatedFastMemory::new(8192);
        assert!(fast.try_allocate(4096));
        assert!(fast.try_allocate(4096));
        assert!(!fast.try_allocate(1));
    }

    #[test]
    fn test_pending_fence_blocks_then_deletes() {
        let (mut fast, gpu) = SimulatedFastMemory::new(0);
        let fence = fast.insert_fence();
        assert!(!fast.test_fence(fence));

        fast.wait_and_reclaim(fence).expect("finish should succeed");
        let stats = gpu.stats();
        assert_eq!(stats.blocking_waits, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn test_signalled_fence_needs_no_wait() {
        let (mut fast, gpu) = SimulatedFastMemory::new(0);
        let fence = fast.insert_fence();
        gpu.signal_all();
        fast.wait_and_reclaim(fence).expect("reclaim");
        assert_eq!(gpu.stats().blocking_waits, 0);
    }

    #[test]
    fn test_hung_fence_reports_and_survives() {
        let (mut fast, gpu) = SimulatedFastMemory::new(0);
        let fence = fast.insert_fence();
        gpu.hang(fence);
        assert!(matches!(fast.wait_and_reclaim(fence), Err(Error::Fence(_))));
        assert_eq!(gpu.live_fences(), vec![fence]);
    }
}
