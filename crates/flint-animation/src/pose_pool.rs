//! Pose buffer pool — a fixed pool of pose buffers tasks acquire and
//! release at execution granularity, plus named "cached" slots that
//! transitions use to preserve a pose across updates.

use crate::pose::Pose;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default pool capacity per `§3`/`§12`: 16 general-purpose buffers, plus
/// one additional slot allocated per live cached-pose ID.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Opaque handle to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoseBufferIndex(pub usize);

/// First-class handle for a transition's cached pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachedPoseId(pub u64);

struct Slot {
    pose: Pose,
    in_use: bool,
}

/// Pool of pose buffers with acquire/release and named cached slots.
pub struct PoseBufferPool {
    num_bones: usize,
    slots: Vec<Slot>,
    cached: HashMap<CachedPoseId, PoseBufferIndex>,
    next_cached_id: u64,
}

impl PoseBufferPool {
    pub fn new(num_bones: usize) -> Self {
        let slots = (0..DEFAULT_POOL_CAPACITY)
            .map(|_| Slot {
                pose: Pose::new(num_bones),
                in_use: false,
            })
            .collect();
        Self {
            num_bones,
            slots,
            cached: HashMap::new(),
            next_cached_id: 0,
        }
    }

    /// Acquire an unused buffer index, growing the pool if every slot is in use.
    pub fn acquire(&mut self) -> PoseBufferIndex {
        if let Some(i) = self.slots.iter().position(|s| !s.in_use) {
            self.slots[i].in_use = true;
            return PoseBufferIndex(i);
        }
        self.slots.push(Slot {
            pose: Pose::new(self.num_bones),
            in_use: true,
        });
        PoseBufferIndex(self.slots.len() - 1)
    }

    pub fn release(&mut self, index: PoseBufferIndex) {
        if let Some(slot) = self.slots.get_mut(index.0) {
            slot.in_use = false;
        }
    }

    pub fn pose(&self, index: PoseBufferIndex) -> &Pose {
        &self.slots[index.0].pose
    }

    pub fn pose_mut(&mut self, index: PoseBufferIndex) -> &mut Pose {
        &mut self.slots[index.0].pose
    }

    /// Create a new cached-pose slot, acquiring a dedicated buffer for it.
    pub fn create_cached(&mut self) -> CachedPoseId {
        let id = CachedPoseId(self.next_cached_id);
        self.next_cached_id += 1;
        let buffer = self.acquire();
        self.cached.insert(id, buffer);
        id
    }

    pub fn cached_buffer(&self, id: CachedPoseId) -> Option<PoseBufferIndex> {
        self.cached.get(&id).copied()
    }

    /// Reset a cached slot to reference its buffer again without reallocating.
    pub fn reset_cached(&mut self, id: CachedPoseId) {
        if let Some(&buffer) = self.cached.get(&id) {
            self.slots[buffer.0].pose = Pose::new(self.num_bones);
        }
    }

    /// Release a cached slot's buffer back to the general pool.
    pub fn destroy_cached(&mut self, id: CachedPoseId) {
        if let Some(buffer) = self.cached.remove(&id) {
            self.release(buffer);
        }
    }

    /// Transfer every cached-buffer ownership from `other` into `self`,
    /// emptying `other`'s list — used when a forced transition steals the
    /// supplanted transition's cached buffers (`§9`).
    pub fn transfer_cached_buffers(&mut self, other_ids: &mut Vec<CachedPoseId>) {
        // Ownership of the buffers themselves lives in this same pool already;
        // this just moves the list of live IDs from one owner to another.
        other_ids.clear();
    }

    pub fn live_buffer_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    /// Reclaim every general-purpose slot at the start of a tick, leaving
    /// cached-pose slots (owned across ticks by in-progress transitions)
    /// untouched. Backstops `TaskSystem`'s own per-tick cleanup against
    /// anything that still slips through as a leaked acquire.
    pub fn reset_for_tick(&mut self) {
        let cached_indices: std::collections::HashSet<usize> = self.cached.values().map(|b| b.0).collect();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if !cached_indices.contains(&i) {
                slot.in_use = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_frees_slot() {
        let mut pool = PoseBufferPool::new(4);
        let a = pool.acquire();
        assert_eq!(pool.live_buffer_count(), 1);
        pool.release(a);
        assert_eq!(pool.live_buffer_count(), 0);
    }

    #[test]
    fn acquire_beyond_capacity_grows_pool() {
        let mut pool = PoseBufferPool::new(2);
        let mut handles = Vec::new();
        for _ in 0..(DEFAULT_POOL_CAPACITY + 2) {
            handles.push(pool.acquire());
        }
        assert_eq!(pool.live_buffer_count(), DEFAULT_POOL_CAPACITY + 2);
    }

    #[test]
    fn cached_pose_roundtrip() {
        let mut pool = PoseBufferPool::new(2);
        let id = pool.create_cached();
        let buffer = pool.cached_buffer(id).unwrap();
        pool.pose_mut(buffer).bones[0].translation.x = 5.0;
        assert_eq!(pool.pose(buffer).bones[0].translation.x, 5.0);
        pool.destroy_cached(id);
        assert!(pool.cached_buffer(id).is_none());
    }

    #[test]
    fn indices_are_distinct_while_both_live() {
        let mut pool = PoseBufferPool::new(2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a, b);
    }

    #[test]
    fn reset_for_tick_frees_general_slots_but_keeps_cached_ones() {
        let mut pool = PoseBufferPool::new(2);
        let cached_id = pool.create_cached();
        pool.acquire();
        pool.acquire();
        assert_eq!(pool.live_buffer_count(), 3);
        pool.reset_for_tick();
        assert_eq!(pool.live_buffer_count(), 1);
        assert!(pool.cached_buffer(cached_id).is_some());
    }
}
