//! Bone masks — per-bone float weights in `[0,1]` used to attenuate layer
//! blends — and a scratch pool for the masks a tick's layer blends need.

/// Resource identifier for a named `BoneMask`, resolved through `GraphResources`.
pub type BoneMaskId = String;

/// Per-bone weight vector over a skeleton.
#[derive(Debug, Clone)]
pub struct BoneMask {
    weights: Vec<f32>,
}

impl BoneMask {
    pub fn new(num_bones: usize) -> Self {
        Self {
            weights: vec![0.0; num_bones],
        }
    }

    pub fn filled(num_bones: usize, weight: f32) -> Self {
        Self {
            weights: vec![weight.clamp(0.0, 1.0); num_bones],
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weight(&self, bone_index: usize) -> f32 {
        self.weights.get(bone_index).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, bone_index: usize, weight: f32) {
        if let Some(w) = self.weights.get_mut(bone_index) {
            *w = weight.clamp(0.0, 1.0);
        }
    }

    pub fn reset_to(&mut self, weight: f32) {
        for w in &mut self.weights {
            *w = weight.clamp(0.0, 1.0);
        }
    }

    /// Move every weight toward `target`'s corresponding weight by `t`.
    pub fn blend_to(&mut self, target: &BoneMask, t: f32) {
        let t = t.clamp(0.0, 1.0);
        for (i, w) in self.weights.iter_mut().enumerate() {
            let target_w = target.weight(i);
            *w += (target_w - *w) * t;
        }
    }

    /// Move every weight from `source`'s weight toward its current value by `t`.
    pub fn blend_from(&mut self, source: &BoneMask, t: f32) {
        let t = t.clamp(0.0, 1.0);
        for (i, w) in self.weights.iter_mut().enumerate() {
            let source_w = source.weight(i);
            *w = source_w + (*w - source_w) * t;
        }
    }
}

/// Pool of scratch bone masks, valid only within the update that allocated
/// them per `§5`'s shared-resource policy.
pub struct BoneMaskPool {
    num_bones: usize,
    free: Vec<BoneMask>,
    in_use: usize,
}

impl BoneMaskPool {
    pub fn new(num_bones: usize) -> Self {
        Self {
            num_bones,
            free: Vec::new(),
            in_use: 0,
        }
    }

    pub fn acquire(&mut self) -> BoneMask {
        self.in_use += 1;
        self.free.pop().unwrap_or_else(|| BoneMask::new(self.num_bones))
    }

    pub fn release(&mut self, mut mask: BoneMask) {
        mask.reset_to(0.0);
        self.free.push(mask);
        self.in_use = self.in_use.saturating_sub(1);
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_query_weight() {
        let mut mask = BoneMask::new(3);
        mask.set(1, 0.5);
        assert_eq!(mask.weight(0), 0.0);
        assert!((mask.weight(1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blend_to_moves_toward_target() {
        let mut mask = BoneMask::filled(2, 0.0);
        let target = BoneMask::filled(2, 1.0);
        mask.blend_to(&target, 0.5);
        assert!((mask.weight(0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn pool_acquire_release_reuses_mask() {
        let mut pool = BoneMaskPool::new(4);
        let mut m = pool.acquire();
        m.set(0, 1.0);
        assert_eq!(pool.in_use_count(), 1);
        pool.release(m);
        assert_eq!(pool.in_use_count(), 0);
        let m2 = pool.acquire();
        assert_eq!(m2.weight(0), 0.0);
    }
}
