//! Root-motion data — the per-frame root transforms recorded alongside a
//! clip, with delta queries that respect a single loop wraparound.

use crate::pose::Transform;
use serde::{Deserialize, Serialize};

/// Per-frame root transforms for one clip, plus the combination modes used
/// when blending two root-motion deltas together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootMotionData {
    pub transforms: Vec<Transform>,
}

/// How two root-motion deltas combine during a blend, per `§4.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootMotionBlendMode {
    Blend,
    Additive,
    IgnoreSource,
    IgnoreTarget,
}

impl RootMotionData {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    pub fn num_frames(&self) -> usize {
        self.transforms.len()
    }

    fn transform_at_frame(&self, frame: usize) -> Transform {
        self.transforms
            .get(frame.min(self.transforms.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Transform::IDENTITY)
    }

    /// Interpolated root transform at a fractional frame position.
    pub fn transform_at(&self, frame_index: u32, percentage_to_next: f32) -> Transform {
        if self.transforms.is_empty() {
            return Transform::IDENTITY;
        }
        let a = self.transform_at_frame(frame_index as usize);
        let b = self.transform_at_frame(frame_index as usize + 1);
        Transform {
            translation: a.translation.lerp(&b.translation, percentage_to_next),
            rotation: a.rotation.slerp(&b.rotation, percentage_to_next),
            scale: a.scale.lerp(&b.scale, percentage_to_next),
        }
    }

    /// The delta transform between two (frame, fractional) positions,
    /// handling at most one loop wraparound: if `to < from` this composes
    /// `delta(from, end) . delta(start, to)`.
    pub fn delta(
        &self,
        from: (u32, f32),
        to: (u32, f32),
        total_start: (u32, f32),
        total_end: (u32, f32),
    ) -> Transform {
        let from_t = self.transform_at(from.0, from.1);
        let to_t = self.transform_at(to.0, to.1);

        let looped = to.0 < from.0 || (to.0 == from.0 && to.1 < from.1);
        if !looped {
            return from_t.delta_to(&to_t);
        }
        let end_t = self.transform_at(total_end.0, total_end.1);
        let start_t = self.transform_at(total_start.0, total_start.1);
        let first_leg = from_t.delta_to(&end_t);
        let second_leg = start_t.delta_to(&to_t);
        first_leg.mul(&second_leg)
    }
}

/// Blend two root-motion deltas at `weight`, honoring `mode`. Tie-breaks
/// mirror the pose blender: `weight <= 0` returns source, `weight >= 1`
/// returns target.
pub fn blend_root_motion_deltas(
    source: Transform,
    target: Transform,
    weight: f32,
    mode: RootMotionBlendMode,
) -> Transform {
    match mode {
        RootMotionBlendMode::IgnoreSource => return target,
        RootMotionBlendMode::IgnoreTarget => return source,
        _ => {}
    }
    if weight <= 0.0 {
        return source;
    }
    if weight >= 1.0 {
        return target;
    }
    match mode {
        RootMotionBlendMode::Additive => {
            let scaled_translation = source.translation + target.translation * weight;
            let scaled_rotation = Transform::IDENTITY
                .rotation
                .slerp(&target.rotation, weight)
                .mul(&source.rotation)
                .normalized();
            Transform {
                translation: scaled_translation,
                rotation: scaled_rotation,
                scale: source.scale.lerp(&target.scale, weight),
            }
        }
        _ => Transform {
            translation: source.translation.lerp(&target.translation, weight),
            rotation: source.rotation.slerp(&target.rotation, weight),
            scale: source.scale.lerp(&target.scale, weight),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::Vec3;

    fn moving_root(n: usize) -> RootMotionData {
        let transforms = (0..n)
            .map(|i| Transform::new(Vec3::new(i as f32, 0.0, 0.0), Default::default(), Vec3::ONE))
            .collect();
        RootMotionData::new(transforms)
    }

    #[test]
    fn delta_total_composition_identity() {
        let root = moving_root(5);
        let total = root.delta((0, 0.0), (4, 0.0), (0, 0.0), (4, 0.0));
        let first = root.delta((0, 0.0), (2, 0.0), (0, 0.0), (4, 0.0));
        let second = root.delta((2, 0.0), (4, 0.0), (0, 0.0), (4, 0.0));
        let composed = first.mul(&second);
        assert!((composed.translation - total.translation).length() < 1e-4);
    }

    #[test]
    fn weight_zero_and_one_short_circuit() {
        let a = Transform::new(Vec3::new(1.0, 0.0, 0.0), Default::default(), Vec3::ONE);
        let b = Transform::new(Vec3::new(5.0, 0.0, 0.0), Default::default(), Vec3::ONE);
        assert_eq!(blend_root_motion_deltas(a, b, 0.0, RootMotionBlendMode::Blend), a);
        assert_eq!(blend_root_motion_deltas(a, b, 1.0, RootMotionBlendMode::Blend), b);
    }

    #[test]
    fn loop_wraparound_composes_two_legs() {
        let root = moving_root(5);
        let wrapped = root.delta((3, 0.0), (1, 0.0), (0, 0.0), (4, 0.0));
        let unwrapped = root.delta((3, 0.0), (4, 0.0), (0, 0.0), (4, 0.0))
            .mul(&root.delta((0, 0.0), (1, 0.0), (0, 0.0), (4, 0.0)));
        assert!((wrapped.translation - unwrapped.translation).length() < 1e-4);
    }
}
