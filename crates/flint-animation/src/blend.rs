//! Pose blender — the four blend operations of `§4.3`: local blend,
//! additive blend, global blend, and root-motion delta blend (the latter
//! lives in `root_motion.rs` since it operates on a single transform, not
//! a whole pose).

use crate::bone_mask::BoneMask;
use crate::pose::{Pose, Transform};
use flint_core::Quat;

/// Per-bone spherical rotation blend, linear translation/scale blend,
/// optionally attenuated by a bone mask. `weight <= 0` returns `source`
/// unchanged; `weight >= 1` returns `target` unchanged (both short-circuit
/// to avoid quaternion-negation artifacts per `§4.3`).
pub fn local_blend(source: &Pose, target: &Pose, weight: f32, mask: Option<&BoneMask>, out: &mut Pose) {
    if weight <= 0.0 {
        out.bones.copy_from_slice(&source.bones);
        out.state = source.state;
        return;
    }
    if weight >= 1.0 {
        out.bones.copy_from_slice(&target.bones);
        out.state = target.state;
        return;
    }
    let count = source.bones.len().min(target.bones.len()).min(out.bones.len());
    for i in 0..count {
        let w = mask.map(|m| weight * m.weight(i)).unwrap_or(weight);
        out.bones[i] = blend_transform(&source.bones[i], &target.bones[i], w);
    }
    out.state = crate::pose::PoseState::Pose;
}

fn blend_transform(a: &Transform, b: &Transform, w: f32) -> Transform {
    Transform {
        translation: a.translation.lerp(&b.translation, w),
        rotation: a.rotation.slerp(&b.rotation, w),
        scale: a.scale.lerp(&b.scale, w),
    }
}

/// `rotation = slerp(identity, additiveRot, w) ∘ baseRot`; translation/scale
/// are linear multiply-add, per `§4.3`.
pub fn additive_blend(base: &Pose, additive: &Pose, weight: f32, mask: Option<&BoneMask>, out: &mut Pose) {
    if weight <= 0.0 {
        out.bones.copy_from_slice(&base.bones);
        out.state = base.state;
        return;
    }
    let count = base.bones.len().min(additive.bones.len()).min(out.bones.len());
    for i in 0..count {
        let w = mask.map(|m| weight * m.weight(i)).unwrap_or(weight).clamp(0.0, 1.0);
        let b = &base.bones[i];
        let a = &additive.bones[i];
        let weighted_rot = Quat::IDENTITY.slerp(&a.rotation, w);
        out.bones[i] = Transform {
            translation: b.translation + a.translation * w,
            rotation: weighted_rot.mul(&b.rotation).normalized(),
            scale: b.scale.lerp(&(b.scale + a.scale), w),
        };
    }
    out.state = crate::pose::PoseState::Pose;
}

/// Convert rotations to global space, blend per-bone with a required mask,
/// convert back to local. Undefined for additive inputs per `§4.3`.
pub fn global_blend(
    base: &Pose,
    layer: &Pose,
    weight: f32,
    mask: &BoneMask,
    parents: &[Option<usize>],
    out: &mut Pose,
) {
    let count = base.bones.len().min(layer.bones.len()).min(out.bones.len());
    let base_globals: Vec<Transform> = (0..count).map(|i| base.global_transform(i, parents)).collect();
    let layer_globals: Vec<Transform> = (0..count).map(|i| layer.global_transform(i, parents)).collect();

    let mut blended_globals = vec![Transform::IDENTITY; count];
    for i in 0..count {
        let w = (weight * mask.weight(i)).clamp(0.0, 1.0);
        blended_globals[i] = blend_transform(&base_globals[i], &layer_globals[i], w);
    }

    for i in 0..count {
        out.bones[i] = match parents[i] {
            Some(parent) => blended_globals[parent].inverse().mul(&blended_globals[i]),
            None => blended_globals[i],
        };
    }
    out.state = crate::pose::PoseState::Pose;
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::Vec3;

    fn pose_at(x: f32, scale: f32) -> Pose {
        Pose {
            bones: vec![Transform::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, Vec3::new(scale, scale, scale))],
            state: crate::pose::PoseState::Pose,
        }
    }

    #[test]
    fn local_blend_weight_zero_returns_source() {
        let a = pose_at(1.0, 1.0);
        let b = pose_at(10.0, 2.0);
        let mut out = Pose::new(1);
        local_blend(&a, &b, 0.0, None, &mut out);
        assert_eq!(out.bones[0], a.bones[0]);
    }

    #[test]
    fn local_blend_weight_one_returns_target() {
        let a = pose_at(1.0, 1.0);
        let b = pose_at(10.0, 2.0);
        let mut out = Pose::new(1);
        local_blend(&a, &b, 1.0, None, &mut out);
        assert_eq!(out.bones[0], b.bones[0]);
    }

    #[test]
    fn local_blend_midpoint_interpolates() {
        let a = pose_at(0.0, 1.0);
        let b = pose_at(10.0, 3.0);
        let mut out = Pose::new(1);
        local_blend(&a, &b, 0.5, None, &mut out);
        assert!((out.bones[0].translation.x - 5.0).abs() < 1e-5);
        assert!((out.bones[0].scale.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn local_blend_respects_bone_mask() {
        let a = pose_at(0.0, 1.0);
        let b = pose_at(10.0, 1.0);
        let mut mask = BoneMask::new(1);
        mask.set(0, 0.0);
        let mut out = Pose::new(1);
        local_blend(&a, &b, 1.0, Some(&mask), &mut out);
        assert!((out.bones[0].translation.x - 0.0).abs() < 1e-5);
    }

    #[test]
    fn additive_blend_zero_weight_returns_base() {
        let base = pose_at(1.0, 1.0);
        let additive = pose_at(5.0, 1.0);
        let mut out = Pose::new(1);
        additive_blend(&base, &additive, 0.0, None, &mut out);
        assert!((out.bones[0].translation.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn additive_blend_full_weight_adds_delta() {
        let base = pose_at(1.0, 1.0);
        let additive = pose_at(5.0, 1.0);
        let mut out = Pose::new(1);
        additive_blend(&base, &additive, 1.0, None, &mut out);
        assert!((out.bones[0].translation.x - 6.0).abs() < 1e-5);
    }

    #[test]
    fn local_blend_rotation_slerp_midpoint() {
        let angle = std::f32::consts::FRAC_PI_2;
        let a = Pose {
            bones: vec![Transform::IDENTITY],
            state: crate::pose::PoseState::Pose,
        };
        let b = Pose {
            bones: vec![Transform::new(
                Vec3::ZERO,
                Quat::new(0.0, (angle / 2.0).sin(), 0.0, (angle / 2.0).cos()),
                Vec3::ONE,
            )],
            state: crate::pose::PoseState::Pose,
        };
        let mut out = Pose::new(1);
        local_blend(&a, &b, 0.5, None, &mut out);
        let half_angle = angle / 4.0;
        assert!((out.bones[0].rotation.y - half_angle.sin()).abs() < 1e-4);
        assert!((out.bones[0].rotation.w - half_angle.cos()).abs() < 1e-4);
    }

    #[test]
    fn global_blend_zero_weight_preserves_base_hierarchy() {
        let parents = vec![None, Some(0usize)];
        let mut base = Pose::new(2);
        base.bones[1].translation = Vec3::new(1.0, 0.0, 0.0);
        let mut layer = Pose::new(2);
        layer.bones[1].translation = Vec3::new(5.0, 0.0, 0.0);
        let mask = BoneMask::filled(2, 1.0);
        let mut out = Pose::new(2);
        global_blend(&base, &layer, 0.0, &mask, &parents, &mut out);
        assert!((out.bones[1].translation - base.bones[1].translation).length() < 1e-4);
    }
}
