//! Pose representation — an array of local-space bone transforms plus a
//! state tag, with on-demand global-transform computation.

use flint_core::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A single bone's local-space transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Compose `self` followed by `child` (i.e. `child` expressed in
    /// `self`'s space): `self * child`.
    pub fn mul(&self, child: &Self) -> Self {
        Self {
            translation: self.translation + self.rotation.rotate(&child.translation),
            rotation: self.rotation.mul(&child.rotation).normalized(),
            scale: Vec3::new(
                self.scale.x * child.scale.x,
                self.scale.y * child.scale.y,
                self.scale.z * child.scale.z,
            ),
        }
    }

    /// The transform that, composed after `self`, yields identity.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.conjugate();
        let inv_translation = inv_rot.rotate(&(self.translation * -1.0));
        Self {
            translation: inv_translation,
            rotation: inv_rot,
            scale: Vec3::new(
                1.0 / self.scale.x.max(1e-10),
                1.0 / self.scale.y.max(1e-10),
                1.0 / self.scale.z.max(1e-10),
            ),
        }
    }

    /// Delta `d` such that `self * d == target` (i.e. `self.inverse() * target`).
    pub fn delta_to(&self, target: &Self) -> Self {
        self.inverse().mul(target)
    }
}

/// What a pose currently represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseState {
    Unset,
    ReferencePose,
    ZeroPose,
    AdditivePose,
    Pose,
}

/// An array of local-space bone transforms plus a state tag.
#[derive(Debug, Clone)]
pub struct Pose {
    pub bones: Vec<Transform>,
    pub state: PoseState,
}

impl Pose {
    pub fn new(num_bones: usize) -> Self {
        Self {
            bones: vec![Transform::IDENTITY; num_bones],
            state: PoseState::Unset,
        }
    }

    pub fn reference(reference_pose: &[Transform]) -> Self {
        Self {
            bones: reference_pose.to_vec(),
            state: PoseState::ReferencePose,
        }
    }

    pub fn zero(num_bones: usize) -> Self {
        Self {
            bones: vec![
                Transform {
                    translation: Vec3::ZERO,
                    rotation: Quat::IDENTITY,
                    scale: Vec3::ZERO,
                };
                num_bones
            ],
            state: PoseState::ZeroPose,
        }
    }

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    /// Walk parent indices to compute the global transform of `bone_index`.
    /// `parents[i] == None` means the bone's parent is identity.
    pub fn global_transform(&self, bone_index: usize, parents: &[Option<usize>]) -> Transform {
        let mut chain = Vec::new();
        let mut idx = Some(bone_index);
        while let Some(i) = idx {
            chain.push(i);
            idx = parents[i];
        }
        let mut global = Transform::IDENTITY;
        for &i in chain.iter().rev() {
            global = global.mul(&self.bones[i]);
        }
        global
    }
}
