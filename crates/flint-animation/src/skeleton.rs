//! The skeleton resource: bone count, parent hierarchy, optional per-bone
//! LOD rank, and the reference pose — fetched via an external loader per
//! `§6` and threaded into a `GraphInstance` through `GraphResources`.

use crate::pose::Transform;
use serde::{Deserialize, Serialize};

/// A skeleton's static bone hierarchy and reference pose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skeleton {
    pub bone_names: Vec<String>,
    pub parents: Vec<Option<usize>>,
    pub reference_pose: Vec<Transform>,
    /// Per-bone LOD rank; a pose at LOD `n` only carries bones with rank `<= n`.
    #[serde(default)]
    pub lod_ranks: Vec<u8>,
}

impl Skeleton {
    pub fn new(bone_names: Vec<String>, parents: Vec<Option<usize>>, reference_pose: Vec<Transform>) -> Self {
        let lod_ranks = vec![0; bone_names.len()];
        Self {
            bone_names,
            parents,
            reference_pose,
            lod_ranks,
        }
    }

    pub fn num_bones(&self) -> usize {
        self.bone_names.len()
    }

    /// Number of bones retained at a given LOD (bones with rank `<= lod`).
    pub fn num_bones_at_lod(&self, lod: u8) -> usize {
        self.lod_ranks.iter().filter(|&&rank| rank <= lod).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bone_skeleton() -> Skeleton {
        Skeleton::new(
            vec!["root".into(), "child".into()],
            vec![None, Some(0)],
            vec![Transform::IDENTITY, Transform::IDENTITY],
        )
    }

    #[test]
    fn num_bones_matches_names() {
        let skel = two_bone_skeleton();
        assert_eq!(skel.num_bones(), 2);
    }

    #[test]
    fn lod_defaults_to_all_bones() {
        let skel = two_bone_skeleton();
        assert_eq!(skel.num_bones_at_lod(0), 2);
    }

    #[test]
    fn lod_truncates_trailing_bones() {
        let mut skel = two_bone_skeleton();
        skel.lod_ranks[1] = 3;
        assert_eq!(skel.num_bones_at_lod(0), 1);
        assert_eq!(skel.num_bones_at_lod(3), 2);
    }
}
