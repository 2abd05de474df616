//! The node runtime: a flat, index-addressed arena of tagged-variant pose
//! nodes (`§9`'s answer to the source's virtual-dispatch `GraphNode`), the
//! per-tick `GraphContext` threaded through every update, and the
//! `PoseNodeResult` each node reports back to its parent.

use crate::bone_mask::{BoneMask, BoneMaskId};
use crate::observer::GraphObserver;
use crate::pose::Transform;
use crate::pose_pool::PoseBufferPool;
use crate::sampled_event::{SampledEventBuffer, SampledEventRange};
use crate::sync_track::SyncTrackTimeRange;
use crate::task::{TaskResources, TaskSystem};
use crate::time::Seconds;
use crate::value_node::ValueNodeGraph;

use crate::node_blend1d::Blend1DState;
use crate::node_blend2d::Blend2DState;
use crate::node_clip::ClipNodeState;
use crate::node_layer::LayerState;
use crate::node_passthrough::PassthroughState;
use crate::node_root_motion_override::RootMotionOverrideState;
use crate::node_speed_scale::{SpeedScaleState, VelocityBasedSpeedScaleState};
use crate::node_target_warp::TargetWarpState;
use crate::state_machine::StateMachineState;

/// Whether the branch a node sits on is contributing to the final pose this
/// tick. Inactive branches still update (so internal time keeps advancing)
/// but their events/weight are suppressed (`§4.11`, `§9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Active,
    Inactive,
}

/// The blend weight and optional bone mask a layer contributes, restored by
/// the caller after each layer update (`§4.10`).
#[derive(Debug, Clone)]
pub struct LayerContext {
    pub weight: f32,
    pub mask: Option<BoneMaskId>,
}

/// How a node should advance this tick.
#[derive(Debug, Clone, Copy)]
pub enum UpdateRange {
    Unsynchronized { delta_time: Seconds },
    Synchronized(SyncTrackTimeRange),
}

/// What a node reports to its parent after `update`.
#[derive(Debug, Clone, Copy)]
pub struct PoseNodeResult {
    pub task_index: Option<usize>,
    pub root_motion_delta: Transform,
    pub sampled_event_range: SampledEventRange,
}

impl PoseNodeResult {
    pub const NONE: Self = Self {
        task_index: None,
        root_motion_delta: Transform::IDENTITY,
        sampled_event_range: SampledEventRange::EMPTY,
    };
}

/// Per-tick state threaded through every node update.
pub struct GraphContext<'a> {
    pub world_transform: Transform,
    pub world_transform_inverse: Transform,
    pub skeleton_lod: u8,
    pub update_id: u64,
    pub branch_state: BranchState,
    pub layer_context: Option<LayerContext>,
    pub tasks: &'a mut TaskSystem,
    pub pool: &'a mut PoseBufferPool,
    pub previous_pose_root_motion: Transform,
    pub events: &'a mut SampledEventBuffer,
    pub bone_masks_available: &'a [BoneMaskId],
    pub observer: &'a mut dyn GraphObserver,
    pub resources: &'a TaskResources<'a>,
    pub values: &'a ValueNodeGraph,
}

impl<'a> GraphContext<'a> {
    pub fn bone_mask(&self, id: &str) -> Option<&BoneMask> {
        self.resources.bone_masks.get(id)
    }
}

/// A node's shared lifecycle surface. Kept tiny per `§9` — most behavior
/// lives in the kind-specific `update_*` free functions each node module
/// exports, called from `PoseNodeArena::update`'s dispatch.
pub trait NodeLifecycle {
    fn is_initialized(&self) -> bool;
    fn set_initialized(&mut self, value: bool);
    fn last_update_id(&self) -> u64;
    fn set_last_update_id(&mut self, id: u64);
}

/// One slot in the node arena. `Placeholder` only ever exists transiently
/// while `PoseNodeArena::update` has taken ownership of the real variant to
/// satisfy the borrow checker during recursive child updates.
pub enum PoseNode {
    Placeholder,
    AnimationClip(ClipNodeState),
    Passthrough(PassthroughState),
    SpeedScale(SpeedScaleState),
    VelocityBasedSpeedScale(VelocityBasedSpeedScaleState),
    RootMotionOverride(RootMotionOverrideState),
    Blend1D(Blend1DState),
    Blend2D(Blend2DState),
    Layer(LayerState),
    StateMachine(StateMachineState),
    TargetWarp(TargetWarpState),
}

/// The flat, index-addressed node array owned by a `GraphInstance`. Indices
/// are monotonic: a parent's index is always greater than any child's
/// (`§6`), so recursive updates never revisit an index already on the call
/// stack.
pub struct PoseNodeArena {
    nodes: Vec<PoseNode>,
}

impl PoseNodeArena {
    pub fn new(nodes: Vec<PoseNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Update node `index`, recursing into its children as needed. Each
    /// kind's own module computes the result; this dispatcher only handles
    /// the borrow-checker dance of lending the arena back to itself.
    pub fn update(&mut self, index: usize, range: UpdateRange, ctx: &mut GraphContext) -> PoseNodeResult {
        let mut node = std::mem::replace(&mut self.nodes[index], PoseNode::Placeholder);
        let result = match &mut node {
            PoseNode::Placeholder => PoseNodeResult::NONE,
            PoseNode::AnimationClip(state) => crate::node_clip::update(state, range, ctx, index),
            PoseNode::Passthrough(state) => {
                let child = state.child;
                let child_result = self.update(child, range, ctx);
                crate::node_passthrough::update(state, child_result)
            }
            PoseNode::SpeedScale(state) => {
                let child = state.child;
                let scaled = crate::node_speed_scale::scale_range(state, range, ctx);
                let child_result = self.update(child, scaled, ctx);
                crate::node_speed_scale::finish(state, child_result)
            }
            PoseNode::VelocityBasedSpeedScale(state) => {
                let child = state.child;
                let scaled = crate::node_speed_scale::scale_range_velocity(state, range, ctx);
                let child_result = self.update(child, scaled, ctx);
                crate::node_speed_scale::finish_velocity(state, child_result)
            }
            PoseNode::RootMotionOverride(state) => {
                let child = state.child;
                let child_result = self.update(child, range, ctx);
                crate::node_root_motion_override::update(state, range, child_result, ctx, index)
            }
            PoseNode::Blend1D(state) => {
                let children = state.sources.clone();
                let child_results: Vec<_> = children.iter().map(|&c| (c, self.update(c, range, ctx))).collect();
                crate::node_blend1d::update(state, ctx, child_results, index)
            }
            PoseNode::Blend2D(state) => {
                let children = state.sources.clone();
                let child_results: Vec<_> = children.iter().map(|&c| (c, self.update(c, range, ctx))).collect();
                crate::node_blend2d::update(state, ctx, child_results, index)
            }
            PoseNode::Layer(state) => crate::node_layer::update(state, range, ctx, self, index),
            PoseNode::StateMachine(state) => crate::state_machine::update(state, range, ctx, self, index),
            PoseNode::TargetWarp(state) => {
                let child = state.child;
                let child_result = self.update(child, range, ctx);
                crate::node_target_warp::update(state, range, child_result, ctx, index)
            }
        };
        if ctx.branch_state == BranchState::Inactive && !result.sampled_event_range.is_empty() {
            ctx.events.mark_inactive_branch(result.sampled_event_range);
        }
        self.nodes[index] = node;
        result
    }

    pub fn node(&self, index: usize) -> &PoseNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut PoseNode {
        &mut self.nodes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_node_result_none_has_empty_range() {
        assert!(PoseNodeResult::NONE.sampled_event_range.is_empty());
        assert!(PoseNodeResult::NONE.task_index.is_none());
    }
}
