//! Parameterized 1-D blend — selects/blends between an ordered list of
//! source pose nodes by a single float parameter, per `§4.8`.

use crate::graph_node::{GraphContext, NodeLifecycle, PoseNodeResult, UpdateRange};
use crate::sampled_event::SampledEventBuffer;
use crate::task::{TaskKind, UpdateStage};

/// One `{inputIdx, value}` pair in the parameterization.
#[derive(Debug, Clone, Copy)]
pub struct ParameterPoint {
    pub input_index: usize,
    pub value: f32,
}

#[derive(Debug, Clone)]
pub struct Blend1DState {
    pub sources: Vec<usize>,
    pub parameter_value_node: usize,
    /// Strictly non-decreasing by `value`, covering the parameter range.
    pub parameterization: Vec<ParameterPoint>,
    pub is_initialized: bool,
    pub last_update_id: u64,
}

impl Blend1DState {
    pub fn new(sources: Vec<usize>, parameter_value_node: usize, parameterization: Vec<ParameterPoint>) -> Self {
        Self {
            sources,
            parameter_value_node,
            parameterization,
            is_initialized: false,
            last_update_id: 0,
        }
    }

    /// Binary search the range `[i, i+1]` covering `param`, returning
    /// `(low_idx, high_idx, weight)`. `weight == 0` means `low` alone;
    /// `weight == 1` means `high` alone.
    fn locate(&self, param: f32) -> (usize, usize, f32) {
        let points = &self.parameterization;
        if points.len() <= 1 {
            return (0, 0, 0.0);
        }
        let clamped = param.clamp(points[0].value, points[points.len() - 1].value);
        let mut lo = 0;
        let mut hi = points.len() - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if points[mid].value <= clamped {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let span = (points[hi].value - points[lo].value).max(1e-8);
        let weight = ((clamped - points[lo].value) / span).clamp(0.0, 1.0);
        (lo, hi, weight)
    }
}

impl NodeLifecycle for Blend1DState {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
    fn set_initialized(&mut self, value: bool) {
        self.is_initialized = value;
    }
    fn last_update_id(&self) -> u64 {
        self.last_update_id
    }
    fn set_last_update_id(&mut self, id: u64) {
        self.last_update_id = id;
    }
}

pub fn update(
    state: &mut Blend1DState,
    ctx: &mut GraphContext,
    child_results: Vec<(usize, PoseNodeResult)>,
    source_node_index: usize,
) -> PoseNodeResult {
    state.set_initialized(true);
    state.set_last_update_id(ctx.update_id);

    let param = ctx.values.evaluate(state.parameter_value_node).as_float();
    let (lo, hi, weight) = state.locate(param);

    if lo == hi || weight <= 0.0 {
        let active_idx = state.parameterization[lo].input_index;
        let (_, result) = child_results[active_idx];
        return roll_back_inactive(&child_results, &[active_idx], ctx, result);
    }
    if weight >= 1.0 {
        let active_idx = state.parameterization[hi].input_index;
        let (_, result) = child_results[active_idx];
        return roll_back_inactive(&child_results, &[active_idx], ctx, result);
    }

    let lo_idx = state.parameterization[lo].input_index;
    let hi_idx = state.parameterization[hi].input_index;
    let (_, lo_result) = child_results[lo_idx];
    let (_, hi_result) = child_results[hi_idx];

    roll_back_inactive(&child_results, &[lo_idx, hi_idx], ctx, PoseNodeResult::NONE);

    let Some(lo_task) = lo_result.task_index else { return hi_result };
    let Some(hi_task) = hi_result.task_index else { return lo_result };

    let blend_task = ctx.tasks.register(
        source_node_index,
        vec![lo_task, hi_task],
        UpdateStage::Any,
        TaskKind::Blend { source: lo_task, target: hi_task, weight, mask: None },
        ctx.observer,
    );

    let root_motion_delta = crate::root_motion::blend_root_motion_deltas(
        lo_result.root_motion_delta,
        hi_result.root_motion_delta,
        weight,
        crate::root_motion::RootMotionBlendMode::Blend,
    );
    let sampled_event_range = SampledEventBuffer::combine(lo_result.sampled_event_range, hi_result.sampled_event_range);

    PoseNodeResult {
        task_index: Some(blend_task),
        root_motion_delta,
        sampled_event_range,
    }
}

/// Marks every source's sampled events as ignored except those at
/// `active_positions` (positions into `child_results`, i.e. `sources`'
/// own ordering — not the arena node index each tuple carries).
fn roll_back_inactive(
    child_results: &[(usize, PoseNodeResult)],
    active_positions: &[usize],
    ctx: &mut GraphContext,
    active_result: PoseNodeResult,
) -> PoseNodeResult {
    for (position, &(_, result)) in child_results.iter().enumerate() {
        if !active_positions.contains(&position) && !result.sampled_event_range.is_empty() {
            ctx.events.mark_ignored(result.sampled_event_range);
        }
    }
    active_result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<ParameterPoint> {
        vec![
            ParameterPoint { input_index: 0, value: 0.0 },
            ParameterPoint { input_index: 1, value: 5.0 },
            ParameterPoint { input_index: 2, value: 10.0 },
        ]
    }

    #[test]
    fn locate_exact_point_selects_single_source_with_zero_weight() {
        let state = Blend1DState::new(vec![0, 1, 2], 0, points());
        let (lo, hi, weight) = state.locate(5.0);
        assert_eq!(lo, 1);
        assert_eq!(hi, 2);
        assert!(weight.abs() < 1e-5);
    }

    #[test]
    fn locate_midpoint_gives_half_weight() {
        let state = Blend1DState::new(vec![0, 1, 2], 0, points());
        let (lo, hi, weight) = state.locate(7.5);
        assert_eq!((lo, hi), (1, 2));
        assert!((weight - 0.5).abs() < 1e-5);
    }

    #[test]
    fn locate_clamps_outside_range() {
        let state = Blend1DState::new(vec![0, 1, 2], 0, points());
        let (_, _, weight) = state.locate(-5.0);
        assert!(weight.abs() < 1e-5);
    }

    #[test]
    fn update_at_exact_point_selects_source_without_registering_blend_task() {
        use crate::bone_mask::BoneMask;
        use crate::clip::AnimationClip;
        use crate::graph_node::BranchState;
        use crate::observer::NullObserver;
        use crate::pose::Transform;
        use crate::pose_pool::PoseBufferPool;
        use crate::sampled_event::SampledEventBuffer;
        use crate::skeleton::Skeleton;
        use crate::task::{TaskResources, TaskSystem};
        use crate::value_node::{Value, ValueNode, ValueNodeGraph};
        use std::collections::HashMap;

        let mut state = Blend1DState::new(vec![0, 1, 2], 0, points());
        let skeleton = Skeleton::new(vec!["root".into()], vec![None], vec![Transform::IDENTITY]);
        let clips: HashMap<String, AnimationClip> = HashMap::new();
        let bone_masks: HashMap<String, BoneMask> = HashMap::new();
        let resources = TaskResources { skeleton: &skeleton, clips: &clips, bone_masks: &bone_masks };
        let values = ValueNodeGraph::new(vec![ValueNode::Constant(Value::Float(5.0))]);
        let mut tasks = TaskSystem::new();
        let mut pool = PoseBufferPool::new(1);
        let mut events = SampledEventBuffer::new();
        events.begin_tick();
        let mut observer = NullObserver;
        let mut ctx = GraphContext {
            world_transform: Transform::IDENTITY,
            world_transform_inverse: Transform::IDENTITY,
            skeleton_lod: 0,
            update_id: 1,
            branch_state: BranchState::Active,
            layer_context: None,
            tasks: &mut tasks,
            pool: &mut pool,
            previous_pose_root_motion: Transform::IDENTITY,
            events: &mut events,
            bone_masks_available: &[],
            observer: &mut observer,
            resources: &resources,
            values: &values,
        };

        let child_results = vec![
            (0, PoseNodeResult { task_index: Some(0), ..PoseNodeResult::NONE }),
            (1, PoseNodeResult { task_index: Some(1), ..PoseNodeResult::NONE }),
            (2, PoseNodeResult { task_index: Some(2), ..PoseNodeResult::NONE }),
        ];
        let result = update(&mut state, &mut ctx, child_results, 3);

        // Parameter 5.0 lands exactly on clip[1]'s point: its own task is
        // forwarded unchanged and no Blend task gets registered.
        assert_eq!(result.task_index, Some(1));
        assert_eq!(tasks.len(), 0);
    }
}
