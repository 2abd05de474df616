//! State machine node — states, transition conduits, and the transition
//! blend itself, per `§4.11`.

use crate::clip::ClipEvent;
use crate::graph_node::{BranchState, GraphContext, NodeLifecycle, PoseNode, PoseNodeArena, PoseNodeResult, UpdateRange};
use crate::pose_pool::CachedPoseId;
use crate::root_motion::RootMotionBlendMode;
use crate::sampled_event::SampledEventBuffer;
use crate::task::{TaskKind, UpdateStage};
use crate::time::Seconds;

/// One state's metadata. `child` is the pose-node subtree the state owns;
/// `entry`/`exit` events fire as synthetic state events (`§9`'s "event
/// ignore/mark flags").
#[derive(Debug, Clone)]
pub struct StateDefinition {
    pub child: usize,
    pub entry_events: Vec<String>,
    pub exit_events: Vec<String>,
}

/// A transition conduit rooted at `from_state`. Selected when `condition`
/// evaluates true and no higher-`priority` conduit from the same state is
/// also eligible.
#[derive(Debug, Clone)]
pub struct TransitionConduit {
    pub from_state: usize,
    pub to_state: usize,
    pub condition_value_node: usize,
    pub duration: Seconds,
    pub priority: u32,
    pub clamp_duration: bool,
    pub keep_event_index: bool,
    pub keep_event_percentage: bool,
    pub sync_event_offset_value_node: Option<usize>,
    pub root_motion_blend_mode: RootMotionBlendMode,
    /// Forced (steal the in-progress transition's cached pose, start fresh
    /// from its target) vs. chained (keep the in-progress transition as the
    /// new one's source).
    pub force: bool,
}

/// The transition currently blending source → target.
#[derive(Debug, Clone)]
pub struct ActiveTransition {
    pub conduit_index: usize,
    pub source_state: usize,
    pub target_state: usize,
    pub duration: Seconds,
    pub elapsed: Seconds,
    pub root_motion_blend_mode: RootMotionBlendMode,
    /// A prior transition's cached pose this one crossfades from, if it was
    /// force-superseded into this one.
    pub source_cached_pose: Option<CachedPoseId>,
    /// This transition's own output, continuously cached so a later forced
    /// transition away from it can crossfade from where it left off.
    pub own_cached_pose: CachedPoseId,
}

#[derive(Debug, Clone)]
pub struct StateMachineState {
    pub states: Vec<StateDefinition>,
    pub transitions: Vec<TransitionConduit>,
    pub initial_state: usize,
    pub active_state: usize,
    pub active_transition: Option<ActiveTransition>,
    pub is_initialized: bool,
    pub last_update_id: u64,
}

impl StateMachineState {
    pub fn new(states: Vec<StateDefinition>, transitions: Vec<TransitionConduit>, initial_state: usize) -> Self {
        Self {
            states,
            transitions,
            initial_state,
            active_state: initial_state,
            active_transition: None,
            is_initialized: false,
            last_update_id: 0,
        }
    }
}

impl NodeLifecycle for StateMachineState {
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

fn delta_time(range: UpdateRange) -> Seconds {
    match range {
        UpdateRange::Unsynchronized { delta_time } => delta_time,
        UpdateRange::Synchronized(_) => 0.0,
    }
}

fn fire_state_events(events: &[String], ctx: &mut GraphContext, source_node_index: usize) {
    for payload in events {
        let synthetic = ClipEvent {
            start_percentage: 0.0,
            end_percentage: 0.0,
            payload: payload.clone(),
        };
        let range = ctx.events.append(synthetic, 1.0, &format!("node[{source_node_index}]"));
        ctx.events.mark_state_event(range);
    }
}

fn select_transition(state: &StateMachineState, from_state: usize, ctx: &GraphContext) -> Option<usize> {
    state
        .transitions
        .iter()
        .enumerate()
        .filter(|(_, t)| t.from_state == from_state)
        .filter(|(_, t)| ctx.values.evaluate(t.condition_value_node).as_bool())
        .max_by_key(|(_, t)| t.priority)
        .map(|(i, _)| i)
}

/// Re-times `target_state`'s clip child to start at the percentage implied
/// by the conduit's sync policy, mutating its `ClipNodeState` directly.
fn retime_target(conduit: &TransitionConduit, source_state_child: usize, target_state_child: usize, ctx: &GraphContext, arena: &mut PoseNodeArena) {
    let source_percentage = match arena.node(source_state_child) {
        PoseNode::AnimationClip(clip_state) => clip_state.current_time,
        _ => 0.0,
    };

    let new_percentage = if conduit.keep_event_index {
        let source_clip_id = match arena.node(source_state_child) {
            PoseNode::AnimationClip(clip_state) => Some(clip_state.clip_id.clone()),
            _ => None,
        };
        let target_clip_id = match arena.node(target_state_child) {
            PoseNode::AnimationClip(clip_state) => Some(clip_state.clip_id.clone()),
            _ => None,
        };
        match (source_clip_id.and_then(|id| ctx.resources.clips.get(&id)), target_clip_id.and_then(|id| ctx.resources.clips.get(&id))) {
            (Some(source_clip), Some(target_clip)) => {
                let sync_time = source_clip.sync_track().get_time(crate::time::Percentage::new(source_percentage));
                target_clip.sync_track().get_percentage_through(sync_time).value()
            }
            _ => source_percentage,
        }
    } else if conduit.keep_event_percentage {
        source_percentage
    } else if let Some(offset_node) = conduit.sync_event_offset_value_node {
        ctx.values.evaluate(offset_node).as_float().clamp(0.0, 1.0)
    } else {
        0.0
    };

    if let PoseNode::AnimationClip(clip_state) = arena.node_mut(target_state_child) {
        clip_state.current_time = new_percentage;
        clip_state.previous_time = new_percentage;
    }
}

fn start_transition_from_state(state: &mut StateMachineState, conduit_idx: usize, ctx: &mut GraphContext, arena: &mut PoseNodeArena, source_node_index: usize) {
    let conduit = state.transitions[conduit_idx].clone();
    let source_child = state.states[conduit.from_state].child;
    let target_child = state.states[conduit.to_state].child;
    retime_target(&conduit, source_child, target_child, ctx, arena);
    fire_state_events(&state.states[conduit.from_state].exit_events, ctx, source_node_index);
    fire_state_events(&state.states[conduit.to_state].entry_events, ctx, source_node_index);

    state.active_transition = Some(ActiveTransition {
        conduit_index: conduit_idx,
        source_state: conduit.from_state,
        target_state: conduit.to_state,
        duration: conduit.duration.max(1e-6),
        elapsed: 0.0,
        root_motion_blend_mode: conduit.root_motion_blend_mode,
        source_cached_pose: None,
        own_cached_pose: ctx.pool.create_cached(),
    });
}

fn start_transition_from_transition(state: &mut StateMachineState, conduit_idx: usize, ctx: &mut GraphContext, arena: &mut PoseNodeArena, source_node_index: usize) {
    let mut old = state.active_transition.take().expect("called only while a transition is active");
    let conduit = state.transitions[conduit_idx].clone();
    let target_child = state.states[conduit.to_state].child;

    if conduit.force {
        let source_child = state.states[old.target_state].child;
        retime_target(&conduit, source_child, target_child, ctx, arena);
        fire_state_events(&state.states[conduit.to_state].entry_events, ctx, source_node_index);

        let mut owned = vec![old.own_cached_pose];
        if let Some(inherited) = old.source_cached_pose {
            owned.push(inherited);
        }
        ctx.pool.transfer_cached_buffers(&mut owned);

        state.active_transition = Some(ActiveTransition {
            conduit_index: conduit_idx,
            source_state: old.target_state,
            target_state: conduit.to_state,
            duration: conduit.duration.max(1e-6),
            elapsed: 0.0,
            root_motion_blend_mode: conduit.root_motion_blend_mode,
            source_cached_pose: Some(old.own_cached_pose),
            own_cached_pose: ctx.pool.create_cached(),
        });
    } else {
        // Chain: keep the in-progress transition as this one's conceptual
        // source by treating its source state as the new source directly.
        let source_child = state.states[old.source_state].child;
        retime_target(&conduit, source_child, target_child, ctx, arena);
        fire_state_events(&state.states[conduit.to_state].entry_events, ctx, source_node_index);
        ctx.pool.destroy_cached(old.own_cached_pose);
        if let Some(inherited) = old.source_cached_pose.take() {
            ctx.pool.destroy_cached(inherited);
        }
        state.active_transition = Some(ActiveTransition {
            conduit_index: conduit_idx,
            source_state: old.source_state,
            target_state: conduit.to_state,
            duration: conduit.duration.max(1e-6),
            elapsed: 0.0,
            root_motion_blend_mode: conduit.root_motion_blend_mode,
            source_cached_pose: None,
            own_cached_pose: ctx.pool.create_cached(),
        });
    }
}

const CACHED_CROSSFADE_DURATION: Seconds = 0.1;

fn update_transition(state: &mut StateMachineState, range: UpdateRange, ctx: &mut GraphContext, arena: &mut PoseNodeArena, source_node_index: usize) -> PoseNodeResult {
    let dt = delta_time(range);
    let active = state.active_transition.as_mut().unwrap();
    active.elapsed += dt;
    let progress = (active.elapsed / active.duration).clamp(0.0, 1.0);
    let (source_state, target_state, root_motion_blend_mode, source_cached_pose, own_cached_pose) =
        (active.source_state, active.target_state, active.root_motion_blend_mode, active.source_cached_pose, active.own_cached_pose);

    let prior_branch = ctx.branch_state;
    ctx.branch_state = BranchState::Inactive;
    let source_result = arena.update(state.states[source_state].child, range, ctx);
    ctx.branch_state = prior_branch;
    let target_result = arena.update(state.states[target_state].child, range, ctx);

    let blended = match (source_result.task_index, target_result.task_index) {
        (Some(source_task), Some(target_task)) => {
            let blend_task = ctx.tasks.register(
                source_node_index,
                vec![source_task, target_task],
                UpdateStage::Any,
                TaskKind::Blend { source: source_task, target: target_task, weight: progress, mask: None },
                ctx.observer,
            );
            let root_motion_delta = crate::root_motion::blend_root_motion_deltas(
                source_result.root_motion_delta,
                target_result.root_motion_delta,
                progress,
                root_motion_blend_mode,
            );
            let sampled_event_range = SampledEventBuffer::combine(source_result.sampled_event_range, target_result.sampled_event_range);
            PoseNodeResult { task_index: Some(blend_task), root_motion_delta, sampled_event_range }
        }
        (Some(_), None) => source_result,
        (None, Some(_)) => target_result,
        (None, None) => PoseNodeResult::NONE,
    };

    let crossfaded = if let (Some(cached_id), Some(base_task)) = (source_cached_pose, blended.task_index) {
        let read_task = ctx.tasks.register(source_node_index, Vec::new(), UpdateStage::Any, TaskKind::CachedPoseRead { id: cached_id }, ctx.observer);
        let fade_weight = (active.elapsed / CACHED_CROSSFADE_DURATION).clamp(0.0, 1.0);
        let fade_task = ctx.tasks.register(
            source_node_index,
            vec![read_task, base_task],
            UpdateStage::Any,
            TaskKind::Blend { source: read_task, target: base_task, weight: fade_weight, mask: None },
            ctx.observer,
        );
        if fade_weight >= 1.0 {
            ctx.pool.destroy_cached(cached_id);
            active.source_cached_pose = None;
        }
        PoseNodeResult { task_index: Some(fade_task), ..blended }
    } else {
        blended
    };

    if let Some(task) = crossfaded.task_index {
        ctx.tasks.register(
            source_node_index,
            vec![task],
            UpdateStage::Any,
            TaskKind::CachedPoseWrite { id: own_cached_pose, input: task },
            ctx.observer,
        );
    }

    if progress >= 1.0 {
        ctx.pool.destroy_cached(own_cached_pose);
        if let Some(inherited) = source_cached_pose {
            ctx.pool.destroy_cached(inherited);
        }
        state.active_state = target_state;
        state.active_transition = None;
    }

    crossfaded
}

pub fn update(state: &mut StateMachineState, range: UpdateRange, ctx: &mut GraphContext, arena: &mut PoseNodeArena, source_node_index: usize) -> PoseNodeResult {
    state.set_last_update_id(ctx.update_id);

    if !state.is_initialized() {
        state.set_initialized(true);
        state.active_state = state.initial_state;
        fire_state_events(&state.states[state.active_state].entry_events, ctx, source_node_index);
    }

    if state.active_transition.is_none() {
        if let Some(conduit_idx) = select_transition(state, state.active_state, ctx) {
            start_transition_from_state(state, conduit_idx, ctx, arena, source_node_index);
        }
    } else {
        let pivot_state = state.active_transition.as_ref().unwrap().target_state;
        if let Some(conduit_idx) = select_transition(state, pivot_state, ctx) {
            start_transition_from_transition(state, conduit_idx, ctx, arena, source_node_index);
        }
    }

    if state.active_transition.is_some() {
        update_transition(state, range, ctx, arena, source_node_index)
    } else {
        arena.update(state.states[state.active_state].child, range, ctx)
    }
}
