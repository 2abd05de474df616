//! Animation-clip node — the leaf that samples a single clip, per `§4.4`.

use crate::clip::ClipId;
use crate::graph_node::{GraphContext, NodeLifecycle, PoseNodeResult, UpdateRange};
use crate::task::{TaskKind, UpdateStage};
use crate::time::{FrameTime, Percentage};

#[derive(Debug, Clone)]
pub struct ClipNodeState {
    pub clip_id: ClipId,
    pub looping: bool,
    /// Value-node index selecting reverse playback; `None` means always forward.
    pub play_in_reverse: Option<usize>,
    pub sample_root_motion: bool,
    pub is_initialized: bool,
    pub last_update_id: u64,
    pub previous_time: f32,
    pub current_time: f32,
}

impl ClipNodeState {
    pub fn new(clip_id: ClipId, looping: bool, sample_root_motion: bool) -> Self {
        Self {
            clip_id,
            looping,
            play_in_reverse: None,
            sample_root_motion,
            is_initialized: false,
            last_update_id: 0,
            previous_time: 0.0,
            current_time: 0.0,
        }
    }
}

impl NodeLifecycle for ClipNodeState {
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

pub fn update(state: &mut ClipNodeState, range: UpdateRange, ctx: &mut GraphContext, source_node_index: usize) -> PoseNodeResult {
    state.set_initialized(true);
    state.set_last_update_id(ctx.update_id);

    let Some(clip) = ctx.resources.clips.get(&state.clip_id) else {
        let task = ctx.tasks.register(
            source_node_index,
            Vec::new(),
            UpdateStage::Any,
            TaskKind::DefaultPose { reference: true },
            ctx.observer,
        );
        return PoseNodeResult {
            task_index: Some(task),
            root_motion_delta: crate::pose::Transform::IDENTITY,
            sampled_event_range: crate::sampled_event::SampledEventRange::EMPTY,
        };
    };

    let reverse = state
        .play_in_reverse
        .map(|idx| ctx.values.evaluate(idx).as_bool())
        .unwrap_or(false);

    state.previous_time = state.current_time;
    let new_time = match range {
        UpdateRange::Unsynchronized { delta_time } => {
            let signed_dt = if reverse { -delta_time } else { delta_time };
            let raw = state.current_time + signed_dt / clip.duration.max(1e-6);
            if state.looping {
                let (wrapped, _) = Percentage::new(raw).wrapped();
                wrapped.value()
            } else {
                raw.clamp(0.0, 1.0)
            }
        }
        UpdateRange::Synchronized(sync_range) => {
            let sync_track = clip.sync_track();
            sync_track.get_percentage_through(sync_range.end).value()
        }
    };
    state.current_time = new_time;

    let frame_time = FrameTime::from_percentage(Percentage::new(state.current_time), clip.num_frames);
    let task = ctx.tasks.register(
        source_node_index,
        Vec::new(),
        UpdateStage::Any,
        TaskKind::Sample { clip_id: state.clip_id.clone(), frame_time },
        ctx.observer,
    );

    let root_motion_delta = if state.sample_root_motion {
        let delta = clip.get_root_motion_delta(state.previous_time, state.current_time);
        ctx.observer.on_root_motion_operation("clip_sample", delta);
        delta
    } else {
        crate::pose::Transform::IDENTITY
    };

    let mut events = Vec::new();
    clip.get_events_for_range(state.previous_time, state.current_time, &mut events);
    let sampled_event_range = ctx.events.append_range(events, 1.0, &format!("node[{source_node_index}]"));

    PoseNodeResult {
        task_index: Some(task),
        root_motion_delta,
        sampled_event_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bone_mask::BoneMask;
    use crate::clip::{AnimationClip, BoneTrack, QuantizedRotation, RotationTrack, SyncTrackDef, VectorTrack};
    use crate::graph_node::BranchState;
    use crate::observer::NullObserver;
    use crate::pose_pool::PoseBufferPool;
    use crate::root_motion::RootMotionData;
    use crate::sampled_event::SampledEventBuffer;
    use crate::skeleton::Skeleton;
    use crate::sync_track::EventMarker;
    use crate::task::{TaskResources, TaskSystem};
    use crate::value_node::ValueNodeGraph;
    use flint_core::{Quat, Vec3};
    use std::collections::HashMap;

    fn one_bone_clip(duration: f32) -> AnimationClip {
        AnimationClip {
            name: "walk".into(),
            num_frames: 2,
            duration,
            tracks: vec![BoneTrack {
                rotation: RotationTrack { samples: vec![QuantizedRotation::quantize(Quat::IDENTITY); 2] },
                translation: VectorTrack {
                    ranges: [
                        crate::clip::AxisRange { start: 0.0, length: 1.0 },
                        crate::clip::AxisRange { start: 0.0, length: 1.0 },
                        crate::clip::AxisRange { start: 0.0, length: 1.0 },
                    ],
                    samples: vec![[0, 0, 0], [u16::MAX, 0, 0]],
                    is_static: false,
                },
                scale: None,
            }],
            events: vec![],
            sync_track: SyncTrackDef { markers: vec![EventMarker { id: 0, start_percentage: 0.0, duration: 1.0 }] },
            root_motion: RootMotionData::new(vec![Transform::IDENTITY, Transform::IDENTITY]),
            is_additive: false,
        }
    }

    use crate::pose::Transform;

    #[test]
    fn update_registers_sample_task_and_advances_time() {
        let clip = one_bone_clip(2.0);
        let mut clips = HashMap::new();
        clips.insert("walk".to_string(), clip);
        let skeleton = Skeleton::new(vec!["root".into()], vec![None], vec![Transform::IDENTITY]);
        let bone_masks: HashMap<String, BoneMask> = HashMap::new();
        let resources = TaskResources { skeleton: &skeleton, clips: &clips, bone_masks: &bone_masks };

        let mut tasks = TaskSystem::new();
        let mut pool = PoseBufferPool::new(1);
        let mut events = SampledEventBuffer::new();
        events.begin_tick();
        let mut observer = NullObserver;
        let values = ValueNodeGraph::new(vec![]);
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

        let mut state = ClipNodeState::new("walk".to_string(), false, true);
        let result = update(&mut state, UpdateRange::Unsynchronized { delta_time: 0.5 }, &mut ctx, 0);
        assert!(result.task_index.is_some());
        assert!((state.current_time - 0.25).abs() < 1e-4);
    }

    #[test]
    fn missing_clip_falls_back_to_reference_pose_task() {
        let skeleton = Skeleton::new(vec!["root".into()], vec![None], vec![Transform::IDENTITY]);
        let clips: HashMap<String, AnimationClip> = HashMap::new();
        let bone_masks: HashMap<String, BoneMask> = HashMap::new();
        let resources = TaskResources { skeleton: &skeleton, clips: &clips, bone_masks: &bone_masks };
        let mut tasks = TaskSystem::new();
        let mut pool = PoseBufferPool::new(1);
        let mut events = SampledEventBuffer::new();
        events.begin_tick();
        let mut observer = NullObserver;
        let values = ValueNodeGraph::new(vec![]);
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
        let mut state = ClipNodeState::new("missing".to_string(), false, true);
        let result = update(&mut state, UpdateRange::Unsynchronized { delta_time: 0.5 }, &mut ctx, 0);
        assert!(result.task_index.is_some());
    }
}
