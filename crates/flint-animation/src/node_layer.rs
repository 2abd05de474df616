//! Layer blend node — a base pose plus an ordered stack of masked overlay
//! layers, per `§4.10`.

use crate::bone_mask::BoneMaskId;
use crate::graph_node::{GraphContext, LayerContext, NodeLifecycle, PoseNodeArena, PoseNodeResult, UpdateRange};
use crate::sampled_event::SampledEventBuffer;
use crate::task::{TaskKind, UpdateStage};

/// Per-layer settings; `child` is the layer's own pose-node subtree (usually
/// rooted at a state machine).
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub child: usize,
    pub weight_value_node: usize,
    pub mask: Option<BoneMaskId>,
    pub is_synchronized: bool,
    pub ignore_events: bool,
    pub only_sample_base_root_motion: bool,
}

#[derive(Debug, Clone)]
pub struct LayerState {
    pub base: usize,
    pub layers: Vec<LayerConfig>,
    pub is_initialized: bool,
    pub last_update_id: u64,
}

impl LayerState {
    pub fn new(base: usize, layers: Vec<LayerConfig>) -> Self {
        Self {
            base,
            layers,
            is_initialized: false,
            last_update_id: 0,
        }
    }
}

impl NodeLifecycle for LayerState {
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
    state: &mut LayerState,
    range: UpdateRange,
    ctx: &mut GraphContext,
    arena: &mut PoseNodeArena,
    source_node_index: usize,
) -> PoseNodeResult {
    state.set_initialized(true);
    state.set_last_update_id(ctx.update_id);

    let prior_layer_context = ctx.layer_context.take();

    let mut combined = arena.update(state.base, range, ctx);
    if combined.task_index.is_none() {
        let task = ctx.tasks.register(
            source_node_index,
            Vec::new(),
            UpdateStage::Any,
            TaskKind::DefaultPose { reference: true },
            ctx.observer,
        );
        combined.task_index = Some(task);
    }

    let base_sync_range = match range {
        UpdateRange::Synchronized(r) => Some(r),
        UpdateRange::Unsynchronized { .. } => None,
    };

    for layer in &state.layers {
        let weight = ctx.values.evaluate(layer.weight_value_node).as_float().clamp(0.0, 1.0);
        ctx.layer_context = Some(LayerContext { weight, mask: layer.mask.clone() });

        let layer_range = if layer.is_synchronized {
            base_sync_range.map(UpdateRange::Synchronized).unwrap_or(range)
        } else {
            range
        };

        let layer_result = arena.update(layer.child, layer_range, ctx);

        let Some(layer_task) = layer_result.task_index else { continue };
        let Some(base_task) = combined.task_index else { continue };

        if weight <= 0.0 {
            if layer.ignore_events && !layer_result.sampled_event_range.is_empty() {
                ctx.events.mark_ignored(layer_result.sampled_event_range);
            }
            continue;
        }

        let kind = if layer.only_sample_base_root_motion {
            TaskKind::GlobalBlend {
                base: base_task,
                layer: layer_task,
                weight,
                mask: layer.mask.clone().unwrap_or_default(),
            }
        } else {
            TaskKind::Blend {
                source: base_task,
                target: layer_task,
                weight,
                mask: layer.mask.clone(),
            }
        };
        let blended = ctx.tasks.register(source_node_index, vec![base_task, layer_task], UpdateStage::Any, kind, ctx.observer);

        let root_motion_delta = if layer.only_sample_base_root_motion {
            combined.root_motion_delta
        } else {
            crate::root_motion::blend_root_motion_deltas(
                combined.root_motion_delta,
                layer_result.root_motion_delta,
                weight,
                crate::root_motion::RootMotionBlendMode::Blend,
            )
        };

        if layer.ignore_events && !layer_result.sampled_event_range.is_empty() {
            ctx.events.mark_ignored(layer_result.sampled_event_range);
        }
        let sampled_event_range = SampledEventBuffer::combine(combined.sampled_event_range, layer_result.sampled_event_range);

        combined = PoseNodeResult {
            task_index: Some(blended),
            root_motion_delta,
            sampled_event_range,
        };
    }

    ctx.layer_context = prior_layer_context;
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_state_new_starts_uninitialized() {
        let state = LayerState::new(0, vec![]);
        assert!(!state.is_initialized);
        assert!(state.layers.is_empty());
    }

    #[test]
    fn layer_config_clones_mask_id() {
        let layer = LayerConfig {
            child: 1,
            weight_value_node: 2,
            mask: Some("upper_body".to_string()),
            is_synchronized: true,
            ignore_events: false,
            only_sample_base_root_motion: false,
        };
        let cloned = layer.mask.clone();
        assert_eq!(cloned, Some("upper_body".to_string()));
    }

    fn clip_with_events(name: &str, events: Vec<crate::clip::ClipEvent>) -> crate::clip::AnimationClip {
        use crate::clip::{AxisRange, BoneTrack, QuantizedRotation, RotationTrack, SyncTrackDef, VectorTrack};
        crate::clip::AnimationClip {
            name: name.to_string(),
            num_frames: 2,
            duration: 1.0,
            tracks: vec![BoneTrack {
                rotation: RotationTrack { samples: vec![QuantizedRotation::quantize(flint_core::Quat::IDENTITY); 2] },
                translation: VectorTrack {
                    ranges: [AxisRange { start: 0.0, length: 1.0 }, AxisRange { start: 0.0, length: 1.0 }, AxisRange { start: 0.0, length: 1.0 }],
                    samples: vec![[0, 0, 0], [0, 0, 0]],
                    is_static: true,
                },
                scale: None,
            }],
            events,
            sync_track: SyncTrackDef { markers: vec![] },
            root_motion: crate::root_motion::RootMotionData::new(vec![crate::pose::Transform::IDENTITY, crate::pose::Transform::IDENTITY]),
            is_additive: false,
        }
    }

    #[test]
    fn zero_weight_layer_keeps_base_and_records_unignored_events() {
        use crate::bone_mask::BoneMask;
        use crate::node_clip::ClipNodeState;
        use crate::observer::NullObserver;
        use crate::pose::Transform;
        use crate::pose_pool::PoseBufferPool;
        use crate::sampled_event::{SampledEventBuffer, SampledEventRange};
        use crate::skeleton::Skeleton;
        use crate::task::{TaskResources, TaskSystem};
        use crate::value_node::{Value, ValueNode, ValueNodeGraph};
        use std::collections::HashMap;

        let mut clips = HashMap::new();
        clips.insert("base".to_string(), clip_with_events("base", vec![]));
        clips.insert(
            "layer".to_string(),
            clip_with_events(
                "layer",
                vec![crate::clip::ClipEvent { start_percentage: 0.0, end_percentage: 0.05, payload: "footstep".to_string() }],
            ),
        );
        let skeleton = Skeleton::new(vec!["root".into()], vec![None], vec![Transform::IDENTITY]);
        let bone_masks: HashMap<String, BoneMask> = HashMap::new();
        let resources = TaskResources { skeleton: &skeleton, clips: &clips, bone_masks: &bone_masks };
        let values = ValueNodeGraph::new(vec![ValueNode::Constant(Value::Float(0.0))]);
        let mut tasks = TaskSystem::new();
        let mut pool = PoseBufferPool::new(1);
        let mut events = SampledEventBuffer::new();
        events.begin_tick();
        let mut observer = NullObserver;
        let mut arena = PoseNodeArena::new(vec![
            PoseNode::AnimationClip(ClipNodeState::new("base".to_string(), true, false)),
            PoseNode::AnimationClip(ClipNodeState::new("layer".to_string(), true, false)),
        ]);
        let mut layer_state = LayerState::new(
            0,
            vec![LayerConfig {
                child: 1,
                weight_value_node: 0,
                mask: None,
                is_synchronized: false,
                ignore_events: false,
                only_sample_base_root_motion: false,
            }],
        );

        let mut ctx = GraphContext {
            world_transform: Transform::IDENTITY,
            world_transform_inverse: Transform::IDENTITY,
            skeleton_lod: 0,
            update_id: 1,
            branch_state: crate::graph_node::BranchState::Active,
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

        update(&mut layer_state, UpdateRange::Unsynchronized { delta_time: 0.1 }, &mut ctx, &mut arena, 2);

        // No Blend/GlobalBlend task registered for the zero-weight layer: just
        // the two leaf Sample tasks.
        assert_eq!(tasks.len(), 2);
        // The layer's event is still in the buffer and not flagged ignored,
        // since `ignore_events` wasn't set on this layer.
        assert_eq!(events.len(), 1);
        let recorded = events.events(SampledEventRange { start: 0, end: 1 });
        assert_eq!(recorded[0].event.payload, "footstep");
        assert!(!recorded[0].flags.ignored);
    }
}
