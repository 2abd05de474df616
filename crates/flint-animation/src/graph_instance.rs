//! Graph instantiation and tick orchestration — turns a compiled
//! `GraphDefinition` into a runnable `GraphInstance` and drives one tick's
//! worth of evaluation end to end, per `§4.14`/`§11`.

use std::collections::HashMap;

use flint_core::{FlintError, Result};

use crate::bone_mask::{BoneMask, BoneMaskId};
use crate::clip::{AnimationClip, ClipId};
use crate::graph_node::{BranchState, GraphContext, PoseNode, PoseNodeArena, UpdateRange};
use crate::node_blend1d::{Blend1DState, ParameterPoint};
use crate::node_blend2d::{Blend2DState, BlendSpacePoint, Triangle};
use crate::node_clip::ClipNodeState;
use crate::node_layer::{LayerConfig, LayerState};
use crate::node_passthrough::PassthroughState;
use crate::node_root_motion_override::RootMotionOverrideState;
use crate::node_speed_scale::{SpeedScaleState, VelocityBasedSpeedScaleState};
use crate::node_target_warp::{SamplingMode, TargetWarpState};
use crate::observer::GraphObserver;
use crate::pose::{Pose, Transform};
use crate::pose_pool::PoseBufferPool;
use crate::sampled_event::SampledEventBuffer;
use crate::skeleton::Skeleton;
use crate::state_machine::{StateDefinition, StateMachineState, TransitionConduit};
use crate::task::{resolve_additive_to_reference, TaskResources, TaskSystem};
use crate::time::Seconds;
use crate::value_node::{Value, ValueNode, ValueNodeGraph};

/// One node's compiled description. Child/value-node references are plain
/// indices into the sibling `GraphDefinition::nodes`/`value_nodes` arrays,
/// checked for the monotonic-index rule at `instantiate` time (`§6`).
#[derive(Debug, Clone)]
pub enum NodeDefinition {
    AnimationClip {
        clip_id: ClipId,
        looping: bool,
        sample_root_motion: bool,
        play_in_reverse: Option<usize>,
    },
    Passthrough {
        child: usize,
    },
    SpeedScale {
        child: usize,
        scale_value_node: usize,
        blend_in_time: Seconds,
    },
    VelocityBasedSpeedScale {
        child: usize,
        desired_velocity_value_node: usize,
        clip_velocity: f32,
        blend_in_time: Seconds,
    },
    RootMotionOverride {
        child: usize,
        desired_velocity_value_node: usize,
        desired_facing_value_node: usize,
        max_linear_velocity: Option<f32>,
        max_angular_velocity: Option<f32>,
        allow_heading_x: bool,
        allow_heading_y: bool,
        allow_heading_z: bool,
        listen_for_events: bool,
        blend_duration: Seconds,
    },
    Blend1D {
        sources: Vec<usize>,
        parameter_value_node: usize,
        parameterization: Vec<ParameterPoint>,
    },
    Blend2D {
        sources: Vec<usize>,
        parameter_x_value_node: usize,
        parameter_y_value_node: usize,
        points: Vec<BlendSpacePoint>,
        triangles: Vec<Triangle>,
        hull: Vec<usize>,
    },
    Layer {
        base: usize,
        layers: Vec<LayerConfig>,
    },
    StateMachine {
        states: Vec<StateDefinition>,
        transitions: Vec<TransitionConduit>,
        initial_state: usize,
    },
    TargetWarp {
        child: usize,
        clip_id: ClipId,
        target_value_node: usize,
        sampling_mode: SamplingMode,
        error_threshold: f32,
    },
}

impl NodeDefinition {
    /// Child node indices this definition references, for validation.
    fn child_indices(&self) -> Vec<usize> {
        match self {
            NodeDefinition::AnimationClip { .. } => vec![],
            NodeDefinition::Passthrough { child }
            | NodeDefinition::SpeedScale { child, .. }
            | NodeDefinition::VelocityBasedSpeedScale { child, .. }
            | NodeDefinition::RootMotionOverride { child, .. }
            | NodeDefinition::TargetWarp { child, .. } => vec![*child],
            NodeDefinition::Blend1D { sources, .. } | NodeDefinition::Blend2D { sources, .. } => sources.clone(),
            NodeDefinition::Layer { base, layers } => {
                let mut out = vec![*base];
                out.extend(layers.iter().map(|l| l.child));
                out
            }
            NodeDefinition::StateMachine { states, .. } => states.iter().map(|s| s.child).collect(),
        }
    }

    /// Value-node indices this definition references, for validation.
    fn value_node_indices(&self) -> Vec<usize> {
        match self {
            NodeDefinition::AnimationClip { play_in_reverse, .. } => play_in_reverse.iter().copied().collect(),
            NodeDefinition::Passthrough { .. } => vec![],
            NodeDefinition::SpeedScale { scale_value_node, .. } => vec![*scale_value_node],
            NodeDefinition::VelocityBasedSpeedScale { desired_velocity_value_node, .. } => vec![*desired_velocity_value_node],
            NodeDefinition::RootMotionOverride { desired_velocity_value_node, desired_facing_value_node, .. } => {
                vec![*desired_velocity_value_node, *desired_facing_value_node]
            }
            NodeDefinition::Blend1D { parameter_value_node, .. } => vec![*parameter_value_node],
            NodeDefinition::Blend2D { parameter_x_value_node, parameter_y_value_node, .. } => {
                vec![*parameter_x_value_node, *parameter_y_value_node]
            }
            NodeDefinition::Layer { layers, .. } => layers.iter().map(|l| l.weight_value_node).collect(),
            NodeDefinition::StateMachine { transitions, .. } => {
                let mut out: Vec<usize> = transitions.iter().map(|t| t.condition_value_node).collect();
                out.extend(transitions.iter().filter_map(|t| t.sync_event_offset_value_node));
                out
            }
            NodeDefinition::TargetWarp { target_value_node, .. } => vec![*target_value_node],
        }
    }
}

/// One externally addressable control input, bound to a `Control` value node.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pub name: String,
    pub value_node_index: usize,
}

/// A compiled graph, ready to be checked and turned into a running instance.
#[derive(Debug, Clone)]
pub struct GraphDefinition {
    pub nodes: Vec<NodeDefinition>,
    pub value_nodes: Vec<ValueNode>,
    pub parameters: Vec<ParameterDefinition>,
    pub root_node_index: usize,
    /// Node indices whose runtime state (e.g. an in-progress transition)
    /// should be preserved across a hot reload rather than reset. Not
    /// consulted by `instantiate`/`tick` themselves — callers that replace a
    /// running instance's definition use this list to decide what to copy
    /// forward.
    pub persistent_node_indices: Vec<usize>,
}

impl GraphDefinition {
    fn validate(&self) -> Result<()> {
        if self.root_node_index >= self.nodes.len() {
            return Err(FlintError::ConfigurationError(format!(
                "root node index {} out of range ({} nodes)",
                self.root_node_index,
                self.nodes.len()
            )));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for child in node.child_indices() {
                if child >= index {
                    return Err(FlintError::ConfigurationError(format!(
                        "node {index} references child {child}, which is not a strictly earlier index"
                    )));
                }
            }
            for value_index in node.value_node_indices() {
                if value_index >= self.value_nodes.len() {
                    return Err(FlintError::ConfigurationError(format!(
                        "node {index} references value node {value_index}, out of range ({} value nodes)",
                        self.value_nodes.len()
                    )));
                }
            }
        }
        for param in &self.parameters {
            match self.value_nodes.get(param.value_node_index) {
                Some(ValueNode::Control(_)) => {}
                Some(_) => {
                    return Err(FlintError::ConfigurationError(format!(
                        "parameter \"{}\" targets value node {}, which is not a Control node",
                        param.name, param.value_node_index
                    )))
                }
                None => {
                    return Err(FlintError::ConfigurationError(format!(
                        "parameter \"{}\" targets out-of-range value node {}",
                        param.name, param.value_node_index
                    )))
                }
            }
        }
        Ok(())
    }
}

fn build_node(definition: &NodeDefinition) -> PoseNode {
    match definition.clone() {
        NodeDefinition::AnimationClip { clip_id, looping, sample_root_motion, play_in_reverse } => {
            let mut state = ClipNodeState::new(clip_id, looping, sample_root_motion);
            state.play_in_reverse = play_in_reverse;
            PoseNode::AnimationClip(state)
        }
        NodeDefinition::Passthrough { child } => PoseNode::Passthrough(PassthroughState::new(child)),
        NodeDefinition::SpeedScale { child, scale_value_node, blend_in_time } => {
            PoseNode::SpeedScale(SpeedScaleState::new(child, scale_value_node, blend_in_time))
        }
        NodeDefinition::VelocityBasedSpeedScale { child, desired_velocity_value_node, clip_velocity, blend_in_time } => {
            PoseNode::VelocityBasedSpeedScale(VelocityBasedSpeedScaleState::new(child, desired_velocity_value_node, clip_velocity, blend_in_time))
        }
        NodeDefinition::RootMotionOverride {
            child,
            desired_velocity_value_node,
            desired_facing_value_node,
            max_linear_velocity,
            max_angular_velocity,
            allow_heading_x,
            allow_heading_y,
            allow_heading_z,
            listen_for_events,
            blend_duration,
        } => {
            let mut state = RootMotionOverrideState::new(child, desired_velocity_value_node, desired_facing_value_node);
            state.max_linear_velocity = max_linear_velocity;
            state.max_angular_velocity = max_angular_velocity;
            state.allow_heading_x = allow_heading_x;
            state.allow_heading_y = allow_heading_y;
            state.allow_heading_z = allow_heading_z;
            state.listen_for_events = listen_for_events;
            state.blend_duration = blend_duration;
            PoseNode::RootMotionOverride(state)
        }
        NodeDefinition::Blend1D { sources, parameter_value_node, parameterization } => {
            PoseNode::Blend1D(Blend1DState::new(sources, parameter_value_node, parameterization))
        }
        NodeDefinition::Blend2D { sources, parameter_x_value_node, parameter_y_value_node, points, triangles, hull } => {
            PoseNode::Blend2D(Blend2DState::new(sources, parameter_x_value_node, parameter_y_value_node, points, triangles, hull))
        }
        NodeDefinition::Layer { base, layers } => PoseNode::Layer(LayerState::new(base, layers)),
        NodeDefinition::StateMachine { states, transitions, initial_state } => {
            PoseNode::StateMachine(StateMachineState::new(states, transitions, initial_state))
        }
        NodeDefinition::TargetWarp { child, clip_id, target_value_node, sampling_mode, error_threshold } => {
            PoseNode::TargetWarp(TargetWarpState::new(child, clip_id, target_value_node, sampling_mode, error_threshold))
        }
    }
}

/// The resources a graph instance needs resolved for its lifetime: the
/// skeleton it poses, and the clips/bone masks its nodes reference by id.
pub struct GraphResources {
    pub skeleton: Skeleton,
    pub clips: HashMap<ClipId, AnimationClip>,
    pub bone_masks: HashMap<BoneMaskId, BoneMask>,
}

/// A running, tickable instance of a compiled graph.
pub struct GraphInstance {
    arena: PoseNodeArena,
    values: ValueNodeGraph,
    root_node_index: usize,
    parameters: HashMap<String, usize>,
    bone_mask_ids: Vec<BoneMaskId>,
    resources: GraphResources,
    tasks: TaskSystem,
    pool: PoseBufferPool,
    events: SampledEventBuffer,
    output_pose: Pose,
    previous_pose_root_motion: Transform,
    skeleton_lod: u8,
    update_id: u64,
}

impl GraphInstance {
    /// Resolve a compiled `GraphDefinition` against concrete resources,
    /// failing on any dangling/non-monotonic index rather than panicking at
    /// tick time (`§11`).
    pub fn instantiate(definition: &GraphDefinition, resources: GraphResources) -> Result<Self> {
        definition.validate()?;

        let nodes: Vec<PoseNode> = definition.nodes.iter().map(build_node).collect();
        let num_bones = resources.skeleton.num_bones();
        let initial_pose = Pose::reference(&resources.skeleton.reference_pose);
        let bone_mask_ids: Vec<BoneMaskId> = resources.bone_masks.keys().cloned().collect();
        let parameters = definition
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.value_node_index))
            .collect();

        Ok(Self {
            arena: PoseNodeArena::new(nodes),
            values: ValueNodeGraph::new(definition.value_nodes.clone()),
            root_node_index: definition.root_node_index,
            parameters,
            bone_mask_ids,
            resources,
            tasks: TaskSystem::new(),
            pool: PoseBufferPool::new(num_bones),
            events: SampledEventBuffer::new(),
            output_pose: initial_pose,
            previous_pose_root_motion: Transform::IDENTITY,
            skeleton_lod: 0,
            update_id: 0,
        })
    }

    pub fn set_parameter(&mut self, name: &str, value: Value) {
        if let Some(&index) = self.parameters.get(name) {
            self.values.set_control(index, value);
        }
    }

    pub fn set_skeleton_lod(&mut self, lod: u8) {
        self.skeleton_lod = lod;
    }

    pub fn pose(&self) -> &Pose {
        &self.output_pose
    }

    pub fn sampled_events(&self) -> &SampledEventBuffer {
        &self.events
    }

    /// Advance the graph by `delta_time`, producing a new output pose.
    /// Mirrors `§4.14`'s tick pipeline: parameters are already applied via
    /// `set_parameter`, so this evaluates the root, runs the deferred task
    /// system across the pre/post-physics split, resolves any additive
    /// result onto the reference pose, and advances cached value nodes.
    pub fn tick(&mut self, delta_time: Seconds, world_transform: Transform, observer: &mut dyn GraphObserver) {
        self.update_id = self.update_id.wrapping_add(1);
        self.tasks.reset();
        self.pool.reset_for_tick();
        self.events.begin_tick();

        let resources = TaskResources {
            skeleton: &self.resources.skeleton,
            clips: &self.resources.clips,
            bone_masks: &self.resources.bone_masks,
        };

        let root_result = {
            let mut ctx = GraphContext {
                world_transform,
                world_transform_inverse: world_transform.inverse(),
                skeleton_lod: self.skeleton_lod,
                update_id: self.update_id,
                branch_state: BranchState::Active,
                layer_context: None,
                tasks: &mut self.tasks,
                pool: &mut self.pool,
                previous_pose_root_motion: self.previous_pose_root_motion,
                events: &mut self.events,
                bone_masks_available: &self.bone_mask_ids,
                observer,
                resources: &resources,
                values: &self.values,
            };
            self.arena.update(self.root_node_index, UpdateRange::Unsynchronized { delta_time }, &mut ctx)
        };

        self.previous_pose_root_motion = root_result.root_motion_delta;

        self.tasks.update_pre_physics(&mut self.pool, &resources);
        let final_buffer = self.tasks.update_post_physics(&mut self.pool, &resources);

        if let Some(buffer) = final_buffer {
            let resolved = resolve_additive_to_reference(self.pool.pose(buffer), &self.resources.skeleton.reference_pose);
            self.output_pose = resolved;
            self.pool.release(buffer);
        }

        self.values.advance_caches();
    }
}
