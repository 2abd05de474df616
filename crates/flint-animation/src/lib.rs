//! Flint Animation - runtime animation graph evaluator
//!
//! A deferred pose-task DAG built on a flat, index-addressed node arena:
//! clips decode from quantized tracks, pose/value nodes blend and drive
//! parameters, and node `update` calls register tasks the task system
//! executes afterward across a pre/post-physics split. See `graph_instance`
//! for the top-level `GraphInstance::instantiate`/`tick` entry points.

pub mod blend;
pub mod bone_mask;
pub mod clip;
pub mod graph_instance;
pub mod graph_node;
pub mod node_blend1d;
pub mod node_blend2d;
pub mod node_clip;
pub mod node_layer;
pub mod node_passthrough;
pub mod node_root_motion_override;
pub mod node_speed_scale;
pub mod node_target_warp;
pub mod observer;
pub mod pose;
pub mod pose_pool;
pub mod root_motion;
pub mod sampled_event;
pub mod skeleton;
pub mod state_machine;
pub mod sync_track;
pub mod task;
pub mod time;
pub mod value_node;

pub use graph_instance::{GraphDefinition, GraphInstance, GraphResources, NodeDefinition, ParameterDefinition};
pub use graph_node::{GraphContext, PoseNodeArena, PoseNodeResult, UpdateRange};
pub use observer::{GraphObserver, NullObserver};
pub use pose::{Pose, Transform};
pub use value_node::{Value, ValueNode};
