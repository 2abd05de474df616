//! Task system — the deferred pose-task DAG. Nodes register tasks during
//! `update`; the system executes them afterward, split across a
//! pre-physics/post-physics barrier, writing into pooled pose buffers.

use crate::blend::{additive_blend, global_blend, local_blend};
use crate::bone_mask::{BoneMask, BoneMaskId};
use crate::clip::{AnimationClip, ClipId};
use crate::observer::GraphObserver;
use crate::pose::{Pose, PoseState, Transform};
use crate::pose_pool::{CachedPoseId, PoseBufferIndex, PoseBufferPool};
use crate::skeleton::Skeleton;
use crate::time::FrameTime;
use flint_core::{FlintError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// When a task is allowed to run relative to the physics solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStage {
    PrePhysics,
    PostPhysics,
    Any,
}

/// The operation a task performs once its dependencies' buffers are ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskKind {
    Sample { clip_id: ClipId, frame_time: FrameTime },
    DefaultPose { reference: bool },
    Blend { source: usize, target: usize, weight: f32, mask: Option<BoneMaskId> },
    AdditiveBlend { base: usize, additive: usize, weight: f32, mask: Option<BoneMaskId> },
    GlobalBlend { base: usize, layer: usize, weight: f32, mask: BoneMaskId },
    CachedPoseRead { id: CachedPoseId },
    CachedPoseWrite { id: CachedPoseId, input: usize },
    /// Contracted out to an external IK solver; the task system only
    /// reserves the slot and forwards the input pose unchanged.
    AimIk { input: usize },
    LookAtIk { input: usize },
    /// Pivot-space blend used by transitions with a `blendPivotBoneId`; the
    /// pivot offset itself is computed by the node, not the task system, so
    /// this forwards its input pose unchanged (same contract as the IK tasks).
    PivotBlend { input: usize },
}

/// One entry in the flat, registration-ordered task array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub source_node_index: usize,
    pub dependencies: Vec<usize>,
    pub stage: UpdateStage,
    pub kind: TaskKind,
    pub result_buffer: Option<PoseBufferIndex>,
}

/// Resources a task needs to execute, threaded in from `GraphResources`.
pub struct TaskResources<'a> {
    pub skeleton: &'a Skeleton,
    pub clips: &'a HashMap<ClipId, AnimationClip>,
    pub bone_masks: &'a HashMap<BoneMaskId, BoneMask>,
}

/// The flat task array for one tick, plus bookkeeping for the pre/post
/// physics split.
#[derive(Default)]
pub struct TaskSystem {
    tasks: Vec<Task>,
    executed: Vec<bool>,
    has_physics_dependency: bool,
}

impl TaskSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.tasks.clear();
        self.executed.clear();
        self.has_physics_dependency = false;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Register a task. `dependencies` must all be strictly less than the
    /// index this call returns — registration order is a topological order.
    pub fn register(
        &mut self,
        source_node_index: usize,
        dependencies: Vec<usize>,
        stage: UpdateStage,
        kind: TaskKind,
        observer: &mut dyn GraphObserver,
    ) -> usize {
        let index = self.tasks.len();
        debug_assert!(
            dependencies.iter().all(|&d| d < index),
            "task dependency must precede its own registration index"
        );
        if stage == UpdateStage::PostPhysics {
            self.has_physics_dependency = true;
        }
        self.tasks.push(Task {
            source_node_index,
            dependencies,
            stage,
            kind,
            result_buffer: None,
        });
        self.executed.push(false);
        observer.on_task_registered(index, source_node_index);
        index
    }

    pub fn has_physics_dependency(&self) -> bool {
        self.has_physics_dependency
    }

    /// Execute everything eligible to run before the physics solve. Returns
    /// `true` if a fallback (reference-pose) task was substituted because a
    /// supposedly pre-physics task transitively depended on post-physics
    /// data.
    pub fn update_pre_physics(&mut self, pool: &mut PoseBufferPool, resources: &TaskResources) -> bool {
        if !self.has_physics_dependency {
            for i in 0..self.tasks.len() {
                self.execute(i, pool, resources);
            }
            return false;
        }

        for i in 0..self.tasks.len() {
            if self.tasks[i].stage == UpdateStage::PostPhysics {
                continue;
            }
            let deps_ready = self.tasks[i].dependencies.iter().all(|&d| self.executed[d]);
            if deps_ready {
                self.execute(i, pool, resources);
            }
        }

        let stuck = (0..self.tasks.len()).any(|i| {
            self.tasks[i].stage == UpdateStage::PrePhysics
                && !self.executed[i]
                && self.tasks[i]
                    .dependencies
                    .iter()
                    .any(|&d| self.tasks[d].stage == UpdateStage::PostPhysics)
        });
        if stuck {
            eprintln!("task system: pre-physics task depends on post-physics data, falling back to reference pose");
            self.reset();
            let mut obs_noop = crate::observer::NullObserver;
            self.register(0, Vec::new(), UpdateStage::PrePhysics, TaskKind::DefaultPose { reference: true }, &mut obs_noop);
            self.execute(0, pool, resources);
            return true;
        }
        false
    }

    /// Execute everything left over, then return the final task's buffer —
    /// the tick's output pose.
    pub fn update_post_physics(&mut self, pool: &mut PoseBufferPool, resources: &TaskResources) -> Option<PoseBufferIndex> {
        for i in 0..self.tasks.len() {
            if !self.executed[i] {
                self.execute(i, pool, resources);
            }
        }
        self.release_orphaned(pool);
        self.tasks.last().and_then(|t| t.result_buffer)
    }

    /// Release buffers belonging to tasks nothing ever consumed: a blend
    /// node rolls back to a sibling's result instead of its own (`§9`), but
    /// every child still gets updated and registers a task before the
    /// parent makes that choice, so the rolled-back child's task still runs
    /// here. Anything that isn't the tick's final output and was never
    /// listed as another task's dependency leaks its buffer otherwise.
    fn release_orphaned(&mut self, pool: &mut PoseBufferPool) {
        let last = self.tasks.len().saturating_sub(1);
        let mut referenced = vec![false; self.tasks.len()];
        for task in &self.tasks {
            for &dep in &task.dependencies {
                referenced[dep] = true;
            }
        }
        for i in 0..self.tasks.len() {
            if i == last || referenced[i] {
                continue;
            }
            if let Some(buffer) = self.tasks[i].result_buffer.take() {
                pool.release(buffer);
            }
        }
    }

    /// Serialize the registered task list for debugging/replay (`§4.13`).
    /// Buffer assignments are included as-is; replaying a deserialized list
    /// against a fresh pool requires re-executing it, not just reading it
    /// back, since buffer indices are only meaningful within the pool that
    /// produced them.
    pub fn serialize_tasks(&self) -> Result<String> {
        serde_json::to_string(&self.tasks).map_err(|e| FlintError::ParseError(e.to_string()))
    }

    /// Rebuild a task list from `serialize_tasks`'s output. The returned
    /// system has everything marked executed with its recorded
    /// `result_buffer`; re-running `update_pre_physics`/`update_post_physics`
    /// on it is a no-op unless `reset` is called first.
    pub fn deserialize_tasks(json: &str) -> Result<Self> {
        let tasks: Vec<Task> = serde_json::from_str(json).map_err(|e| FlintError::ParseError(e.to_string()))?;
        let executed = vec![true; tasks.len()];
        let has_physics_dependency = tasks.iter().any(|t| t.stage == UpdateStage::PostPhysics);
        Ok(Self { tasks, executed, has_physics_dependency })
    }

    fn execute(&mut self, index: usize, pool: &mut PoseBufferPool, resources: &TaskResources) {
        let kind = self.tasks[index].kind.clone();
        let buffer = pool.acquire();

        match kind {
            TaskKind::Sample { clip_id, frame_time } => {
                if let Some(clip) = resources.clips.get(&clip_id) {
                    clip.get_pose(frame_time, pool.pose_mut(buffer));
                } else {
                    *pool.pose_mut(buffer) = Pose::reference(&resources.skeleton.reference_pose);
                }
            }
            TaskKind::DefaultPose { reference } => {
                *pool.pose_mut(buffer) = if reference {
                    Pose::reference(&resources.skeleton.reference_pose)
                } else {
                    Pose::zero(resources.skeleton.num_bones())
                };
            }
            TaskKind::Blend { source, target, weight, mask } => {
                let mask_ref = mask.as_ref().and_then(|id| resources.bone_masks.get(id));
                let (src, tgt) = (self.buffer_of(source), self.buffer_of(target));
                let out = blend_with(pool, src, tgt, |s, t, o| local_blend(s, t, weight, mask_ref, o));
                *pool.pose_mut(buffer) = out;
                self.release_dependency(source, pool);
                self.release_dependency(target, pool);
            }
            TaskKind::AdditiveBlend { base, additive, weight, mask } => {
                let mask_ref = mask.as_ref().and_then(|id| resources.bone_masks.get(id));
                let (b, a) = (self.buffer_of(base), self.buffer_of(additive));
                let out = blend_with(pool, b, a, |s, t, o| additive_blend(s, t, weight, mask_ref, o));
                *pool.pose_mut(buffer) = out;
                self.release_dependency(base, pool);
                self.release_dependency(additive, pool);
            }
            TaskKind::GlobalBlend { base, layer, weight, mask } => {
                let out = if let Some(mask_ref) = resources.bone_masks.get(&mask) {
                    let (b, l) = (self.buffer_of(base), self.buffer_of(layer));
                    blend_with(pool, b, l, |s, t, o| {
                        global_blend(s, t, weight, mask_ref, &resources.skeleton.parents, o)
                    })
                } else {
                    pool.pose(self.buffer_of(base)).clone()
                };
                *pool.pose_mut(buffer) = out;
                self.release_dependency(base, pool);
                self.release_dependency(layer, pool);
            }
            TaskKind::CachedPoseRead { id } => {
                if let Some(src) = pool.cached_buffer(id) {
                    *pool.pose_mut(buffer) = pool.pose(src).clone();
                }
            }
            TaskKind::CachedPoseWrite { id, input } => {
                let input_buffer = self.buffer_of(input);
                let input_pose = pool.pose(input_buffer).clone();
                if let Some(cached) = pool.cached_buffer(id) {
                    *pool.pose_mut(cached) = input_pose.clone();
                }
                *pool.pose_mut(buffer) = input_pose;
                self.release_dependency(input, pool);
            }
            TaskKind::AimIk { input } | TaskKind::LookAtIk { input } | TaskKind::PivotBlend { input } => {
                let input_buffer = self.buffer_of(input);
                *pool.pose_mut(buffer) = pool.pose(input_buffer).clone();
                self.release_dependency(input, pool);
            }
        }

        self.tasks[index].result_buffer = Some(buffer);
        self.executed[index] = true;
    }

    fn buffer_of(&self, task_index: usize) -> PoseBufferIndex {
        self.tasks[task_index]
            .result_buffer
            .expect("dependency task must execute before its dependent")
    }

    fn release_dependency(&self, task_index: usize, pool: &mut PoseBufferPool) {
        if let Some(buffer) = self.tasks[task_index].result_buffer {
            pool.release(buffer);
        }
    }
}

fn blend_with(pool: &mut PoseBufferPool, a: PoseBufferIndex, b: PoseBufferIndex, f: impl FnOnce(&Pose, &Pose, &mut Pose)) -> Pose {
    let a_pose = pool.pose(a).clone();
    let b_pose = pool.pose(b).clone();
    let mut out = Pose::new(a_pose.num_bones());
    f(&a_pose, &b_pose, &mut out);
    out
}

/// Convert an additive result pose to an absolute pose by blending it onto
/// a reference, per `§4.13`'s final-task resolution step.
pub fn resolve_additive_to_reference(pose: &Pose, reference: &[Transform]) -> Pose {
    if pose.state != PoseState::AdditivePose {
        return pose.clone();
    }
    let reference_pose = Pose::reference(reference);
    let mut out = Pose::new(pose.num_bones());
    additive_blend(&reference_pose, pose, 1.0, None, &mut out);
    out
}
