//! Target-warp node — reshapes a wrapped clip's root-motion path so it
//! reaches a world-space target transform by the time the clip ends, per
//! `§4.12`.

use crate::clip::{AnimationClip, ClipId};
use crate::graph_node::{GraphContext, NodeLifecycle, PoseNodeResult, UpdateRange};
use crate::pose::Transform;
use crate::root_motion::RootMotionData;
use crate::time::{FrameTime, Percentage};
use flint_core::spline;
use flint_core::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    Accurate,
    Inaccurate,
}

/// `FeaturePreserving` is treated as an alias of `Hermite` — the source's
/// feature-preserving mode adds curvature clamping this distillation doesn't
/// specify, so it degrades to plain Hermite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpAlgorithm {
    Hermite,
    Bezier,
    FeaturePreserving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    RotationOnly,
    Full,
}

#[derive(Debug, Clone, Copy)]
struct WarpSection {
    start_percentage: f32,
    end_percentage: f32,
    kind: SectionKind,
    algorithm: WarpAlgorithm,
}

#[derive(Debug, Clone)]
pub struct TargetWarpState {
    pub child: usize,
    pub clip_id: ClipId,
    pub target_value_node: usize,
    pub sampling_mode: SamplingMode,
    pub error_threshold: f32,
    pub update_target: bool,
    pub is_initialized: bool,
    pub last_update_id: u64,
    previous_time: f32,
    current_time: f32,
    target_snapshot: Option<Transform>,
    activation_world_transform: Transform,
    warped: Option<RootMotionData>,
    effective_mode: SamplingMode,
}

impl TargetWarpState {
    pub fn new(
        child: usize,
        clip_id: ClipId,
        target_value_node: usize,
        sampling_mode: SamplingMode,
        error_threshold: f32,
    ) -> Self {
        Self {
            child,
            clip_id,
            target_value_node,
            sampling_mode,
            error_threshold,
            update_target: true,
            is_initialized: false,
            last_update_id: 0,
            previous_time: 0.0,
            current_time: 0.0,
            target_snapshot: None,
            activation_world_transform: Transform::IDENTITY,
            warped: None,
            effective_mode: sampling_mode,
        }
    }
}

impl NodeLifecycle for TargetWarpState {
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

/// Recognizes event payloads of the form `Warp:<RotationOnly|Full>[:<algorithm>]`.
fn parse_section_tag(payload: &str) -> Option<(SectionKind, WarpAlgorithm)> {
    let rest = payload.strip_prefix("Warp:")?;
    let mut parts = rest.split(':');
    let kind = match parts.next()? {
        "RotationOnly" => SectionKind::RotationOnly,
        "Full" => SectionKind::Full,
        _ => return None,
    };
    let algorithm = match parts.next().unwrap_or("Hermite") {
        "Bezier" => WarpAlgorithm::Bezier,
        "FeaturePreserving" => WarpAlgorithm::FeaturePreserving,
        _ => WarpAlgorithm::Hermite,
    };
    Some((kind, algorithm))
}

/// Warp sections in clip order, with any section already fully elapsed
/// dropped and the first remaining one clamped to `previous_time` (§4.12 step 2).
fn parse_warp_sections(clip: &AnimationClip, previous_time: f32) -> Vec<WarpSection> {
    let mut sections: Vec<WarpSection> = clip
        .events
        .iter()
        .filter_map(|e| {
            parse_section_tag(&e.payload).map(|(kind, algorithm)| WarpSection {
                start_percentage: e.start_percentage,
                end_percentage: e.end_percentage,
                kind,
                algorithm,
            })
        })
        .collect();
    sections.sort_by(|a, b| a.start_percentage.partial_cmp(&b.start_percentage).unwrap_or(std::cmp::Ordering::Equal));
    sections.retain(|s| s.end_percentage >= previous_time);
    if let Some(first) = sections.first_mut() {
        if first.start_percentage < previous_time {
            first.start_percentage = previous_time;
        }
    }
    sections
}

fn frame_of(percentage: f32, num_frames: u32) -> usize {
    let ft = FrameTime::from_percentage(Percentage::new(percentage), num_frames);
    (ft.frame_index + ft.percentage_to_next.round() as u32) as usize
}

/// Rotation that turns `from` into `to` about `axis`, both projected flat
/// against `axis` implicitly via the cross product's sign.
fn yaw_between(from: Vec3, to: Vec3, axis: Vec3) -> Quat {
    if from.length() < 1e-5 || to.length() < 1e-5 {
        return Quat::IDENTITY;
    }
    let from = from.normalized();
    let to = to.normalized();
    let dot = from.dot(&to).clamp(-1.0, 1.0);
    let cross = from.cross(&to);
    let sign = if cross.dot(&axis) < 0.0 { -1.0 } else { 1.0 };
    Quat::from_axis_angle(&axis, sign * dot.acos())
}

/// Builds the warped per-frame root path: forward-filled from the original
/// clip up to the first section, backward-filled from `target_local` after
/// the last section, with each section's interior reshaped per its kind.
fn build_warped_path(original: &[Transform], sections: &[WarpSection], num_frames: u32, target_local: Transform) -> Vec<Transform> {
    let n = original.len();
    let mut out = original.to_vec();
    if n < 2 || sections.is_empty() {
        return out;
    }

    let deltas: Vec<Transform> = (0..n - 1).map(|i| original[i].delta_to(&original[i + 1])).collect();

    let last_end_frame = sections.last().map(|s| frame_of(s.end_percentage, num_frames).min(n - 1)).unwrap_or(0);
    out[n - 1] = target_local;
    for i in (last_end_frame..n - 1).rev() {
        out[i] = out[i + 1].mul(&deltas[i].inverse());
    }

    for section in sections {
        let start_frame = frame_of(section.start_percentage, num_frames).min(n - 1);
        let end_frame = frame_of(section.end_percentage, num_frames).min(n - 1);
        if end_frame <= start_frame {
            continue;
        }
        let anchor_start = out[start_frame];
        let anchor_end = out[end_frame];

        match section.kind {
            SectionKind::RotationOnly => {
                let original_dir = (original[end_frame].translation - original[start_frame].translation).normalized();
                let desired_dir = (anchor_end.translation - anchor_start.translation).normalized();
                let extra = yaw_between(original_dir, desired_dir, Vec3::UP);
                let span = (end_frame - start_frame) as f32;
                for f in start_frame..=end_frame {
                    let t = (f - start_frame) as f32 / span.max(1.0);
                    let step = Quat::IDENTITY.slerp(&extra, t);
                    out[f] = Transform {
                        translation: original[f].translation,
                        rotation: step.mul(&original[f].rotation).normalized(),
                        scale: original[f].scale,
                    };
                }
                out[end_frame] = anchor_end;
            }
            SectionKind::Full => {
                let total_displacement: f32 = (start_frame..end_frame)
                    .map(|f| (original[f + 1].translation - original[f].translation).length())
                    .sum::<f32>()
                    .max(1e-6);
                let tangent_start = if start_frame > 0 {
                    (original[start_frame].translation - original[start_frame - 1].translation).normalized()
                } else {
                    (original[(start_frame + 1).min(n - 1)].translation - original[start_frame].translation).normalized()
                };
                let tangent_end = if end_frame + 1 < n {
                    (original[end_frame + 1].translation - original[end_frame].translation).normalized()
                } else {
                    tangent_start
                };
                let chord = (anchor_end.translation - anchor_start.translation).length().max(1e-4);
                let m0 = tangent_start * chord;
                let m1 = tangent_end * chord;
                let p1 = anchor_start.translation + tangent_start * (chord / 3.0);
                let p2 = anchor_end.translation - tangent_end * (chord / 3.0);

                let mut progress = 0.0;
                let mut prev_translation = anchor_start.translation;
                let mut prev_tangent = tangent_start;
                for f in start_frame..=end_frame {
                    let t = if f == start_frame {
                        0.0
                    } else {
                        progress += (original[f].translation - original[f - 1].translation).length();
                        (progress / total_displacement).clamp(0.0, 1.0)
                    };
                    let curved = match section.algorithm {
                        WarpAlgorithm::Bezier => spline::cubic_bezier(anchor_start.translation, p1, p2, anchor_end.translation, t),
                        WarpAlgorithm::Hermite | WarpAlgorithm::FeaturePreserving => {
                            spline::cubic_hermite(anchor_start.translation, m0, anchor_end.translation, m1, t)
                        }
                    };

                    let original_tangent = if f > start_frame {
                        (original[f].translation - original[f - 1].translation).normalized()
                    } else {
                        tangent_start
                    };
                    let original_forward = original[f].rotation.rotate(&Vec3::FORWARD);
                    let offset_rotation = yaw_between(original_tangent, original_forward, Vec3::UP);

                    let delta_vec = curved - prev_translation;
                    let new_tangent = if delta_vec.length() > 1e-6 { delta_vec.normalized() } else { prev_tangent };
                    let facing = yaw_between(Vec3::FORWARD, new_tangent, Vec3::UP);

                    out[f] = Transform {
                        translation: curved,
                        rotation: offset_rotation.mul(&facing).normalized(),
                        scale: original[f].scale,
                    };
                    prev_translation = curved;
                    prev_tangent = new_tangent;
                }
                out[start_frame] = anchor_start;
                out[end_frame] = anchor_end;
            }
        }
    }

    out
}

fn advance_time(state: &mut TargetWarpState, range: UpdateRange, clip: &AnimationClip) {
    state.previous_time = state.current_time;
    state.current_time = match range {
        UpdateRange::Unsynchronized { delta_time } => (state.current_time + delta_time / clip.duration.max(1e-6)).clamp(0.0, 1.0),
        UpdateRange::Synchronized(sync_range) => clip.sync_track().get_percentage_through(sync_range.end).value(),
    };
}

pub fn update(
    state: &mut TargetWarpState,
    range: UpdateRange,
    child_result: PoseNodeResult,
    ctx: &mut GraphContext,
    source_node_index: usize,
) -> PoseNodeResult {
    state.set_initialized(true);
    state.set_last_update_id(ctx.update_id);
    let _ = source_node_index;

    let Some(clip) = ctx.resources.clips.get(&state.clip_id) else {
        return child_result;
    };
    advance_time(state, range, clip);

    let target = ctx.values.evaluate(state.target_value_node).as_target();
    let should_recompute = if state.update_target {
        target != state.target_snapshot
    } else {
        state.warped.is_none() && target.is_some()
    };

    if should_recompute {
        state.target_snapshot = target;
        state.activation_world_transform = ctx.world_transform;
        state.effective_mode = state.sampling_mode;
        state.warped = target.and_then(|target| {
            let target_local = ctx.world_transform_inverse.mul(&target);
            let sections = parse_warp_sections(clip, state.previous_time);
            if sections.is_empty() {
                None
            } else {
                Some(RootMotionData::new(build_warped_path(
                    &clip.root_motion.transforms,
                    &sections,
                    clip.num_frames,
                    target_local,
                )))
            }
        });
    }

    let Some(warped) = &state.warped else {
        return child_result;
    };

    let from_ft = FrameTime::from_percentage(Percentage::new(state.previous_time), clip.num_frames);
    let to_ft = FrameTime::from_percentage(Percentage::new(state.current_time), clip.num_frames);
    let start_ft = FrameTime::from_percentage(Percentage::new(0.0), clip.num_frames);
    let end_ft = FrameTime::from_percentage(Percentage::new(1.0), clip.num_frames);

    let root_motion_delta = if state.effective_mode == SamplingMode::Accurate {
        let expected_world = state
            .activation_world_transform
            .mul(&warped.transform_at(from_ft.frame_index, from_ft.percentage_to_next));
        let error = expected_world.delta_to(&ctx.world_transform).translation.length();
        if error <= state.error_threshold {
            let expected_target_world = state
                .activation_world_transform
                .mul(&warped.transform_at(to_ft.frame_index, to_ft.percentage_to_next));
            ctx.world_transform.delta_to(&expected_target_world)
        } else {
            state.effective_mode = SamplingMode::Inaccurate;
            warped.delta(
                (from_ft.frame_index, from_ft.percentage_to_next),
                (to_ft.frame_index, to_ft.percentage_to_next),
                (start_ft.frame_index, start_ft.percentage_to_next),
                (end_ft.frame_index, end_ft.percentage_to_next),
            )
        }
    } else {
        warped.delta(
            (from_ft.frame_index, from_ft.percentage_to_next),
            (to_ft.frame_index, to_ft.percentage_to_next),
            (start_ft.frame_index, start_ft.percentage_to_next),
            (end_ft.frame_index, end_ft.percentage_to_next),
        )
    };

    ctx.observer.on_root_motion_operation("target_warp", root_motion_delta);

    PoseNodeResult {
        root_motion_delta,
        ..child_result
    }
}
