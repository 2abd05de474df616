//! Speed-scale nodes — a generic multiplier and a velocity-based variant,
//! both of which scale `ΔT` for their child and scale their own reported
//! duration by the inverse, per `§4.6`.

use crate::graph_node::{GraphContext, NodeLifecycle, PoseNodeResult, UpdateRange};
use crate::time::Seconds;

#[derive(Debug, Clone)]
pub struct SpeedScaleState {
    pub child: usize,
    pub scale_value_node: usize,
    pub blend_in_time: Seconds,
    pub is_initialized: bool,
    pub last_update_id: u64,
    pub current_scale: f32,
    pub time_since_activation: Seconds,
}

impl SpeedScaleState {
    pub fn new(child: usize, scale_value_node: usize, blend_in_time: Seconds) -> Self {
        Self {
            child,
            scale_value_node,
            blend_in_time,
            is_initialized: false,
            last_update_id: 0,
            current_scale: 1.0,
            time_since_activation: 0.0,
        }
    }
}

impl NodeLifecycle for SpeedScaleState {
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

#[derive(Debug, Clone)]
pub struct VelocityBasedSpeedScaleState {
    pub child: usize,
    pub desired_velocity_value_node: usize,
    pub clip_velocity: f32,
    pub blend_in_time: Seconds,
    pub is_initialized: bool,
    pub last_update_id: u64,
    pub current_scale: f32,
    pub time_since_activation: Seconds,
}

impl VelocityBasedSpeedScaleState {
    pub fn new(child: usize, desired_velocity_value_node: usize, clip_velocity: f32, blend_in_time: Seconds) -> Self {
        Self {
            child,
            desired_velocity_value_node,
            clip_velocity: clip_velocity.max(1e-6),
            blend_in_time,
            is_initialized: false,
            last_update_id: 0,
            current_scale: 1.0,
            time_since_activation: 0.0,
        }
    }
}

impl NodeLifecycle for VelocityBasedSpeedScaleState {
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

fn ramp(current: f32, target: f32, elapsed: Seconds, blend_in_time: Seconds) -> f32 {
    if blend_in_time <= 0.0 {
        return target;
    }
    let t = (elapsed / blend_in_time).clamp(0.0, 1.0);
    current + (target - current) * t
}

/// Synchronized update is disallowed for speed-scale nodes per `§4.6`; this
/// degrades to unsynchronized and logs, matching `§7`'s local-recovery policy.
fn to_unsynchronized(range: UpdateRange) -> Seconds {
    match range {
        UpdateRange::Unsynchronized { delta_time } => delta_time,
        UpdateRange::Synchronized(_) => {
            eprintln!("speed-scale node: synchronized update is not supported, ignoring sync range");
            0.0
        }
    }
}

pub fn scale_range(state: &mut SpeedScaleState, range: UpdateRange, ctx: &mut GraphContext) -> UpdateRange {
    let dt = to_unsynchronized(range);
    if !state.is_initialized {
        state.time_since_activation = 0.0;
    }
    let target_scale = ctx.values.evaluate(state.scale_value_node).as_float().max(1e-6);
    state.current_scale = ramp(state.current_scale, target_scale, state.time_since_activation, state.blend_in_time);
    state.time_since_activation += dt;
    UpdateRange::Unsynchronized { delta_time: dt * state.current_scale }
}

pub fn finish(state: &mut SpeedScaleState, child_result: PoseNodeResult) -> PoseNodeResult {
    state.set_initialized(true);
    child_result
}

pub fn scale_range_velocity(state: &mut VelocityBasedSpeedScaleState, range: UpdateRange, ctx: &mut GraphContext) -> UpdateRange {
    let dt = to_unsynchronized(range);
    if !state.is_initialized {
        state.time_since_activation = 0.0;
    }
    let desired = ctx.values.evaluate(state.desired_velocity_value_node).as_float();
    let target_scale = (desired / state.clip_velocity).max(1e-6);
    state.current_scale = ramp(state.current_scale, target_scale, state.time_since_activation, state.blend_in_time);
    state.time_since_activation += dt;
    UpdateRange::Unsynchronized { delta_time: dt * state.current_scale }
}

pub fn finish_velocity(state: &mut VelocityBasedSpeedScaleState, child_result: PoseNodeResult) -> PoseNodeResult {
    state.set_initialized(true);
    child_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_reaches_target_after_blend_in_time() {
        let r = ramp(1.0, 2.0, 1.0, 1.0);
        assert!((r - 2.0).abs() < 1e-5);
    }

    #[test]
    fn ramp_partial_progress_interpolates() {
        let r = ramp(1.0, 3.0, 0.5, 1.0);
        assert!((r - 2.0).abs() < 1e-5);
    }

    #[test]
    fn zero_blend_in_time_snaps_immediately() {
        let r = ramp(1.0, 5.0, 0.0, 0.0);
        assert!((r - 5.0).abs() < 1e-5);
    }
}
