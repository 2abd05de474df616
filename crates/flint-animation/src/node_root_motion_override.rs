//! Root-motion override node — replaces selected axes of a child's
//! root-motion delta with a desired heading velocity/facing, per `§4.7`.

use crate::graph_node::{GraphContext, NodeLifecycle, PoseNodeResult, UpdateRange};
use crate::pose::Transform;
use crate::time::Seconds;
use flint_core::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendState {
    FullyOut,
    BlendingIn,
    FullyIn,
    BlendingOut,
}

#[derive(Debug, Clone)]
pub struct RootMotionOverrideState {
    pub child: usize,
    pub desired_velocity_value_node: usize,
    pub desired_facing_value_node: usize,
    pub max_linear_velocity: Option<f32>,
    pub max_angular_velocity: Option<f32>,
    pub allow_heading_x: bool,
    pub allow_heading_y: bool,
    pub allow_heading_z: bool,
    pub listen_for_events: bool,
    pub is_initialized: bool,
    pub last_update_id: u64,
    pub blend_state: BlendState,
    pub blend_duration: Seconds,
    pub blend_elapsed: Seconds,
}

impl RootMotionOverrideState {
    pub fn new(child: usize, desired_velocity_value_node: usize, desired_facing_value_node: usize) -> Self {
        Self {
            child,
            desired_velocity_value_node,
            desired_facing_value_node,
            max_linear_velocity: None,
            max_angular_velocity: None,
            allow_heading_x: true,
            allow_heading_y: true,
            allow_heading_z: true,
            listen_for_events: false,
            is_initialized: false,
            last_update_id: 0,
            blend_state: BlendState::FullyOut,
            blend_duration: 0.2,
            blend_elapsed: 0.0,
        }
    }

    fn weight(&self) -> f32 {
        match self.blend_state {
            BlendState::FullyOut => 0.0,
            BlendState::FullyIn => 1.0,
            BlendState::BlendingIn => (self.blend_elapsed / self.blend_duration.max(1e-6)).clamp(0.0, 1.0),
            BlendState::BlendingOut => 1.0 - (self.blend_elapsed / self.blend_duration.max(1e-6)).clamp(0.0, 1.0),
        }
    }
}

impl NodeLifecycle for RootMotionOverrideState {
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

fn parse_event_duration(payload: &str) -> Option<Seconds> {
    payload
        .strip_prefix("RootMotionOverride")
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|d| d.parse::<f32>().ok())
}

pub fn update(
    state: &mut RootMotionOverrideState,
    range: UpdateRange,
    child_result: PoseNodeResult,
    ctx: &mut GraphContext,
    source_node_index: usize,
) -> PoseNodeResult {
    state.set_initialized(true);
    state.set_last_update_id(ctx.update_id);

    let dt = match range {
        UpdateRange::Unsynchronized { delta_time } => delta_time,
        UpdateRange::Synchronized(_) => 0.0,
    };

    if state.listen_for_events {
        for ev in ctx.events.events(child_result.sampled_event_range) {
            if let Some(duration) = parse_event_duration(&ev.event.payload) {
                state.blend_duration = duration.max(1e-6);
                state.blend_elapsed = 0.0;
                state.blend_state = match state.blend_state {
                    BlendState::FullyOut | BlendState::BlendingOut => BlendState::BlendingIn,
                    BlendState::FullyIn | BlendState::BlendingIn => BlendState::BlendingOut,
                };
            }
        }
    }

    match state.blend_state {
        BlendState::BlendingIn if state.blend_elapsed >= state.blend_duration => state.blend_state = BlendState::FullyIn,
        BlendState::BlendingOut if state.blend_elapsed >= state.blend_duration => state.blend_state = BlendState::FullyOut,
        _ => {}
    }
    state.blend_elapsed += dt;

    let weight = state.weight();
    if weight <= 0.0 {
        return child_result;
    }

    let desired_velocity = ctx.values.evaluate(state.desired_velocity_value_node).as_vector();
    let desired_facing = ctx.values.evaluate(state.desired_facing_value_node).as_vector();

    let any_heading_allowed = state.allow_heading_x || state.allow_heading_y || state.allow_heading_z;
    let mut translation = child_result.root_motion_delta.translation;
    if any_heading_allowed {
        let mut desired_delta = desired_velocity * dt;
        if let Some(max_linear) = state.max_linear_velocity {
            let cap = max_linear * dt;
            if desired_delta.length() > cap && desired_delta.length() > 1e-8 {
                desired_delta = desired_delta.normalized() * cap;
            }
        }
        if state.allow_heading_x {
            translation.x = desired_delta.x;
        }
        if state.allow_heading_y {
            translation.y = desired_delta.y;
        }
        if state.allow_heading_z {
            translation.z = desired_delta.z;
        }
    }

    let rotation = if desired_facing.length() > 1e-6 {
        let forward = Vec3::FORWARD;
        let target = desired_facing.normalized();
        let axis = forward.cross(&target);
        let dot = forward.dot(&target).clamp(-1.0, 1.0);
        let mut angle = dot.acos();
        if let Some(max_angular) = state.max_angular_velocity {
            angle = angle.min(max_angular * dt);
        }
        if axis.length() > 1e-8 {
            Quat::from_axis_angle(&axis.normalized(), angle)
        } else {
            Quat::IDENTITY
        }
    } else {
        child_result.root_motion_delta.rotation
    };

    let overridden = Transform {
        translation,
        rotation,
        scale: child_result.root_motion_delta.scale,
    };

    let blended = crate::root_motion::blend_root_motion_deltas(
        child_result.root_motion_delta,
        overridden,
        weight,
        crate::root_motion::RootMotionBlendMode::Blend,
    );
    ctx.observer.on_root_motion_operation("root_motion_override", blended);
    let _ = source_node_index;

    PoseNodeResult {
        root_motion_delta: blended,
        ..child_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_from_event_payload() {
        assert_eq!(parse_event_duration("RootMotionOverride:0.5"), Some(0.5));
        assert_eq!(parse_event_duration("other"), None);
    }

    #[test]
    fn fully_out_weight_is_zero() {
        let state = RootMotionOverrideState::new(0, 1, 2);
        assert_eq!(state.weight(), 0.0);
    }

    #[test]
    fn fully_in_weight_is_one() {
        let mut state = RootMotionOverrideState::new(0, 1, 2);
        state.blend_state = BlendState::FullyIn;
        assert_eq!(state.weight(), 1.0);
    }

    #[test]
    fn blending_in_ramps_linearly() {
        let mut state = RootMotionOverrideState::new(0, 1, 2);
        state.blend_state = BlendState::BlendingIn;
        state.blend_duration = 1.0;
        state.blend_elapsed = 0.5;
        assert!((state.weight() - 0.5).abs() < 1e-5);
    }
}
