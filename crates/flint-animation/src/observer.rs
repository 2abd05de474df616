//! Development-only observer hooks. Not part of the core tick contract —
//! a graph instance runs identically whether or not one is attached.

use crate::pose::Transform;

/// Receives notifications as a tick executes. All methods have a default
/// no-op body so implementers only override what they need.
pub trait GraphObserver {
    fn on_task_registered(&mut self, task_index: usize, source_node_index: usize) {
        let _ = (task_index, source_node_index);
    }

    fn on_root_motion_operation(&mut self, description: &str, delta: Transform) {
        let _ = (description, delta);
    }

    fn on_pose_produced(&mut self, node_index: usize) {
        let _ = node_index;
    }
}

/// An observer that discards everything; the default when no recording is
/// requested.
#[derive(Debug, Default)]
pub struct NullObserver;

impl GraphObserver for NullObserver {}

#[derive(Debug, Clone)]
pub struct RootMotionRecord {
    pub description: String,
    pub delta: Transform,
}

/// Ring-buffer recorder for root-motion operations and produced-task source
/// paths, recallable for the previous `N` ticks worth of activity.
pub struct RootMotionRecorder {
    capacity: usize,
    records: Vec<RootMotionRecord>,
    task_sources: Vec<(usize, usize)>,
}

impl RootMotionRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Vec::new(),
            task_sources: Vec::new(),
        }
    }

    pub fn records(&self) -> &[RootMotionRecord] {
        &self.records
    }

    pub fn task_sources(&self) -> &[(usize, usize)] {
        &self.task_sources
    }

    fn push_bounded<T>(buf: &mut Vec<T>, cap: usize, item: T) {
        buf.push(item);
        if buf.len() > cap {
            let overflow = buf.len() - cap;
            buf.drain(0..overflow);
        }
    }
}

impl GraphObserver for RootMotionRecorder {
    fn on_task_registered(&mut self, task_index: usize, source_node_index: usize) {
        Self::push_bounded(&mut self.task_sources, self.capacity, (task_index, source_node_index));
    }

    fn on_root_motion_operation(&mut self, description: &str, delta: Transform) {
        Self::push_bounded(
            &mut self.records,
            self.capacity,
            RootMotionRecord {
                description: description.to_string(),
                delta,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::Vec3;

    #[test]
    fn recorder_bounds_to_capacity() {
        let mut rec = RootMotionRecorder::new(2);
        for i in 0..5 {
            rec.on_task_registered(i, i);
        }
        assert_eq!(rec.task_sources().len(), 2);
        assert_eq!(rec.task_sources()[1], (4, 4));
    }

    #[test]
    fn null_observer_ignores_everything() {
        let mut obs = NullObserver;
        obs.on_task_registered(0, 0);
        obs.on_root_motion_operation("blend", Transform::new(Vec3::ZERO, Default::default(), Vec3::ONE));
    }
}
