//! Passthrough node — forwards a single child's lifecycle and result
//! unchanged. The base every modifier node (speed-scale, root-motion
//! override, target-warp) builds on, per `§4.5`.

use crate::graph_node::{NodeLifecycle, PoseNodeResult};

#[derive(Debug, Clone)]
pub struct PassthroughState {
    pub child: usize,
    pub is_initialized: bool,
    pub last_update_id: u64,
}

impl PassthroughState {
    pub fn new(child: usize) -> Self {
        Self {
            child,
            is_initialized: false,
            last_update_id: 0,
        }
    }
}

impl NodeLifecycle for PassthroughState {
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

pub fn update(state: &mut PassthroughState, child_result: PoseNodeResult) -> PoseNodeResult {
    state.set_initialized(true);
    child_result
}
