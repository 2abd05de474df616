//! Parameterized 2-D ("blend space") blend — selects/blends between a
//! triangulated set of source pose nodes by two float parameters, per `§4.9`.

use crate::graph_node::{GraphContext, NodeLifecycle, PoseNodeResult, UpdateRange};
use crate::sampled_event::SampledEventBuffer;
use crate::task::{TaskKind, UpdateStage};

/// One source point's position in parameter space. `input_index` is the
/// position of the corresponding source in `Blend2DState::sources`.
#[derive(Debug, Clone, Copy)]
pub struct BlendSpacePoint {
    pub input_index: usize,
    pub x: f32,
    pub y: f32,
}

/// A triangle referencing three positions in `Blend2DState::points`.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

#[derive(Debug, Clone)]
pub struct Blend2DState {
    pub sources: Vec<usize>,
    pub parameter_x_value_node: usize,
    pub parameter_y_value_node: usize,
    pub points: Vec<BlendSpacePoint>,
    pub triangles: Vec<Triangle>,
    /// Indices into `points`, in order, forming the closed convex hull.
    pub hull: Vec<usize>,
    pub is_initialized: bool,
    pub last_update_id: u64,
}

impl Blend2DState {
    pub fn new(
        sources: Vec<usize>,
        parameter_x_value_node: usize,
        parameter_y_value_node: usize,
        points: Vec<BlendSpacePoint>,
        triangles: Vec<Triangle>,
        hull: Vec<usize>,
    ) -> Self {
        Self {
            sources,
            parameter_x_value_node,
            parameter_y_value_node,
            points,
            triangles,
            hull,
            is_initialized: false,
            last_update_id: 0,
        }
    }

    /// Barycentric coordinates of `(x, y)` in the triangle `a, b, c`
    /// (weights for `a`, `b`, `c` respectively).
    fn barycentric(&self, tri: Triangle, x: f32, y: f32) -> (f32, f32, f32) {
        let pa = self.points[tri.a];
        let pb = self.points[tri.b];
        let pc = self.points[tri.c];
        let (v0x, v0y) = (pb.x - pa.x, pb.y - pa.y);
        let (v1x, v1y) = (pc.x - pa.x, pc.y - pa.y);
        let (v2x, v2y) = (x - pa.x, y - pa.y);
        let d00 = v0x * v0x + v0y * v0y;
        let d01 = v0x * v1x + v0y * v1y;
        let d11 = v1x * v1x + v1y * v1y;
        let d20 = v2x * v0x + v2y * v0y;
        let d21 = v2x * v1x + v2y * v1y;
        let denom = d00 * d11 - d01 * d01;
        if denom.abs() < 1e-8 {
            return (1.0, 0.0, 0.0);
        }
        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        let u = 1.0 - v - w;
        (u, v, w)
    }

    /// Closest point on the closed hull loop, returning `(edge_start,
    /// edge_end, t)` where `t` is the projection parameter along the edge.
    fn closest_hull_edge(&self, x: f32, y: f32) -> (usize, usize, f32) {
        let mut best = (self.hull[0], self.hull[0], 0.0f32);
        let mut best_dist = f32::MAX;
        let n = self.hull.len();
        for i in 0..n {
            let start = self.hull[i];
            let end = self.hull[(i + 1) % n];
            let p0 = self.points[start];
            let p1 = self.points[end];
            let (ex, ey) = (p1.x - p0.x, p1.y - p0.y);
            let len_sq = (ex * ex + ey * ey).max(1e-8);
            let t = (((x - p0.x) * ex + (y - p0.y) * ey) / len_sq).clamp(0.0, 1.0);
            let (cx, cy) = (p0.x + ex * t, p0.y + ey * t);
            let dist = (x - cx).powi(2) + (y - cy).powi(2);
            if dist < best_dist {
                best_dist = dist;
                best = (start, end, t);
            }
        }
        best
    }
}

impl NodeLifecycle for Blend2DState {
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

/// What the locate step resolved to: a single source, a 2-way blend, or a
/// 3-way blend — positions all index into `Blend2DState::points`/`sources`.
enum Selection {
    Single(usize),
    Pair(usize, usize, f32),
    Triple(usize, usize, usize, f32, f32, f32),
}

fn locate(state: &Blend2DState, x: f32, y: f32) -> Selection {
    for &tri in &state.triangles {
        let (u, v, w) = state.barycentric(tri, x, y);
        let eps = 1e-4;
        if u >= -eps && v >= -eps && w >= -eps {
            if u >= 1.0 - eps {
                return Selection::Single(tri.a);
            }
            if v >= 1.0 - eps {
                return Selection::Single(tri.b);
            }
            if w >= 1.0 - eps {
                return Selection::Single(tri.c);
            }
            return Selection::Triple(tri.a, tri.b, tri.c, u.max(0.0), v.max(0.0), w.max(0.0));
        }
    }

    let (start, end, t) = state.closest_hull_edge(x, y);
    if t <= 1e-4 {
        return Selection::Single(start);
    }
    if t >= 1.0 - 1e-4 {
        return Selection::Single(end);
    }
    Selection::Pair(start, end, t)
}

pub fn update(
    state: &mut Blend2DState,
    ctx: &mut GraphContext,
    child_results: Vec<(usize, PoseNodeResult)>,
    source_node_index: usize,
) -> PoseNodeResult {
    state.set_initialized(true);
    state.set_last_update_id(ctx.update_id);

    let x = ctx.values.evaluate(state.parameter_x_value_node).as_float();
    let y = ctx.values.evaluate(state.parameter_y_value_node).as_float();

    match locate(state, x, y) {
        Selection::Single(point_idx) => {
            let active = state.points[point_idx].input_index;
            let (_, result) = child_results[active];
            roll_back_inactive(&child_results, &[active], ctx, result)
        }
        Selection::Pair(a, b, weight) => {
            let idx_a = state.points[a].input_index;
            let idx_b = state.points[b].input_index;
            let (_, result_a) = child_results[idx_a];
            let (_, result_b) = child_results[idx_b];
            roll_back_inactive(&child_results, &[idx_a, idx_b], ctx, PoseNodeResult::NONE);
            blend_pair(ctx, source_node_index, result_a, result_b, weight)
        }
        Selection::Triple(a, b, c, wa, wb, wc) => {
            let idx_a = state.points[a].input_index;
            let idx_b = state.points[b].input_index;
            let idx_c = state.points[c].input_index;
            let (_, result_a) = child_results[idx_a];
            let (_, result_b) = child_results[idx_b];
            let (_, result_c) = child_results[idx_c];
            roll_back_inactive(&child_results, &[idx_a, idx_b, idx_c], ctx, PoseNodeResult::NONE);

            let ab_weight = if wa + wb > 1e-6 { wb / (wa + wb) } else { 0.0 };
            let ab = blend_pair(ctx, source_node_index, result_a, result_b, ab_weight);
            blend_pair(ctx, source_node_index, ab, result_c, wc)
        }
    }
}

/// Registers a single `Blend` task combining two already-resolved results,
/// falling back to whichever side has no task if the other is missing.
fn blend_pair(
    ctx: &mut GraphContext,
    source_node_index: usize,
    a: PoseNodeResult,
    b: PoseNodeResult,
    weight: f32,
) -> PoseNodeResult {
    let Some(a_task) = a.task_index else { return b };
    let Some(b_task) = b.task_index else { return a };

    let blend_task = ctx.tasks.register(
        source_node_index,
        vec![a_task, b_task],
        UpdateStage::Any,
        TaskKind::Blend { source: a_task, target: b_task, weight, mask: None },
        ctx.observer,
    );

    let root_motion_delta = crate::root_motion::blend_root_motion_deltas(
        a.root_motion_delta,
        b.root_motion_delta,
        weight,
        crate::root_motion::RootMotionBlendMode::Blend,
    );
    let sampled_event_range = SampledEventBuffer::combine(a.sampled_event_range, b.sampled_event_range);

    PoseNodeResult {
        task_index: Some(blend_task),
        root_motion_delta,
        sampled_event_range,
    }
}

/// Marks every source's sampled events as ignored except those at
/// `active_positions` (positions into `child_results`/`sources`, not the
/// arena node index each tuple carries).
fn roll_back_inactive(
    child_results: &[(usize, PoseNodeResult)],
    active_positions: &[usize],
    ctx: &mut GraphContext,
    active_result: PoseNodeResult,
) -> PoseNodeResult {
    for (position, &(_, result)) in child_results.iter().enumerate() {
        if !active_positions.contains(&position) && !result.sampled_event_range.is_empty() {
            ctx.events.mark_ignored(result.sampled_event_range);
        }
    }
    active_result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_state() -> Blend2DState {
        let points = vec![
            BlendSpacePoint { input_index: 0, x: 0.0, y: 0.0 },
            BlendSpacePoint { input_index: 1, x: 1.0, y: 0.0 },
            BlendSpacePoint { input_index: 2, x: 1.0, y: 1.0 },
            BlendSpacePoint { input_index: 3, x: 0.0, y: 1.0 },
        ];
        let triangles = vec![Triangle { a: 0, b: 1, c: 2 }, Triangle { a: 0, b: 2, c: 3 }];
        let hull = vec![0, 1, 2, 3];
        Blend2DState::new(vec![0, 1, 2, 3], 0, 1, points, triangles, hull)
    }

    #[test]
    fn locate_inside_triangle_gives_triple() {
        let state = square_state();
        match locate(&state, 0.5, 0.2) {
            Selection::Triple(..) => {}
            _ => panic!("expected a triple selection"),
        }
    }

    #[test]
    fn locate_exact_vertex_collapses_to_single() {
        let state = square_state();
        match locate(&state, 0.0, 0.0) {
            Selection::Single(idx) => assert_eq!(idx, 0),
            _ => panic!("expected a single selection at the exact vertex"),
        }
    }

    #[test]
    fn locate_outside_hull_projects_to_closest_edge() {
        let state = square_state();
        match locate(&state, 0.5, -1.0) {
            Selection::Pair(a, b, t) => {
                assert_eq!((a, b), (0, 1));
                assert!((t - 0.5).abs() < 1e-3);
            }
            _ => panic!("expected an edge pair"),
        }
    }
}
