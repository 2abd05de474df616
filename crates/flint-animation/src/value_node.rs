//! Value nodes — the typed scalar/vector/target/ID graph that drives pose
//! node parameters. Evaluated before pose nodes each tick (`§4.14` step 1).

use crate::pose::Transform;
use flint_core::Vec3;

/// A value node's runtime output; pose nodes pull whichever variant their
/// parameter expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Float(f32),
    Vector(Vec3),
    Target(Transform),
    Id(u32),
}

impl Value {
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Float(f) => *f != 0.0,
            _ => false,
        }
    }

    pub fn as_float(&self) -> f32 {
        match self {
            Value::Float(f) => *f,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            _ => 0.0,
        }
    }

    pub fn as_vector(&self) -> Vec3 {
        match self {
            Value::Vector(v) => *v,
            _ => Vec3::ZERO,
        }
    }

    pub fn as_target(&self) -> Option<Transform> {
        match self {
            Value::Target(t) => Some(*t),
            _ => None,
        }
    }
}

/// Comparison operators for `ComparisonNode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    fn evaluate(self, a: f32, b: f32) -> bool {
        match self {
            Comparison::Equal => (a - b).abs() < 1e-6,
            Comparison::NotEqual => (a - b).abs() >= 1e-6,
            Comparison::Less => a < b,
            Comparison::LessOrEqual => a <= b,
            Comparison::Greater => a > b,
            Comparison::GreaterOrEqual => a >= b,
        }
    }
}

/// The tagged variants of value node. External parameters are written into
/// `Control` nodes by `GraphInstance::set_parameter`; everything else is
/// derived each tick from its inputs.
#[derive(Debug, Clone)]
pub enum ValueNode {
    /// A constant baked in at compile time.
    Constant(Value),
    /// An externally driven slot, updated once per tick from the caller's
    /// parameter map.
    Control(Value),
    /// Holds the value produced by its child on the *previous* tick,
    /// updating to the current value only at the end of the tick.
    Cached { child: usize, current: Value },
    /// `a (op) b`, both operands resolved from other value-node indices.
    Comparison { op: Comparison, a: usize, b: usize },
    /// Arithmetic combination of two float-valued children.
    Add(usize, usize),
    Multiply(usize, usize),
}

/// Flat value-node array, resolved by index like pose nodes (`§9`).
pub struct ValueNodeGraph {
    nodes: Vec<ValueNode>,
}

impl ValueNodeGraph {
    pub fn new(nodes: Vec<ValueNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Overwrite a `Control` node's value; no-op if `index` isn't a control
    /// node (or out of range) — degrades per `§7` rather than panicking.
    pub fn set_control(&mut self, index: usize, value: Value) {
        if let Some(ValueNode::Control(slot)) = self.nodes.get_mut(index) {
            *slot = value;
        }
    }

    /// Evaluate node `index`, recursively resolving any child indices. Value
    /// nodes form a DAG by construction (same monotonic-index rule as pose
    /// nodes), so this never recurses into a cycle.
    pub fn evaluate(&self, index: usize) -> Value {
        match &self.nodes[index] {
            ValueNode::Constant(v) | ValueNode::Control(v) => *v,
            ValueNode::Cached { current, .. } => *current,
            ValueNode::Comparison { op, a, b } => {
                let av = self.evaluate(*a).as_float();
                let bv = self.evaluate(*b).as_float();
                Value::Bool(op.evaluate(av, bv))
            }
            ValueNode::Add(a, b) => Value::Float(self.evaluate(*a).as_float() + self.evaluate(*b).as_float()),
            ValueNode::Multiply(a, b) => Value::Float(self.evaluate(*a).as_float() * self.evaluate(*b).as_float()),
        }
    }

    /// Advance every `Cached` node's stored value from its child, called
    /// once at tick end after pose nodes have consumed the pre-tick values.
    pub fn advance_caches(&mut self) {
        let refreshed: Vec<(usize, Value)> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                ValueNode::Cached { child, .. } => Some((i, self.evaluate(*child))),
                _ => None,
            })
            .collect();
        for (i, v) in refreshed {
            if let ValueNode::Cached { current, .. } = &mut self.nodes[i] {
                *current = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_evaluates_to_itself() {
        let g = ValueNodeGraph::new(vec![ValueNode::Constant(Value::Float(3.5))]);
        assert_eq!(g.evaluate(0).as_float(), 3.5);
    }

    #[test]
    fn control_node_reflects_set_value() {
        let mut g = ValueNodeGraph::new(vec![ValueNode::Control(Value::Float(0.0))]);
        g.set_control(0, Value::Float(7.0));
        assert_eq!(g.evaluate(0).as_float(), 7.0);
    }

    #[test]
    fn comparison_resolves_children() {
        let g = ValueNodeGraph::new(vec![
            ValueNode::Constant(Value::Float(5.0)),
            ValueNode::Constant(Value::Float(3.0)),
            ValueNode::Comparison { op: Comparison::Greater, a: 0, b: 1 },
        ]);
        assert!(g.evaluate(2).as_bool());
    }

    #[test]
    fn cached_node_lags_by_one_tick() {
        let mut g = ValueNodeGraph::new(vec![
            ValueNode::Control(Value::Float(1.0)),
            ValueNode::Cached { child: 0, current: Value::Float(1.0) },
        ]);
        g.set_control(0, Value::Float(9.0));
        assert_eq!(g.evaluate(1).as_float(), 1.0);
        g.advance_caches();
        assert_eq!(g.evaluate(1).as_float(), 9.0);
    }

    #[test]
    fn add_and_multiply_combine_children() {
        let g = ValueNodeGraph::new(vec![
            ValueNode::Constant(Value::Float(2.0)),
            ValueNode::Constant(Value::Float(3.0)),
            ValueNode::Add(0, 1),
            ValueNode::Multiply(0, 1),
        ]);
        assert_eq!(g.evaluate(2).as_float(), 5.0);
        assert_eq!(g.evaluate(3).as_float(), 6.0);
    }
}
