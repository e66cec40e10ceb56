use std::cmp::Ordering;

use petgraph::graph::NodeIndex;

/// Lifecycle of a single point-to-point search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Init,
    Expanding,
    /// Goal reached, path available
    Succeeded,
    /// Frontier exhausted without reaching the goal
    Infeasible,
    /// Deadline passed during expansion
    TimedOut,
}

impl SearchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SearchPhase::Succeeded | SearchPhase::Infeasible | SearchPhase::TimedOut
        )
    }
}

/// Frontier entry ordered by estimated total cost
#[derive(Copy, Clone, Debug)]
pub(super) struct State {
    pub(super) estimate: f64,
    pub(super) cost: f64,
    pub(super) node: NodeIndex,
}

// Min-heap by estimate (reversed from standard Rust BinaryHeap)
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.cost.total_cmp(&self.cost))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}
