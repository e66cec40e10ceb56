use std::{collections::BinaryHeap, time::Instant};

use fixedbitset::FixedBitSet;
use geo::Point;
use log::trace;
use petgraph::{
    graph::{EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use super::state::{SearchPhase, State};
use crate::{DEADLINE_CHECK_INTERVAL, model::RoadNetworkGraph, routing::cost::CostModel};

/// A* search between two nodes under one cost model.
///
/// Scores live in dense vectors indexed by node, closed nodes in a bitset,
/// so one search allocates a few flat buffers regardless of how far it
/// expands.
pub struct AStar<'a> {
    graph: &'a RoadNetworkGraph,
    model: &'a CostModel<'a>,
    goal: NodeIndex,
    goal_point: Point<f64>,
    deadline: Instant,
    phase: SearchPhase,
    scores: Vec<f64>,
    predecessors: Vec<Option<EdgeIndex>>,
    closed: FixedBitSet,
    heap: BinaryHeap<State>,
    expanded: usize,
}

impl<'a> AStar<'a> {
    pub fn new(
        graph: &'a RoadNetworkGraph,
        model: &'a CostModel<'a>,
        start: NodeIndex,
        goal: NodeIndex,
        deadline: Instant,
    ) -> Self {
        let n = graph.node_count();
        let goal_point = graph.graph[goal].geometry;
        let mut search = Self {
            graph,
            model,
            goal,
            goal_point,
            deadline,
            phase: SearchPhase::Init,
            scores: vec![f64::INFINITY; n],
            predecessors: vec![None; n],
            closed: FixedBitSet::with_capacity(n),
            heap: BinaryHeap::with_capacity(n.min(1024)),
            expanded: 0,
        };
        search.scores[start.index()] = 0.0;
        search.heap.push(State {
            estimate: search.estimate(start),
            cost: 0.0,
            node: start,
        });
        search
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Number of nodes closed so far
    pub fn expanded(&self) -> usize {
        self.expanded
    }

    fn estimate(&self, node: NodeIndex) -> f64 {
        self.model.heuristic(self.graph.graph[node].geometry, self.goal_point)
    }

    /// Expands until a terminal phase is reached and returns it
    pub fn run(&mut self) -> SearchPhase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        self.phase = SearchPhase::Expanding;

        while let Some(State { cost, node, .. }) = self.heap.pop() {
            if self.closed.contains(node.index()) {
                continue;
            }
            if node == self.goal {
                self.phase = SearchPhase::Succeeded;
                break;
            }
            self.closed.insert(node.index());
            self.expanded += 1;

            if self.expanded % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
                self.phase = SearchPhase::TimedOut;
                break;
            }

            for edge in self.graph.edges(node) {
                let next = edge.target();
                if self.closed.contains(next.index()) {
                    continue;
                }
                let step = self.model.cost(edge.weight());
                if !step.is_finite() {
                    continue;
                }
                let next_cost = cost + step;
                if next_cost < self.scores[next.index()] {
                    self.scores[next.index()] = next_cost;
                    self.predecessors[next.index()] = Some(edge.id());
                    self.heap.push(State {
                        estimate: next_cost + self.estimate(next),
                        cost: next_cost,
                        node: next,
                    });
                }
            }
        }

        if self.phase == SearchPhase::Expanding {
            self.phase = SearchPhase::Infeasible;
        }
        trace!(
            "A* to {:?} finished as {:?} after {} expansions",
            self.goal, self.phase, self.expanded
        );
        self.phase
    }

    /// Total cost to the goal once the search succeeded
    pub fn cost(&self) -> Option<f64> {
        (self.phase == SearchPhase::Succeeded).then(|| self.scores[self.goal.index()])
    }

    /// Edges from start to goal once the search succeeded
    pub fn path(&self) -> Option<Vec<EdgeIndex>> {
        if self.phase != SearchPhase::Succeeded {
            return None;
        }
        let mut edges = Vec::new();
        let mut node = self.goal;
        while let Some(edge) = self.predecessors[node.index()] {
            edges.push(edge);
            let (source, _) = self.graph.endpoints(edge)?;
            node = source;
        }
        edges.reverse();
        Some(edges)
    }
}
