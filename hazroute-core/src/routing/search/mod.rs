//! Constrained A* search and multi-strategy candidate generation

mod astar;
mod candidates;
mod state;

pub use astar::AStar;
pub use candidates::{ConstraintViolations, PathSearchEngine, SearchReport};
pub use state::SearchPhase;
