//! Edge costs, path search and export of computed routes

pub mod cost;
pub mod search;
mod to_geojson;

pub use cost::{Blocked, CostModel, CostParameters, CostWeights, EdgeAssessment, Strategy};
pub use search::{AStar, ConstraintViolations, PathSearchEngine, SearchPhase, SearchReport};
