use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No road network node found near {lon}, {lat}")]
    NoNodesFound { lon: f64, lat: f64 },
    #[error("Invalid node index")]
    InvalidNodeIndex,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("None of the requested routes are known")]
    EmptyRouteSet,
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
