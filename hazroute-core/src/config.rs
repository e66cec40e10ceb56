use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Meters, Seconds};

/// Tuning knobs of the routing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of cached optimization results
    pub cache_ttl_secs: u64,
    /// Maximum number of cached results
    pub cache_capacity: usize,
    /// Search budget used when a request carries no timeout
    pub default_timeout_ms: u64,
    /// Farthest a request point may be from the nearest road node
    pub max_snap_distance: Meters,
    /// Edge-set similarity above which two candidates count as the same path
    pub dedup_similarity: f64,
    /// Distance within which a traffic incident affects an edge
    pub traffic_proximity: Meters,
    /// Penalty for touching a low-severity hazard, scaled by severity
    pub hazard_base_penalty: Seconds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_capacity: 256,
            default_timeout_ms: 5_000,
            max_snap_distance: 500.0,
            dedup_similarity: 0.9,
            traffic_proximity: 30.0,
            hazard_base_penalty: 300.0,
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] for values outside their meaningful range
    pub fn validate(&self) -> Result<(), Error> {
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.dedup_similarity) {
            return Err(Error::Config(format!(
                "dedup_similarity must be within [0, 1], got {}",
                self.dedup_similarity
            )));
        }
        let distances = [
            ("max_snap_distance", self.max_snap_distance),
            ("traffic_proximity", self.traffic_proximity),
            ("hazard_base_penalty", self.hazard_base_penalty),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!("{name} must be non-negative, got {value}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"cache_capacity": 8}"#).unwrap();
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.default_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let config = EngineConfig {
            dedup_similarity: 1.5,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
