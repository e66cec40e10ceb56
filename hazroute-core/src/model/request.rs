//! Optimization request: endpoints, vehicle constraints and objective

use std::time::Duration;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::{Error, Meters, Seconds, geometry::is_valid_lon_lat};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Ambulance,
    FireTruck,
    Police,
    #[default]
    Standard,
}

/// Physical limits of a vehicle class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleProfile {
    /// Highest attainable speed in m/s, also the search heuristic's speed
    pub max_speed: f64,
    /// Grade in percent above which the vehicle slows down
    pub slope_threshold: f64,
    /// Steepest grade in percent the vehicle can handle
    pub max_slope: f64,
    /// Narrowest road the vehicle fits through
    pub min_width: Meters,
}

impl VehicleType {
    pub fn profile(self) -> VehicleProfile {
        match self {
            VehicleType::Ambulance => VehicleProfile {
                max_speed: 33.3,
                slope_threshold: 6.0,
                max_slope: 15.0,
                min_width: 2.5,
            },
            VehicleType::FireTruck => VehicleProfile {
                max_speed: 27.8,
                slope_threshold: 4.0,
                max_slope: 10.0,
                min_width: 3.0,
            },
            VehicleType::Police => VehicleProfile {
                max_speed: 36.1,
                slope_threshold: 8.0,
                max_slope: 18.0,
                min_width: 2.2,
            },
            VehicleType::Standard => VehicleProfile {
                max_speed: 30.6,
                slope_threshold: 8.0,
                max_slope: 20.0,
                min_width: 2.0,
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VehicleType::Ambulance => "ambulance",
            VehicleType::FireTruck => "fire truck",
            VehicleType::Police => "police vehicle",
            VehicleType::Standard => "standard vehicle",
        }
    }
}

/// Hard limits and vehicle characteristics. Absent limits are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConstraints {
    /// Longest acceptable route in meters
    pub max_distance: Option<Meters>,
    /// Longest acceptable travel time in seconds
    pub max_time: Option<Seconds>,
    /// Steepest acceptable grade in percent
    pub max_slope: Option<f64>,
    pub avoid_hazards: bool,
    pub emergency_priority: bool,
    pub vehicle_type: VehicleType,
}

impl Default for VehicleConstraints {
    fn default() -> Self {
        Self {
            max_distance: None,
            max_time: None,
            max_slope: None,
            avoid_hazards: true,
            emergency_priority: false,
            vehicle_type: VehicleType::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    Fastest,
    Shortest,
    Safest,
    MostAccessible,
    #[default]
    Balanced,
}

impl OptimizationMode {
    pub const ALL: [OptimizationMode; 5] = [
        OptimizationMode::Balanced,
        OptimizationMode::Shortest,
        OptimizationMode::Fastest,
        OptimizationMode::Safest,
        OptimizationMode::MostAccessible,
    ];
}

/// Relative importance of the four objectives
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceWeights {
    pub distance: f64,
    pub time: f64,
    pub safety: f64,
    pub accessibility: f64,
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        Self {
            distance: 0.25,
            time: 0.35,
            safety: 0.3,
            accessibility: 0.1,
        }
    }
}

impl PreferenceWeights {
    pub const fn new(distance: f64, time: f64, safety: f64, accessibility: f64) -> Self {
        Self {
            distance,
            time,
            safety,
            accessibility,
        }
    }

    fn values(&self) -> [f64; 4] {
        [self.distance, self.time, self.safety, self.accessibility]
    }

    /// Weights rescaled to sum to one. An all-zero set becomes uniform.
    pub fn normalized(&self) -> Self {
        let sum: f64 = self.values().iter().sum();
        if sum > 0.0 && sum.is_finite() {
            Self::new(
                self.distance / sum,
                self.time / sum,
                self.safety / sum,
                self.accessibility / sum,
            )
        } else {
            Self::new(0.25, 0.25, 0.25, 0.25)
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.values().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidRequest(
                "preference weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = self.values().iter().sum();
        if (sum - 1.0).abs() > 0.05 {
            log::debug!("Preference weights sum to {sum:.3}, normalizing");
        }
        Ok(())
    }
}

/// A single route optimization query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub start: Point<f64>,
    pub destination: Point<f64>,
    #[serde(default)]
    pub waypoints: Vec<Point<f64>>,
    #[serde(default)]
    pub constraints: VehicleConstraints,
    #[serde(default)]
    pub mode: OptimizationMode,
    #[serde(default)]
    pub preferences: PreferenceWeights,
    /// Search time budget in milliseconds, engine default when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl OptimizationRequest {
    pub fn new(start: Point<f64>, destination: Point<f64>) -> Self {
        Self {
            start,
            destination,
            waypoints: Vec::new(),
            constraints: VehicleConstraints::default(),
            mode: OptimizationMode::default(),
            preferences: PreferenceWeights::default(),
            timeout_ms: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: OptimizationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: VehicleConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_waypoints(mut self, waypoints: Vec<Point<f64>>) -> Self {
        self.waypoints = waypoints;
        self
    }

    #[must_use]
    pub fn with_preferences(mut self, preferences: PreferenceWeights) -> Self {
        self.preferences = preferences;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Start, waypoints and destination in travel order
    pub fn stops(&self) -> Vec<Point<f64>> {
        let mut stops = Vec::with_capacity(self.waypoints.len() + 2);
        stops.push(self.start);
        stops.extend(self.waypoints.iter().copied());
        stops.push(self.destination);
        stops
    }

    /// Checks everything that can be checked without the network
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] describing the first problem found
    pub fn validate(&self) -> Result<(), Error> {
        for (idx, point) in self.stops().iter().enumerate() {
            if !is_valid_lon_lat(point) {
                return Err(Error::InvalidRequest(format!(
                    "coordinate #{idx} ({}, {}) is not a valid lon/lat pair",
                    point.x(),
                    point.y()
                )));
            }
        }
        if self.start == self.destination && self.waypoints.is_empty() {
            return Err(Error::InvalidRequest(
                "start and destination are identical".to_string(),
            ));
        }
        self.preferences.validate()?;

        let limits = [
            ("max_distance", self.constraints.max_distance),
            ("max_time", self.constraints.max_time),
            ("max_slope", self.constraints.max_slope),
        ];
        for (name, limit) in limits {
            if let Some(value) = limit
                && (!value.is_finite() || value < 0.0)
            {
                return Err(Error::InvalidRequest(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}
