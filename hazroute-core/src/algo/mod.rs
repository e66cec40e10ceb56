pub mod comparison;
pub mod metrics;

pub use comparison::{ComparisonRecommendations, RouteComparator, RouteComparison};
pub use metrics::{
    AccessibilityMetrics, ElevationMetrics, PerformanceMetrics, RouteMetrics,
    RouteMetricsCalculator, SafetyMetrics, SlopeMetrics, TrafficMetrics,
};
