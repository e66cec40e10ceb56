//! Small planar helpers over geographic coordinates.
//!
//! Hazard buffers and traffic proximity are expressed in meters while the
//! network is stored in lon/lat degrees. Geometries are projected to a local
//! equirectangular plane around a reference latitude before measuring, which
//! is accurate to well under a percent over city-sized extents.

use geo::{
    Coord, Distance, Euclidean, Haversine, Intersects, LineString, MapCoords, Point, Polygon, Rect,
};

use crate::Meters;

pub(crate) const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalProjection {
    lon_scale: f64,
}

impl LocalProjection {
    pub(crate) fn around(latitude: f64) -> Self {
        Self {
            lon_scale: METERS_PER_DEGREE * latitude.to_radians().cos().max(0.01),
        }
    }

    pub(crate) fn coord(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: c.x * self.lon_scale,
            y: c.y * METERS_PER_DEGREE,
        }
    }

    pub(crate) fn point(&self, p: Point<f64>) -> Point<f64> {
        Point::from(self.coord(p.0))
    }

    pub(crate) fn line(&self, line: &LineString<f64>) -> LineString<f64> {
        line.map_coords(|c| self.coord(c))
    }

    pub(crate) fn polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        polygon.map_coords(|c| self.coord(c))
    }
}

/// Great-circle distance between two lon/lat points
pub(crate) fn haversine(a: Point<f64>, b: Point<f64>) -> Meters {
    Haversine.distance(a, b)
}

/// Sum of great-circle distances along a line
pub(crate) fn line_length(line: &LineString<f64>) -> Meters {
    line.lines()
        .map(|segment| haversine(segment.start.into(), segment.end.into()))
        .sum()
}

/// Distance in meters between a projected line and a projected polygon,
/// zero when they touch or the line runs inside the polygon.
pub(crate) fn line_polygon_distance(line: &LineString<f64>, polygon: &Polygon<f64>) -> Meters {
    if line.intersects(polygon) {
        0.0
    } else {
        Euclidean.distance(line, polygon)
    }
}

pub(crate) fn point_line_distance(point: &Point<f64>, line: &LineString<f64>) -> Meters {
    Euclidean.distance(point, line)
}

/// Grows a lon/lat rectangle by a margin given in meters
pub(crate) fn expand_rect(rect: Rect<f64>, margin: Meters) -> Rect<f64> {
    let center_lat = rect.center().y;
    let dy = margin / METERS_PER_DEGREE;
    let dx = margin / (METERS_PER_DEGREE * center_lat.to_radians().cos().max(0.01));
    Rect::new(
        Coord {
            x: rect.min().x - dx,
            y: rect.min().y - dy,
        },
        Coord {
            x: rect.max().x + dx,
            y: rect.max().y + dy,
        },
    )
}

/// Approximates a circle of `radius` meters around `center` with a polygon
pub(crate) fn circle_polygon(center: Point<f64>, radius: Meters, vertices: usize) -> Polygon<f64> {
    let vertices = vertices.max(8);
    let dy = radius / METERS_PER_DEGREE;
    let dx = radius / (METERS_PER_DEGREE * center.y().to_radians().cos().max(0.01));
    let ring: Vec<Coord<f64>> = (0..vertices)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = std::f64::consts::TAU * i as f64 / vertices as f64;
            Coord {
                x: center.x() + dx * angle.cos(),
                y: center.y() + dy * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}

/// Finite longitude in [-180, 180] and latitude in [-90, 90]
pub fn is_valid_lon_lat(point: &Point<f64>) -> bool {
    point.x().is_finite()
        && point.y().is_finite()
        && (-180.0..=180.0).contains(&point.x())
        && (-90.0..=90.0).contains(&point.y())
}
