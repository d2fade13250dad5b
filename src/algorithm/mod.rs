use anyhow::Result;
use geo::algorithm::haversine_distance::HaversineDistance;
use geo::{Closest, ClosestPoint, LineString};
use geojson::{Geometry, Value};

/**
 * Geometry primitives shared by the network, the searches and the matcher.
 * Coordinates are (lng, lat) in degrees, distances are meters.
 */

pub const EARTH_RADIUS_IN_METER: f64 = 6378137.0;

/// (lng, lat)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point(pub f64, pub f64);

impl From<Point> for geo::Point<f64> {
    fn from(p: Point) -> Self {
        geo::Point::new(p.0, p.1)
    }
}

impl From<geo::Point<f64>> for Point {
    fn from(p: geo::Point<f64>) -> Self {
        Point(p.x(), p.y())
    }
}

/// Great-circle distance between two points.
pub fn haversine_distance(a: &Point, b: &Point) -> f64 {
    geo::Point::from(*a).haversine_distance(&geo::Point::from(*b))
}

/// Sum of the haversine lengths of every piece of the polyline.
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|l| l.start_point().haversine_distance(&l.end_point()))
        .sum()
}

/// Converts a geojson LineString into a geo one.
pub fn linestring_from_geometry(geometry: &Geometry) -> Result<LineString<f64>> {
    match &geometry.value {
        Value::LineString(line_string) => {
            if line_string.len() < 2 {
                return Err(anyhow::anyhow!("linestring needs at least two points"));
            }
            let coords: Vec<(f64, f64)> = line_string.iter().map(|p| (p[0], p[1])).collect();
            Ok(LineString::from(coords))
        }
        _ => Err(anyhow::anyhow!("geometry is not linestring")),
    }
}

/// Haversine length of a geojson LineString.
pub fn linestring_distance(geometry: &Geometry) -> Result<f64> {
    Ok(line_length(&linestring_from_geometry(geometry)?))
}

/// Where a point lands on a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub point: Point,
    /// distance between the raw point and its projection
    pub error_distance: f64,
    /// distance along the polyline from its first coordinate
    pub offset: f64,
    /// index of the polyline piece the projection falls on
    pub sub_index: usize,
}

/// Projects `point` onto the closest piece of `line`. Ties keep the earliest piece.
pub fn project_to_line(point: &Point, line: &LineString<f64>) -> Option<Projection> {
    let target = geo::Point::from(*point);
    let mut walked = 0.0;
    let mut best: Option<Projection> = None;
    for (index, piece) in line.lines().enumerate() {
        let start = piece.start_point();
        let closest = match piece.closest_point(&target) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p,
            Closest::Indeterminate => start,
        };
        let error_distance = target.haversine_distance(&closest);
        let better = match &best {
            Some(b) => error_distance < b.error_distance,
            None => true,
        };
        if better {
            best = Some(Projection {
                point: closest.into(),
                error_distance,
                offset: walked + start.haversine_distance(&closest),
                sub_index: index,
            });
        }
        walked += start.haversine_distance(&piece.end_point());
    }
    best
}

/// Half-extent in degrees (lng, lat) of a box covering `meters` around `point`.
pub fn degree_buffer(point: &Point, meters: f64) -> (f64, f64) {
    let perimeter = 2.0 * std::f64::consts::PI * EARTH_RADIUS_IN_METER;
    let lat_buffer = meters * 360.0 / perimeter;
    let cos_lat = point.1.to_radians().cos().abs().max(1e-6);
    (lat_buffer / cos_lat, lat_buffer)
}
