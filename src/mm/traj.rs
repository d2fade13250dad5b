use crate::algorithm::Point;
use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};

/// One raw GPS fix.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub point: Point,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub id: String,
    pub observations: Vec<Observation>,
}

impl Trajectory {
    /// Observations one second apart starting at the epoch.
    pub fn from_points(id: impl Into<String>, points: Vec<Point>) -> Result<Self> {
        Trajectory::with_timestamps(id, points, None)
    }

    /// `timestamps` are epoch seconds, one per point.
    pub fn with_timestamps(
        id: impl Into<String>,
        points: Vec<Point>,
        timestamps: Option<Vec<i64>>,
    ) -> Result<Self> {
        let id = id.into();
        let timestamps = match timestamps {
            Some(ts) if ts.len() != points.len() => {
                return Err(anyhow!(
                    "trajectory {} has {} points but {} timestamps",
                    id,
                    points.len(),
                    ts.len()
                ))
            }
            Some(ts) => ts,
            None => (0..points.len() as i64).collect(),
        };
        let mut observations = Vec::with_capacity(points.len());
        for (point, secs) in points.into_iter().zip(timestamps) {
            let time = Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| anyhow!("timestamp {} out of range", secs))?;
            observations.push(Observation { point, time });
        }
        Ok(Trajectory { id, observations })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

pub struct TrajectorySet {
    pub trajs: Vec<Trajectory>,
}

fn positions_to_points(positions: Vec<geojson::Position>) -> Result<Vec<Point>> {
    positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [lng, lat, ..] => Ok(Point(*lng, *lat)),
            _ => Err(anyhow!("position needs longitude and latitude")),
        })
        .collect()
}

fn trajectory_from_geometry(
    id: String,
    geometry: geojson::Geometry,
    timestamps: Option<Vec<i64>>,
) -> Result<Trajectory> {
    let points = match geometry.value {
        geojson::Value::LineString(line) => positions_to_points(line)?,
        geojson::Value::MultiPoint(points) => positions_to_points(points)?,
        _ => return Err(anyhow!("geometry only support LineString, MultiPoint")),
    };
    Trajectory::with_timestamps(id, points, timestamps)
}

fn trajectory_from_feature(index: usize, feature: geojson::Feature) -> Result<Trajectory> {
    let id = match &feature.id {
        Some(geojson::feature::Id::String(s)) => s.clone(),
        Some(geojson::feature::Id::Number(n)) => n.to_string(),
        None => feature
            .property("id")
            .map(|v| match v.as_str() {
                Some(s) => s.to_string(),
                None => v.to_string(),
            })
            .unwrap_or_else(|| index.to_string()),
    };
    let timestamps = match feature.property("timestamps") {
        Some(value) => {
            let array = value
                .as_array()
                .ok_or_else(|| anyhow!("timestamps of {} should be an array", id))?;
            let secs = array
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| anyhow!("timestamp {} is not an integer", v)))
                .collect::<Result<Vec<i64>>>()?;
            Some(secs)
        }
        None => None,
    };
    let geometry = feature
        .geometry
        .ok_or_else(|| anyhow!("feature {} has no geometry", id))?;
    trajectory_from_geometry(id, geometry, timestamps)
}

impl TryFrom<geojson::GeoJson> for TrajectorySet {
    type Error = anyhow::Error;
    fn try_from(value: geojson::GeoJson) -> Result<Self, Self::Error> {
        let trajs = match value {
            geojson::GeoJson::FeatureCollection(fc) => fc
                .features
                .into_iter()
                .enumerate()
                .map(|(i, f)| trajectory_from_feature(i, f))
                .collect::<Result<Vec<_>>>()?,
            geojson::GeoJson::Feature(feature) => vec![trajectory_from_feature(0, feature)?],
            geojson::GeoJson::Geometry(geom) => {
                vec![trajectory_from_geometry("0".to_string(), geom, None)?]
            }
        };
        Ok(TrajectorySet { trajs })
    }
}

impl TryFrom<wkt::Wkt<f64>> for TrajectorySet {
    type Error = anyhow::Error;
    fn try_from(value: wkt::Wkt<f64>) -> Result<Self, Self::Error> {
        let points = match value.item {
            wkt::Geometry::LineString(line) => line.0.into_iter().map(|c| Point(c.x, c.y)).collect(),
            wkt::Geometry::MultiPoint(multi_points) => multi_points
                .0
                .into_iter()
                .map(|p| {
                    p.0.map(|c| Point(c.x, c.y))
                        .ok_or_else(|| anyhow!("empty point in multipoint"))
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(anyhow!("wkt only support LineString, MultiPoint")),
        };
        Ok(TrajectorySet {
            trajs: vec![Trajectory::from_points("0", points)?],
        })
    }
}
