use super::traj::Observation;
use crate::algorithm::Point;
use crate::graph::EdgeIx;
use crate::shortestpath::AlgorithmKind;
use chrono::{DateTime, Utc};
use geo::LineString;

/**
 * Value types shared by the matcher and route recovery.
 * */

/// Projection of an observation onto one road segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePoint {
    pub edge: EdgeIx,
    pub segment_id: i64,
    pub point: Point,       // projected point on the segment
    pub offset: f64,        // meters from the segment start, within [0, length]
    pub error_distance: f64, // meters between observation and projection
    pub sub_index: usize,   // geometry piece the projection falls on
}

/// One emitted matching result: the chosen candidate, or none when the
/// observation could not be matched.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceState {
    pub candidate: Option<CandidatePoint>,
    pub observation: Observation,
}

impl SequenceState {
    pub fn matched(candidate: CandidatePoint, observation: Observation) -> Self {
        SequenceState {
            candidate: Some(candidate),
            observation,
        }
    }

    pub fn unmatched(observation: Observation) -> Self {
        SequenceState {
            candidate: None,
            observation,
        }
    }
}

/// Matching output, one state per input observation in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedTrajectory {
    pub id: String,
    pub points: Vec<SequenceState>,
}

impl MatchedTrajectory {
    /// Matched positions of the observations that found a candidate.
    pub fn candidate_line(&self) -> LineString<f64> {
        self.points
            .iter()
            .filter_map(|s| s.candidate.map(|c| (c.point.0, c.point.1)))
            .collect::<Vec<_>>()
            .into()
    }

    pub fn segment_ids(&self) -> Vec<Option<i64>> {
        self.points
            .iter()
            .map(|s| s.candidate.map(|c| c.segment_id))
            .collect()
    }

    pub fn matched_count(&self) -> usize {
        self.points.iter().filter(|s| s.candidate.is_some()).count()
    }
}

/// One traversed segment of a recovered route.
#[derive(Debug, Clone, PartialEq)]
pub struct SubRoute {
    pub road_id: i64,
    pub enter_time: DateTime<Utc>,
    pub geometry: LineString<f64>,
}

/// A connected piece of a recovered route. The estimated flags mark boundary
/// times that were approximated rather than interpolated between observations.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOfTrajectory {
    pub id: String,
    pub sub_routes: Vec<SubRoute>,
    pub leave_time: DateTime<Utc>,
    pub enter_estimated: bool,
    pub leave_estimated: bool,
}

impl RouteOfTrajectory {
    pub fn road_ids(&self) -> Vec<i64> {
        self.sub_routes.iter().map(|s| s.road_id).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sigma: f64,  // emission standard deviation, meters
    pub beta: f64,   // transition exponential parameter
    pub radius: f64, // candidate search radius, meters
    pub algorithm: AlgorithmKind,
    pub batched: bool, // compute transitions with the many-to-many engine
    /// precompute distances up to this many meters and look them up before searching
    pub cache_radius: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sigma: 50.0,
            beta: 2.0,
            radius: 50.0,
            algorithm: AlgorithmKind::AStar,
            batched: false,
            cache_radius: None,
        }
    }
}
