use super::model::{CandidatePoint, MatchedTrajectory, RouteOfTrajectory, SubRoute};
use super::traj::Observation;
use crate::graph::RoadGraph;
use crate::shortestpath::{ShortestPath, ShortestPathAlgo};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

/**
 * Route recovery: turns matched points into connected route fragments with an
 * entry time per traversed segment.
 *
 * Times between two observations are spread over the connecting path in
 * proportion to distance. Where two matched points cannot be connected (no
 * route, or unmatched observations between them) the fragment is closed at the
 * earlier point's time and the next one opens at the later point's time; both
 * boundaries are flagged as estimated.
 */

fn millis(value: f64) -> Duration {
    Duration::milliseconds(value.round() as i64)
}

// `time` moved by `value` milliseconds, None when that leaves chrono's range
fn shifted(time: DateTime<Utc>, value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    Duration::try_milliseconds(value.round() as i64).and_then(|delta| time.checked_add_signed(delta))
}

pub struct RouteRecovery<'a> {
    graph: &'a RoadGraph,
    algo: &'a dyn ShortestPathAlgo,
}

// a matched point and whether unmatched observations came right before it
struct Anchor<'t> {
    candidate: CandidatePoint,
    observation: &'t Observation,
    after_gap: bool,
}

struct FragmentBuilder {
    id: String,
    sub_routes: Vec<SubRoute>,
    enter_time: DateTime<Utc>,
    enter_estimated: bool,
    routes: Vec<RouteOfTrajectory>,
}

impl FragmentBuilder {
    fn push(&mut self, graph: &RoadGraph, candidate: &CandidatePoint, enter_time: DateTime<Utc>) {
        let segment = graph.segment(candidate.edge);
        self.sub_routes.push(SubRoute {
            road_id: segment.get_id(),
            enter_time,
            geometry: segment.get_geometry().clone(),
        });
    }

    /// Ends the current fragment on the segment of `last`, leaving at `leave_time`.
    fn close(&mut self, graph: &RoadGraph, last: &CandidatePoint, leave_time: DateTime<Utc>, leave_estimated: bool) {
        self.push(graph, last, self.enter_time);
        self.routes.push(RouteOfTrajectory {
            id: self.id.clone(),
            sub_routes: std::mem::take(&mut self.sub_routes),
            leave_time,
            enter_estimated: self.enter_estimated,
            leave_estimated,
        });
    }

    /// Opens a new fragment whose entry time is only an estimate.
    fn reopen(&mut self, enter_time: DateTime<Utc>) {
        self.enter_time = enter_time;
        self.enter_estimated = true;
    }
}

impl<'a> RouteRecovery<'a> {
    pub fn new(graph: &'a RoadGraph, algo: &'a dyn ShortestPathAlgo) -> Self {
        RouteRecovery { graph, algo }
    }

    pub fn recover(&self, matched: &MatchedTrajectory) -> Result<Vec<RouteOfTrajectory>> {
        let mut anchors = Vec::new();
        let mut gap = false;
        for state in &matched.points {
            match state.candidate {
                Some(candidate) => {
                    anchors.push(Anchor {
                        candidate,
                        observation: &state.observation,
                        after_gap: gap && !anchors.is_empty(),
                    });
                    gap = false;
                }
                None => gap = true,
            }
        }

        match anchors.len() {
            0 => Ok(Vec::new()),
            1 => Ok(vec![self.single_point(&matched.id, &anchors[0])]),
            _ => self.connect(&matched.id, &anchors),
        }
    }

    /// Entry and leave times from the segment speed limit around one fix.
    fn single_point(&self, id: &str, anchor: &Anchor) -> RouteOfTrajectory {
        let segment = self.graph.segment(anchor.candidate.edge);
        let time = anchor.observation.time;
        let speed = segment.get_speed_limit() / 3.6;
        let (enter_time, leave_time) = if speed > 0.0 && speed.is_finite() {
            let before = anchor.candidate.offset / speed * 1000.0;
            let after = (segment.get_length() - anchor.candidate.offset) / speed * 1000.0;
            (
                shifted(time, -before).unwrap_or(time),
                shifted(time, after).unwrap_or(time),
            )
        } else {
            (time, time)
        };
        RouteOfTrajectory {
            id: id.to_string(),
            sub_routes: vec![SubRoute {
                road_id: segment.get_id(),
                enter_time,
                geometry: segment.get_geometry().clone(),
            }],
            leave_time,
            enter_estimated: true,
            leave_estimated: true,
        }
    }

    fn connect(&self, id: &str, anchors: &[Anchor]) -> Result<Vec<RouteOfTrajectory>> {
        let network = &self.graph.network;
        let mut builder = FragmentBuilder {
            id: id.to_string(),
            sub_routes: Vec::new(),
            enter_time: anchors[0].observation.time,
            enter_estimated: false,
            routes: Vec::new(),
        };

        for pair in anchors.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            if cur.after_gap {
                debug!("unmatched observations before {}, split route", cur.observation.time);
                builder.close(self.graph, &prev.candidate, prev.observation.time, true);
                builder.reopen(cur.observation.time);
                continue;
            }
            if prev.candidate.edge == cur.candidate.edge {
                continue;
            }
            let path = self.algo.find_path(
                network.end_node(prev.candidate.edge),
                network.start_node(cur.candidate.edge),
            )?;
            if !path.is_reachable() {
                warn!(
                    "segment {} can not reach segment {}, split route",
                    prev.candidate.segment_id, cur.candidate.segment_id
                );
                builder.close(self.graph, &prev.candidate, prev.observation.time, true);
                builder.reopen(cur.observation.time);
                continue;
            }

            let span = (cur.observation.time - prev.observation.time).num_milliseconds() as f64;
            let tail = self.graph.segment(prev.candidate.edge).get_length() - prev.candidate.offset;
            let total = path.length + tail + cur.candidate.offset;
            let (prev_leave, mut cur_enter) = if total > 0.0 {
                (
                    prev.observation.time + millis(tail * span / total),
                    cur.observation.time - millis(cur.candidate.offset * span / total),
                )
            } else {
                (prev.observation.time, cur.observation.time)
            };
            builder.push(self.graph, &prev.candidate, builder.enter_time);
            if path.edges.is_empty() {
                cur_enter = prev_leave;
            } else {
                self.interpolate(&mut builder, &path, prev_leave, cur_enter);
            }
            builder.enter_time = cur_enter;
        }

        let last = &anchors[anchors.len() - 1];
        builder.close(self.graph, &last.candidate, last.observation.time, false);
        Ok(builder.routes)
    }

    /// Entry times of the path segments between `enter` and `leave`, by
    /// cumulative length. The last segment leaves exactly at `leave`.
    fn interpolate(
        &self,
        builder: &mut FragmentBuilder,
        path: &ShortestPath,
        enter: DateTime<Utc>,
        leave: DateTime<Utc>,
    ) {
        let span = (leave - enter).num_milliseconds() as f64;
        let mut covered = 0.0;
        let mut edge_enter = enter;
        for (j, edge) in path.edges.iter().enumerate() {
            let segment = self.graph.segment(*edge);
            builder.sub_routes.push(SubRoute {
                road_id: segment.get_id(),
                enter_time: edge_enter,
                geometry: segment.get_geometry().clone(),
            });
            covered += segment.get_length();
            edge_enter = if j + 1 == path.edges.len() {
                leave
            } else if path.length > 0.0 {
                enter + millis(covered * span / path.length)
            } else {
                enter
            };
        }
    }
}
