pub mod cache;
pub mod ch;
pub mod frontier;
pub mod many;
pub mod single;

use crate::graph::{EdgeIx, NodeIx, RoadGraph};
use crate::mm::model::CandidatePoint;
use anyhow::{anyhow, Result};

pub use cache::PathCache;
pub use many::{DistanceTable, ManyToMany};

/// Shortest-path algorithm families the matcher can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum AlgorithmKind {
    AStar,
    Dijkstra,
    BiDijkstra,
    BiAStar,
    Ch,
}

/// Result of a single-pair query. Unreachable pairs carry an infinite length
/// and no edges.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPath {
    pub length: f64,
    pub edges: Vec<EdgeIx>,
}

impl ShortestPath {
    pub fn empty() -> Self {
        ShortestPath {
            length: 0.0,
            edges: Vec::new(),
        }
    }

    pub fn unreachable() -> Self {
        ShortestPath {
            length: f64::INFINITY,
            edges: Vec::new(),
        }
    }

    /// Path over real segments; the length is the sum of their lengths in order.
    pub fn from_edges(graph: &RoadGraph, edges: Vec<EdgeIx>) -> Self {
        let length = edges.iter().map(|e| graph.segment(*e).get_length()).sum();
        ShortestPath { length, edges }
    }

    pub fn is_reachable(&self) -> bool {
        self.length.is_finite()
    }
}

pub trait ShortestPathAlgo {
    fn graph(&self) -> &RoadGraph;

    /// Best path between two network vertices.
    fn find_path(&self, start: NodeIx, end: NodeIx) -> Result<ShortestPath>;

    /// Route length between two candidate points: the graph distance from the end
    /// of the previous segment to the start of the current one plus the two
    /// offsets. Infinite when no route exists.
    fn find_path_between_candidates(
        &self,
        prev: &CandidatePoint,
        cur: &CandidatePoint,
    ) -> Result<f64> {
        if let Some(distance) = same_segment_distance(prev, cur) {
            return Ok(distance);
        }
        let graph = self.graph();
        let path = self.find_path(
            graph.network.end_node(prev.edge),
            graph.network.start_node(cur.edge),
        )?;
        if !path.is_reachable() {
            return Ok(f64::INFINITY);
        }
        Ok(candidate_route_length(graph, prev, cur, path.length))
    }
}

/// Distance between two candidates on one segment when the second is not behind the first.
pub fn same_segment_distance(prev: &CandidatePoint, cur: &CandidatePoint) -> Option<f64> {
    if prev.edge == cur.edge && cur.offset >= prev.offset {
        Some(cur.offset - prev.offset)
    } else {
        None
    }
}

/// Adds the remainder of the previous segment and the head of the current one
/// to a graph distance between them.
pub fn candidate_route_length(
    graph: &RoadGraph,
    prev: &CandidatePoint,
    cur: &CandidatePoint,
    graph_distance: f64,
) -> f64 {
    let remainder = graph.segment(prev.edge).get_length() - prev.offset;
    graph_distance + remainder + cur.offset
}

/// Builds the single-pair algorithm for `kind`. Selecting CH without a
/// precomputed hierarchy fails here rather than at query time.
pub fn get_algo<'a>(
    graph: &'a RoadGraph,
    kind: AlgorithmKind,
) -> Result<Box<dyn ShortestPathAlgo + 'a>> {
    Ok(match kind {
        AlgorithmKind::Dijkstra => Box::new(single::Dijkstra::new(graph)),
        AlgorithmKind::AStar => Box::new(single::AStar::new(graph)),
        AlgorithmKind::BiDijkstra => Box::new(single::Bidirectional::dijkstra(graph)),
        AlgorithmKind::BiAStar => Box::new(single::Bidirectional::astar(graph)),
        AlgorithmKind::Ch => {
            let hierarchy = graph
                .contraction_hierarchy()
                .ok_or_else(|| anyhow!("contraction hierarchy should be precomputed before selecting CH"))?;
            Box::new(ch::ChQuery::new(graph, hierarchy))
        }
    })
}
