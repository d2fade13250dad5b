use super::frontier::{RoadView, SearchFrontier};
use crate::graph::{NodeIx, RoadGraph};
use anyhow::{bail, Result};
use log::{debug, info};
use std::collections::HashMap;

/// Network distances between every vertex and everything it reaches within a
/// fixed radius, computed up front so transitions can skip the search.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    radius: f64,
    distances: HashMap<(NodeIx, NodeIx), f64>,
}

impl PathCache {
    /// Runs one Dijkstra per vertex, stopping once the next vertex lies beyond
    /// `radius` meters. Only settled (exact) distances are stored.
    pub fn build(graph: &RoadGraph, radius: f64) -> Result<Self> {
        if !(radius >= 0.0) {
            bail!("path cache radius should not be negative, got {}", radius);
        }
        info!("start caching paths within {} meters...", radius);
        let mut distances = HashMap::new();
        for source in 0..graph.node_count() {
            let mut frontier = SearchFrontier::new(RoadView::forward(graph));
            frontier.update_distance(source, None, 0.0);
            while let Some(key) = frontier.min_key() {
                if key > radius {
                    break;
                }
                match frontier.settle_next(|_, _| {})? {
                    Some((vertex, distance)) => {
                        distances.insert((source, vertex), distance);
                    }
                    None => break,
                }
            }
            if source % 10000 == 0 {
                debug!("cached paths of {}/{} vertices", source, graph.node_count());
            }
        }
        info!("finish caching paths, {} pairs", distances.len());
        Ok(PathCache { radius, distances })
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Cached distance, None when the pair is farther apart than the radius
    /// or not connected.
    pub fn get(&self, start: NodeIx, end: NodeIx) -> Option<f64> {
        self.distances.get(&(start, end)).copied()
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shortestpath::{get_algo, AlgorithmKind};
    use crate::testutil;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cached_distances_are_exact_within_radius() {
        let graph = testutil::grid_graph(5);
        let radius = 500.0;
        let cache = PathCache::build(&graph, radius).unwrap();
        let dijkstra = get_algo(&graph, AlgorithmKind::Dijkstra).unwrap();
        for s in 0..graph.node_count() {
            for t in 0..graph.node_count() {
                let expected = dijkstra.find_path(s, t).unwrap().length;
                match cache.get(s, t) {
                    Some(distance) => assert_abs_diff_eq!(distance, expected, epsilon = 1e-9),
                    None => assert!(expected > radius, "{} -> {} missing", s, t),
                }
            }
        }
        assert_eq!(cache.get(3, 3), Some(0.0));
    }

    #[test]
    fn one_way_chain_only_caches_forward() {
        let graph = testutil::chain_graph();
        let cache = PathCache::build(&graph, 10_000.0).unwrap();
        let first = graph.network.find_node_by_id(1).unwrap();
        let last = graph.network.find_node_by_id(4).unwrap();
        assert!(cache.get(first, last).is_some());
        assert!(cache.get(last, first).is_none());
        // 4 + 3 + 2 + 1 reachable pairs including the vertices themselves
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn negative_radius_and_weight_are_refused() {
        assert!(PathCache::build(&testutil::chain_graph(), -1.0).is_err());
        assert!(PathCache::build(&testutil::negative_graph(), 1000.0).is_err());
    }
}
