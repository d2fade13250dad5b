use super::frontier::{join_at, RoadView, SearchFrontier, SearchSpace};
use super::{ShortestPath, ShortestPathAlgo};
use crate::graph::{NodeIx, RoadGraph};
use anyhow::Result;
use log::trace;

/**
 * One-to-one searches over the plain road graph: Dijkstra, A*, and their
 * bidirectional versions. A* uses the great-circle distance to the target,
 * which never overestimates a road distance.
 */

fn one_directional(graph: &RoadGraph, start: NodeIx, end: NodeIx, astar: bool) -> Result<ShortestPath> {
    if start == end {
        return Ok(ShortestPath::empty());
    }
    let view = RoadView::forward(graph);
    let mut frontier = if astar {
        SearchFrontier::with_heuristic(view, graph.node_point(end))
    } else {
        SearchFrontier::new(view)
    };
    frontier.update_distance(start, None, 0.0);
    let mut settled = 0usize;
    while let Some((vertex, _)) = frontier.settle_next(|_, _| {})? {
        settled += 1;
        if vertex == end {
            trace!("{} -> {} settled {} vertices", start, end, settled);
            let mut edges = frontier.tree_path(end);
            edges.reverse();
            return Ok(ShortestPath::from_edges(graph, edges));
        }
    }
    Ok(ShortestPath::unreachable())
}

pub struct Dijkstra<'a> {
    graph: &'a RoadGraph,
}

impl<'a> Dijkstra<'a> {
    pub fn new(graph: &'a RoadGraph) -> Self {
        Dijkstra { graph }
    }
}

impl ShortestPathAlgo for Dijkstra<'_> {
    fn graph(&self) -> &RoadGraph {
        self.graph
    }

    fn find_path(&self, start: NodeIx, end: NodeIx) -> Result<ShortestPath> {
        one_directional(self.graph, start, end, false)
    }
}

pub struct AStar<'a> {
    graph: &'a RoadGraph,
}

impl<'a> AStar<'a> {
    pub fn new(graph: &'a RoadGraph) -> Self {
        AStar { graph }
    }
}

impl ShortestPathAlgo for AStar<'_> {
    fn graph(&self) -> &RoadGraph {
        self.graph
    }

    fn find_path(&self, start: NodeIx, end: NodeIx) -> Result<ShortestPath> {
        one_directional(self.graph, start, end, true)
    }
}

/// Best meeting found so far between two frontiers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Meeting {
    pub vertex: Option<NodeIx>,
    pub length: f64,
}

impl Meeting {
    pub fn none() -> Self {
        Meeting {
            vertex: None,
            length: f64::INFINITY,
        }
    }

    pub fn offer(&mut self, vertex: NodeIx, length: f64) {
        if length < self.length {
            self.vertex = Some(vertex);
            self.length = length;
        }
    }
}

/// Marks the frontier finished once it is empty or cannot beat `best`.
pub(crate) fn check_finished<S: SearchSpace>(frontier: &mut SearchFrontier<S>, best: f64) {
    if frontier.finished {
        return;
    }
    match frontier.min_key() {
        Some(key) if key <= best => {}
        _ => frontier.finished = true,
    }
}

/// Bidirectional Dijkstra, or bidirectional A* when `astar` is set (forward keys
/// aim at the sink, backward keys at the source).
pub struct Bidirectional<'a> {
    graph: &'a RoadGraph,
    astar: bool,
}

impl<'a> Bidirectional<'a> {
    pub fn dijkstra(graph: &'a RoadGraph) -> Self {
        Bidirectional {
            graph,
            astar: false,
        }
    }

    pub fn astar(graph: &'a RoadGraph) -> Self {
        Bidirectional { graph, astar: true }
    }
}

impl ShortestPathAlgo for Bidirectional<'_> {
    fn graph(&self) -> &RoadGraph {
        self.graph
    }

    fn find_path(&self, start: NodeIx, end: NodeIx) -> Result<ShortestPath> {
        if start == end {
            return Ok(ShortestPath::empty());
        }
        let (mut forward, mut backward) = if self.astar {
            (
                SearchFrontier::with_heuristic(RoadView::forward(self.graph), self.graph.node_point(end)),
                SearchFrontier::with_heuristic(RoadView::backward(self.graph), self.graph.node_point(start)),
            )
        } else {
            (
                SearchFrontier::new(RoadView::forward(self.graph)),
                SearchFrontier::new(RoadView::backward(self.graph)),
            )
        };
        forward.update_distance(start, None, 0.0);
        backward.update_distance(end, None, 0.0);
        let mut best = Meeting::none();

        loop {
            check_finished(&mut forward, best.length);
            check_finished(&mut backward, best.length);
            let expand_forward = match (forward.finished, backward.finished) {
                (true, true) => break,
                (false, true) => true,
                (true, false) => false,
                (false, false) => {
                    let f = forward.min_key().unwrap_or(f64::INFINITY);
                    let b = backward.min_key().unwrap_or(f64::INFINITY);
                    f <= b
                }
            };
            if expand_forward {
                forward.settle_next(|u, d| best.offer(u, d + backward.distance(u)))?;
            } else {
                backward.settle_next(|u, d| best.offer(u, d + forward.distance(u)))?;
            }
        }

        match best.vertex {
            Some(meeting) if best.length.is_finite() => Ok(ShortestPath::from_edges(
                self.graph,
                join_at(&forward, &backward, meeting),
            )),
            _ => Ok(ShortestPath::unreachable()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil;
    use approx::assert_abs_diff_eq;

    #[test]
    fn chain_paths() {
        let graph = testutil::chain_graph();
        let a = graph.network.find_node_by_id(1).unwrap();
        let d = graph.network.find_node_by_id(4).unwrap();
        let algos: Vec<Box<dyn ShortestPathAlgo>> = vec![
            Box::new(Dijkstra::new(&graph)),
            Box::new(AStar::new(&graph)),
            Box::new(Bidirectional::dijkstra(&graph)),
            Box::new(Bidirectional::astar(&graph)),
        ];
        let total: f64 = graph.network.edges.iter().map(|e| e.get_length()).sum();
        for algo in algos {
            let path = algo.find_path(a, d).unwrap();
            let ids: Vec<i64> = path.edges.iter().map(|e| graph.segment(*e).get_id()).collect();
            assert_eq!(ids, vec![101, 102, 103]);
            assert_abs_diff_eq!(path.length, total, epsilon = 1e-9);
        }
    }

    #[test]
    fn shorter_detour_wins() {
        // 1 -> 2 -> 3 is the long way round, 1 -> 3 is direct
        let graph = testutil::triangle_graph();
        let a = graph.network.find_node_by_id(1).unwrap();
        let c = graph.network.find_node_by_id(3).unwrap();
        for algo in [
            Box::new(Dijkstra::new(&graph)) as Box<dyn ShortestPathAlgo>,
            Box::new(Bidirectional::astar(&graph)),
        ] {
            let path = algo.find_path(a, c).unwrap();
            assert_eq!(path.edges.len(), 1);
            assert_eq!(graph.segment(path.edges[0]).get_id(), 13);
        }
    }

    #[test]
    fn meeting_keeps_minimum() {
        let mut meeting = Meeting::none();
        meeting.offer(3, 10.0);
        meeting.offer(4, 12.0);
        meeting.offer(5, f64::INFINITY);
        assert_eq!(meeting.vertex, Some(3));
        assert_eq!(meeting.length, 10.0);
    }
}
