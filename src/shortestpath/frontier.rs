use crate::algorithm::{self, Point};
use crate::graph::{NodeIx, RoadGraph};
use anyhow::{bail, Result};
use ordered_float::OrderedFloat;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One traversable arc as a search direction sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    /// edge id inside the searched graph (segment index or hierarchy edge id)
    pub edge: usize,
    /// vertex the arc leads to in the search direction
    pub head: NodeIx,
    pub weight: f64,
}

/// A graph as seen by one search direction.
pub trait SearchSpace {
    fn arcs(&self, vertex: NodeIx) -> impl Iterator<Item = Arc> + '_;

    /// The vertex a tree edge was relaxed from.
    fn tail(&self, edge: usize) -> NodeIx;

    fn position(&self, vertex: NodeIx) -> Point;
}

/// Road network searched along (`Outgoing`) or against (`Incoming`) the
/// segment direction.
#[derive(Clone, Copy)]
pub struct RoadView<'a> {
    graph: &'a RoadGraph,
    direction: Direction,
}

impl<'a> RoadView<'a> {
    pub fn forward(graph: &'a RoadGraph) -> Self {
        RoadView {
            graph,
            direction: Direction::Outgoing,
        }
    }

    pub fn backward(graph: &'a RoadGraph) -> Self {
        RoadView {
            graph,
            direction: Direction::Incoming,
        }
    }
}

impl SearchSpace for RoadView<'_> {
    fn arcs(&self, vertex: NodeIx) -> impl Iterator<Item = Arc> + '_ {
        self.graph
            .adjacent(vertex, self.direction)
            .map(move |(edge, head)| Arc {
                edge,
                head,
                weight: self.graph.segment(edge).get_length(),
            })
    }

    fn tail(&self, edge: usize) -> NodeIx {
        match self.direction {
            Direction::Outgoing => self.graph.network.start_node(edge),
            Direction::Incoming => self.graph.network.end_node(edge),
        }
    }

    fn position(&self, vertex: NodeIx) -> Point {
        self.graph.node_point(vertex)
    }
}

// (key, distance, vertex); the key adds the heuristic when there is one
type HeapEntry = Reverse<(OrderedFloat<f64>, OrderedFloat<f64>, NodeIx)>;

/// One directional Dijkstra (or A*) expansion. Decrease-key is done by pushing
/// a fresh entry; entries whose distance is worse than the recorded one are
/// dropped when they surface.
pub struct SearchFrontier<S> {
    space: S,
    heap: BinaryHeap<HeapEntry>,
    // vertex -> (best distance, edge that produced it)
    seen: HashMap<NodeIx, (f64, Option<usize>)>,
    target: Option<Point>,
    pub finished: bool,
}

impl<S: SearchSpace> SearchFrontier<S> {
    pub fn new(space: S) -> Self {
        SearchFrontier {
            space,
            heap: BinaryHeap::new(),
            seen: HashMap::new(),
            target: None,
            finished: false,
        }
    }

    /// Frontier keyed by distance plus great-circle distance to `target`.
    pub fn with_heuristic(space: S, target: Point) -> Self {
        let mut frontier = SearchFrontier::new(space);
        frontier.target = Some(target);
        frontier
    }

    fn heuristic(space: &S, target: Option<Point>, vertex: NodeIx) -> f64 {
        match target {
            Some(target) => algorithm::haversine_distance(&space.position(vertex), &target),
            None => 0.0,
        }
    }

    /// Inserts `vertex` or lowers its distance when `distance` improves on the
    /// stored one, recording `edge` as its predecessor.
    pub fn update_distance(&mut self, vertex: NodeIx, edge: Option<usize>, distance: f64) {
        if distance < self.distance(vertex) {
            self.seen.insert(vertex, (distance, edge));
            let key = distance + Self::heuristic(&self.space, self.target, vertex);
            self.heap
                .push(Reverse((OrderedFloat(key), OrderedFloat(distance), vertex)));
        }
    }

    /// Best known distance, infinite when unseen.
    pub fn distance(&self, vertex: NodeIx) -> f64 {
        self.seen
            .get(&vertex)
            .map(|(distance, _)| *distance)
            .unwrap_or(f64::INFINITY)
    }

    pub fn tree_edge(&self, vertex: NodeIx) -> Option<usize> {
        self.seen.get(&vertex).and_then(|(_, edge)| *edge)
    }

    /// Smallest pending key, dropping outdated entries on the way.
    pub fn min_key(&mut self) -> Option<f64> {
        while let Some(Reverse((key, distance, vertex))) = self.heap.peek().copied() {
            if distance.0 > self.distance(vertex) {
                self.heap.pop();
                continue;
            }
            return Some(key.0);
        }
        None
    }

    pub fn is_empty(&mut self) -> bool {
        self.min_key().is_none()
    }

    fn pop(&mut self) -> Option<(NodeIx, f64)> {
        while let Some(Reverse((_, distance, vertex))) = self.heap.pop() {
            if distance.0 > self.distance(vertex) {
                continue;
            }
            return Some((vertex, distance.0));
        }
        None
    }

    /// Settles the closest pending vertex and relaxes its arcs. `on_relax` sees
    /// every arc head with the distance reached through the settled vertex,
    /// improving or not. Returns the settled vertex and its distance.
    pub fn settle_next<F>(&mut self, mut on_relax: F) -> Result<Option<(NodeIx, f64)>>
    where
        F: FnMut(NodeIx, f64),
    {
        let (vertex, distance) = match self.pop() {
            Some(settled) => settled,
            None => return Ok(None),
        };
        let space = &self.space;
        for arc in space.arcs(vertex) {
            if arc.weight < 0.0 {
                bail!("negative weight {} on edge {}", arc.weight, arc.edge);
            }
            let candidate = distance + arc.weight;
            let improved = match self.seen.get(&arc.head) {
                Some((known, _)) => candidate < *known,
                None => true,
            };
            if improved {
                self.seen.insert(arc.head, (candidate, Some(arc.edge)));
                let key = candidate + Self::heuristic(space, self.target, arc.head);
                self.heap
                    .push(Reverse((OrderedFloat(key), OrderedFloat(candidate), arc.head)));
            }
            on_relax(arc.head, candidate);
        }
        Ok(Some((vertex, distance)))
    }

    /// Tree edges from `vertex` back to the root, nearest first.
    pub fn tree_path(&self, vertex: NodeIx) -> Vec<usize> {
        let mut edges = Vec::new();
        let mut v = vertex;
        while let Some(edge) = self.tree_edge(v) {
            edges.push(edge);
            v = self.space.tail(edge);
            if edges.len() > self.seen.len() {
                break;
            }
        }
        edges
    }
}

/// Edges of the path source -> meeting -> sink in traversal order.
pub fn join_at<F: SearchSpace, B: SearchSpace>(
    forward: &SearchFrontier<F>,
    backward: &SearchFrontier<B>,
    meeting: NodeIx,
) -> Vec<usize> {
    let mut edges = forward.tree_path(meeting);
    edges.reverse();
    edges.extend(backward.tree_path(meeting));
    edges
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil;

    #[test]
    fn update_distance_keeps_the_best() {
        let graph = testutil::chain_graph();
        let mut frontier = SearchFrontier::new(RoadView::forward(&graph));
        assert!(frontier.distance(0).is_infinite());
        frontier.update_distance(0, None, 5.0);
        frontier.update_distance(0, Some(1), 7.0);
        assert_eq!(frontier.distance(0), 5.0);
        assert_eq!(frontier.tree_edge(0), None);
        frontier.update_distance(0, Some(2), 3.0);
        assert_eq!(frontier.distance(0), 3.0);
        assert_eq!(frontier.tree_edge(0), Some(2));
        assert_eq!(frontier.min_key(), Some(3.0));
    }

    #[test]
    fn settles_in_distance_order() {
        let graph = testutil::chain_graph();
        let start = graph.network.find_node_by_id(1).unwrap();
        let mut frontier = SearchFrontier::new(RoadView::forward(&graph));
        frontier.update_distance(start, None, 0.0);
        let mut last = -1.0;
        let mut settled = 0;
        while let Some((_, distance)) = frontier.settle_next(|_, _| {}).unwrap() {
            assert!(distance >= last);
            last = distance;
            settled += 1;
        }
        assert_eq!(settled, 4);
        assert!(frontier.is_empty());
        let end = graph.network.find_node_by_id(4).unwrap();
        assert_eq!(frontier.tree_path(end).len(), 3);
    }

    #[test]
    fn backward_tree_walks_towards_sink() {
        let graph = testutil::chain_graph();
        let start = graph.network.find_node_by_id(1).unwrap();
        let middle = graph.network.find_node_by_id(3).unwrap();
        let end = graph.network.find_node_by_id(4).unwrap();
        let mut forward = SearchFrontier::new(RoadView::forward(&graph));
        let mut backward = SearchFrontier::new(RoadView::backward(&graph));
        forward.update_distance(start, None, 0.0);
        backward.update_distance(end, None, 0.0);
        while forward.settle_next(|_, _| {}).unwrap().is_some() {}
        while backward.settle_next(|_, _| {}).unwrap().is_some() {}
        let ids: Vec<i64> = join_at(&forward, &backward, middle)
            .into_iter()
            .map(|e| graph.segment(e).get_id())
            .collect();
        assert_eq!(ids, vec![101, 102, 103]);
    }
}
