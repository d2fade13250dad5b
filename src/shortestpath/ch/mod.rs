pub mod contraction;
pub mod io;

use super::frontier::{join_at, Arc, SearchFrontier, SearchSpace};
use super::single::{check_finished, Meeting};
use super::{ShortestPath, ShortestPathAlgo};
use crate::algorithm::Point;
use crate::graph::{EdgeIx, NodeIx, RoadGraph};
use anyhow::Result;
use petgraph::Direction;

/// A network vertex together with its contraction rank.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractionVertex {
    pub node: NodeIx,
    pub node_id: i64,
    pub point: Point,
    pub rank: usize,
}

/// What a hierarchy edge stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// one real segment
    Original(EdgeIx),
    /// two hierarchy edges (first, second) through a contracted vertex
    Shortcut(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShortcutEdge {
    pub id: usize,
    pub source: NodeIx,
    pub target: NodeIx,
    pub weight: f64,
    /// source ranks below target
    pub upward: bool,
    pub original_edge_count: usize,
    pub kind: EdgeKind,
}

/// Original segments plus shortcuts over a vertex ordering. Vertices are indexed
/// by network node index, edges by their id.
#[derive(Debug, Clone)]
pub struct ContractionHierarchy {
    vertices: Vec<ContractionVertex>,
    edges: Vec<ShortcutEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl ContractionHierarchy {
    /// `edges[i].id` must be `i` and every shortcut must reference lower ids.
    pub(crate) fn from_parts(vertices: Vec<ContractionVertex>, edges: Vec<ShortcutEdge>) -> Self {
        let mut outgoing = vec![Vec::new(); vertices.len()];
        let mut incoming = vec![Vec::new(); vertices.len()];
        for edge in &edges {
            outgoing[edge.source].push(edge.id);
            incoming[edge.target].push(edge.id);
        }
        ContractionHierarchy {
            vertices,
            edges,
            outgoing,
            incoming,
        }
    }

    pub fn vertices(&self) -> &[ContractionVertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[ShortcutEdge] {
        &self.edges
    }

    pub fn edge(&self, id: usize) -> &ShortcutEdge {
        &self.edges[id]
    }

    pub fn rank(&self, node: NodeIx) -> usize {
        self.vertices[node].rank
    }

    pub fn shortcut_count(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Shortcut(..)))
            .count()
    }

    /// Edges climbing the order, searched forward from a source.
    pub fn upward_view(&self) -> ChView<'_> {
        ChView {
            hierarchy: self,
            direction: Direction::Outgoing,
        }
    }

    /// Edges descending the order, searched backward from a sink.
    pub fn downward_view(&self) -> ChView<'_> {
        ChView {
            hierarchy: self,
            direction: Direction::Incoming,
        }
    }

    /// Appends the real segments behind `edge` in traversal order. A shortcut
    /// yields its first half before its second.
    pub fn unpack(&self, edge: usize, out: &mut Vec<EdgeIx>) {
        let mut stack = vec![edge];
        while let Some(id) = stack.pop() {
            match self.edges[id].kind {
                EdgeKind::Original(segment) => out.push(segment),
                EdgeKind::Shortcut(first, second) => {
                    stack.push(second);
                    stack.push(first);
                }
            }
        }
    }

    /// Unpacks a hierarchy path given in traversal order.
    pub fn unpack_path(&self, edges: &[usize]) -> Vec<EdgeIx> {
        let total = edges.iter().map(|e| self.edges[*e].original_edge_count).sum();
        let mut out = Vec::with_capacity(total);
        for edge in edges {
            self.unpack(*edge, &mut out);
        }
        out
    }
}

/// The hierarchy restricted to one search direction.
#[derive(Clone, Copy)]
pub struct ChView<'a> {
    hierarchy: &'a ContractionHierarchy,
    direction: Direction,
}

impl SearchSpace for ChView<'_> {
    fn arcs(&self, vertex: NodeIx) -> impl Iterator<Item = Arc> + '_ {
        let (ids, upward) = match self.direction {
            Direction::Outgoing => (&self.hierarchy.outgoing[vertex], true),
            Direction::Incoming => (&self.hierarchy.incoming[vertex], false),
        };
        let direction = self.direction;
        ids.iter()
            .map(move |id| &self.hierarchy.edges[*id])
            .filter(move |e| e.upward == upward)
            .map(move |e| Arc {
                edge: e.id,
                head: match direction {
                    Direction::Outgoing => e.target,
                    Direction::Incoming => e.source,
                },
                weight: e.weight,
            })
    }

    fn tail(&self, edge: usize) -> NodeIx {
        let e = &self.hierarchy.edges[edge];
        match self.direction {
            Direction::Outgoing => e.source,
            Direction::Incoming => e.target,
        }
    }

    fn position(&self, vertex: NodeIx) -> Point {
        self.hierarchy.vertices[vertex].point
    }
}

/// Bidirectional query over a hierarchy: upward from the source, downward
/// (reversed) from the sink, one step per side per round.
pub struct ChQuery<'a> {
    graph: &'a RoadGraph,
    hierarchy: &'a ContractionHierarchy,
}

impl<'a> ChQuery<'a> {
    pub fn new(graph: &'a RoadGraph, hierarchy: &'a ContractionHierarchy) -> Self {
        ChQuery { graph, hierarchy }
    }
}

impl ShortestPathAlgo for ChQuery<'_> {
    fn graph(&self) -> &RoadGraph {
        self.graph
    }

    fn find_path(&self, start: NodeIx, end: NodeIx) -> Result<ShortestPath> {
        if start == end {
            return Ok(ShortestPath::empty());
        }
        let mut forward = SearchFrontier::new(self.hierarchy.upward_view());
        let mut backward = SearchFrontier::new(self.hierarchy.downward_view());
        forward.update_distance(start, None, 0.0);
        backward.update_distance(end, None, 0.0);
        let mut best = Meeting::none();

        while !forward.finished || !backward.finished {
            check_finished(&mut forward, best.length);
            if !forward.finished {
                forward.settle_next(|u, d| best.offer(u, d + backward.distance(u)))?;
            }
            check_finished(&mut backward, best.length);
            if !backward.finished {
                backward.settle_next(|u, d| best.offer(u, d + forward.distance(u)))?;
            }
        }

        match best.vertex {
            Some(meeting) if best.length.is_finite() => {
                let edges = join_at(&forward, &backward, meeting);
                Ok(ShortestPath::from_edges(
                    self.graph,
                    self.hierarchy.unpack_path(&edges),
                ))
            }
            _ => Ok(ShortestPath::unreachable()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shortestpath::single::Dijkstra;
    use crate::testutil;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unpack_expands_nested_shortcuts() {
        let graph = testutil::chain_graph();
        let v = |id| {
            let node = graph.network.find_node_by_id(id).unwrap();
            ContractionVertex {
                node,
                node_id: id,
                point: graph.node_point(node),
                rank: 0,
            }
        };
        let vertices = vec![v(1), v(2), v(3), v(4)];
        let seg = |id| graph.network.find_edge_index(id).unwrap();
        let edge = |id, source, target, kind, count| ShortcutEdge {
            id,
            source,
            target,
            weight: 1.0,
            upward: true,
            original_edge_count: count,
            kind,
        };
        let edges = vec![
            edge(0, 0, 1, EdgeKind::Original(seg(101)), 1),
            edge(1, 1, 2, EdgeKind::Original(seg(102)), 1),
            edge(2, 2, 3, EdgeKind::Original(seg(103)), 1),
            edge(3, 1, 3, EdgeKind::Shortcut(1, 2), 2),
            edge(4, 0, 3, EdgeKind::Shortcut(0, 3), 3),
        ];
        let hierarchy = ContractionHierarchy::from_parts(vertices, edges);
        let ids: Vec<i64> = hierarchy
            .unpack_path(&[4])
            .into_iter()
            .map(|e| graph.segment(e).get_id())
            .collect();
        assert_eq!(ids, vec![101, 102, 103]);
        assert_eq!(hierarchy.shortcut_count(), 2);
    }

    #[test]
    fn query_matches_dijkstra_and_uses_real_segments() {
        let mut graph = testutil::grid_graph(5);
        graph.precompute_contraction_hierarchy().unwrap();
        let hierarchy = graph.contraction_hierarchy().unwrap();
        let query = ChQuery::new(&graph, hierarchy);
        let dijkstra = Dijkstra::new(&graph);
        let last = graph.node_count() - 1;
        for (s, t) in [(0, last), (last, 0), (3, 17), (12, 2)] {
            let expected = dijkstra.find_path(s, t).unwrap();
            let path = query.find_path(s, t).unwrap();
            assert_abs_diff_eq!(path.length, expected.length, epsilon = 1e-6);
            testutil::assert_connected(&graph, s, t, &path.edges);
        }
    }
}
