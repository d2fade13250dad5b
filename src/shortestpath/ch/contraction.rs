use super::{ContractionHierarchy, ContractionVertex, EdgeKind, ShortcutEdge};
use crate::graph::{NodeIx, RoadGraph};
use anyhow::{bail, Result};
use log::{debug, info};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

// witness searches give up after this many settled vertices and assume no witness
const WITNESS_SETTLE_LIMIT: usize = 200;

/// A shortcut the contraction of one vertex would add:
/// (source, target, weight, first edge, second edge).
type Shortcut = (NodeIx, NodeIx, f64, usize, usize);

struct Contractor {
    edges: Vec<ShortcutEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    contracted: Vec<bool>,
    contracted_neighbours: Vec<i64>,
}

impl Contractor {
    fn new(graph: &RoadGraph) -> Result<Self> {
        let n = graph.node_count();
        let mut contractor = Contractor {
            edges: Vec::with_capacity(graph.edge_count()),
            outgoing: vec![Vec::new(); n],
            incoming: vec![Vec::new(); n],
            contracted: vec![false; n],
            contracted_neighbours: vec![0; n],
        };
        for (index, segment) in graph.network.edges.iter().enumerate() {
            if segment.get_length() < 0.0 {
                bail!(
                    "segment {} has negative length {}",
                    segment.get_id(),
                    segment.get_length()
                );
            }
            let source = graph.network.start_node(index);
            let target = graph.network.end_node(index);
            if source == target {
                continue;
            }
            contractor.push_edge(source, target, segment.get_length(), 1, EdgeKind::Original(index));
        }
        Ok(contractor)
    }

    fn push_edge(&mut self, source: NodeIx, target: NodeIx, weight: f64, count: usize, kind: EdgeKind) {
        let id = self.edges.len();
        self.edges.push(ShortcutEdge {
            id,
            source,
            target,
            weight,
            upward: false,
            original_edge_count: count,
            kind,
        });
        self.outgoing[source].push(id);
        self.incoming[target].push(id);
    }

    // cheapest live edge per neighbour, keyed by neighbour for a stable order
    fn live_neighbours(&self, vertex: NodeIx, incoming: bool) -> BTreeMap<NodeIx, (f64, usize)> {
        let ids = if incoming {
            &self.incoming[vertex]
        } else {
            &self.outgoing[vertex]
        };
        let mut neighbours: BTreeMap<NodeIx, (f64, usize)> = BTreeMap::new();
        for id in ids {
            let edge = &self.edges[*id];
            let other = if incoming { edge.source } else { edge.target };
            if other == vertex || self.contracted[other] {
                continue;
            }
            let entry = neighbours.entry(other).or_insert((f64::INFINITY, *id));
            if edge.weight < entry.0 {
                *entry = (edge.weight, *id);
            }
        }
        neighbours
    }

    /// Bounded Dijkstra from `source` over live vertices, never entering `avoid`.
    fn witness_distances(&self, source: NodeIx, avoid: NodeIx, limit: f64) -> HashMap<NodeIx, f64> {
        let mut distances = HashMap::new();
        let mut heap = BinaryHeap::new();
        distances.insert(source, 0.0);
        heap.push(Reverse((OrderedFloat(0.0), source)));
        let mut settled = 0;
        while let Some(Reverse((OrderedFloat(distance), vertex))) = heap.pop() {
            if distance > distances.get(&vertex).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            if distance > limit || settled >= WITNESS_SETTLE_LIMIT {
                break;
            }
            settled += 1;
            for id in &self.outgoing[vertex] {
                let edge = &self.edges[*id];
                if edge.target == avoid || self.contracted[edge.target] {
                    continue;
                }
                let candidate = distance + edge.weight;
                if candidate < distances.get(&edge.target).copied().unwrap_or(f64::INFINITY) {
                    distances.insert(edge.target, candidate);
                    heap.push(Reverse((OrderedFloat(candidate), edge.target)));
                }
            }
        }
        distances
    }

    /// Shortcuts needed to keep distances intact once `vertex` is removed.
    fn shortcuts_for(&self, vertex: NodeIx) -> (Vec<Shortcut>, i64) {
        let ins = self.live_neighbours(vertex, true);
        let outs = self.live_neighbours(vertex, false);
        let removed = (ins.len() + outs.len()) as i64;
        let mut shortcuts = Vec::new();
        let max_out = outs.values().map(|(w, _)| *w).fold(0.0, f64::max);
        for (&source, &(in_weight, first)) in &ins {
            let witnesses = self.witness_distances(source, vertex, in_weight + max_out);
            for (&target, &(out_weight, second)) in &outs {
                if target == source {
                    continue;
                }
                let via = in_weight + out_weight;
                let witness = witnesses.get(&target).copied().unwrap_or(f64::INFINITY);
                if witness > via {
                    shortcuts.push((source, target, via, first, second));
                }
            }
        }
        (shortcuts, removed)
    }

    fn priority(&self, vertex: NodeIx) -> i64 {
        let (shortcuts, removed) = self.shortcuts_for(vertex);
        shortcuts.len() as i64 - removed + self.contracted_neighbours[vertex]
    }

    fn contract(&mut self, vertex: NodeIx) -> usize {
        let (shortcuts, _) = self.shortcuts_for(vertex);
        let added = shortcuts.len();
        for (source, target, weight, first, second) in shortcuts {
            let count = self.edges[first].original_edge_count + self.edges[second].original_edge_count;
            self.push_edge(source, target, weight, count, EdgeKind::Shortcut(first, second));
        }
        self.contracted[vertex] = true;
        let neighbours: Vec<NodeIx> = self
            .live_neighbours(vertex, true)
            .keys()
            .chain(self.live_neighbours(vertex, false).keys())
            .copied()
            .collect();
        for neighbour in neighbours {
            self.contracted_neighbours[neighbour] += 1;
        }
        added
    }
}

impl ContractionHierarchy {
    /// Contracts every vertex of `graph` in edge-difference order. Vertex ranks
    /// are the contraction order; an edge is upward when its source ranks lower.
    pub fn build(graph: &RoadGraph) -> Result<Self> {
        let n = graph.node_count();
        info!("start contraction of {} vertices...", n);
        let mut contractor = Contractor::new(graph)?;

        let mut queue = BinaryHeap::new();
        for vertex in 0..n {
            queue.push(Reverse((contractor.priority(vertex), vertex)));
        }

        let mut rank = vec![0usize; n];
        let mut order = 0usize;
        let mut shortcuts = 0usize;
        while let Some(Reverse((priority, vertex))) = queue.pop() {
            if contractor.contracted[vertex] {
                continue;
            }
            // lazy update: requeue when the priority went stale and someone else is now cheaper
            let current = contractor.priority(vertex);
            if current > priority {
                if let Some(Reverse((next, _))) = queue.peek() {
                    if current > *next {
                        queue.push(Reverse((current, vertex)));
                        continue;
                    }
                }
            }
            shortcuts += contractor.contract(vertex);
            rank[vertex] = order;
            order += 1;
            if order % 1000 == 0 {
                debug!("contracted {}/{} vertices, {} shortcuts", order, n, shortcuts);
            }
        }

        let mut edges = contractor.edges;
        for edge in edges.iter_mut() {
            edge.upward = rank[edge.source] < rank[edge.target];
        }
        let vertices = (0..n)
            .map(|node| ContractionVertex {
                node,
                node_id: graph.network.node(node).id,
                point: graph.node_point(node),
                rank: rank[node],
            })
            .collect();
        info!(
            "finish contraction: {} edges, {} shortcuts",
            edges.len(),
            shortcuts
        );
        Ok(ContractionHierarchy::from_parts(vertices, edges))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil;

    #[test]
    fn ranks_are_a_permutation() {
        let graph = testutil::grid_graph(4);
        let hierarchy = ContractionHierarchy::build(&graph).unwrap();
        let mut ranks: Vec<usize> = hierarchy.vertices().iter().map(|v| v.rank).collect();
        ranks.sort();
        assert_eq!(ranks, (0..graph.node_count()).collect::<Vec<_>>());
    }

    #[test]
    fn shortcut_counts_and_weights_add_up() {
        let graph = testutil::grid_graph(5);
        let hierarchy = ContractionHierarchy::build(&graph).unwrap();
        for edge in hierarchy.edges() {
            assert_eq!(edge.upward, hierarchy.rank(edge.source) < hierarchy.rank(edge.target));
            match edge.kind {
                EdgeKind::Original(segment) => {
                    assert_eq!(edge.original_edge_count, 1);
                    assert_eq!(edge.weight, graph.segment(segment).get_length());
                }
                EdgeKind::Shortcut(first, second) => {
                    assert!(first < edge.id && second < edge.id);
                    let (a, b) = (hierarchy.edge(first), hierarchy.edge(second));
                    assert_eq!(a.target, b.source);
                    assert_eq!(edge.original_edge_count, a.original_edge_count + b.original_edge_count);
                    assert!((edge.weight - (a.weight + b.weight)).abs() < 1e-9);
                    let mut segments = Vec::new();
                    hierarchy.unpack(edge.id, &mut segments);
                    assert_eq!(segments.len(), edge.original_edge_count);
                }
            }
        }
    }

    #[test]
    fn chain_middle_needs_shortcut() {
        let graph = testutil::chain_graph();
        let hierarchy = ContractionHierarchy::build(&graph).unwrap();
        // every node of a one-way chain lies on a unique path, so contracting any
        // inner node before both its neighbours bypasses it with a shortcut
        assert!(hierarchy.shortcut_count() >= 1);
        assert_eq!(hierarchy.edges().len(), 3 + hierarchy.shortcut_count());
    }

    #[test]
    fn negative_length_is_refused() {
        let graph = testutil::negative_graph();
        assert!(ContractionHierarchy::build(&graph).is_err());
    }
}
