//! Small synthetic road networks for unit tests.

use crate::algorithm::Point;
use crate::graph::{EdgeIx, Network, NodeIx, RoadGraph, RoadNode, RoadSegment};
use crate::mm::model::CandidatePoint;
use geo::LineString;

const ORIGIN: (f64, f64) = (121.0, 31.0);
const GRID_SPACING: f64 = 0.002;

fn line(points: &[(f64, f64)]) -> LineString<f64> {
    LineString::from(points.to_vec())
}

/// One-way chain 1 -> 2 -> 3 -> 4 along lat 31.0 made of segments 101, 102, 103,
/// each about 477 m long with a 36 km/h limit.
pub fn chain_graph() -> RoadGraph {
    let mut network = Network::new();
    let lngs = [121.0, 121.005, 121.010, 121.015];
    for (i, id) in [101, 102, 103].into_iter().enumerate() {
        let geometry = line(&[(lngs[i], 31.0), (lngs[i + 1], 31.0)]);
        network
            .add_edge(RoadSegment::from_geometry(id, i as i64 + 1, i as i64 + 2, 36.0, geometry))
            .unwrap();
    }
    RoadGraph::new(network)
}

/// `n` x `n` grid, mostly two-way, with a few one-way streets and a few bent
/// (longer) segments. Node index `r * n + c` has id `r * n + c + 1`.
pub fn grid_graph(n: usize) -> RoadGraph {
    let mut network = Network::new();
    let position = |r: usize, c: usize| {
        (
            ORIGIN.0 + c as f64 * GRID_SPACING,
            ORIGIN.1 + r as f64 * GRID_SPACING,
        )
    };
    for r in 0..n {
        for c in 0..n {
            let (lng, lat) = position(r, c);
            network
                .add_node(RoadNode {
                    id: (r * n + c + 1) as i64,
                    point: Point(lng, lat),
                })
                .unwrap();
        }
    }
    let mut next_id = 1000;
    let mut add = |network: &mut Network, a: (usize, usize), b: (usize, usize), bend: bool, both: bool| {
        let (pa, pb) = (position(a.0, a.1), position(b.0, b.1));
        let mut points = vec![pa];
        if bend {
            points.push(((pa.0 + pb.0) / 2.0 + 0.0004, (pa.1 + pb.1) / 2.0 + 0.0003));
        }
        points.push(pb);
        let from = (a.0 * n + a.1 + 1) as i64;
        let to = (b.0 * n + b.1 + 1) as i64;
        network
            .add_edge(RoadSegment::from_geometry(next_id, from, to, 50.0, line(&points)))
            .unwrap();
        next_id += 1;
        if both {
            points.reverse();
            network
                .add_edge(RoadSegment::from_geometry(next_id, to, from, 50.0, line(&points)))
                .unwrap();
            next_id += 1;
        }
    };
    for r in 0..n {
        for c in 0..n {
            if c + 1 < n {
                // every fourth street is one-way eastbound
                add(&mut network, (r, c), (r, c + 1), false, (r + c) % 4 != 1);
            }
            if r + 1 < n {
                add(&mut network, (r, c), (r + 1, c), (r + c) % 3 == 0, true);
            }
        }
    }
    RoadGraph::new(network)
}

/// 1 -> 2 -> 3 around the long way and a direct 1 -> 3 (segment 13).
pub fn triangle_graph() -> RoadGraph {
    let mut network = Network::new();
    let (a, b, c) = ((121.0, 31.0), (121.005, 31.005), (121.01, 31.0));
    network
        .add_edge(RoadSegment::from_geometry(12, 1, 2, 50.0, line(&[a, b])))
        .unwrap();
    network
        .add_edge(RoadSegment::from_geometry(23, 2, 3, 50.0, line(&[b, c])))
        .unwrap();
    network
        .add_edge(RoadSegment::from_geometry(13, 1, 3, 50.0, line(&[a, c])))
        .unwrap();
    RoadGraph::new(network)
}

/// 1 -> 2 with a negative length, then 2 -> 3.
pub fn negative_graph() -> RoadGraph {
    let mut network = Network::new();
    let (a, b, c) = ((121.0, 31.0), (121.001, 31.0), (121.002, 31.0));
    network
        .add_edge(RoadSegment::new(1, 1, 2, -5.0, 50.0, line(&[a, b])))
        .unwrap();
    network
        .add_edge(RoadSegment::new(2, 2, 3, 100.0, 50.0, line(&[b, c])))
        .unwrap();
    RoadGraph::new(network)
}

/// Candidate on `edge` at `offset` meters from its start, with no error.
pub fn candidate(graph: &RoadGraph, edge: EdgeIx, offset: f64) -> CandidatePoint {
    let segment = graph.segment(edge);
    let start = graph.node_point(graph.network.start_node(edge));
    CandidatePoint {
        edge,
        segment_id: segment.get_id(),
        point: start,
        offset,
        error_distance: 0.0,
        sub_index: 0,
    }
}

/// Checks that `edges` walk from `start` to `end` head to tail.
pub fn assert_connected(graph: &RoadGraph, start: NodeIx, end: NodeIx, edges: &[EdgeIx]) {
    if edges.is_empty() {
        assert_eq!(start, end, "empty path between different vertices");
        return;
    }
    assert_eq!(graph.network.start_node(edges[0]), start);
    for pair in edges.windows(2) {
        assert_eq!(
            graph.network.end_node(pair[0]),
            graph.network.start_node(pair[1]),
            "segments {} and {} do not join",
            graph.segment(pair[0]).get_id(),
            graph.segment(pair[1]).get_id()
        );
    }
    assert_eq!(graph.network.end_node(edges[edges.len() - 1]), end);
}
