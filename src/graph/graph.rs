use super::network::{EdgeIx, Network, NodeIx, RoadSegment};
use crate::algorithm::{self, Point};
use crate::mm::model::CandidatePoint;
use crate::shortestpath::ch::ContractionHierarchy;
use anyhow::Result;
use log::{debug, info};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use rtree_rs::{RTree, Rect};

/// The road network as the searches and the matcher see it: a directed petgraph
/// over the segments, an rtree over segment bounding boxes, and an optional
/// precomputed contraction hierarchy. Read-only while queries run.
pub struct RoadGraph {
    pub network: Network,
    graph: Graph<NodeIx, EdgeIx, Directed, usize>,
    rtree: RTree<2, f64, EdgeIx>,
    hierarchy: Option<ContractionHierarchy>,
}

impl RoadGraph {
    pub fn new(network: Network) -> Self {
        info!("start construct graph...");
        let node_size = network.nodes.len();
        let edge_size = network.edges.len();
        debug!("node size: {}, edge size: {}", node_size, edge_size);
        let mut graph = Graph::with_capacity(node_size, edge_size);
        for index in 0..node_size {
            graph.add_node(index);
        }
        let mut rtree = RTree::new();
        for (index, edge) in network.edges.iter().enumerate() {
            graph.add_edge(
                NodeIndex::new(network.start_node(index)),
                NodeIndex::new(network.end_node(index)),
                index,
            );
            let (min, max) = edge.get_geom_rect();
            rtree.insert(Rect::new([min.0, min.1], [max.0, max.1]), index);
        }
        info!("finish construct road network graph and rtree...");
        RoadGraph {
            network,
            graph,
            rtree,
            hierarchy: None,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn segment(&self, edge: EdgeIx) -> &RoadSegment {
        self.network.edge(edge)
    }

    pub fn segment_by_id(&self, id: i64) -> Option<&RoadSegment> {
        self.network.find_edge_by_id(id)
    }

    pub fn node_point(&self, node: NodeIx) -> Point {
        self.network.node(node).point
    }

    /// (segment, neighbour) pairs leaving `node` for `Outgoing`, entering it for `Incoming`.
    pub fn adjacent(
        &self,
        node: NodeIx,
        direction: Direction,
    ) -> impl Iterator<Item = (EdgeIx, NodeIx)> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(node), direction)
            .map(move |e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (*e.weight(), other.index())
            })
    }

    // edge indices whose bbox intersects the query box
    fn query_bbox(&self, bbox: Rect<2, f64>) -> Vec<EdgeIx> {
        let mut result = Vec::new();
        for item in self.rtree.search(bbox) {
            result.push(*item.data);
        }
        result
    }

    /// Projections of `point` onto every segment within `radius` meters,
    /// closest first; ties are ordered by segment index.
    pub fn candidates_near(&self, point: &Point, radius: f64) -> Vec<CandidatePoint> {
        let (lng_buffer, lat_buffer) = algorithm::degree_buffer(point, radius);
        let bbox = Rect::new(
            [point.0 - lng_buffer, point.1 - lat_buffer],
            [point.0 + lng_buffer, point.1 + lat_buffer],
        );
        let mut candidates = Vec::new();
        for edge in self.query_bbox(bbox) {
            let segment = self.network.edge(edge);
            let projection = match algorithm::project_to_line(point, segment.get_geometry()) {
                Some(projection) => projection,
                None => continue,
            };
            if projection.error_distance > radius {
                continue;
            }
            candidates.push(CandidatePoint {
                edge,
                segment_id: segment.get_id(),
                point: projection.point,
                offset: projection.offset.clamp(0.0, segment.get_length().max(0.0)),
                error_distance: projection.error_distance,
                sub_index: projection.sub_index,
            });
        }
        candidates.sort_by(|a, b| {
            a.error_distance
                .total_cmp(&b.error_distance)
                .then(a.edge.cmp(&b.edge))
        });
        candidates
    }

    pub fn contraction_hierarchy(&self) -> Option<&ContractionHierarchy> {
        self.hierarchy.as_ref()
    }

    pub fn set_contraction_hierarchy(&mut self, hierarchy: ContractionHierarchy) {
        self.hierarchy = Some(hierarchy);
    }

    /// Builds the hierarchy over the current network and keeps it.
    pub fn precompute_contraction_hierarchy(&mut self) -> Result<()> {
        let hierarchy = ContractionHierarchy::build(self)?;
        self.hierarchy = Some(hierarchy);
        Ok(())
    }
}
