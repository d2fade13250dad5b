use crate::algorithm::{self, Point};
use anyhow::{anyhow, Result};
use geo::LineString;
use std::collections::HashMap;

/**
 * @file network.rs
 * Road network storage: nodes and directed road segments, loaded from a
 * geojson FeatureCollection and kept in memory, read-only once built.
 */

pub type NodeIx = usize;
pub type EdgeIx = usize;

pub const DEFAULT_SPEED_LIMIT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub id: i64,
    pub point: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    id: i64,                   // segment id
    from: i64,                 // start node id
    to: i64,                   // end node id
    length: f64,               // meters
    speed_limit: f64,          // km/h
    name: String,
    geometry: LineString<f64>, // at least two points
}

impl RoadSegment {
    pub fn new(
        id: i64,
        from: i64,
        to: i64,
        length: f64,
        speed_limit: f64,
        geometry: LineString<f64>,
    ) -> Self {
        RoadSegment {
            id,
            from,
            to,
            length,
            speed_limit,
            name: String::new(),
            geometry,
        }
    }

    /// Builds a segment whose length is the haversine length of its geometry.
    pub fn from_geometry(
        id: i64,
        from: i64,
        to: i64,
        speed_limit: f64,
        geometry: LineString<f64>,
    ) -> Self {
        let length = algorithm::line_length(&geometry);
        RoadSegment::new(id, from, to, length, speed_limit, geometry)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn get_length(&self) -> f64 {
        self.length
    }

    pub fn get_speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    // return (min_lng, min_lat), (max_lng, max_lat)
    pub fn get_geom_rect(&self) -> (Point, Point) {
        let mut min_lng = 180_f64;
        let mut min_lat = 90_f64;
        let mut max_lng = -180_f64;
        let mut max_lat = -90_f64;
        for point in self.geometry.points() {
            min_lng = min_lng.min(point.x());
            max_lng = max_lng.max(point.x());
            min_lat = min_lat.min(point.y());
            max_lat = max_lat.max(point.y());
        }
        (Point(min_lng, min_lat), Point(max_lng, max_lat))
    }

    fn first_point(&self) -> Option<Point> {
        self.geometry.points().next().map(Point::from)
    }

    fn last_point(&self) -> Option<Point> {
        self.geometry.points().last().map(Point::from)
    }
}

#[derive(Debug, Default)]
pub struct Network {
    edges_index: HashMap<i64, EdgeIx>, // segment id -> index
    nodes_index: HashMap<i64, NodeIx>, // node id -> index
    edge_ends: Vec<(NodeIx, NodeIx)>,  // resolved (start, end) per segment
    pub edges: Vec<RoadSegment>,
    pub nodes: Vec<RoadNode>,
}

impl TryFrom<geojson::GeoJson> for Network {
    type Error = anyhow::Error;
    fn try_from(value: geojson::GeoJson) -> std::result::Result<Self, Self::Error> {
        let mut network = Network::new();
        let feature_collection = match value {
            geojson::GeoJson::FeatureCollection(feature_collection) => feature_collection,
            _ => return Err(anyhow!("not a feature collection")),
        };
        for feature in feature_collection.features {
            let geometry = feature
                .geometry
                .as_ref()
                .ok_or_else(|| anyhow!("feature without geometry"))?;
            let properties = feature
                .properties
                .as_ref()
                .ok_or_else(|| anyhow!("feature without properties"))?;
            let int_property = |key: &str| {
                properties
                    .get(key)
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| anyhow!("missing integer property {}", key))
            };
            let id = int_property("edge_id")?;
            let from = int_property("from_node_id")?;
            let to = int_property("to_node_id")?;
            let speed_limit = properties
                .get("speed_limit")
                .and_then(|v| v.as_f64())
                .unwrap_or(DEFAULT_SPEED_LIMIT);
            let name = properties
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let line = algorithm::linestring_from_geometry(geometry)?;
            let segment = RoadSegment::from_geometry(id, from, to, speed_limit, line).with_name(name);
            network.add_edge(segment)?;
        }
        Ok(network)
    }
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    pub fn edge(&self, index: EdgeIx) -> &RoadSegment {
        &self.edges[index]
    }

    pub fn node(&self, index: NodeIx) -> &RoadNode {
        &self.nodes[index]
    }

    pub fn find_edge_by_id(&self, id: i64) -> Option<&RoadSegment> {
        self.edges_index.get(&id).map(|index| &self.edges[*index])
    }

    pub fn find_edge_index(&self, id: i64) -> Option<EdgeIx> {
        self.edges_index.get(&id).copied()
    }

    pub fn find_node_by_id(&self, id: i64) -> Option<NodeIx> {
        self.nodes_index.get(&id).copied()
    }

    pub fn start_node(&self, edge: EdgeIx) -> NodeIx {
        self.edge_ends[edge].0
    }

    pub fn end_node(&self, edge: EdgeIx) -> NodeIx {
        self.edge_ends[edge].1
    }

    /// add node
    pub fn add_node(&mut self, node: RoadNode) -> Result<NodeIx> {
        if self.nodes_index.contains_key(&node.id) {
            return Err(anyhow!("node {} already exists", node.id));
        }
        self.nodes_index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    /// add edge; unknown end nodes are created from the segment's first/last coordinate
    pub fn add_edge(&mut self, edge: RoadSegment) -> Result<EdgeIx> {
        if self.edges_index.contains_key(&edge.id) {
            return Err(anyhow!("edge {} already exists", edge.id));
        }
        if edge.geometry.0.len() < 2 {
            return Err(anyhow!("edge {} needs at least two coordinates", edge.id));
        }
        let start = self.node_or_insert(edge.from, edge.first_point())?;
        let end = self.node_or_insert(edge.to, edge.last_point())?;
        self.edges_index.insert(edge.id, self.edges.len());
        self.edges.push(edge);
        self.edge_ends.push((start, end));
        Ok(self.edges.len() - 1)
    }

    fn node_or_insert(&mut self, id: i64, point: Option<Point>) -> Result<NodeIx> {
        match self.find_node_by_id(id) {
            Some(index) => Ok(index),
            None => {
                let point = point.ok_or_else(|| anyhow!("node {} has no coordinate", id))?;
                self.add_node(RoadNode { id, point })
            }
        }
    }
}
