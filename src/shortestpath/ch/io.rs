use super::{ContractionHierarchy, ContractionVertex, EdgeKind, ShortcutEdge};
use crate::algorithm::Point;
use crate::graph::RoadGraph;
use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/**
 * Text form of a contraction hierarchy, one edge per line:
 *
 *   id|vertex,nodeId,lng,lat,rank|vertex,nodeId,lng,lat,rank|weight|upward|segmentId|first|second|count
 *
 * segmentId is -1 for shortcuts, first/second are -1 for original edges.
 */

#[derive(Debug, Clone, PartialEq)]
pub struct RecordVertex {
    pub vertex: usize,
    pub node_id: i64,
    pub point: Point,
    pub rank: usize,
}

impl fmt::Display for RecordVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.vertex, self.node_id, self.point.0, self.point.1, self.rank
        )
    }
}

impl FromStr for RecordVertex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            bail!("vertex needs 5 fields, got {}", fields.len());
        }
        Ok(RecordVertex {
            vertex: fields[0].parse().context("vertex id")?,
            node_id: fields[1].parse().context("node id")?,
            point: Point(
                fields[2].parse().context("longitude")?,
                fields[3].parse().context("latitude")?,
            ),
            rank: fields[4].parse().context("rank")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChRecord {
    pub id: usize,
    pub source: RecordVertex,
    pub target: RecordVertex,
    pub weight: f64,
    pub upward: bool,
    pub segment_id: i64,
    pub first: i64,
    pub second: i64,
    pub original_edge_count: usize,
}

impl fmt::Display for ChRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.id,
            self.source,
            self.target,
            self.weight,
            self.upward,
            self.segment_id,
            self.first,
            self.second,
            self.original_edge_count
        )
    }
}

impl FromStr for ChRecord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split('|').map(str::trim).collect();
        if fields.len() != 9 {
            bail!("record needs 9 fields, got {}", fields.len());
        }
        Ok(ChRecord {
            id: fields[0].parse().context("edge id")?,
            source: fields[1].parse().context("source vertex")?,
            target: fields[2].parse().context("target vertex")?,
            weight: fields[3].parse().context("weight")?,
            upward: fields[4].parse().context("upward flag")?,
            segment_id: fields[5].parse().context("segment id")?,
            first: fields[6].parse().context("first bypass edge")?,
            second: fields[7].parse().context("second bypass edge")?,
            original_edge_count: fields[8].parse().context("original edge count")?,
        })
    }
}

impl ContractionHierarchy {
    /// One record per edge, in edge id order.
    pub fn to_records(&self, graph: &RoadGraph) -> Vec<ChRecord> {
        let vertex = |v: usize| {
            let cv = &self.vertices[v];
            RecordVertex {
                vertex: cv.node,
                node_id: cv.node_id,
                point: cv.point,
                rank: cv.rank,
            }
        };
        self.edges
            .iter()
            .map(|edge| {
                let (segment_id, first, second) = match edge.kind {
                    EdgeKind::Original(segment) => (graph.segment(segment).get_id(), -1, -1),
                    EdgeKind::Shortcut(first, second) => (-1, first as i64, second as i64),
                };
                ChRecord {
                    id: edge.id,
                    source: vertex(edge.source),
                    target: vertex(edge.target),
                    weight: edge.weight,
                    upward: edge.upward,
                    segment_id,
                    first,
                    second,
                    original_edge_count: edge.original_edge_count,
                }
            })
            .collect()
    }

    /// Rebuilds a hierarchy over `graph`. Records are materialized in ascending
    /// original-edge-count order so bypass references always point at edges
    /// already built; edge ids are reassigned in that order.
    pub fn from_records(graph: &RoadGraph, mut records: Vec<ChRecord>) -> Result<Self> {
        records.sort_by_key(|r| r.original_edge_count);

        let mut vertices: Vec<ContractionVertex> = graph
            .network
            .nodes
            .iter()
            .enumerate()
            .map(|(node, n)| ContractionVertex {
                node,
                node_id: n.id,
                point: n.point,
                rank: 0,
            })
            .collect();
        let mut resolve = |v: &RecordVertex| -> Result<usize> {
            let node = graph
                .network
                .find_node_by_id(v.node_id)
                .ok_or_else(|| anyhow!("unknown node {}", v.node_id))?;
            vertices[node].rank = v.rank;
            Ok(node)
        };

        let mut ids: HashMap<usize, usize> = HashMap::with_capacity(records.len());
        let mut edges: Vec<ShortcutEdge> = Vec::with_capacity(records.len());
        for record in &records {
            let source = resolve(&record.source).with_context(|| format!("edge {}", record.id))?;
            let target = resolve(&record.target).with_context(|| format!("edge {}", record.id))?;
            let kind = if record.original_edge_count == 1 {
                let segment = graph
                    .network
                    .find_edge_index(record.segment_id)
                    .ok_or_else(|| anyhow!("edge {}: unknown segment {}", record.id, record.segment_id))?;
                if graph.network.start_node(segment) != source || graph.network.end_node(segment) != target {
                    bail!("edge {}: segment {} does not join its vertices", record.id, record.segment_id);
                }
                EdgeKind::Original(segment)
            } else {
                let lookup = |file_id: i64| {
                    usize::try_from(file_id)
                        .ok()
                        .and_then(|id| ids.get(&id).copied())
                        .ok_or_else(|| anyhow!("edge {}: unknown bypass edge {}", record.id, file_id))
                };
                let (first, second) = (lookup(record.first)?, lookup(record.second)?);
                let (a, b) = (&edges[first], &edges[second]);
                if a.source != source || a.target != b.source || b.target != target {
                    bail!("edge {}: bypass edges {} and {} do not chain", record.id, record.first, record.second);
                }
                EdgeKind::Shortcut(first, second)
            };
            let id = edges.len();
            if ids.insert(record.id, id).is_some() {
                bail!("duplicate edge id {}", record.id);
            }
            edges.push(ShortcutEdge {
                id,
                source,
                target,
                weight: record.weight,
                upward: record.upward,
                original_edge_count: record.original_edge_count,
                kind,
            });
        }
        Ok(ContractionHierarchy::from_parts(vertices, edges))
    }

    pub fn export_to<W: Write>(&self, graph: &RoadGraph, writer: &mut W) -> Result<()> {
        for record in self.to_records(graph) {
            writeln!(writer, "{}", record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads records line by line; blank lines are skipped.
    pub fn import_from<R: BufRead>(graph: &RoadGraph, reader: R) -> Result<Self> {
        let mut records = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ChRecord = line
                .parse()
                .with_context(|| format!("malformed hierarchy record at line {}", number + 1))?;
            records.push(record);
        }
        ContractionHierarchy::from_records(graph, records)
    }

    pub fn save<P: AsRef<Path>>(&self, graph: &RoadGraph, path: P) -> Result<()> {
        let path = path.as_ref();
        info!("write contraction hierarchy to {}", path.display());
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.export_to(graph, &mut writer)
    }

    pub fn load<P: AsRef<Path>>(graph: &RoadGraph, path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("read contraction hierarchy from {}", path.display());
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        ContractionHierarchy::import_from(graph, BufReader::new(file))
    }
}
