use super::frontier::{RoadView, SearchFrontier, SearchSpace};
use super::single::Meeting;
use super::AlgorithmKind;
use crate::graph::{NodeIx, RoadGraph};
use anyhow::{anyhow, bail, Result};
use log::trace;
use std::collections::{HashMap, HashSet};

/// (source, sink) -> distance; unreachable pairs map to infinity.
pub type DistanceTable = HashMap<(NodeIx, NodeIx), f64>;

/// Distances between every source and every sink, computed with one forward
/// frontier per source and one backward frontier per sink sharing the meeting
/// bookkeeping. Works on the plain graph or on a contraction hierarchy.
pub struct ManyToMany<'a> {
    graph: &'a RoadGraph,
    kind: AlgorithmKind,
}

impl<'a> ManyToMany<'a> {
    /// Only bidirectional Dijkstra and CH have a many-to-many form.
    pub fn new(graph: &'a RoadGraph, kind: AlgorithmKind) -> Result<Self> {
        match kind {
            AlgorithmKind::BiDijkstra => {}
            AlgorithmKind::Ch => {
                if graph.contraction_hierarchy().is_none() {
                    bail!("contraction hierarchy should be precomputed before selecting CH");
                }
            }
            other => bail!("{:?} has no many-to-many variant", other),
        }
        Ok(ManyToMany { graph, kind })
    }

    pub fn find_all_pairs(&self, sources: &[NodeIx], sinks: &[NodeIx]) -> Result<DistanceTable> {
        let sources = dedup(sources);
        let sinks = dedup(sinks);
        let best = match self.kind {
            AlgorithmKind::Ch => {
                let hierarchy = self
                    .graph
                    .contraction_hierarchy()
                    .ok_or_else(|| anyhow!("contraction hierarchy is missing"))?;
                search_all(
                    hierarchy.upward_view(),
                    hierarchy.downward_view(),
                    &sources,
                    &sinks,
                )?
            }
            _ => search_all(
                RoadView::forward(self.graph),
                RoadView::backward(self.graph),
                &sources,
                &sinks,
            )?,
        };
        let mut table = DistanceTable::with_capacity(sources.len() * sinks.len());
        for (i, source) in sources.iter().enumerate() {
            for (j, sink) in sinks.iter().enumerate() {
                let distance = if source == sink { 0.0 } else { best[i][j].length };
                table.insert((*source, *sink), distance);
            }
        }
        Ok(table)
    }
}

fn dedup(vertices: &[NodeIx]) -> Vec<NodeIx> {
    let mut seen = HashSet::new();
    vertices.iter().copied().filter(|v| seen.insert(*v)).collect()
}

/// A frontier may stop once its smallest key exceeds the best meeting of every
/// pair it takes part in: no later relaxation can shorten any of them.
fn should_stop<S: SearchSpace>(frontier: &mut SearchFrontier<S>, mut bests: impl Iterator<Item = f64>) -> bool {
    match frontier.min_key() {
        None => true,
        Some(key) => bests.all(|best| key > best),
    }
}

fn search_all<S: SearchSpace + Copy>(
    up: S,
    down: S,
    sources: &[NodeIx],
    sinks: &[NodeIx],
) -> Result<Vec<Vec<Meeting>>> {
    let mut forwards: Vec<SearchFrontier<S>> = sources
        .iter()
        .map(|s| {
            let mut frontier = SearchFrontier::new(up);
            frontier.update_distance(*s, None, 0.0);
            frontier
        })
        .collect();
    let mut backwards: Vec<SearchFrontier<S>> = sinks
        .iter()
        .map(|t| {
            let mut frontier = SearchFrontier::new(down);
            frontier.update_distance(*t, None, 0.0);
            frontier
        })
        .collect();
    let mut best = vec![vec![Meeting::none(); sinks.len()]; sources.len()];
    for (i, source) in sources.iter().enumerate() {
        for (j, backward) in backwards.iter().enumerate() {
            best[i][j].offer(*source, backward.distance(*source));
        }
    }

    let mut rounds = 0usize;
    loop {
        let mut active = false;
        for i in 0..forwards.len() {
            let forward = &mut forwards[i];
            if forward.finished {
                continue;
            }
            if should_stop(forward, best[i].iter().map(|m| m.length)) {
                forward.finished = true;
                continue;
            }
            active = true;
            let row = &mut best[i];
            forward.settle_next(|u, d| {
                for (j, backward) in backwards.iter().enumerate() {
                    row[j].offer(u, d + backward.distance(u));
                }
            })?;
        }
        for j in 0..backwards.len() {
            let backward = &mut backwards[j];
            if backward.finished {
                continue;
            }
            if should_stop(backward, best.iter().map(|row| row[j].length)) {
                backward.finished = true;
                continue;
            }
            active = true;
            backward.settle_next(|u, d| {
                for (i, forward) in forwards.iter().enumerate() {
                    best[i][j].offer(u, d + forward.distance(u));
                }
            })?;
        }
        if !active {
            break;
        }
        rounds += 1;
    }
    trace!(
        "many-to-many {}x{} finished after {} rounds",
        sources.len(),
        sinks.len(),
        rounds
    );
    Ok(best)
}
