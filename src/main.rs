use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use trajmatch::graph::{network, RoadGraph};
use trajmatch::mm::model::Config;
use trajmatch::mm::{MapMatcher, TrajectorySet};
use trajmatch::shortestpath::ch::ContractionHierarchy;
use trajmatch::shortestpath::AlgorithmKind;
use trajmatch::utils;

#[derive(Parser, Debug)]
#[command(name = "trajmatch")]
#[command(version = "0.1")]
#[command(about = "hmm map matching and route recovery for gps trajectories", long_about = None)]
struct Args {
    /// emission standard deviation in meters
    #[arg(long, default_value_t = 50.0)]
    sigma: f64,
    /// transition exponential parameter
    #[arg(long, default_value_t = 2.0)]
    beta: f64,
    /// find candidate points in radius (meters)
    #[arg(long, default_value_t = 50.0)]
    radius: f64,
    /// shortest path algorithm
    #[arg(long, value_enum, default_value_t = AlgorithmKind::AStar)]
    algorithm: AlgorithmKind,
    /// compute transitions with the many-to-many engine (bi-dijkstra or ch)
    #[arg(long)]
    batched: bool,
    /// cache network distances up to this many meters before matching
    #[arg(long, value_name = "METERS")]
    cache_radius: Option<f64>,
    /// build the contraction hierarchy before matching
    #[arg(long)]
    precompute_ch: bool,
    /// load a previously exported contraction hierarchy
    #[arg(long, value_name = "CH_FILE")]
    ch_import: Option<PathBuf>,
    /// write the contraction hierarchy to this file
    #[arg(long, value_name = "CH_FILE")]
    ch_export: Option<PathBuf>,
    /// road network path
    #[arg(short, long, value_name = "ROAD_NETWORK_FILE")]
    network_file: PathBuf,

    /// input gps traj (.geojson or .wkt)
    #[arg(value_name = "GPS_TRAJ_FILE")]
    input_file: PathBuf,
}

fn load_graph(path: &Path) -> Result<RoadGraph> {
    info!("loading network from {}", path.display());
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let geojson = geojson::GeoJson::from_reader(BufReader::new(file))?;
    let network = network::Network::try_from(geojson)?;
    info!(
        "load road network success, {} nodes {} segments",
        network.nodes.len(),
        network.edges.len()
    );
    Ok(RoadGraph::new(network))
}

fn load_trajectories(path: &Path) -> Result<TrajectorySet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("gps file {} has no extension", path.display()))?;
    match ext {
        "geojson" | "json" => {
            info!("read geojson file {} ", path.display());
            let reader = BufReader::new(File::open(path)?);
            let geojson = geojson::GeoJson::from_reader(reader)?;
            TrajectorySet::try_from(geojson)
        }
        "wkt" => {
            info!("read wkt file {} ", path.display());
            let content = fs::read_to_string(path)?;
            let wkt: wkt::Wkt<f64> = content
                .trim()
                .parse()
                .map_err(|e| anyhow!("read gps traj failed: {}", e))?;
            TrajectorySet::try_from(wkt)
        }
        other => Err(anyhow!("gps file format {} not support", other)),
    }
}

fn main() -> Result<()> {
    utils::log::log_init();
    let args = Args::parse();
    debug!("{:?}", args);

    let mut graph = load_graph(&args.network_file)?;
    if let Some(path) = &args.ch_import {
        let hierarchy = ContractionHierarchy::load(&graph, path)?;
        graph.set_contraction_hierarchy(hierarchy);
    } else if args.precompute_ch || args.ch_export.is_some() || args.algorithm == AlgorithmKind::Ch {
        graph.precompute_contraction_hierarchy()?;
    }
    if let (Some(path), Some(hierarchy)) = (&args.ch_export, graph.contraction_hierarchy()) {
        hierarchy.save(&graph, path)?;
    }

    let trajectories = load_trajectories(&args.input_file)?;
    let config = Config {
        sigma: args.sigma,
        beta: args.beta,
        radius: args.radius,
        algorithm: args.algorithm,
        batched: args.batched,
        cache_radius: args.cache_radius,
    };
    let matcher = MapMatcher::new(&graph, config)?;

    for traj in trajectories.trajs.iter() {
        if traj.is_empty() {
            warn!("trajectory {} is empty, skip", traj.id);
            continue;
        }
        let matched = matcher.match_trajectory(traj)?;
        info!(
            "trajectory {}: matched {}/{} points, edges: {:?}",
            traj.id,
            matched.matched_count(),
            traj.len(),
            matched.segment_ids()
        );
        for (i, route) in matcher.recover_route(&matched)?.iter().enumerate() {
            info!(
                "trajectory {} route {}: roads {:?}, leave at {}{}",
                traj.id,
                i,
                route.road_ids(),
                route.leave_time,
                if route.enter_estimated || route.leave_estimated {
                    " (estimated boundary)"
                } else {
                    ""
                }
            );
        }
    }
    Ok(())
}
