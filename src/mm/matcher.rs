use super::hmm::HmmProbabilities;
use super::model::{CandidatePoint, Config, MatchedTrajectory, RouteOfTrajectory, SequenceState};
use super::recovery::RouteRecovery;
use super::traj::{Observation, Trajectory};
use super::viterbi::{TimeStep, Viterbi};
use crate::algorithm;
use crate::graph::RoadGraph;
use crate::shortestpath::{self, ManyToMany, PathCache, ShortestPathAlgo};
use anyhow::{bail, Result};
use log::{debug, info, warn};

/// HMM map matcher over a shared road graph. The shortest-path engine is chosen
/// once from the configuration; a bad choice fails here, never mid-match.
pub struct MapMatcher<'a> {
    graph: &'a RoadGraph,
    config: Config,
    probabilities: HmmProbabilities,
    path_algo: Box<dyn ShortestPathAlgo + 'a>,
    batch: Option<ManyToMany<'a>>,
    cache: Option<PathCache>,
}

impl<'a> MapMatcher<'a> {
    pub fn new(graph: &'a RoadGraph, config: Config) -> Result<Self> {
        if !(config.sigma > 0.0) || !(config.beta > 0.0) {
            bail!("sigma and beta should be positive, got {} and {}", config.sigma, config.beta);
        }
        if !(config.radius >= 0.0) {
            bail!("radius should not be negative, got {}", config.radius);
        }
        if config.batched && config.cache_radius.is_some() {
            bail!("path cache and batched transitions can not be combined");
        }
        let path_algo = shortestpath::get_algo(graph, config.algorithm)?;
        let batch = if config.batched {
            Some(ManyToMany::new(graph, config.algorithm)?)
        } else {
            None
        };
        let cache = match config.cache_radius {
            Some(radius) => Some(PathCache::build(graph, radius)?),
            None => None,
        };
        debug!("map matcher config: {:?}", config);
        Ok(MapMatcher {
            graph,
            probabilities: HmmProbabilities::new(config.sigma, config.beta),
            config,
            path_algo,
            batch,
            cache,
        })
    }

    pub fn match_trajectory(&self, trajectory: &Trajectory) -> Result<MatchedTrajectory> {
        let points = self.compute_viterbi_sequence(&trajectory.observations)?;
        debug_assert_eq!(points.len(), trajectory.observations.len());
        Ok(MatchedTrajectory {
            id: trajectory.id.clone(),
            points,
        })
    }

    pub fn recover_route(&self, matched: &MatchedTrajectory) -> Result<Vec<RouteOfTrajectory>> {
        RouteRecovery::new(self.graph, self.path_algo.as_ref()).recover(matched)
    }

    /// Matches and recovers in one go. The route may fall apart into several
    /// connected fragments.
    pub fn match_to_route(&self, trajectory: &Trajectory) -> Result<Vec<RouteOfTrajectory>> {
        let matched = self.match_trajectory(trajectory)?;
        self.recover_route(&matched)
    }

    fn create_time_step(&self, observation: &Observation) -> Result<Option<TimeStep>> {
        let candidates = self.graph.candidates_near(&observation.point, self.config.radius);
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut step = TimeStep::new(observation.clone(), candidates);
        for j in 0..step.candidates.len() {
            let probability = self
                .probabilities
                .emission_log_probability(step.candidates[j].error_distance);
            step.add_emission_log_probability(j, probability)?;
        }
        Ok(Some(step))
    }

    fn compute_transitions(&self, prev: &TimeStep, cur: &mut TimeStep) -> Result<()> {
        let linear = algorithm::haversine_distance(&prev.observation.point, &cur.observation.point);
        let routes = match &self.batch {
            Some(batch) => self.batched_route_lengths(batch, prev, cur)?,
            None => {
                let mut routes = Vec::with_capacity(prev.candidates.len() * cur.candidates.len());
                for (i, p) in prev.candidates.iter().enumerate() {
                    for (j, c) in cur.candidates.iter().enumerate() {
                        routes.push((i, j, self.route_length(p, c)?));
                    }
                }
                routes
            }
        };
        for (i, j, route) in routes {
            // impossible transitions stay absent
            if route.is_finite() {
                let probability = self.probabilities.transition_log_probability(route, linear);
                cur.add_transition_log_probability(i, j, probability)?;
            }
        }
        Ok(())
    }

    /// Route length between two candidates, from the path cache when the pair
    /// is in it and from the configured algorithm otherwise.
    fn route_length(&self, prev: &CandidatePoint, cur: &CandidatePoint) -> Result<f64> {
        if let Some(distance) = shortestpath::same_segment_distance(prev, cur) {
            return Ok(distance);
        }
        if let Some(cache) = &self.cache {
            let network = &self.graph.network;
            if let Some(distance) = cache.get(network.end_node(prev.edge), network.start_node(cur.edge)) {
                return Ok(shortestpath::candidate_route_length(self.graph, prev, cur, distance));
            }
        }
        self.path_algo.find_path_between_candidates(prev, cur)
    }

    fn batched_route_lengths(
        &self,
        batch: &ManyToMany,
        prev: &TimeStep,
        cur: &TimeStep,
    ) -> Result<Vec<(usize, usize, f64)>> {
        let network = &self.graph.network;
        let sources: Vec<_> = prev.candidates.iter().map(|c| network.end_node(c.edge)).collect();
        let sinks: Vec<_> = cur.candidates.iter().map(|c| network.start_node(c.edge)).collect();
        let table = batch.find_all_pairs(&sources, &sinks)?;
        let mut routes = Vec::with_capacity(sources.len() * sinks.len());
        for (i, p) in prev.candidates.iter().enumerate() {
            for (j, c) in cur.candidates.iter().enumerate() {
                let route = match shortestpath::same_segment_distance(p, c) {
                    Some(distance) => distance,
                    None => {
                        let distance = table
                            .get(&(sources[i], sinks[j]))
                            .copied()
                            .unwrap_or(f64::INFINITY);
                        if distance.is_finite() {
                            shortestpath::candidate_route_length(self.graph, p, c, distance)
                        } else {
                            f64::INFINITY
                        }
                    }
                };
                routes.push((i, j, route));
            }
        }
        Ok(routes)
    }

    /// One state per observation, in order. Observations without candidates
    /// yield an unmatched state and end the current chain; a chain that cannot
    /// continue is flushed and restarted at the current observation.
    fn compute_viterbi_sequence(&self, observations: &[Observation]) -> Result<Vec<SequenceState>> {
        let mut sequence = Vec::with_capacity(observations.len());
        let mut viterbi = Viterbi::new();
        let mut prev_step: Option<TimeStep> = None;
        for (index, observation) in observations.iter().enumerate() {
            let mut step = match self.create_time_step(observation)? {
                Some(step) => step,
                None => {
                    warn!("no candidate found in {} gps point", index);
                    sequence.extend(viterbi.compute_most_likely_sequence());
                    sequence.push(SequenceState::unmatched(observation.clone()));
                    viterbi = Viterbi::new();
                    prev_step = None;
                    continue;
                }
            };
            match &prev_step {
                None => viterbi.start_with_initial_observation(&step),
                Some(prev) => {
                    self.compute_transitions(prev, &mut step)?;
                    viterbi.next_step(&step);
                }
            }
            if viterbi.is_broken() {
                info!("hmm chain broken at {} gps point, restart", index);
                sequence.extend(viterbi.compute_most_likely_sequence());
                viterbi = Viterbi::new();
                viterbi.start_with_initial_observation(&step);
            }
            prev_step = Some(step);
        }
        sequence.extend(viterbi.compute_most_likely_sequence());
        Ok(sequence)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::algorithm::Point;
    use crate::shortestpath::AlgorithmKind;
    use crate::testutil;
    use approx::assert_abs_diff_eq;

    fn trajectory(points: &[(f64, f64)], step_secs: i64) -> Trajectory {
        let timestamps = (0..points.len() as i64)
            .map(|i| 1_700_000_000 + i * step_secs)
            .collect();
        let points = points.iter().map(|(x, y)| Point(*x, *y)).collect();
        Trajectory::with_timestamps("t", points, Some(timestamps)).unwrap()
    }

    // S1, S2, S2, S3, S3 on the chain 101 -> 102 -> 103, about 11 m off the road
    const ALONG_CHAIN: [(f64, f64); 5] = [
        (121.0025, 31.0001),
        (121.0065, 31.0001),
        (121.0085, 31.0001),
        (121.0115, 31.0001),
        (121.0135, 31.0001),
    ];

    #[test]
    fn matches_along_connected_segments() {
        let graph = testutil::chain_graph();
        let matcher = MapMatcher::new(&graph, Config::default()).unwrap();
        let traj = trajectory(&ALONG_CHAIN, 20);
        let matched = matcher.match_trajectory(&traj).unwrap();
        assert_eq!(
            matched.segment_ids(),
            vec![Some(101), Some(102), Some(102), Some(103), Some(103)]
        );

        let routes = matcher.recover_route(&matched).unwrap();
        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.road_ids(), vec![101, 102, 103]);
        assert_eq!(route.sub_routes[0].enter_time, traj.observations[0].time);
        for pair in route.sub_routes.windows(2) {
            assert!(pair[0].enter_time < pair[1].enter_time);
        }
        assert_eq!(route.leave_time, traj.observations[4].time);
    }

    #[test]
    fn unmatched_observation_splits_route() {
        let graph = testutil::chain_graph();
        let matcher = MapMatcher::new(&graph, Config::default()).unwrap();
        let mut points = ALONG_CHAIN.to_vec();
        // far away from every segment
        points.insert(2, (121.0075, 31.01));
        let traj = trajectory(&points, 20);
        let matched = matcher.match_trajectory(&traj).unwrap();
        assert_eq!(matched.points.len(), 6);
        let ids = matched.segment_ids();
        assert_eq!(ids.iter().filter(|id| id.is_none()).count(), 1);
        assert_eq!(ids[2], None);

        let routes = matcher.recover_route(&matched).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].road_ids(), vec![101, 102]);
        assert_eq!(routes[0].leave_time, traj.observations[1].time);
        assert!(routes[0].leave_estimated);
        assert_eq!(routes[1].road_ids(), vec![102, 103]);
        assert_eq!(routes[1].sub_routes[0].enter_time, traj.observations[3].time);
        assert!(routes[1].enter_estimated);
    }

    #[test]
    fn impossible_transition_restarts_chain() {
        let graph = testutil::chain_graph();
        let matcher = MapMatcher::new(&graph, Config::default()).unwrap();
        // moving backwards along the one-way chain
        let traj = trajectory(&[(121.0135, 31.0001), (121.0025, 31.0001)], 30);
        let matched = matcher.match_trajectory(&traj).unwrap();
        assert_eq!(matched.segment_ids(), vec![Some(103), Some(101)]);
        let routes = matcher.recover_route(&matched).unwrap();
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn matching_is_deterministic_and_batched_agrees() {
        let graph = testutil::grid_graph(5);
        let plain = MapMatcher::new(&graph, Config::default()).unwrap();
        let batched = MapMatcher::new(
            &graph,
            Config {
                algorithm: AlgorithmKind::BiDijkstra,
                batched: true,
                ..Config::default()
            },
        )
        .unwrap();
        let mut ch_graph = testutil::grid_graph(5);
        ch_graph.precompute_contraction_hierarchy().unwrap();
        let batched_ch = MapMatcher::new(
            &ch_graph,
            Config {
                algorithm: AlgorithmKind::Ch,
                batched: true,
                ..Config::default()
            },
        )
        .unwrap();
        let points = [
            (121.0003, 31.00002),
            (121.0011, 31.00003),
            (121.0019, 31.0002),
            (121.00202, 31.0011),
            (121.0021, 31.0027),
            (121.0031, 31.00398),
        ];
        let traj = trajectory(&points, 15);
        let first = plain.match_trajectory(&traj).unwrap();
        assert_eq!(first.points.len(), points.len());
        assert_eq!(plain.match_trajectory(&traj).unwrap(), first);
        assert_eq!(batched.match_trajectory(&traj).unwrap().segment_ids(), first.segment_ids());
        assert_eq!(batched_ch.match_trajectory(&traj).unwrap().segment_ids(), first.segment_ids());
    }

    #[test]
    fn cached_and_searched_route_lengths_agree() {
        let graph = testutil::chain_graph();
        let plain = MapMatcher::new(&graph, Config::default()).unwrap();
        let cached = |radius| {
            MapMatcher::new(
                &graph,
                Config {
                    cache_radius: Some(radius),
                    ..Config::default()
                },
            )
            .unwrap()
        };
        // the whole chain fits in the first cache, only vertices themselves in the second
        let wide = cached(10_000.0);
        let narrow = cached(1.0);
        let first = graph.network.find_edge_index(101).unwrap();
        let last = graph.network.find_edge_index(103).unwrap();
        let (prev, cur) = (testutil::candidate(&graph, first, 100.0), testutil::candidate(&graph, last, 30.0));
        let (from, to) = (graph.network.end_node(first), graph.network.start_node(last));
        assert!(wide.cache.as_ref().unwrap().get(from, to).is_some());
        assert!(narrow.cache.as_ref().unwrap().get(from, to).is_none());

        let expected = plain.route_length(&prev, &cur).unwrap();
        assert!(expected.is_finite());
        assert_abs_diff_eq!(wide.route_length(&prev, &cur).unwrap(), expected, epsilon = 1e-9);
        assert_abs_diff_eq!(narrow.route_length(&prev, &cur).unwrap(), expected, epsilon = 1e-9);
        // unreachable pairs are never cached and stay infinite
        assert!(wide.route_length(&cur, &prev).unwrap().is_infinite());

        let traj = trajectory(&ALONG_CHAIN, 20);
        let reference = plain.match_trajectory(&traj).unwrap();
        assert_eq!(wide.match_trajectory(&traj).unwrap(), reference);
        assert_eq!(narrow.match_trajectory(&traj).unwrap(), reference);
    }

    #[test]
    fn bad_configuration_fails_eagerly() {
        let graph = testutil::chain_graph();
        let ch = Config {
            algorithm: AlgorithmKind::Ch,
            ..Config::default()
        };
        assert!(MapMatcher::new(&graph, ch).is_err());
        let batched_astar = Config {
            batched: true,
            ..Config::default()
        };
        assert!(MapMatcher::new(&graph, batched_astar).is_err());
        let negative = Config {
            sigma: -1.0,
            ..Config::default()
        };
        assert!(MapMatcher::new(&graph, negative).is_err());
        let cached_batch = Config {
            algorithm: AlgorithmKind::BiDijkstra,
            batched: true,
            cache_radius: Some(500.0),
            ..Config::default()
        };
        assert!(MapMatcher::new(&graph, cached_batch).is_err());
    }
}
