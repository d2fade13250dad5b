use super::model::{CandidatePoint, SequenceState};
use super::traj::Observation;
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/**
 * Time-inhomogeneous Viterbi over candidate points. Trellis nodes live in an
 * arena and point back to their predecessor by index, so a finished chain is
 * dropped in one piece.
 */

/// Matching state of one observation: its candidates, their emission
/// log-probabilities and the transitions into them from the previous step.
#[derive(Debug, Clone)]
pub struct TimeStep {
    pub observation: Observation,
    pub candidates: Vec<CandidatePoint>,
    emissions: Vec<Option<f64>>,
    // (previous candidate, current candidate) -> log-probability; absent means impossible
    transitions: HashMap<(usize, usize), f64>,
}

impl TimeStep {
    pub fn new(observation: Observation, candidates: Vec<CandidatePoint>) -> Self {
        let emissions = vec![None; candidates.len()];
        TimeStep {
            observation,
            candidates,
            emissions,
            transitions: HashMap::new(),
        }
    }

    pub fn add_emission_log_probability(&mut self, candidate: usize, probability: f64) -> Result<()> {
        let slot = self
            .emissions
            .get_mut(candidate)
            .ok_or_else(|| anyhow!("no candidate {}", candidate))?;
        if slot.is_some() {
            return Err(anyhow!("candidate {} already has an emission probability", candidate));
        }
        *slot = Some(probability);
        Ok(())
    }

    pub fn add_transition_log_probability(&mut self, from: usize, to: usize, probability: f64) -> Result<()> {
        if self.transitions.insert((from, to), probability).is_some() {
            return Err(anyhow!("transition {} -> {} has already been added", from, to));
        }
        Ok(())
    }

    pub fn emission(&self, candidate: usize) -> Option<f64> {
        self.emissions.get(candidate).copied().flatten()
    }

    pub fn transition(&self, from: usize, to: usize) -> Option<f64> {
        self.transitions.get(&(from, to)).copied()
    }
}

/// Trellis node.
#[derive(Debug, Clone)]
struct ExtendedState {
    candidate: CandidatePoint,
    observation: Observation,
    back_pointer: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Viterbi {
    states: Vec<ExtendedState>,
    // per candidate of the last accepted step: (score, arena index), None when unreachable
    message: Vec<Option<(f64, usize)>>,
    broken: bool,
}

impl Viterbi {
    pub fn new() -> Self {
        Viterbi::default()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn start_with_initial_observation(&mut self, step: &TimeStep) {
        self.states.clear();
        self.message.clear();
        for (j, candidate) in step.candidates.iter().enumerate() {
            match step.emission(j) {
                Some(score) => {
                    self.states.push(ExtendedState {
                        candidate: *candidate,
                        observation: step.observation.clone(),
                        back_pointer: None,
                    });
                    self.message.push(Some((score, self.states.len() - 1)));
                }
                None => self.message.push(None),
            }
        }
        self.broken = self.message.iter().all(Option::is_none);
    }

    /// Advances the trellis by one step. When no candidate of `step` can be
    /// reached the chain is marked broken and the previous message is kept, so
    /// the sequence up to the previous step can still be extracted.
    pub fn next_step(&mut self, step: &TimeStep) {
        if self.broken {
            return;
        }
        let mut next: Vec<Option<(f64, usize)>> = Vec::with_capacity(step.candidates.len());
        let mut pending = Vec::new();
        for (j, candidate) in step.candidates.iter().enumerate() {
            let emission = match step.emission(j) {
                Some(emission) => emission,
                None => {
                    next.push(None);
                    continue;
                }
            };
            let mut best: Option<(f64, usize)> = None;
            for (i, entry) in self.message.iter().enumerate() {
                let (score, state) = match entry {
                    Some(entry) => *entry,
                    None => continue,
                };
                let transition = match step.transition(i, j) {
                    Some(transition) => transition,
                    None => continue,
                };
                let total = score + transition;
                // first maximum wins
                if best.map_or(true, |(b, _)| total > b) {
                    best = Some((total, state));
                }
            }
            match best {
                Some((score, back)) => {
                    let index = self.states.len() + pending.len();
                    pending.push(ExtendedState {
                        candidate: *candidate,
                        observation: step.observation.clone(),
                        back_pointer: Some(back),
                    });
                    next.push(Some((score + emission, index)));
                }
                None => next.push(None),
            }
        }
        if next.iter().all(Option::is_none) {
            self.broken = true;
            return;
        }
        self.states.extend(pending);
        self.message = next;
    }

    /// Backtracks from the best candidate of the last accepted step, oldest first.
    pub fn compute_most_likely_sequence(&self) -> Vec<SequenceState> {
        let mut best: Option<(f64, usize)> = None;
        for (score, state) in self.message.iter().flatten() {
            if best.map_or(true, |(b, _)| *score > b) {
                best = Some((*score, *state));
            }
        }
        let mut sequence = Vec::new();
        let mut cursor = best.map(|(_, state)| state);
        while let Some(index) = cursor {
            let state = &self.states[index];
            sequence.push(SequenceState::matched(state.candidate, state.observation.clone()));
            cursor = state.back_pointer;
        }
        sequence.reverse();
        sequence
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::algorithm::Point;
    use chrono::{TimeZone, Utc};

    fn observation(secs: i64) -> Observation {
        Observation {
            point: Point(121.0, 31.0),
            time: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn step(secs: i64, segment_ids: &[i64], emissions: &[f64]) -> TimeStep {
        let candidates = segment_ids
            .iter()
            .map(|id| CandidatePoint {
                edge: *id as usize,
                segment_id: *id,
                point: Point(121.0, 31.0),
                offset: 0.0,
                error_distance: 0.0,
                sub_index: 0,
            })
            .collect();
        let mut step = TimeStep::new(observation(secs), candidates);
        for (j, e) in emissions.iter().enumerate() {
            step.add_emission_log_probability(j, *e).unwrap();
        }
        step
    }

    fn ids(sequence: &[SequenceState]) -> Vec<i64> {
        sequence
            .iter()
            .map(|s| s.candidate.map(|c| c.segment_id).unwrap_or(-1))
            .collect()
    }

    #[test]
    fn duplicates_are_refused() {
        let mut s = step(0, &[1, 2], &[-1.0, -2.0]);
        assert!(s.add_emission_log_probability(0, -1.0).is_err());
        assert!(s.add_emission_log_probability(5, -1.0).is_err());
        s.add_transition_log_probability(0, 1, -1.0).unwrap();
        assert!(s.add_transition_log_probability(0, 1, -3.0).is_err());
    }

    #[test]
    fn transitions_outweigh_emissions() {
        let mut viterbi = Viterbi::new();
        viterbi.start_with_initial_observation(&step(0, &[1, 2], &[-1.0, -1.5]));
        // candidate 20 is closer but only reachable from the weaker start
        let mut second = step(1, &[10, 20], &[-2.0, -1.0]);
        second.add_transition_log_probability(0, 0, -0.5).unwrap();
        second.add_transition_log_probability(1, 1, -5.0).unwrap();
        viterbi.next_step(&second);
        assert!(!viterbi.is_broken());
        assert_eq!(ids(&viterbi.compute_most_likely_sequence()), vec![1, 10]);
    }

    #[test]
    fn broken_chain_keeps_previous_message() {
        let mut viterbi = Viterbi::new();
        viterbi.start_with_initial_observation(&step(0, &[1], &[-1.0]));
        let mut second = step(1, &[2], &[-1.0]);
        second.add_transition_log_probability(0, 0, -1.0).unwrap();
        viterbi.next_step(&second);
        // no transition into the third step
        viterbi.next_step(&step(2, &[3, 4], &[-1.0, -1.0]));
        assert!(viterbi.is_broken());
        let sequence = viterbi.compute_most_likely_sequence();
        assert_eq!(ids(&sequence), vec![1, 2]);
        assert_eq!(sequence[1].observation.time.timestamp(), 1);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let mut viterbi = Viterbi::new();
        viterbi.start_with_initial_observation(&step(0, &[1, 2], &[-1.0, -1.0]));
        assert_eq!(ids(&viterbi.compute_most_likely_sequence()), vec![1]);
        assert!(Viterbi::new().compute_most_likely_sequence().is_empty());
    }
}
