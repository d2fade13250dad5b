pub mod hmm;
pub mod matcher;
pub mod model;
pub mod recovery;
pub mod traj;
pub mod viterbi;

pub use matcher::MapMatcher;
pub use traj::{Observation, Trajectory, TrajectorySet};
