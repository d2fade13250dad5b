use std::f64::consts::PI;

/// Log-probabilities of the hidden Markov model: a Gaussian on the distance
/// between observation and candidate, an exponential on how much the route
/// length differs from the straight-line distance.
#[derive(Debug, Clone, Copy)]
pub struct HmmProbabilities {
    sigma: f64,
    beta: f64,
}

impl HmmProbabilities {
    pub fn new(sigma: f64, beta: f64) -> Self {
        HmmProbabilities { sigma, beta }
    }

    pub fn emission_log_probability(&self, distance: f64) -> f64 {
        log_normal_distribution(self.sigma, distance)
    }

    pub fn transition_log_probability(&self, route_length: f64, linear_distance: f64) -> f64 {
        let difference = (linear_distance - route_length).abs();
        log_exponential_distribution(self.beta, difference)
    }
}

fn log_normal_distribution(sigma: f64, x: f64) -> f64 {
    (1.0 / ((2.0 * PI).sqrt() * sigma)).ln() + -0.5 * (x / sigma).powi(2)
}

fn log_exponential_distribution(beta: f64, x: f64) -> f64 {
    (1.0 / beta).ln() - x / beta
}
