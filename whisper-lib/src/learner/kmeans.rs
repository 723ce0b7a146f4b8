use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::analyzer::spectral::l2_distance;
use crate::error::{Result, WhisperError};

/// Clustering primitive the learner depends on. Any implementation that
/// turns a sample set into `k` prototype vectors may plug in.
pub trait Clusterer: Send + Sync {
    fn fit(&self, samples: &[Vec<f64>], k: usize) -> Result<Vec<Vec<f64>>>;
}

/// Lloyd's iteration with random initialization.
pub struct LloydKmeans {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Fixed seed for reproducible fits; entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl Default for LloydKmeans {
    fn default() -> Self {
        Self { max_iterations: 1000, tolerance: 1e-6, seed: None }
    }
}

impl LloydKmeans {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed), ..Self::default() }
    }
}

impl Clusterer for LloydKmeans {
    fn fit(&self, samples: &[Vec<f64>], k: usize) -> Result<Vec<Vec<f64>>> {
        if k == 0 {
            return Err(WhisperError::Learner("cluster count must be at least 1".into()));
        }
        if samples.len() < k {
            return Err(WhisperError::Learner(format!(
                "{} samples cannot seed {k} clusters",
                samples.len()
            )));
        }
        let dim = samples[0].len();
        if dim == 0 || samples.iter().any(|s| s.len() != dim) {
            return Err(WhisperError::Learner("inconsistent sample dimensions".into()));
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut centers: Vec<Vec<f64>> = sample(&mut rng, samples.len(), k)
            .into_iter()
            .map(|i| samples[i].clone())
            .collect();

        let mut assignment = vec![0usize; samples.len()];
        for _ in 0..self.max_iterations {
            for (slot, s) in assignment.iter_mut().zip(samples) {
                *slot = nearest(&centers, s);
            }

            let mut sums = vec![vec![0.0; dim]; k];
            let mut counts = vec![0usize; k];
            for (&c, s) in assignment.iter().zip(samples) {
                counts[c] += 1;
                for (acc, v) in sums[c].iter_mut().zip(s) {
                    *acc += v;
                }
            }

            let mut movement: f64 = 0.0;
            for c in 0..k {
                // An emptied cluster keeps its previous center.
                if counts[c] == 0 {
                    continue;
                }
                for v in &mut sums[c] {
                    *v /= counts[c] as f64;
                }
                movement = movement.max(l2_distance(&centers[c], &sums[c]));
                std::mem::swap(&mut centers[c], &mut sums[c]);
            }

            if movement < self.tolerance {
                break;
            }
        }
        Ok(centers)
    }
}

fn nearest(centers: &[Vec<f64>], sample: &[f64]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = l2_distance(c, sample);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_clouds_yield_their_means() {
        let mut samples = Vec::new();
        for i in 0..20 {
            let j = f64::from(i % 5) * 0.01;
            samples.push(vec![0.0 + j, 0.0 + j]);
            samples.push(vec![10.0 + j, 10.0 + j]);
        }

        let centers = LloydKmeans::with_seed(7).fit(&samples, 2).expect("fit succeeds");
        let mut lows = 0;
        let mut highs = 0;
        for c in &centers {
            if c[0] < 1.0 {
                lows += 1;
                assert!((c[0] - 0.02).abs() < 0.1);
            } else {
                highs += 1;
                assert!((c[0] - 10.02).abs() < 0.1);
            }
        }
        assert_eq!((lows, highs), (1, 1));
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let samples = vec![vec![1.0, 2.0]];
        assert!(LloydKmeans::with_seed(1).fit(&samples, 2).is_err());
    }

    #[test]
    fn inconsistent_dimensions_are_rejected() {
        let samples = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(LloydKmeans::with_seed(1).fit(&samples, 1).is_err());
    }

    #[test]
    fn seeded_fit_is_reproducible() {
        let samples: Vec<Vec<f64>> =
            (0..30).map(|i| vec![f64::from(i), f64::from(i % 7)]).collect();
        let a = LloydKmeans::with_seed(42).fit(&samples, 3).expect("fit succeeds");
        let b = LloydKmeans::with_seed(42).fit(&samples, 3).expect("fit succeeds");
        assert_eq!(a, b);
    }
}
