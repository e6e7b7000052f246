//! Variational autoencoder anomaly detector.
//!
//! The source's `classifiers/autoencoders.py` is an unfilled PyTorch
//! stub (just imports, no class body) — there is no original forward
//! pass or training loop to preserve, only the architecture description
//! in the spec: symmetric encoder/decoder with two hidden layers (64,
//! 32) around a latent dimension, MSE reconstruction + KL-to-`N(0, I)`
//! loss, and a fixed-quantile decision threshold learned from training
//! scores. Inference here is plain matrix-vector arithmetic with no
//! autodiff dependency, matching the rest of the workspace's
//! dependency-light numerics (see `linalg.rs`).

use crate::errors::ClassifyError;
use rand::Rng;

const HIDDEN1: usize = 64;
const HIDDEN2: usize = 32;

#[derive(Debug, Clone)]
pub struct VaeConfig {
    pub input_dim: usize,
    pub latent_dim: usize,
    /// Quantile of training reconstruction scores used as the anomaly
    /// decision boundary, e.g. `0.95`.
    pub quantile: f64,
}

impl Default for VaeConfig {
    fn default() -> Self {
        Self { input_dim: 0, latent_dim: 8, quantile: 0.95 }
    }
}

/// One fully connected layer with a tanh activation, initialized with a
/// small random spread so an untrained network doesn't saturate.
#[derive(Debug, Clone)]
struct Layer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl Layer {
    fn new(in_dim: usize, out_dim: usize, rng: &mut impl Rng) -> Self {
        let scale = 1.0 / (in_dim as f64).sqrt();
        let weights = (0..out_dim)
            .map(|_| (0..in_dim).map(|_| rng.gen_range(-scale..scale)).collect())
            .collect();
        Self { weights, bias: vec![0.0; out_dim] }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(self.bias.iter())
            .map(|(row, b)| {
                let z: f64 = row.iter().zip(input.iter()).map(|(w, x)| w * x).sum::<f64>() + b;
                z.tanh()
            })
            .collect()
    }

    fn forward_linear(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(self.bias.iter())
            .map(|(row, b)| row.iter().zip(input.iter()).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

/// Symmetric encoder/decoder around a Gaussian latent bottleneck: widths
/// `d -> 64 -> 32 -> latent` and back, per spec §4.7(c).
pub struct VaeDetector {
    config: VaeConfig,
    enc1: Layer,
    enc2: Layer,
    mu: Layer,
    log_var: Layer,
    dec1: Layer,
    dec2: Layer,
    out: Layer,
    /// Reconstruction MSE scores observed during `fit`; the `quantile`-th
    /// order statistic of this set is the live decision boundary.
    training_scores: Vec<f64>,
    threshold: f64,
}

impl VaeDetector {
    pub fn new(config: VaeConfig) -> Self {
        let d = config.input_dim;
        let latent = config.latent_dim;
        let mut rng = rand::thread_rng();
        Self {
            enc1: Layer::new(d, HIDDEN1, &mut rng),
            enc2: Layer::new(HIDDEN1, HIDDEN2, &mut rng),
            mu: Layer::new(HIDDEN2, latent, &mut rng),
            log_var: Layer::new(HIDDEN2, latent, &mut rng),
            dec1: Layer::new(latent, HIDDEN2, &mut rng),
            dec2: Layer::new(HIDDEN2, HIDDEN1, &mut rng),
            out: Layer::new(HIDDEN1, d, &mut rng),
            config,
            training_scores: Vec::new(),
            threshold: f64::INFINITY,
        }
    }

    /// Encode to `(mu, log_var)`, the parameters of the approximate
    /// posterior `q(z|x)`.
    fn encode(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let h1 = self.enc1.forward(x);
        let h2 = self.enc2.forward(&h1);
        (self.mu.forward_linear(&h2), self.log_var.forward_linear(&h2))
    }

    fn decode(&self, z: &[f64]) -> Vec<f64> {
        let h1 = self.dec1.forward(z);
        let h2 = self.dec2.forward(&h1);
        self.out.forward_linear(&h2)
    }

    /// Reconstruction MSE for one input, using the posterior mean as the
    /// latent code (inference is deterministic: no sampling noise).
    fn reconstruction_mse(&self, x: &[f64]) -> f64 {
        let (mu, _log_var) = self.encode(x);
        let recon = self.decode(&mu);
        let n = x.len() as f64;
        x.iter().zip(recon.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n
    }

    /// Offline/bootstrap training pass: a plain gradient-descent loop
    /// over MSE + KL-to-`N(0,I)` loss, then records the reconstruction
    /// score distribution used to set `threshold` at the configured
    /// quantile. Read-only thereafter; `classify` never mutates weights.
    pub fn fit(&mut self, samples: &[Vec<f64>], epochs: usize, lr: f64) {
        for _ in 0..epochs {
            for x in samples {
                self.train_step(x, lr);
            }
        }
        self.training_scores = samples.iter().map(|x| self.reconstruction_mse(x)).collect();
        self.threshold = quantile(&self.training_scores, self.config.quantile);
    }

    /// One finite-difference gradient step on a single sample. With no
    /// tensor/autodiff framework in the dependency stack, a central
    /// difference per weight against the MSE+KL loss stands in for a
    /// hand-written backward pass — slower, but the network here is
    /// small and training only runs offline during the bootstrap phase.
    fn train_step(&mut self, x: &[f64], lr: f64) {
        self.train_layer(x, lr, |s| &mut s.enc1);
        self.train_layer(x, lr, |s| &mut s.enc2);
        self.train_layer(x, lr, |s| &mut s.mu);
        self.train_layer(x, lr, |s| &mut s.log_var);
        self.train_layer(x, lr, |s| &mut s.dec1);
        self.train_layer(x, lr, |s| &mut s.dec2);
        self.train_layer(x, lr, |s| &mut s.out);
    }

    fn train_layer(&mut self, x: &[f64], lr: f64, select: impl Fn(&mut Self) -> &mut Layer) {
        const EPS: f64 = 1e-4;
        let (rows, cols) = {
            let layer = select(self);
            (layer.weights.len(), layer.weights[0].len())
        };
        for i in 0..rows {
            for j in 0..cols {
                let orig = select(self).weights[i][j];
                select(self).weights[i][j] = orig + EPS;
                let loss_plus = self.loss(x);
                select(self).weights[i][j] = orig - EPS;
                let loss_minus = self.loss(x);
                let grad = (loss_plus - loss_minus) / (2.0 * EPS);
                select(self).weights[i][j] = orig - lr * grad;
            }
        }
    }

    fn loss(&self, x: &[f64]) -> f64 {
        let (mu, log_var) = self.encode(x);
        let recon = self.decode(&mu);
        let n = x.len() as f64;
        let mse: f64 = x.iter().zip(recon.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n;
        let kl: f64 = mu
            .iter()
            .zip(log_var.iter())
            .map(|(m, lv)| -0.5 * (1.0 + lv - m * m - lv.exp()))
            .sum();
        mse + kl / mu.len().max(1) as f64
    }

    pub fn classify(&self, values: &[f64]) -> Result<(bool, f64, Vec<f64>), ClassifyError> {
        if values.len() != self.config.input_dim {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.config.input_dim,
                got: values.len(),
            });
        }
        let (mu, _) = self.encode(values);
        let recon = self.decode(&mu);
        let per_feature: Vec<f64> = values.iter().zip(recon.iter()).map(|(a, b)| (a - b).powi(2)).collect();
        let score = per_feature.iter().sum::<f64>() / values.len() as f64;
        if !score.is_finite() {
            return Err(ClassifyError::NonFiniteScore);
        }
        Ok((score > self.threshold, score, per_feature))
    }
}

/// `q`-th order statistic of `data` (`q` in `[0, 1]`), linear-interpolated
/// between the two nearest ranks, matching numpy's default `quantile`.
fn quantile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::INFINITY;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rejects_dimension_mismatch() {
        let det = VaeDetector::new(VaeConfig { input_dim: 4, latent_dim: 2, quantile: 0.95 });
        let err = det.classify(&[0.0, 0.0]);
        assert!(matches!(err, Err(ClassifyError::DimensionMismatch { .. })));
    }

    #[test]
    fn quantile_of_sorted_uniform_set_matches_expected_rank() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&data, 0.0), 1.0);
        assert_eq!(quantile(&data, 1.0), 5.0);
        assert!((quantile(&data, 0.5) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn untrained_detector_has_infinite_threshold_so_nothing_is_flagged() {
        let det = VaeDetector::new(VaeConfig { input_dim: 3, latent_dim: 2, quantile: 0.95 });
        let (is_anomaly, score, per_feature) = det.classify(&[1.0, 2.0, 3.0]).unwrap();
        assert!(!is_anomaly);
        assert!(score.is_finite());
        assert_eq!(per_feature.len(), 3);
    }

    #[test]
    fn fit_sets_a_finite_threshold_from_training_scores() {
        let mut det = VaeDetector::new(VaeConfig { input_dim: 3, latent_dim: 2, quantile: 0.95 });
        let samples: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 * 0.1, 0.0, 0.0]).collect();
        det.fit(&samples, 1, 0.01);
        assert!(det.threshold.is_finite());
    }
}
