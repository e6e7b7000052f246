use crate::errors::{ClassifyError, ConfigError};
use crate::linalg::{dot, norm, svd_right, Matrix};
use rand::Rng;

/// Something that can absorb normalized sample vectors and hand back a
/// right-singular basis (`Vt`, one row per basis vector, most significant
/// first) approximating the subspace of everything it has seen.
pub trait SubspaceSketch: Send {
    fn append(&mut self, y: &[f64]);
    fn reconstruction_basis(&self) -> Vec<Vec<f64>>;
}

/// Baseline sketch: keeps the entire sample history and refreshes the
/// basis via a full SVD on every append. O(n) memory, exact.
#[derive(Debug, Default)]
pub struct GlobalUpdate {
    history: Vec<Vec<f64>>,
}

impl GlobalUpdate {
    pub fn new() -> Self {
        Self { history: Vec::new() }
    }
}

impl SubspaceSketch for GlobalUpdate {
    fn append(&mut self, y: &[f64]) {
        self.history.push(y.to_vec());
    }

    fn reconstruction_basis(&self) -> Vec<Vec<f64>> {
        let mat = Matrix::from_rows(&self.history);
        let (_s, vt) = svd_right(&mat);
        (0..vt.rows).map(|i| vt.row(i).to_vec()).collect()
    }
}

/// Frequent-Directions sketch: a fixed `ell x d` buffer that shrinks
/// singular values after each refresh, bounding the covariance error of
/// the approximated subspace instead of keeping the full history.
pub struct FrequentDirections {
    d: usize,
    ell: usize,
    sketch: Matrix,
    vt: Matrix,
    next_row: usize,
}

impl FrequentDirections {
    pub fn new(d: usize, ell: usize) -> Self {
        Self {
            d,
            ell,
            sketch: Matrix::zeros(ell, d),
            vt: Matrix::zeros(ell, d),
            next_row: 0,
        }
    }
}

impl SubspaceSketch for FrequentDirections {
    fn append(&mut self, y: &[f64]) {
        if self.next_row < self.ell {
            self.sketch.set_row(self.next_row, y);
            self.next_row += 1;
        } else {
            self.sketch.set_row(self.ell - 1, y);
        }

        let (s, vt) = svd_right(&self.sketch);
        let last = s[self.ell - 1];
        let shrunk: Vec<f64> = s.iter().map(|&si| (si * si - last * last).max(0.0).sqrt()).collect();

        for row in 0..self.ell.min(vt.rows) {
            let scaled: Vec<f64> = vt.row(row).iter().map(|&v| v * shrunk[row]).collect();
            self.sketch.set_row(row, &scaled);
        }
        self.vt = vt;
    }

    fn reconstruction_basis(&self) -> Vec<Vec<f64>> {
        (0..self.vt.rows).map(|i| self.vt.row(i).to_vec()).collect()
    }
}

/// Subspace-reconstruction anomaly detector: flags samples whose residual
/// against a top-k basis exceeds the classifier's own running model.
pub struct SubspaceDetector {
    k: usize,
    model: Box<dyn SubspaceSketch>,
    basis: Vec<Vec<f64>>,
    /// `(th, eta)` the detector was built with; defaults are the spec's
    /// `th=0, eta=0`. [`ClassifierKind`] reads this so a caller driving
    /// the detector through the tagged enum doesn't need to thread these
    /// through on every call.
    th_eta: (f64, f64),
}

impl SubspaceDetector {
    pub fn build(num_metrics: Option<usize>, k: Option<usize>, ell: Option<usize>, use_fd_sketch: bool) -> Result<Self, ConfigError> {
        let d = num_metrics.ok_or(ConfigError::MissingNumMetrics)?;
        let ell = ell.unwrap_or_else(|| (d as f64).sqrt().ceil() as usize).max(1);
        let k = k.unwrap_or(ell);
        if k > ell {
            return Err(ConfigError::KGreaterThanEll { k, ell });
        }
        if ell > d {
            return Err(ConfigError::EllGreaterThanD { ell, d });
        }
        let model: Box<dyn SubspaceSketch> = if use_fd_sketch {
            Box::new(FrequentDirections::new(d, ell))
        } else {
            Box::new(GlobalUpdate::new())
        };
        Ok(Self { k, model, basis: Vec::new(), th_eta: (0.0, 0.0) })
    }

    /// Override the `(th, eta)` update-trigger pair used by callers that
    /// drive this detector through [`crate::ClassifierKind`] rather than
    /// passing `th`/`eta` to `classify` on every call.
    pub fn set_runtime_params(&mut self, th: f64, eta: f64) {
        self.th_eta = (th, eta);
    }

    pub fn runtime_params(&self) -> (f64, f64) {
        self.th_eta
    }

    /// `th`/`eta` default to 0: a detector constructed this way never
    /// self-updates during `classify`, which is useful for scoring a
    /// held-out set without perturbing the model.
    pub fn classify(&mut self, y: &[f64], th: f64, eta: f64) -> Result<(bool, f64, Vec<f64>), ClassifyError> {
        let d = y.len();
        let n = norm(y);
        let yn: Vec<f64> = if n > 0.0 { y.iter().map(|v| v / n).collect() } else { y.to_vec() };

        let xi: Vec<f64> = self.basis.iter().take(self.k).map(|row| dot(&yn, row)).collect();
        let mut recon = vec![0.0; d];
        for (j, row) in self.basis.iter().take(self.k).enumerate() {
            let coeff = xi[j];
            for (i, v) in row.iter().enumerate() {
                recon[i] += coeff * v;
            }
        }
        let residual: Vec<f64> = yn.iter().zip(recon.iter()).map(|(a, b)| a - b).collect();
        let score = norm(&residual);
        if !score.is_finite() {
            return Err(ClassifyError::NonFiniteScore);
        }

        if score <= th || rand::thread_rng().gen::<f64>() < eta {
            self.model.append(&yn);
            self.basis = self.model.reconstruction_basis();
        }

        Ok((score > th, score, residual))
    }

    /// Feeds `samples` through the model unconditionally, used to derive
    /// an initial basis from a training set before live scoring.
    pub fn fit(&mut self, samples: &[Vec<f64>]) {
        for y in samples {
            let n = norm(y);
            let yn: Vec<f64> = if n > 0.0 { y.iter().map(|v| v / n).collect() } else { y.clone() };
            self.model.append(&yn);
        }
        self.basis = self.model.reconstruction_basis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_k_greater_than_ell() {
        let err = SubspaceDetector::build(Some(16), Some(5), Some(3), false);
        assert!(matches!(err, Err(ConfigError::KGreaterThanEll { .. })));
    }

    #[test]
    fn config_rejects_ell_greater_than_d() {
        let err = SubspaceDetector::build(Some(4), None, Some(10), false);
        assert!(matches!(err, Err(ConfigError::EllGreaterThanD { .. })));
    }

    #[test]
    fn fitted_detector_scores_in_subspace_samples_low() {
        let mut det = SubspaceDetector::build(Some(4), Some(1), Some(1), false).unwrap();
        let train: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0 + i as f64 * 0.01, 0.0, 0.0, 0.0]).collect();
        det.fit(&train);
        let (_, score, _) = det.classify(&[2.0, 0.0, 0.0, 0.0], 0.0, 0.0).unwrap();
        assert!(score < 0.2, "in-subspace sample should have a small residual, got {score}");
    }

    #[test]
    fn fitted_detector_scores_off_subspace_sample_higher() {
        let mut det = SubspaceDetector::build(Some(4), Some(1), Some(1), false).unwrap();
        let train: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0 + i as f64 * 0.01, 0.0, 0.0, 0.0]).collect();
        det.fit(&train);
        let (_, in_subspace, _) = det.classify(&[2.0, 0.0, 0.0, 0.0], 0.0, 0.0).unwrap();
        let (_, off_subspace, _) = det.classify(&[0.0, 0.0, 1.0, 0.0], 0.0, 0.0).unwrap();
        assert!(off_subspace > in_subspace);
    }

    #[test]
    fn fd_sketch_tracks_the_same_dominant_direction() {
        let mut det = SubspaceDetector::build(Some(4), Some(1), Some(2), true).unwrap();
        let train: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0 + i as f64 * 0.01, 0.0, 0.0, 0.0]).collect();
        det.fit(&train);
        let (_, score, _) = det.classify(&[2.0, 0.0, 0.0, 0.0], 0.0, 0.0).unwrap();
        assert!(score < 0.3);
    }

    #[test]
    fn fd_sketch_smallest_singular_value_is_zeroed_by_every_shrink() {
        // Once the ell x d buffer fills, each append does an SVD-then-
        // shrink pass that zeroes the smallest singular value of the
        // sketch it keeps, bounding the sketch's rank growth.
        let mut fd = FrequentDirections::new(3, 2);
        for y in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0, 0.0]] {
            fd.append(&y);
        }
        let (s, _vt) = svd_right(&fd.sketch);
        assert!(s[s.len() - 1] < 1e-9, "smallest singular value should be ~0 after shrink, got {:?}", s);
    }
}
