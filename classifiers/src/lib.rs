//! Streaming anomaly-detection classifiers shared by every LMAP.
//!
//! Three variants implement the same `classify` contract (threshold,
//! subspace reconstruction, variational autoencoder). [`ClassifierKind`]
//! is the tagged variant an LMAP actually builds and dispatches through;
//! no runtime subclassing is needed since the set of kinds is closed.

mod errors;
mod linalg;
mod subspace;
mod threshold;
mod vae;

pub use errors::{ClassifyError, ConfigError};
pub use subspace::{FrequentDirections, GlobalUpdate, SubspaceDetector, SubspaceSketch};
pub use threshold::ThresholdDetector;
pub use vae::{VaeConfig, VaeDetector};

/// One classify call's outcome: anomaly flag, overall score, and the
/// per-feature contribution to that score.
#[derive(Debug, Clone)]
pub struct Classification {
    pub is_anomaly: bool,
    pub score: f64,
    pub per_feature_score: Vec<f64>,
}

/// Configuration accepted when building a classifier for one producer,
/// mirroring the source's `ModelBuilder.build(**kwargs)` call sites but
/// as a typed struct instead of a kwargs dict.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub num_metrics: Option<usize>,
    pub default_threshold: Option<f64>,
    pub thresholds: Option<Vec<f64>>,
    pub k: Option<usize>,
    pub ell: Option<usize>,
    pub use_fd_sketch: bool,
    pub subspace_th: f64,
    pub subspace_eta: f64,
    pub latent_dim: Option<usize>,
    /// Quantile of training reconstruction scores used as the VAE's
    /// anomaly decision boundary; spec default is the 95th percentile.
    pub vae_quantile: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_metrics: None,
            default_threshold: None,
            thresholds: None,
            k: None,
            ell: None,
            use_fd_sketch: false,
            subspace_th: 0.0,
            subspace_eta: 0.0,
            latent_dim: None,
            vae_quantile: 0.95,
        }
    }
}

/// The model an operator selects per deployment (one per LMAP, per the
/// source spec's "selected per deployment" classifier contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierModel {
    Threshold,
    Subspace,
    Vae,
}

impl std::str::FromStr for ClassifierModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threshold" | "th" => Ok(ClassifierModel::Threshold),
            "subspace" | "fd" | "sketch" => Ok(ClassifierModel::Subspace),
            "vae" => Ok(ClassifierModel::Vae),
            other => Err(ConfigError::UnknownModel(other.to_string())),
        }
    }
}

/// A built classifier, dispatched through one tagged variant rather than
/// a trait object: the set of kinds is fixed by the spec, not extensible
/// at runtime, so a closed enum reads more plainly than `Box<dyn ..>`.
pub enum ClassifierKind {
    Threshold(ThresholdDetector),
    Subspace(SubspaceDetector),
    Vae(VaeDetector),
}

impl ClassifierKind {
    pub fn build(model: ClassifierModel, config: &ClassifierConfig) -> Result<Self, ConfigError> {
        match model {
            ClassifierModel::Threshold => Ok(ClassifierKind::Threshold(ThresholdDetector::build(
                config.num_metrics,
                config.thresholds.clone(),
                config.default_threshold,
            )?)),
            ClassifierModel::Subspace => {
                let mut detector = SubspaceDetector::build(
                    config.num_metrics,
                    config.k,
                    config.ell,
                    config.use_fd_sketch,
                )?;
                detector.set_runtime_params(config.subspace_th, config.subspace_eta);
                Ok(ClassifierKind::Subspace(detector))
            }
            ClassifierModel::Vae => {
                let d = config.num_metrics.ok_or(ConfigError::MissingNumMetrics)?;
                let latent = config.latent_dim.unwrap_or(8);
                if latent > d {
                    return Err(ConfigError::LatentGreaterThanD { latent, d });
                }
                Ok(ClassifierKind::Vae(VaeDetector::new(VaeConfig {
                    input_dim: d,
                    latent_dim: latent,
                    quantile: config.vae_quantile,
                })))
            }
        }
    }

    pub fn classify(&mut self, values: &[f64]) -> Result<Classification, ClassifyError> {
        match self {
            ClassifierKind::Threshold(t) => t.classify(values).map(Into::into),
            ClassifierKind::Subspace(s) => {
                let cfg = s.runtime_params();
                s.classify(values, cfg.0, cfg.1).map(Into::into)
            }
            ClassifierKind::Vae(v) => v.classify(values).map(Into::into),
        }
    }
}

impl From<(bool, f64, Vec<f64>)> for Classification {
    fn from((is_anomaly, score, per_feature_score): (bool, f64, Vec<f64>)) -> Self {
        Classification { is_anomaly, score, per_feature_score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_from_str_accepts_known_aliases() {
        assert_eq!("TH".parse::<ClassifierModel>().unwrap(), ClassifierModel::Threshold);
        assert_eq!("fd".parse::<ClassifierModel>().unwrap(), ClassifierModel::Subspace);
        assert_eq!("VAE".parse::<ClassifierModel>().unwrap(), ClassifierModel::Vae);
    }

    #[test]
    fn model_from_str_rejects_unknown() {
        assert!("quantum".parse::<ClassifierModel>().is_err());
    }

    #[test]
    fn build_threshold_and_classify_through_the_tagged_kind() {
        let cfg = ClassifierConfig { num_metrics: Some(3), ..Default::default() };
        let mut kind = ClassifierKind::build(ClassifierModel::Threshold, &cfg).unwrap();
        let out = kind.classify(&[0.1, 5.0, 0.1]).unwrap();
        assert!(out.is_anomaly);
    }

    #[test]
    fn vae_config_rejects_latent_greater_than_d() {
        let cfg = ClassifierConfig { num_metrics: Some(4), latent_dim: Some(10), ..Default::default() };
        let err = ClassifierKind::build(ClassifierModel::Vae, &cfg);
        assert!(matches!(err, Err(ConfigError::LatentGreaterThanD { .. })));
    }
}
