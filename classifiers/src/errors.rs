use thiserror::Error;

/// Surfaced at builder time: configuration errors are never retried, they
/// indicate a caller mistake.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_metrics must be provided")]
    MissingNumMetrics,

    #[error("k ({k}) cannot be greater than ell ({ell})")]
    KGreaterThanEll { k: usize, ell: usize },

    #[error("expected {expected} thresholds, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("ell ({ell}) cannot be greater than d ({d})")]
    EllGreaterThanD { ell: usize, d: usize },

    #[error("unknown classifier model '{0}'")]
    UnknownModel(String),

    #[error("latent dimension ({latent}) cannot be greater than d ({d})")]
    LatentGreaterThanD { latent: usize, d: usize },
}

/// Isolated to one producer's step: a classify call failed but the LMAP
/// keeps running and the producer is simply skipped this tick.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("classifier produced a non-finite score")]
    NonFiniteScore,
}
