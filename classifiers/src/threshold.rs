use crate::errors::{ClassifyError, ConfigError};

/// Per-feature deviation against a threshold vector. Anomaly if any
/// feature's `|x_i| - tau_i` is positive; score is the worst such margin.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    thresholds: Vec<f64>,
}

const DEFAULT_THRESHOLD: f64 = 3.0;

impl ThresholdDetector {
    pub fn build(num_metrics: Option<usize>, thresholds: Option<Vec<f64>>, default_threshold: Option<f64>) -> Result<Self, ConfigError> {
        if let Some(t) = thresholds {
            return Ok(Self { thresholds: t });
        }
        let num_metrics = num_metrics.ok_or(ConfigError::MissingNumMetrics)?;
        let value = default_threshold.unwrap_or(DEFAULT_THRESHOLD);
        Ok(Self { thresholds: vec![value; num_metrics] })
    }

    pub fn classify(&self, values: &[f64]) -> Result<(bool, f64, Vec<f64>), ClassifyError> {
        if values.len() != self.thresholds.len() {
            return Err(ClassifyError::DimensionMismatch { expected: self.thresholds.len(), got: values.len() });
        }
        let scores: Vec<f64> = values
            .iter()
            .zip(self.thresholds.iter())
            .map(|(x, tau)| x.abs() - tau)
            .collect();
        let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !max_score.is_finite() {
            return Err(ClassifyError::NonFiniteScore);
        }
        Ok((max_score > 0.0, max_score, scores))
    }

    pub fn update_thresholds(&mut self, new_thresholds: Vec<f64>) -> Result<(), ConfigError> {
        if new_thresholds.len() != self.thresholds.len() {
            return Err(ConfigError::LengthMismatch { expected: self.thresholds.len(), got: new_thresholds.len() });
        }
        self.thresholds = new_thresholds;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_uses_default_threshold() {
        let det = ThresholdDetector::build(Some(4), None, None).unwrap();
        let (is_anomaly, score, scores) = det.classify(&[0.1, 0.2, 0.0, -0.3]).unwrap();
        assert!(!is_anomaly);
        assert!(score < 0.0);
        assert_eq!(scores.len(), 4);
    }

    #[test]
    fn value_exceeding_threshold_is_anomalous() {
        let det = ThresholdDetector::build(Some(3), None, None).unwrap();
        let (is_anomaly, score, _) = det.classify(&[0.1, 5.0, 0.1]).unwrap();
        assert!(is_anomaly);
        assert!((score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let det = ThresholdDetector::build(Some(3), None, None).unwrap();
        assert!(matches!(det.classify(&[0.0, 0.0]), Err(ClassifyError::DimensionMismatch { .. })));
    }

    #[test]
    fn missing_num_metrics_is_a_config_error() {
        assert!(matches!(ThresholdDetector::build(None, None, None), Err(ConfigError::MissingNumMetrics)));
    }

    #[test]
    fn update_thresholds_rejects_a_length_mismatch() {
        let mut det = ThresholdDetector::build(Some(3), None, None).unwrap();
        let err = det.update_thresholds(vec![1.0, 2.0]);
        assert!(matches!(err, Err(ConfigError::LengthMismatch { expected: 3, got: 2 })));
    }
}
