//! Stateless mapping from decoded page values to scrape-formatted metric
//! families: `{collector_id}_{name}` counter/gauge families labeled with
//! `pod_id`/`collector_id`, matching the source's `CounterMetricFamily`/
//! `GaugeMetricFamily` construction in `LMAP.collect`. The family name
//! prefix is the same "dirty trick" the source comments on: it lets every
//! LMAP register distinct family names for the same underlying metric in
//! one shared registry.

use metrics_codec::RecordType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    Counter,
    Gauge,
}

impl From<RecordType> for FamilyKind {
    fn from(ty: RecordType) -> Self {
        match ty {
            RecordType::Counter => FamilyKind::Counter,
            RecordType::Gauge => FamilyKind::Gauge,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub pod_id: String,
    pub collector_id: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct MetricFamily {
    pub name: String,
    pub kind: FamilyKind,
    pub samples: Vec<Sample>,
}

/// Turns one pod's decoded record arrays into one family per metric.
pub fn export_pod(collector_id: &str, pod_id: &str, names: &[Vec<u8>], types: &[RecordType], values: &[f64]) -> Vec<MetricFamily> {
    names
        .iter()
        .zip(types)
        .zip(values)
        .map(|((name, ty), value)| MetricFamily {
            name: format!("{collector_id}_{}", String::from_utf8_lossy(name)),
            kind: (*ty).into(),
            samples: vec![Sample { pod_id: pod_id.to_string(), collector_id: collector_id.to_string(), value: *value }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_name_is_prefixed_with_collector_id() {
        let families = export_pod("LMAP_0", "pod-a", &[b"rps".to_vec()], &[RecordType::Counter], &[3.0]);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, "LMAP_0_rps");
        assert_eq!(families[0].kind, FamilyKind::Counter);
        assert_eq!(families[0].samples[0].pod_id, "pod-a");
        assert_eq!(families[0].samples[0].collector_id, "LMAP_0");
        assert_eq!(families[0].samples[0].value, 3.0);
    }

    #[test]
    fn empty_pod_yields_no_families() {
        assert!(export_pod("LMAP_0", "pod-a", &[], &[], &[]).is_empty());
    }
}
