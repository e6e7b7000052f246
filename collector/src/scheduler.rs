//! Pure partitioning logic for spreading memory regions across LMAPs,
//! matching `configure_lmaps`'s distribution in the source: empty MRs
//! are dropped first, then the remainder is sliced into `N` near-equal,
//! order-preserving groups.

use control_proto::PageLayoutEntry;

/// Indices of memory regions that currently hold at least one page.
pub fn active_mr_indices(layout: &[Vec<PageLayoutEntry>]) -> Vec<usize> {
    layout.iter().enumerate().filter(|(_, mr)| !mr.is_empty()).map(|(i, _)| i).collect()
}

/// Splits `active` into `min(num_lmaps, active.len())` contiguous,
/// near-equal-sized groups, preserving order: group `i` gets indices
/// `[i*len/n, (i+1)*len/n)`, with the last group absorbing any remainder.
pub fn partition(active: &[usize], num_lmaps: usize) -> Vec<Vec<usize>> {
    let n = num_lmaps.min(active.len());
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let start = i * active.len() / n;
            let end = if i == n - 1 { active.len() } else { (i + 1) * active.len() / n };
            active[start..end].to_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pod_id: &str) -> PageLayoutEntry {
        PageLayoutEntry { pod_id: pod_id.to_string(), num_metrics: 1, page_size_bytes: 64 }
    }

    #[test]
    fn empty_memory_regions_are_excluded() {
        let layout = vec![vec![entry("a")], vec![], vec![entry("b")]];
        assert_eq!(active_mr_indices(&layout), vec![0, 2]);
    }

    #[test]
    fn partition_caps_group_count_at_active_len() {
        let active = vec![0, 1];
        let groups = partition(&active, 5);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups, vec![vec![0], vec![1]]);
    }

    #[test]
    fn partition_distributes_remainder_to_later_groups() {
        let active: Vec<usize> = (0..7).collect();
        let groups = partition(&active, 3);
        assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![2, 2, 3]);
        assert_eq!(groups.iter().flatten().copied().collect::<Vec<_>>(), active);
    }

    #[test]
    fn partition_of_no_active_regions_is_empty() {
        assert!(partition(&[], 4).is_empty());
    }
}
