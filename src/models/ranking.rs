//! Top-k ranking of class probabilities

use crate::labels::LabelTable;
use crate::types::prediction::RankedLabel;
use std::cmp::Ordering;

/// Selects the `k` most probable classes.
#[derive(Debug, Clone, Copy)]
pub struct TopK {
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    /// Class indices ordered by probability, highest first.
    ///
    /// Equal probabilities keep ascending index order (stable sort).
    /// Returns `min(k, probabilities.len())` indices.
    pub fn indices(&self, probabilities: &[f32]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..probabilities.len()).collect();
        order.sort_by(|&a, &b| {
            probabilities[b]
                .partial_cmp(&probabilities[a])
                .unwrap_or(Ordering::Equal)
        });
        order.truncate(self.k);
        order
    }

    /// Ranked `(label, probability)` entries.
    pub fn rank(&self, probabilities: &[f32], labels: &LabelTable) -> Vec<RankedLabel> {
        self.indices(probabilities)
            .into_iter()
            .map(|i| RankedLabel {
                label: labels.label_for(i),
                probability: probabilities[i],
            })
            .collect()
    }
}

impl Default for TopK {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_order() {
        let topk = TopK::default();
        let probs = [0.05, 0.4, 0.1, 0.3, 0.15];
        assert_eq!(topk.indices(&probs), vec![1, 3, 4, 2, 0]);
    }

    #[test]
    fn test_ties_keep_ascending_index() {
        let topk = TopK::new(3);
        let probs = [0.2, 0.3, 0.2, 0.3];
        assert_eq!(topk.indices(&probs), vec![1, 3, 0]);
    }

    #[test]
    fn test_k_larger_than_classes() {
        let topk = TopK::new(5);
        assert_eq!(topk.indices(&[0.3, 0.7]), vec![1, 0]);
    }

    #[test]
    fn test_rank_with_labels() {
        let topk = TopK::new(2);
        let labels = LabelTable::from_labels(vec!["No DR".into(), "Mild".into(), "Moderate".into()]);
        let ranked = topk.rank(&[0.2, 0.5, 0.3], &labels);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].label, "Mild");
        assert_eq!(ranked[0].probability, 0.5);
        assert_eq!(ranked[1].label, "Moderate");
    }

    #[test]
    fn test_rank_index_fallback() {
        let topk = TopK::new(5);
        let labels = LabelTable::from_labels(vec!["a".into(), "b".into()]);
        let ranked = topk.rank(&[0.1, 0.1, 0.6, 0.1, 0.1], &labels);

        let names: Vec<&str> = ranked.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(names, vec!["2", "a", "b", "3", "4"]);
    }
}
