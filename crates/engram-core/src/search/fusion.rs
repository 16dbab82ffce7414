//! Hybrid score fusion
//!
//! Combines keyword (BM25) and vector (cosine) candidate lists into one
//! ranking with a weighted sum of normalized scores. Ranking ties are
//! resolved by the caller with layer-specific signals (quality, recency).

use std::collections::HashMap;

/// Normalize scores to [0, 1] by dividing by the maximum.
///
/// An empty or all-zero list comes back unchanged.
pub fn normalize_scores(results: &[(String, f32)]) -> Vec<(String, f32)> {
    let max = results
        .iter()
        .map(|(_, s)| *s)
        .fold(0.0_f32, f32::max)
        .max(0.001);
    results.iter().map(|(id, s)| (id.clone(), s / max)).collect()
}

/// Weighted linear combination of two candidate lists.
///
/// `score(id) = semantic_weight * norm_sim(id) + keyword_weight * norm_bm25(id)`
/// with each list normalized by its own maximum. Items present in only one
/// list contribute their single term. Output is sorted descending.
pub fn linear_combination(
    semantic_results: &[(String, f32)],
    keyword_results: &[(String, f32)],
    semantic_weight: f32,
    keyword_weight: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (id, score) in normalize_scores(semantic_results) {
        *scores.entry(id).or_default() += score * semantic_weight;
    }
    for (id, score) in normalize_scores(keyword_results) {
        *scores.entry(id).or_default() += score * keyword_weight;
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_in_both_lists_rank_first() {
        let semantic = vec![("a".to_string(), 0.9), ("b".to_string(), 0.8)];
        let keyword = vec![("b".to_string(), 5.0), ("c".to_string(), 3.0)];

        let fused = linear_combination(&semantic, &keyword, 0.7, 0.3);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn weights_shift_the_ranking() {
        let semantic = vec![("a".to_string(), 1.0)];
        let keyword = vec![("b".to_string(), 1.0)];

        let semantic_heavy = linear_combination(&semantic, &keyword, 0.9, 0.1);
        assert_eq!(semantic_heavy[0].0, "a");

        let keyword_heavy = linear_combination(&semantic, &keyword, 0.1, 0.9);
        assert_eq!(keyword_heavy[0].0, "b");
    }

    #[test]
    fn empty_side_degrades_to_the_other() {
        let keyword = vec![("a".to_string(), 2.0), ("b".to_string(), 1.0)];
        let fused = linear_combination(&[], &keyword, 0.7, 0.3);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn normalization_caps_at_one() {
        let normalized = normalize_scores(&[("a".to_string(), 10.0), ("b".to_string(), 5.0)]);
        assert!((normalized[0].1 - 1.0).abs() < 1e-6);
        assert!((normalized[1].1 - 0.5).abs() < 1e-6);
    }
}
