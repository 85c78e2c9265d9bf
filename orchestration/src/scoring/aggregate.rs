//! Score aggregation: items → categories → final score.

use std::collections::BTreeMap;

use crate::config::CategoryWeighting;
use crate::store::ChecklistItem;

/// Item score mapped from 0..=10 into [0, 1]. Unset or non-finite ⇒ 0.
pub fn normalized(item: &ChecklistItem) -> f64 {
    match item.score {
        Some(score) if score.is_finite() => (score / 10.0).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Weighted mean of normalized item scores per category. A category whose
/// items carry zero total weight scores 0.
pub fn category_scores(items: &[ChecklistItem]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for item in items {
        let weight = if item.weight.is_finite() && item.weight > 0.0 {
            item.weight
        } else {
            0.0
        };
        let entry = sums.entry(item.category.clone()).or_insert((0.0, 0.0));
        entry.0 += normalized(item) * weight;
        entry.1 += weight;
    }

    sums.into_iter()
        .map(|(category, (sum, weight))| {
            let score = if weight > 0.0 { sum / weight } else { 0.0 };
            (category, score)
        })
        .collect()
}

/// Weighted mean of category scores over the configured category weights.
pub fn final_score(
    category_scores: &BTreeMap<String, f64>,
    category_weights: &BTreeMap<String, f64>,
    weighting: CategoryWeighting,
) -> f64 {
    let mut total = 0.0;
    let mut denominator = 0.0;
    for (category, weight) in category_weights {
        match (category_scores.get(category), weighting) {
            (Some(score), _) => {
                total += score * weight;
                denominator += weight;
            }
            (None, CategoryWeighting::ZeroFill) => denominator += weight,
            (None, CategoryWeighting::Exclude) => {}
        }
    }
    if denominator > 0.0 {
        total / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(category: &str, weight: f64, score: Option<f64>) -> ChecklistItem {
        let mut item = ChecklistItem::new("i", "req", category, weight);
        item.score = score;
        item
    }

    fn default_weights() -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("technical_skill".to_string(), 0.7),
            ("soft_skill".to_string(), 0.3),
        ])
    }

    #[test]
    fn test_weighted_category_mean() {
        let items = vec![
            scored("technical_skill", 4.0, Some(8.0)),
            scored("technical_skill", 6.0, Some(4.0)),
        ];
        let scores = category_scores(&items);
        assert!((scores["technical_skill"] - 0.56).abs() < 1e-9);
    }

    #[test]
    fn test_normalization_clamps_and_defaults() {
        assert_eq!(normalized(&scored("x", 1.0, Some(15.0))), 1.0);
        assert_eq!(normalized(&scored("x", 1.0, Some(-2.0))), 0.0);
        assert_eq!(normalized(&scored("x", 1.0, None)), 0.0);
        assert_eq!(normalized(&scored("x", 1.0, Some(f64::NAN))), 0.0);
    }

    #[test]
    fn test_zero_weight_category_scores_zero() {
        let scores = category_scores(&[scored("soft_skill", 0.0, Some(10.0))]);
        assert_eq!(scores["soft_skill"], 0.0);
    }

    #[test]
    fn test_missing_category_policies() {
        let scores = BTreeMap::from([("technical_skill".to_string(), 0.56)]);

        let zero_fill = final_score(&scores, &default_weights(), CategoryWeighting::ZeroFill);
        assert!((zero_fill - 0.392).abs() < 1e-9);

        let exclude = final_score(&scores, &default_weights(), CategoryWeighting::Exclude);
        assert!((exclude - 0.56).abs() < 1e-9);
    }

    #[test]
    fn test_unweighted_categories_ignored() {
        let scores = BTreeMap::from([
            ("technical_skill".to_string(), 1.0),
            ("soft_skill".to_string(), 0.5),
            ("language".to_string(), 0.0),
        ]);
        let score = final_score(&scores, &default_weights(), CategoryWeighting::ZeroFill);
        assert!((score - 0.85).abs() < 1e-9);
        assert_eq!(final_score(&scores, &BTreeMap::new(), CategoryWeighting::ZeroFill), 0.0);
    }
}
