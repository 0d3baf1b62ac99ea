//! Weighted multi-factor similarity between a committed detection and an
//! existing aggregated item.
//!
//! Four factors (category equality, label edit distance, size ratio, center
//! distance) are combined as a weighted mean normalized by the weight sum,
//! so weights do not need to sum to 1. Hard filters (required category/label,
//! size delta cap, distance cap) force the whole pair to 0 regardless of the
//! other factors.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, FRAME_DIAGONAL};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub category: f32,
    pub label: f32,
    pub size: f32,
    pub distance: f32,
}

impl SimilarityWeights {
    pub fn sum(&self) -> f32 {
        self.category + self.label + self.size + self.distance
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            category: 0.30,
            label: 0.25,
            size: 0.20,
            distance: 0.25,
        }
    }
}

/// Secondary spatial-temporal merge policy for identity churn. Runs only
/// after the weighted scorer came up inconclusive, and only within a short
/// window of the candidate item's last update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub enabled: bool,
    /// Require equal categories before a fallback merge.
    pub require_category: bool,
    /// Merge when boxes overlap at least this much...
    pub min_iou: f32,
    /// ...or when centers sit within this distance (normalized units).
    pub max_center_distance: f32,
    /// Only items updated within this window are fallback-eligible.
    pub window_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_category: true,
            min_iou: 0.3,
            max_center_distance: 0.15,
            window_ms: 800,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Merge when the best weighted similarity reaches this value.
    pub threshold: f32,
    pub weights: SimilarityWeights,
    /// Category mismatch becomes a hard filter.
    pub category_match_required: bool,
    /// A missing label on either side becomes a hard filter.
    pub label_match_required: bool,
    /// Hard filter: relative area difference above this never merges.
    pub max_size_difference_ratio: f32,
    /// Hard filter: center distance above this fraction of the frame
    /// diagonal never merges.
    pub max_center_distance_ratio: f32,
    pub fallback: FallbackConfig,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            weights: SimilarityWeights::default(),
            category_match_required: false,
            label_match_required: false,
            max_size_difference_ratio: 0.5,
            max_center_distance_ratio: 0.25,
            fallback: FallbackConfig::default(),
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.weights.sum() <= 0.0 {
            return Err(anyhow!("similarity weights must sum to a positive value"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(anyhow!(
                "similarity threshold must be in [0, 1], got {}",
                self.threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.max_size_difference_ratio) {
            return Err(anyhow!("max_size_difference_ratio must be in [0, 1]"));
        }
        if self.max_center_distance_ratio <= 0.0 {
            return Err(anyhow!("max_center_distance_ratio must be positive"));
        }
        if self.fallback.min_iou < 0.0 || self.fallback.min_iou > 1.0 {
            return Err(anyhow!("fallback min_iou must be in [0, 1]"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Scoring
// ----------------------------------------------------------------------------

/// The geometric/attribute view of one side of a comparison.
pub struct SimilaritySubject<'a> {
    pub bbox: &'a BoundingBox,
    pub category: Option<&'a str>,
    pub label: Option<&'a str>,
}

/// Weighted similarity in [0, 1], or 0.0 when any hard filter trips.
pub fn similarity(a: &SimilaritySubject<'_>, b: &SimilaritySubject<'_>, cfg: &SimilarityConfig) -> f32 {
    let category_equal = a.category == b.category;
    if cfg.category_match_required && !category_equal {
        return 0.0;
    }
    if cfg.label_match_required && (a.label.is_none() || b.label.is_none()) {
        return 0.0;
    }

    let area_a = a.bbox.area();
    let area_b = b.bbox.area();
    let size_score = a.bbox.size_ratio(b.bbox);
    if area_a > 0.0 && area_b > 0.0 {
        let size_delta = 1.0 - size_score;
        if size_delta > cfg.max_size_difference_ratio {
            return 0.0;
        }
    }

    let normalized_distance = a.bbox.center_distance(b.bbox) / FRAME_DIAGONAL;
    if normalized_distance > cfg.max_center_distance_ratio {
        return 0.0;
    }
    let distance_score = (1.0 - normalized_distance).max(0.0);

    let category_score = if category_equal { 1.0 } else { 0.0 };
    let label_score = match (a.label, b.label) {
        (Some(la), Some(lb)) => label_similarity(la, lb),
        _ => 0.0,
    };

    let w = &cfg.weights;
    let sum = w.sum();
    if sum <= 0.0 {
        // Callers validate before installing a config; this is the last line
        // of defense against a zero-sum sneaking in.
        return 0.0;
    }
    (category_score * w.category
        + label_score * w.label
        + size_score * w.size
        + distance_score * w.distance)
        / sum
}

/// Normalized edit-distance similarity over lowercased labels: 1.0 for
/// identical strings, approaching 0.0 as the edit distance nears the longer
/// string's length.
pub fn label_similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a, &b);
    1.0 - distance as f32 / max_len as f32
}

/// Classic two-row Levenshtein over characters.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>(
        bbox: &'a BoundingBox,
        category: Option<&'a str>,
        label: Option<&'a str>,
    ) -> SimilaritySubject<'a> {
        SimilaritySubject {
            bbox,
            category,
            label,
        }
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("shirt", "shirt"), 0);
    }

    #[test]
    fn label_similarity_is_case_insensitive() {
        assert_eq!(label_similarity("Shirt", "shirt"), 1.0);
        assert!(label_similarity("shirt", "shorts") > 0.4);
        assert!(label_similarity("shirt", "zzzzz") < 0.2);
    }

    #[test]
    fn near_identical_commits_score_high() {
        let a = BoundingBox::new(0.40, 0.40, 0.60, 0.60);
        let b = BoundingBox::new(0.42, 0.41, 0.61, 0.59);
        let cfg = SimilarityConfig::default();

        let score = similarity(
            &subject(&a, Some("FASHION"), Some("Shirt")),
            &subject(&b, Some("FASHION"), Some("shirt")),
            &cfg,
        );
        assert!(score > 0.85, "score was {score}");
    }

    #[test]
    fn category_mismatch_with_requirement_is_zero() {
        let a = BoundingBox::new(0.40, 0.40, 0.60, 0.60);
        let mut cfg = SimilarityConfig::default();
        cfg.category_match_required = true;

        let score = similarity(
            &subject(&a, Some("FASHION"), Some("shirt")),
            &subject(&a, Some("ELECTRONICS"), Some("shirt")),
            &cfg,
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn missing_label_with_requirement_is_zero() {
        let a = BoundingBox::new(0.40, 0.40, 0.60, 0.60);
        let mut cfg = SimilarityConfig::default();
        cfg.label_match_required = true;

        let score = similarity(
            &subject(&a, Some("FASHION"), Some("shirt")),
            &subject(&a, Some("FASHION"), None),
            &cfg,
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn oversized_delta_is_hard_filtered() {
        let small = BoundingBox::new(0.45, 0.45, 0.55, 0.55);
        let large = BoundingBox::new(0.25, 0.25, 0.75, 0.75);
        let cfg = SimilarityConfig::default();

        let score = similarity(
            &subject(&small, Some("FASHION"), Some("shirt")),
            &subject(&large, Some("FASHION"), Some("shirt")),
            &cfg,
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn distant_centers_are_hard_filtered() {
        let a = BoundingBox::new(0.05, 0.05, 0.25, 0.25);
        let b = BoundingBox::new(0.75, 0.75, 0.95, 0.95);
        let cfg = SimilarityConfig::default();

        let score = similarity(
            &subject(&a, Some("FASHION"), Some("shirt")),
            &subject(&b, Some("FASHION"), Some("shirt")),
            &cfg,
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn weights_normalize_by_their_sum() {
        let a = BoundingBox::new(0.40, 0.40, 0.60, 0.60);
        let mut cfg = SimilarityConfig::default();
        // Double every weight; scores must not change.
        cfg.weights = SimilarityWeights {
            category: 0.60,
            label: 0.50,
            size: 0.40,
            distance: 0.50,
        };

        let doubled = similarity(
            &subject(&a, Some("FASHION"), Some("shirt")),
            &subject(&a, Some("FASHION"), Some("shirt")),
            &cfg,
        );
        let default = similarity(
            &subject(&a, Some("FASHION"), Some("shirt")),
            &subject(&a, Some("FASHION"), Some("shirt")),
            &SimilarityConfig::default(),
        );
        assert!((doubled - default).abs() < 1e-6);
    }

    #[test]
    fn zero_weight_sum_fails_validation() {
        let mut cfg = SimilarityConfig::default();
        cfg.weights = SimilarityWeights {
            category: 0.0,
            label: 0.0,
            size: 0.0,
            distance: 0.0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(SimilarityConfig::default().validate().is_ok());
    }
}
