use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Holds optional subscores gathered from the two retrieval signals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scores {
    /// Cosine similarity against the query embedding.
    pub vector: Option<f32>,
    /// Min-max normalized keyword score.
    pub keyword: Option<f32>,
    /// Title-match bonus added to the semantic component.
    pub title_boost: f32,
}

/// Generic wrapper combining an item with its accumulated retrieval scores.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }

    pub const fn with_vector_score(mut self, score: f32) -> Self {
        self.scores.vector = Some(score);
        self
    }

    pub const fn with_keyword_score(mut self, score: f32) -> Self {
        self.scores.keyword = Some(score);
        self
    }

    pub const fn update_fused(&mut self, fused: f32) {
        self.fused = fused;
    }
}

/// Weights used for linear score fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub semantic: f32,
    pub keyword: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;

    for s in scores {
        if !s.is_finite() {
            continue;
        }
        if *s < min {
            min = *s;
        }
        if *s > max {
            max = *s;
        }
    }

    if min > max {
        return scores.iter().map(|_| 0.0).collect();
    }

    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / (max - min))
            } else {
                0.0
            }
        })
        .collect()
}

/// `semantic_component × semantic_weight + keyword_component × keyword_weight`.
///
/// The title boost only applies to semantic hits; keyword-only items have a
/// semantic component of zero.
pub fn fuse_scores(scores: &Scores, weights: FusionWeights) -> f32 {
    let semantic = scores
        .vector
        .map_or(0.0, |similarity| similarity + scores.title_boost);
    let keyword = scores.keyword.unwrap_or(0.0);
    semantic.mul_add(weights.semantic, keyword * weights.keyword)
}

/// Stable descending sort; equal scores keep their incoming order.
pub fn sort_by_fused_desc<T>(items: &mut [Scored<T>]) {
    items.sort_by(|a, b| b.fused.partial_cmp(&a.fused).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_unit_range() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(min_max_normalize(&[3.0, 3.0]), vec![1.0, 1.0]);
        assert!(min_max_normalize(&[]).is_empty());
        assert_eq!(
            min_max_normalize(&[f32::NAN, 1.0, 3.0]),
            vec![0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn keyword_only_items_ignore_title_boost() {
        let weights = FusionWeights::default();
        let keyword_only = Scores {
            vector: None,
            keyword: Some(1.0),
            title_boost: 0.2,
        };
        assert!((fuse_scores(&keyword_only, weights) - 0.3).abs() < 1e-6);

        let both = Scores {
            vector: Some(0.8),
            keyword: Some(0.5),
            title_boost: 0.2,
        };
        assert!((fuse_scores(&both, weights) - (1.0 * 0.7 + 0.5 * 0.3)).abs() < 1e-6);
    }

    #[test]
    fn fused_score_never_drops_when_semantic_weight_grows() {
        let scores = Scores {
            vector: Some(0.6),
            keyword: Some(0.4),
            title_boost: 0.0,
        };
        let mut previous = f32::MIN;
        for step in 0..=10 {
            let weights = FusionWeights {
                semantic: step as f32 / 10.0,
                keyword: 0.3,
            };
            let fused = fuse_scores(&scores, weights);
            assert!(fused >= previous);
            previous = fused;
        }
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut items: Vec<Scored<&str>> = ["a", "b", "c"]
            .into_iter()
            .zip([0.5, 0.9, 0.5])
            .map(|(item, fused)| {
                let mut scored = Scored::new(item);
                scored.update_fused(fused);
                scored
            })
            .collect();
        sort_by_fused_desc(&mut items);
        let order: Vec<&str> = items.iter().map(|s| s.item).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
