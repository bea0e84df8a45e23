use std::time::Duration;

use common::utils::config::{AppConfig, TitleBoostOverride};

use crate::scoring::FusionWeights;

/// Phrases that ask what the index contains rather than searching it.
pub const DEFAULT_INTENT_PHRASES: &[&str] = &[
    "what do you have access to",
    "what documents do you have",
    "what can you search",
    "what standards do you have",
    "list your documents",
];

/// Tunable parameters that govern each retrieval stage.
#[derive(Debug, Clone)]
pub struct RetrievalTuning {
    pub default_results: usize,
    pub similarity_threshold: f32,
    pub weights: FusionWeights,
    pub title_boost: f32,
    /// Checked in order; the first term found in both query and title wins.
    pub title_boost_overrides: Vec<TitleBoostOverride>,
    pub intent_phrases: Vec<String>,
    /// Each signal is asked for this many times `n_results` before merging.
    pub candidate_multiplier: usize,
    pub max_chunks_per_url: usize,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_trim_count: usize,
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self {
            default_results: 10,
            similarity_threshold: 0.5,
            weights: FusionWeights::default(),
            title_boost: 0.2,
            title_boost_overrides: Vec::new(),
            intent_phrases: DEFAULT_INTENT_PHRASES
                .iter()
                .map(|phrase| (*phrase).to_string())
                .collect(),
            candidate_multiplier: default_candidate_multiplier(),
            max_chunks_per_url: default_max_chunks_per_url(),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: default_cache_max_entries(),
            cache_trim_count: default_cache_trim_count(),
        }
    }
}

impl From<&AppConfig> for RetrievalTuning {
    fn from(config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            default_results: config.max_results,
            similarity_threshold: config.similarity_threshold,
            weights: FusionWeights {
                semantic: config.semantic_weight,
                keyword: config.keyword_weight,
            },
            title_boost: config.title_boost,
            title_boost_overrides: config.title_boost_overrides.clone(),
            intent_phrases: config
                .intent_phrases
                .as_ref()
                .map_or(defaults.intent_phrases, |phrases| {
                    phrases.iter().map(|p| p.trim().to_lowercase()).collect()
                }),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            ..defaults
        }
    }
}

const fn default_candidate_multiplier() -> usize {
    2
}

const fn default_max_chunks_per_url() -> usize {
    2
}

const fn default_cache_max_entries() -> usize {
    100
}

const fn default_cache_trim_count() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_values_flow_into_tuning() {
        let config = AppConfig {
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            cache_ttl_secs: 7,
            intent_phrases: Some(vec!["  Show Me Everything ".into()]),
            title_boost_overrides: vec![TitleBoostOverride {
                term: "revit".into(),
                boost: 0.4,
            }],
            ..AppConfig::default()
        };
        let tuning = RetrievalTuning::from(&config);
        assert_eq!(
            tuning.weights,
            FusionWeights {
                semantic: 0.5,
                keyword: 0.5
            }
        );
        assert_eq!(tuning.cache_ttl, Duration::from_secs(7));
        assert_eq!(tuning.intent_phrases, vec!["show me everything"]);
        assert_eq!(tuning.title_boost_overrides.len(), 1);
        assert_eq!(tuning.max_chunks_per_url, 2);
    }

    #[test]
    fn default_intent_phrases_apply_without_config() {
        let tuning = RetrievalTuning::from(&AppConfig::default());
        assert!(tuning
            .intent_phrases
            .iter()
            .any(|p| p == "what do you have access to"));
    }
}
