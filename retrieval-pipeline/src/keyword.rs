use common::storage::snapshot::IndexSnapshot;

use crate::scoring::{min_max_normalize, Scored};

/// A title hit counts this many content hits.
const TITLE_WEIGHT: usize = 10;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "all", "also", "and", "any", "are", "because", "been",
    "before", "being", "below", "between", "both", "but", "can", "could", "did", "does", "doing",
    "down", "during", "each", "few", "for", "from", "further", "had", "has", "have", "having",
    "her", "here", "hers", "him", "his", "how", "into", "its", "itself", "just", "more", "most",
    "nor", "not", "now", "off", "once", "only", "other", "our", "ours", "out", "over", "own",
    "same", "she", "should", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "then", "there", "these", "they", "this", "those", "through", "too", "under", "until", "use",
    "very", "was", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours",
];

/// Lowercased query terms that survive punctuation stripping, stopword
/// removal and the minimum length filter. Repeated terms are kept.
pub fn extract_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| token.chars().count() > 2 && !STOPWORDS.contains(token))
        .map(str::to_owned)
        .collect()
}

/// Term-frequency search. Returns row indices with min-max normalized
/// keyword scores; rows that match nothing are left out.
pub fn search(snapshot: &IndexSnapshot, query: &str, k: usize) -> Vec<Scored<usize>> {
    let keywords = extract_keywords(query);
    if keywords.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut raw: Vec<(usize, usize)> = snapshot
        .metadata()
        .iter()
        .enumerate()
        .filter_map(|(row, chunk)| {
            let title = chunk.title.to_lowercase();
            let content = chunk.text.to_lowercase();
            let score: usize = keywords
                .iter()
                .map(|kw| {
                    TITLE_WEIGHT * title.matches(kw.as_str()).count()
                        + content.matches(kw.as_str()).count()
                })
                .sum();
            (score > 0).then_some((row, score))
        })
        .collect();

    raw.sort_by(|a, b| b.1.cmp(&a.1));
    raw.truncate(k);

    #[allow(clippy::cast_precision_loss)]
    let counts: Vec<f32> = raw.iter().map(|(_, score)| *score as f32).collect();
    let normalized = min_max_normalize(&counts);

    raw.into_iter()
        .zip(normalized)
        .map(|((row, _), score)| Scored::new(row).with_keyword_score(score))
        .collect()
}
