use std::collections::HashMap;

use common::storage::{snapshot::IndexSnapshot, types::SearchResult};

use crate::{
    config::RetrievalTuning,
    scoring::{fuse_scores, sort_by_fused_desc, Scored},
};

/// Merges semantic and keyword hits by chunk identity and fuses their scores.
/// Both inputs hold snapshot row indices. The result is sorted by hybrid
/// score, best first.
pub fn merge(
    snapshot: &IndexSnapshot,
    query: &str,
    semantic: Vec<Scored<usize>>,
    keyword: Vec<Scored<usize>>,
    tuning: &RetrievalTuning,
) -> Vec<Scored<usize>> {
    let metadata = snapshot.metadata();
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Scored<usize>> = HashMap::new();

    for hit in semantic.into_iter().chain(keyword) {
        let Some(chunk) = metadata.get(hit.item) else {
            continue;
        };
        let id = chunk.chunk_id();
        merged
            .entry(id.clone())
            .and_modify(|existing| {
                if let Some(score) = hit.scores.vector {
                    existing.scores.vector = Some(score);
                }
                if let Some(score) = hit.scores.keyword {
                    existing.scores.keyword = Some(score);
                }
            })
            .or_insert_with(|| {
                order.push(id);
                hit.clone()
            });
    }

    let mut fused: Vec<Scored<usize>> = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .map(|mut scored| {
            if scored.scores.vector.is_some() {
                if let Some(chunk) = metadata.get(scored.item) {
                    scored.scores.title_boost = title_boost(query, &chunk.title, tuning);
                }
            }
            let score = fuse_scores(&scored.scores, tuning.weights);
            scored.update_fused(score);
            scored
        })
        .collect();

    sort_by_fused_desc(&mut fused);
    fused
}

/// The boost for a title given the query. A configured override term found in
/// both replaces the generic boost, which applies when any query term longer
/// than three characters appears in the title.
pub fn title_boost(query: &str, title: &str, tuning: &RetrievalTuning) -> f32 {
    let query = query.to_lowercase();
    let title = title.to_lowercase();

    for rule in &tuning.title_boost_overrides {
        let term = rule.term.to_lowercase();
        if !term.is_empty() && query.contains(&term) && title.contains(&term) {
            return rule.boost;
        }
    }

    let matched = query
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .any(|token| token.chars().count() > 3 && title.contains(token));
    if matched {
        tuning.title_boost
    } else {
        0.0
    }
}

pub fn to_results(snapshot: &IndexSnapshot, ranked: &[Scored<usize>]) -> Vec<SearchResult> {
    let metadata = snapshot.metadata();
    ranked
        .iter()
        .filter_map(|scored| {
            metadata.get(scored.item).map(|chunk| {
                SearchResult::from_chunk(
                    chunk,
                    scored.fused,
                    scored.scores.vector.unwrap_or(0.0),
                    scored.scores.keyword.unwrap_or(0.0),
                )
            })
        })
        .collect()
}

/// Keeps at most `max_per_url` results per URL. Input must be sorted by
/// score; the output stays sorted.
pub fn dedupe_by_url(results: Vec<SearchResult>, max_per_url: usize) -> Vec<SearchResult> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<SearchResult> = results
        .into_iter()
        .filter(|result| {
            let count = seen.entry(result.url.clone()).or_insert(0);
            *count += 1;
            *count <= max_per_url
        })
        .collect();
    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept
}

/// Whether the query asks what the index contains.
pub fn is_catalog_query(normalized_query: &str, tuning: &RetrievalTuning) -> bool {
    tuning
        .intent_phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && normalized_query.contains(phrase.as_str()))
}

/// A single synthetic result listing every indexed document title.
pub fn catalog_result(snapshot: &IndexSnapshot) -> SearchResult {
    let titles = snapshot.titles();
    let mut content = format!(
        "The search index contains {} documents:\n",
        titles.len()
    );
    for title in &titles {
        content.push_str("- ");
        content.push_str(title);
        content.push('\n');
    }

    SearchResult {
        id: "document_catalog".to_string(),
        chunk_id: "document_catalog_chunk_0".to_string(),
        title: "Available Documents".to_string(),
        url: String::new(),
        content,
        category: "System".to_string(),
        last_updated: String::new(),
        chunk_index: 0,
        total_chunks: 1,
        score: 1.0,
        semantic_score: 0.0,
        keyword_score: 0.0,
    }
}
