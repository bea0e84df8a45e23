use std::cmp::Ordering;

use common::storage::snapshot::{l2_normalize, IndexSnapshot};
use tracing::warn;

use crate::scoring::Scored;

/// Cosine top-k over the snapshot rows. Returns row indices.
///
/// Over-fetches `min(3k, N)` candidates before dropping those under
/// `threshold`, then keeps at most `k`. Ties keep row order.
pub fn search(
    snapshot: &IndexSnapshot,
    query: &[f32],
    k: usize,
    threshold: f32,
) -> Vec<Scored<usize>> {
    if k == 0 || snapshot.is_empty() {
        return Vec::new();
    }
    if query.len() != snapshot.dimension() {
        warn!(
            query_dimension = query.len(),
            index_dimension = snapshot.dimension(),
            "Query embedding dimension does not match index"
        );
        return Vec::new();
    }

    let mut normalized = query.to_vec();
    l2_normalize(&mut normalized);

    let mut scored: Vec<(usize, f32)> = snapshot
        .rows()
        .enumerate()
        .map(|(row, (embedding, _))| (row, dot(embedding, &normalized)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k.saturating_mul(3).min(snapshot.len()));

    scored
        .into_iter()
        .filter(|(_, score)| *score >= threshold)
        .take(k)
        .map(|(row, score)| Scored::new(row).with_vector_score(score))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
