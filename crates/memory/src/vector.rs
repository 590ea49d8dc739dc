//! Vector similarity utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Stable top-k ranking of memory items against a query embedding

use chorus_core::memory::MemoryItem;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ, either vector is empty, or either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank items by cosine similarity to `query`, highest first.
///
/// Items without an embedding are skipped. The sort is stable, so items with
/// equal scores keep their insertion order.
pub fn rank_by_similarity<'a>(
    items: &'a [MemoryItem],
    query: &[f32],
    limit: usize,
) -> Vec<(f32, &'a MemoryItem)> {
    let mut scored: Vec<(f32, &MemoryItem)> = items
        .iter()
        .filter_map(|item| {
            let emb = item.embedding.as_ref()?;
            Some((cosine_similarity(emb, query), item))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
