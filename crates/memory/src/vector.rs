//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and top-k ranking over stored embeddings.
//! No external vector index: episodic and semantic tiers are small enough
//! that a scan-and-rank is the honest implementation.

use mnemon_core::memory::MemoryItem;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 =
/// opposite. Returns 0.0 if either vector is zero-length or the lengths
/// differ.
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

/// Rank items by cosine similarity to a query embedding.
///
/// Only items that have embeddings and meet the minimum similarity are
/// included. Results are sorted by descending similarity.
pub fn rank_by_similarity(
    items: &[MemoryItem],
    query_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Vec<(f32, MemoryItem)> {
    let mut scored: Vec<(f32, MemoryItem)> = items
        .iter()
        .filter_map(|item| {
            let emb = item.embedding.as_ref()?;
            let sim = cosine_similarity(emb, query_embedding);
            (sim >= min_similarity).then(|| (sim, item.clone()))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
