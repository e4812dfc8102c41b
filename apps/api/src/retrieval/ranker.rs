use crate::retrieval::similarity::cosine_similarity;

/// Scores every document against the query and keeps the best `k`.
///
/// Sorting is stable, so documents with equal scores stay in insertion order.
/// Returns `min(k, documents)` entries; `k == 0` yields nothing.
pub fn rank_top_k<'a, K, I>(query: &[f32], documents: I, k: usize) -> Vec<(K, f32)>
where
    I: IntoIterator<Item = (K, &'a [f32])>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(K, f32)> = documents
        .into_iter()
        .map(|(id, vector)| (id, cosine_similarity(query, vector)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}
