use std::collections::HashMap;

use super::VectorHit;

/// Merge the hit lists of several query variants by chunk identity, keeping
/// each chunk's best similarity. The result does not depend on the order of
/// the lists; ties in the final ordering break on `chunk_id`.
pub fn max_fusion(per_variant: Vec<Vec<VectorHit>>) -> Vec<VectorHit> {
    let mut best: HashMap<String, VectorHit> = HashMap::new();

    for hit in per_variant.into_iter().flatten() {
        match best.get_mut(&hit.chunk_id) {
            Some(existing) if existing.similarity >= hit.similarity => {}
            Some(existing) => *existing = hit,
            None => {
                best.insert(hit.chunk_id.clone(), hit);
            }
        }
    }

    let mut fused: Vec<VectorHit> = best.into_values().collect();
    sort_by_similarity(&mut fused);
    fused
}

/// Descending by similarity, then ascending by chunk id.
pub fn sort_by_similarity(hits: &mut [VectorHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

/// Keep only the first (best) hit of each item. Input must already be sorted.
pub fn best_per_item(hits: Vec<VectorHit>) -> Vec<VectorHit> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.item_id.clone()))
        .collect()
}
