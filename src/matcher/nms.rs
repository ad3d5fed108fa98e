//! Non-maximum suppression over match hits.

use super::MatchHit;

/// Keeps the most confident hit of every cluster.
///
/// Two hits are duplicates when their centers differ by less than
/// `overlap * avg` on both axes, where `avg` is the mean of the four box sides.
/// The output is sorted by confidence (stable) and is a fixed point: running it
/// again returns the same hits.
pub fn suppress_duplicates(mut hits: Vec<MatchHit>, overlap: f32) -> Vec<MatchHit> {
    hits.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<MatchHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if !kept.iter().any(|k| is_duplicate(k, &hit, overlap)) {
            kept.push(hit);
        }
    }
    kept
}

fn is_duplicate(a: &MatchHit, b: &MatchHit, overlap: f32) -> bool {
    let avg = (a.width + a.height + b.width + b.height) as f32 / 4.0;
    let limit = overlap * avg;
    let dx = (a.x as f32 - b.x as f32).abs();
    let dy = (a.y as f32 - b.y as f32).abs();
    dx < limit && dy < limit
}
