//! Ordering and filtering rules applied when accumulators merge.
//!
//! Formula: results sort by `(mark rank, similarity)` descending. Remaining
//! ties fall back to `url`, `engine`, `text` and `thumbnail` ascending so
//! the merged list never depends on the order backends finished in.

use std::cmp::Ordering;

use crate::types::{Detail, Mark, ResultItem};

/// Merged-result ordering: best first.
pub fn compare_results(a: &ResultItem, b: &ResultItem) -> Ordering {
    b.mark
        .rank()
        .cmp(&a.mark.rank())
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.engine.cmp(&b.engine))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.thumbnail.cmp(&b.thumbnail))
}

/// Per-backend ordering used after a single run: similarity descending.
pub fn compare_similarity(a: &ResultItem, b: &ResultItem) -> Ordering {
    b.similarity.total_cmp(&a.similarity)
}

/// Diagnostic ordering: fastest backend first.
pub fn compare_details(a: &Detail, b: &Detail) -> Ordering {
    a.elapsed
        .cmp(&b.elapsed)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.text.cmp(&b.text))
}

/// Whether a result survives the merge filter.
///
/// Confirmed results always survive. Rejected results never do. Uncertain
/// results survive when their similarity meets `min_similarity`.
pub fn survives(item: &ResultItem, min_similarity: f64) -> bool {
    match item.mark {
        Mark::Confirmed => true,
        Mark::Rejected => false,
        Mark::Uncertain => item.similarity.meets(min_similarity),
    }
}

/// Sort, filter and truncate a merged result list in place.
pub fn rank_results(results: &mut Vec<ResultItem>, min_similarity: f64, max_count: usize) {
    results.sort_by(compare_results);
    results.retain(|item| survives(item, min_similarity));
    results.truncate(max_count);
}
