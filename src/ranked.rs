//! Ordered-list helpers shared by the ranking components.
//!
//! `search_insert` is the classic binary-search insertion point used for the
//! point-in-time leadership queries; `rank_descending` maintains a bounded,
//! descending-sorted list of entries (the leaderboard shape).

/// Binary search for the position of `target` in an ascending-sorted slice.
///
/// Returns the index of an exact match if present, otherwise the index at
/// which `target` would have to be inserted to keep the slice sorted.
/// O(log n) time, O(1) space.
pub fn search_insert<T: Ord>(sorted: &[T], target: &T) -> usize {
    let mut left = 0usize;
    let mut right = sorted.len();

    while left < right {
        let mid = left + (right - left) / 2;
        match sorted[mid].cmp(target) {
            std::cmp::Ordering::Equal => return mid,
            std::cmp::Ordering::Greater => right = mid,
            std::cmp::Ordering::Less => left = mid + 1,
        }
    }
    left
}

/// Re-rank `entries` in descending order of `key` and drop the smallest
/// entries beyond `capacity`.
///
/// The sort is stable, so entries with equal keys keep their insertion order
/// (earliest-inserted ranks first among ties).
pub fn rank_descending<T, K, F>(entries: &mut Vec<T>, key: F, capacity: usize)
where
    K: Ord,
    F: Fn(&T) -> K,
{
    entries.sort_by(|a, b| key(b).cmp(&key(a)));
    entries.truncate(capacity);
}
