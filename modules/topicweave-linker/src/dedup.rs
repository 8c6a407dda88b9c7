//! Fuzzy title dedup for suggestion and candidate batches.
//!
//! Titles coming back from the suggestion generator have no stable key: the
//! same idea can return reworded on every call. Identity is approximated from
//! the normalized title with two signals: substring containment in either
//! direction, and token overlap.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use topicweave_common::{CandidateItem, Suggestion};

/// Overlap ratio above which two titles count as the same idea.
pub const TOKEN_OVERLAP_THRESHOLD: f64 = 0.6;

/// Shared tokens must be longer than this to count toward overlap.
const MIN_SHARED_TOKEN_CHARS: usize = 2;

/// Normalize a title for dedup comparison: lowercase and trim.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Anything the filter can compare by title.
pub trait Titled {
    fn title(&self) -> &str;
}

impl Titled for Suggestion {
    fn title(&self) -> &str {
        &self.title
    }
}

impl Titled for CandidateItem {
    fn title(&self) -> &str {
        &self.title
    }
}

impl Titled for String {
    fn title(&self) -> &str {
        self
    }
}

fn tokens(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}

/// |shared tokens longer than two chars| / min(|tokens a|, |tokens b|).
/// Zero when either side has no tokens.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    let denominator = ta.len().min(tb.len());
    if denominator == 0 {
        return 0.0;
    }

    let shared = ta
        .intersection(&tb)
        .filter(|t| t.chars().count() > MIN_SHARED_TOKEN_CHARS)
        .count();
    shared as f64 / denominator as f64
}

/// Both inputs must already be normalized and non-empty.
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a) || token_overlap(a, b) > TOKEN_OVERLAP_THRESHOLD
}

/// Drop items from `incoming` that duplicate an existing title, a dismissed
/// title, or an item accepted earlier in the same pass. Order is preserved and
/// the first occurrence wins.
///
/// Blank titles are always dropped: an empty string is contained in every
/// title, so it can never survive the containment check.
pub fn filter_duplicates<T, I>(incoming: Vec<T>, existing: I, dismissed: &BTreeSet<String>) -> Vec<T>
where
    T: Titled,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut exact: HashSet<String> = HashSet::new();
    let mut comparison: Vec<String> = Vec::new();
    for title in existing
        .into_iter()
        .map(|t| normalize_title(t.as_ref()))
        .chain(dismissed.iter().map(|t| normalize_title(t)))
    {
        if !title.is_empty() && exact.insert(title.clone()) {
            comparison.push(title);
        }
    }

    let mut accepted = Vec::with_capacity(incoming.len());
    for item in incoming {
        let title = normalize_title(item.title());
        if title.is_empty() {
            debug!("Dropping candidate with blank title");
            continue;
        }
        if exact.contains(&title) {
            debug!(title = title.as_str(), "Exact duplicate title");
            continue;
        }
        if let Some(seen) = comparison.iter().find(|seen| is_near_duplicate(&title, seen)) {
            debug!(title = title.as_str(), matched = seen.as_str(), "Near-duplicate title");
            continue;
        }

        exact.insert(title.clone());
        comparison.push(title);
        accepted.push(item);
    }
    accepted
}
