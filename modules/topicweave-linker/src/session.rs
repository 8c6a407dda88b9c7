//! Session-scoped title registry and the "fetch more" suggestion flow.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use topicweave_common::Suggestion;

use crate::dedup::{filter_duplicates, normalize_title};
use crate::traits::SuggestionGenerator;

/// Titles surfaced, created or dismissed during one user session.
///
/// Created at session start and dropped (or `clear`ed) at session end. Never
/// persisted. Both sets only grow while the session lives.
#[derive(Debug, Clone, Default)]
pub struct SuggestionSession {
    seen: BTreeSet<String>,
    dismissed: BTreeSet<String>,
}

impl SuggestionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_surfaced<'a>(&mut self, titles: impl IntoIterator<Item = &'a str>) {
        for title in titles {
            self.insert_seen(title);
        }
    }

    /// A suggestion the user turned into a topic.
    pub fn record_created(&mut self, title: &str) {
        self.insert_seen(title);
    }

    /// A suggestion the user rejected. It will never be surfaced again.
    pub fn dismiss(&mut self, title: &str) {
        let normalized = normalize_title(title);
        if normalized.is_empty() {
            return;
        }
        self.seen.insert(normalized.clone());
        self.dismissed.insert(normalized);
    }

    pub fn is_dismissed(&self, title: &str) -> bool {
        self.dismissed.contains(&normalize_title(title))
    }

    pub fn seen(&self) -> &BTreeSet<String> {
        &self.seen
    }

    pub fn dismissed(&self) -> &BTreeSet<String> {
        &self.dismissed
    }

    /// Titles the generator must not propose again.
    pub fn exclude_titles(&self) -> Vec<String> {
        self.seen.union(&self.dismissed).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.dismissed.clear();
    }

    fn insert_seen(&mut self, title: &str) {
        let normalized = normalize_title(title);
        if !normalized.is_empty() {
            self.seen.insert(normalized);
        }
    }
}

/// Pulls suggestion batches from the generator and filters out anything the
/// session has already seen.
pub struct SuggestionFeed {
    generator: Arc<dyn SuggestionGenerator>,
}

impl SuggestionFeed {
    pub fn new(generator: Arc<dyn SuggestionGenerator>) -> Self {
        Self { generator }
    }

    /// Fetch the next batch. `visible` is what the user currently has on
    /// screen. An empty result is a normal outcome.
    pub async fn fetch_more(
        &self,
        session: &mut SuggestionSession,
        visible: &[Suggestion],
    ) -> Result<Vec<Suggestion>> {
        let exclude = session.exclude_titles();
        let raw = self.generator.suggest(&exclude).await?;
        let generated = raw.len();

        let existing = visible
            .iter()
            .map(|s| s.title.as_str())
            .chain(session.seen().iter().map(|t| t.as_str()));
        let fresh = filter_duplicates(raw, existing, session.dismissed());

        session.record_surfaced(fresh.iter().map(|s| s.title.as_str()));
        info!(
            generated,
            surfaced = fresh.len(),
            excluded = exclude.len(),
            "Fetched suggestion batch"
        );
        Ok(fresh)
    }
}
