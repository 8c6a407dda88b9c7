//! Candidate search across every enabled source.
//!
//! Providers are queried together; one failing source becomes a warning and
//! never hides results from the others. Results are tagged against the
//! active topic's mirror so already-linked items are never offered again.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use topicweave_common::{CandidateItem, ItemKey, SearchRequest, Source, SourceAccount};

use crate::reconciler::LinkedMirror;
use crate::traits::{CandidateScorer, SourceProvider};

const MAX_CONCURRENT_PROVIDERS: usize = 5;

/// A source that could not be searched this time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderWarning {
    pub source: Source,
    pub message: String,
}

/// Everything one search produced.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub candidates: Vec<CandidateItem>,
    pub warnings: Vec<ProviderWarning>,
    pub accounts: Vec<SourceAccount>,
    /// Set when ranking was requested but the scorer failed.
    pub scoring_error: Option<String>,
}

impl Aggregation {
    /// Candidates the user may still link to the active topic.
    pub fn linkable(&self) -> impl Iterator<Item = &CandidateItem> {
        self.candidates.iter().filter(|c| !c.already_linked)
    }
}

pub struct CandidateAggregator {
    providers: Vec<Arc<dyn SourceProvider>>,
    scorer: Option<Arc<dyn CandidateScorer>>,
}

impl CandidateAggregator {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self {
            providers,
            scorer: None,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn CandidateScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Search every source in `request.sources` and tag the results against
    /// `mirror`. Never fails: provider errors land in `warnings`.
    pub async fn search(&self, request: &SearchRequest, mirror: &LinkedMirror) -> Aggregation {
        let mut aggregation = Aggregation::default();

        let mut enabled: Vec<Arc<dyn SourceProvider>> = Vec::new();
        for source in dedup_sources(&request.sources) {
            match self.providers.iter().find(|p| p.source() == source) {
                Some(provider) => enabled.push(provider.clone()),
                None => aggregation.warnings.push(ProviderWarning {
                    source,
                    message: "no provider connected".to_string(),
                }),
            }
        }

        let results: Vec<_> = stream::iter(enabled.into_iter().map(|provider| async move {
            let result = provider.search(request).await;
            (provider.source(), result)
        }))
        .buffered(MAX_CONCURRENT_PROVIDERS)
        .collect()
        .await;

        for (source, result) in results {
            match result {
                Ok(found) => {
                    aggregation.candidates.extend(found.items);
                    aggregation.accounts.extend(found.accounts);
                }
                Err(e) => {
                    warn!(source = %source, query = request.query.as_str(), error = %e, "Source search failed");
                    aggregation.warnings.push(ProviderWarning {
                        source,
                        message: e.to_string(),
                    });
                }
            }
        }

        tag_already_linked(&mut aggregation.candidates, mirror);

        if let Some(scorer) = &self.scorer {
            if !aggregation.candidates.is_empty() {
                match scorer.score(mirror.topic_id(), &aggregation.candidates).await {
                    Ok(scores) => {
                        let by_key: HashMap<ItemKey, _> =
                            scores.into_iter().map(|s| (s.key(), s)).collect();
                        for candidate in &mut aggregation.candidates {
                            if let Some(score) = by_key.get(&candidate.key()) {
                                candidate.ai_confidence = Some(score.confidence);
                                candidate.ai_reason = score.reason.clone();
                            }
                        }
                        rank_by_confidence(&mut aggregation.candidates);
                    }
                    Err(e) => {
                        warn!(topic_id = %mirror.topic_id(), error = %e, "Candidate scoring failed");
                        aggregation.scoring_error = Some(e.to_string());
                    }
                }
            }
        }

        info!(
            query = request.query.as_str(),
            candidates = aggregation.candidates.len(),
            already_linked = aggregation.candidates.iter().filter(|c| c.already_linked).count(),
            warnings = aggregation.warnings.len(),
            "Aggregated candidates"
        );
        aggregation
    }
}

fn dedup_sources(sources: &[Source]) -> Vec<Source> {
    let mut out: Vec<Source> = Vec::with_capacity(sources.len());
    for source in sources {
        if !out.contains(source) {
            out.push(*source);
        }
    }
    out
}

/// Mark candidates whose (source, external_id) is already linked in `mirror`.
pub fn tag_already_linked(candidates: &mut [CandidateItem], mirror: &LinkedMirror) {
    let linked = mirror.keys();
    for candidate in candidates {
        candidate.already_linked = linked.contains(&candidate.key());
    }
}

/// Highest confidence first; unscored candidates keep their order at the end.
pub fn rank_by_confidence(candidates: &mut [CandidateItem]) {
    candidates.sort_by(|a, b| match (a.ai_confidence, b.ai_confidence) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::testing::*;

    fn request(sources: &[Source]) -> SearchRequest {
        SearchRequest {
            query: "roadmap".to_string(),
            sources: sources.to_vec(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn concatenates_sources_in_request_order() {
        let mail = Arc::new(MockSourceProvider::new(Source::Mail).with_items(vec![
            candidate(Source::Mail, "m-1", "Roadmap email"),
        ]));
        let files = Arc::new(MockSourceProvider::new(Source::Files).with_items(vec![
            candidate(Source::Files, "f-1", "Roadmap doc"),
            candidate(Source::Files, "f-2", "Roadmap v2"),
        ]));
        let aggregator = CandidateAggregator::new(vec![
            mail as Arc<dyn SourceProvider>,
            files as Arc<dyn SourceProvider>,
        ]);

        let out = aggregator
            .search(&request(&[Source::Files, Source::Mail]), &LinkedMirror::new(Uuid::new_v4()))
            .await;

        let ids: Vec<_> = out.candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["f-1", "f-2", "m-1"]);
        assert!(out.warnings.is_empty());
    }

    #[tokio::test]
    async fn failing_source_becomes_warning() {
        let mail = Arc::new(MockSourceProvider::new(Source::Mail).failing("token expired"));
        let notes = Arc::new(
            MockSourceProvider::new(Source::Notes)
                .with_items(vec![candidate(Source::Notes, "n-1", "Roadmap notes")])
                .with_account("notes-1"),
        );
        let aggregator = CandidateAggregator::new(vec![
            mail as Arc<dyn SourceProvider>,
            notes as Arc<dyn SourceProvider>,
        ]);

        let out = aggregator
            .search(&request(&[Source::Mail, Source::Notes]), &LinkedMirror::new(Uuid::new_v4()))
            .await;

        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.accounts.len(), 1);
        assert_eq!(
            out.warnings,
            vec![ProviderWarning {
                source: Source::Mail,
                message: "token expired".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn disabled_sources_are_not_called() {
        let mail = Arc::new(MockSourceProvider::new(Source::Mail));
        let chat = Arc::new(MockSourceProvider::new(Source::Chat));
        let aggregator = CandidateAggregator::new(vec![
            mail.clone() as Arc<dyn SourceProvider>,
            chat.clone() as Arc<dyn SourceProvider>,
        ]);

        let out = aggregator
            .search(&request(&[Source::Chat, Source::Calendar]), &LinkedMirror::new(Uuid::new_v4()))
            .await;

        assert_eq!(mail.calls(), 0);
        assert_eq!(chat.calls(), 1);
        assert_eq!(out.warnings.len(), 1, "calendar has no provider");
        assert!(out.candidates.is_empty());
    }

    #[tokio::test]
    async fn tags_items_already_in_topic() {
        let store = MockTopicStore::new();
        let topic = Uuid::new_v4();
        let linked = candidate(Source::Files, "f-1", "Roadmap doc");
        let mirror = LinkedMirror::from_items(topic, vec![store.seed(topic, &linked)]);

        let files = Arc::new(MockSourceProvider::new(Source::Files).with_items(vec![
            linked.clone(),
            candidate(Source::Files, "f-2", "Roadmap v2"),
        ]));
        let out = CandidateAggregator::new(vec![files as Arc<dyn SourceProvider>])
            .search(&request(&[Source::Files]), &mirror)
            .await;

        assert!(out.candidates[0].already_linked);
        assert!(!out.candidates[1].already_linked);
        let linkable: Vec<_> = out.linkable().map(|c| c.external_id.as_str()).collect();
        assert_eq!(linkable, vec!["f-2"]);
    }

    #[tokio::test]
    async fn scorer_ranks_candidates() {
        let files = Arc::new(MockSourceProvider::new(Source::Files).with_items(vec![
            candidate(Source::Files, "low", "Low"),
            candidate(Source::Files, "none", "Unscored"),
            candidate(Source::Files, "high", "High"),
        ]));
        let scorer = Arc::new(
            MockScorer::new()
                .with_score(ItemKey::new(Source::Files, "low"), 0.2)
                .with_score(ItemKey::new(Source::Files, "high"), 0.9),
        );
        let out = CandidateAggregator::new(vec![files as Arc<dyn SourceProvider>])
            .with_scorer(scorer)
            .search(&request(&[Source::Files]), &LinkedMirror::new(Uuid::new_v4()))
            .await;

        let ids: Vec<_> = out.candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "none"]);
        assert_eq!(out.candidates[0].ai_confidence, Some(0.9));
    }

    #[tokio::test]
    async fn scorer_failure_keeps_results() {
        let files = Arc::new(
            MockSourceProvider::new(Source::Files)
                .with_items(vec![candidate(Source::Files, "f-1", "Roadmap")]),
        );
        let out = CandidateAggregator::new(vec![files as Arc<dyn SourceProvider>])
            .with_scorer(Arc::new(MockScorer::new().failing()))
            .search(&request(&[Source::Files]), &LinkedMirror::new(Uuid::new_v4()))
            .await;

        assert_eq!(out.candidates.len(), 1);
        assert!(out.scoring_error.is_some());
    }

    #[tokio::test]
    async fn no_results_is_not_an_error() {
        let out = CandidateAggregator::new(Vec::new())
            .search(&request(&[]), &LinkedMirror::new(Uuid::new_v4()))
            .await;
        assert!(out.candidates.is_empty());
        assert!(out.warnings.is_empty());
    }
}
