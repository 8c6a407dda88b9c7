use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use typed_builder::TypedBuilder;

use topicweave_client::TopicWeaveClient;
use topicweave_common::{LinkedBy, Source};

use crate::aggregator::CandidateAggregator;
use crate::orchestrator::BatchOrchestrator;
use crate::session::SuggestionFeed;
use crate::traits::{
    CandidateScorer, Enricher, HttpSourceProvider, SourceProvider, SuggestionGenerator, TopicStore,
};

/// Shared dependency container for the linker components.
///
/// Holds the long-lived collaborators; the aggregator, feed and orchestrator
/// are built from it per session.
#[derive(Clone, TypedBuilder)]
pub struct LinkerDeps {
    pub store: Arc<dyn TopicStore>,
    #[builder(default)]
    pub providers: Vec<Arc<dyn SourceProvider>>,
    pub generator: Arc<dyn SuggestionGenerator>,
    #[builder(default)]
    pub scorer: Option<Arc<dyn CandidateScorer>>,
    #[builder(default)]
    pub enricher: Option<Arc<dyn Enricher>>,
    #[builder(default)]
    pub linked_by: LinkedBy,
    /// Batch sequence counter shared by every orchestrator built here.
    #[builder(default = Arc::new(AtomicU64::new(1)))]
    pub next_seq: Arc<AtomicU64>,
}

impl LinkerDeps {
    /// Wire every collaborator to the HTTP client, one provider per source.
    pub fn from_client(client: TopicWeaveClient, linked_by: LinkedBy) -> Self {
        let providers: Vec<Arc<dyn SourceProvider>> = Source::ALL
            .iter()
            .map(|source| {
                Arc::new(HttpSourceProvider::new(client.clone(), *source)) as Arc<dyn SourceProvider>
            })
            .collect();
        let client = Arc::new(client);

        Self::builder()
            .store(client.clone())
            .providers(providers)
            .generator(client.clone())
            .scorer(Some(client.clone() as Arc<dyn CandidateScorer>))
            .enricher(Some(client as Arc<dyn Enricher>))
            .linked_by(linked_by)
            .build()
    }

    pub fn build_aggregator(&self) -> CandidateAggregator {
        let aggregator = CandidateAggregator::new(self.providers.clone());
        match &self.scorer {
            Some(scorer) => aggregator.with_scorer(scorer.clone()),
            None => aggregator,
        }
    }

    pub fn build_feed(&self) -> SuggestionFeed {
        SuggestionFeed::new(self.generator.clone())
    }

    pub fn build_orchestrator(&self) -> BatchOrchestrator {
        let orchestrator = BatchOrchestrator::new(self.store.clone(), self.linked_by)
            .with_sequence(self.next_seq.clone());
        match &self.enricher {
            Some(enricher) => orchestrator.with_enricher(enricher.clone()),
            None => orchestrator,
        }
    }
}
