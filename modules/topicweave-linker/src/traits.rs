// Trait abstractions for the linker's external collaborators.
//
// TopicStore: create/list/delete links; the only writer of Linked Items.
// SourceProvider: one connected source (mail, calendar, files, ...).
// SuggestionGenerator / CandidateScorer / Enricher: the analysis service.
//
// The HTTP client implements all of them. Tests use the mocks in `testing`:
// no network, no server.

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use topicweave_client::TopicWeaveClient;
use topicweave_common::{
    CandidateItem, CandidateScore, CreateLinkRequest, LinkResponse, LinkedItem, SearchRequest,
    Source, SourceAccount, Suggestion,
};

// ---------------------------------------------------------------------------
// TopicStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TopicStore: Send + Sync {
    /// Attempt to create one link. `Err` means the request never got an answer.
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<LinkResponse>;

    /// Authoritative list of items linked to a topic.
    async fn list_links(&self, topic_id: Uuid) -> Result<Vec<LinkedItem>>;

    async fn unlink(&self, topic_id: Uuid, item_id: Uuid) -> Result<()>;
}

#[async_trait]
impl TopicStore for TopicWeaveClient {
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<LinkResponse> {
        Ok(self.create_link(request).await?)
    }

    async fn list_links(&self, topic_id: Uuid) -> Result<Vec<LinkedItem>> {
        Ok(self.list_links(topic_id).await?)
    }

    async fn unlink(&self, topic_id: Uuid, item_id: Uuid) -> Result<()> {
        Ok(self.unlink(topic_id, item_id).await?)
    }
}

// ---------------------------------------------------------------------------
// SourceProvider
// ---------------------------------------------------------------------------

/// What one provider returned for a search.
#[derive(Debug, Clone, Default)]
pub struct ProviderResults {
    pub items: Vec<CandidateItem>,
    pub accounts: Vec<SourceAccount>,
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn source(&self) -> Source;

    async fn search(&self, request: &SearchRequest) -> Result<ProviderResults>;
}

/// Single-source view over the unified search endpoint.
pub struct HttpSourceProvider {
    client: TopicWeaveClient,
    source: Source,
}

impl HttpSourceProvider {
    pub fn new(client: TopicWeaveClient, source: Source) -> Self {
        Self { client, source }
    }
}

#[async_trait]
impl SourceProvider for HttpSourceProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(&self, request: &SearchRequest) -> Result<ProviderResults> {
        let scoped = SearchRequest {
            sources: vec![self.source],
            ..request.clone()
        };
        let response = self.client.search(&scoped).await?;

        let mut items = Vec::new();
        for result in response.results.into_iter().filter(|r| r.source == self.source) {
            if let Some(error) = result.error {
                bail!("{} search failed: {error}", self.source);
            }
            items.extend(result.items);
        }

        Ok(ProviderResults {
            items,
            accounts: response
                .accounts
                .into_iter()
                .filter(|a| a.source == self.source)
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Analysis service
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    /// Propose topic ideas, skipping anything in `exclude_titles`.
    async fn suggest(&self, exclude_titles: &[String]) -> Result<Vec<Suggestion>>;
}

#[async_trait]
impl SuggestionGenerator for TopicWeaveClient {
    async fn suggest(&self, exclude_titles: &[String]) -> Result<Vec<Suggestion>> {
        Ok(self.suggest(exclude_titles).await?)
    }
}

#[async_trait]
pub trait CandidateScorer: Send + Sync {
    /// Relevance of each candidate to a topic. Candidates missing from the
    /// answer are left unscored.
    async fn score(&self, topic_id: Uuid, candidates: &[CandidateItem])
        -> Result<Vec<CandidateScore>>;
}

#[async_trait]
impl CandidateScorer for TopicWeaveClient {
    async fn score(
        &self,
        topic_id: Uuid,
        candidates: &[CandidateItem],
    ) -> Result<Vec<CandidateScore>> {
        Ok(self.score(topic_id, candidates).await?)
    }
}

#[async_trait]
pub trait Enricher: Send + Sync {
    /// Re-run topic analysis after new items were linked.
    async fn reanalyze(&self, topic_id: Uuid) -> Result<()>;
}

#[async_trait]
impl Enricher for TopicWeaveClient {
    async fn reanalyze(&self, topic_id: Uuid) -> Result<()> {
        Ok(self.reanalyze(topic_id).await?)
    }
}
