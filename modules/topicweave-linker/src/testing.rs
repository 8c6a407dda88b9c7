// Test mocks for the linker.
//
// One mock per trait boundary:
// - MockTopicStore (TopicStore): stateful in-memory store with the real
//   per-topic unique key and 409 semantics, plus scripted failures
// - MockSourceProvider (SourceProvider): fixed items or a fixed error
// - MockSuggestionGenerator (SuggestionGenerator): queued batches
// - MockScorer (CandidateScorer): key→confidence map
// - RecordingEnricher (Enricher): records re-analysis calls
//
// Plus helpers for building candidates and suggestions.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use topicweave_common::{
    CandidateItem, CandidateScore, CreateLinkRequest, ItemKey, LinkResponse, LinkedBy, LinkedItem,
    Metadata, SearchRequest, Source, SourceAccount, Suggestion,
};

use crate::traits::{
    CandidateScorer, Enricher, ProviderResults, SourceProvider, SuggestionGenerator, TopicStore,
};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn candidate(source: Source, external_id: &str, title: &str) -> CandidateItem {
    CandidateItem {
        source,
        external_id: external_id.to_string(),
        title: title.to_string(),
        snippet: format!("{title} snippet"),
        url: Some(format!("https://{source}.example.com/{external_id}")),
        occurred_at: Some(Utc::now()),
        source_account_id: Some(format!("{source}-account")),
        metadata: Metadata::new(),
        ai_confidence: None,
        ai_reason: None,
        already_linked: false,
    }
}

pub fn suggestion(title: &str) -> Suggestion {
    Suggestion {
        title: title.to_string(),
        description: format!("About {title}"),
        area: "general".to_string(),
        reason: "recent activity".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockTopicStore
// ---------------------------------------------------------------------------

/// Canned answer for every create request on one key, until cleared.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    TransportError,
    ServerError,
    ConstraintError,
    Conflict { same_topic: bool },
}

struct MockTopicStoreInner {
    /// topic_id → items, oldest first
    links: HashMap<Uuid, Vec<LinkedItem>>,
    scripted: HashMap<ItemKey, ScriptedResponse>,
    requests: Vec<CreateLinkRequest>,
    fail_listing: bool,
    tick: i64,
}

/// In-memory topic store enforcing one link per (topic, source, external_id).
pub struct MockTopicStore {
    inner: Mutex<MockTopicStoreInner>,
}

impl MockTopicStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockTopicStoreInner {
                links: HashMap::new(),
                scripted: HashMap::new(),
                requests: Vec::new(),
                fail_listing: false,
                tick: 0,
            }),
        }
    }

    /// Insert a link directly, as if created earlier.
    pub fn seed(&self, topic_id: Uuid, candidate: &CandidateItem) -> LinkedItem {
        let mut inner = self.inner.lock().unwrap();
        let request = CreateLinkRequest::from_candidate(candidate, topic_id, LinkedBy::User, false);
        insert_link(&mut inner, &request)
    }

    pub fn script(&self, key: ItemKey, response: ScriptedResponse) {
        self.inner.lock().unwrap().scripted.insert(key, response);
    }

    pub fn clear_script(&self, key: &ItemKey) {
        self.inner.lock().unwrap().scripted.remove(key);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.inner.lock().unwrap().fail_listing = fail;
    }

    /// Items linked to a topic, most recent first.
    pub fn links_for(&self, topic_id: Uuid) -> Vec<LinkedItem> {
        let inner = self.inner.lock().unwrap();
        let mut items = inner.links.get(&topic_id).cloned().unwrap_or_default();
        items.reverse();
        items
    }

    pub fn total_links(&self) -> usize {
        self.inner.lock().unwrap().links.values().map(Vec::len).sum()
    }

    /// Distinct external items linked anywhere.
    pub fn distinct_keys(&self) -> BTreeSet<ItemKey> {
        self.inner
            .lock()
            .unwrap()
            .links
            .values()
            .flatten()
            .map(LinkedItem::key)
            .collect()
    }

    pub fn requests(&self) -> Vec<CreateLinkRequest> {
        self.inner.lock().unwrap().requests.clone()
    }
}

impl Default for MockTopicStore {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_link(inner: &mut MockTopicStoreInner, request: &CreateLinkRequest) -> LinkedItem {
    inner.tick += 1;
    let item = LinkedItem {
        id: Uuid::new_v4(),
        topic_id: request.topic_id,
        source: request.source,
        external_id: request.external_id.clone(),
        source_account_id: request.source_account_id.clone(),
        title: request.title.clone(),
        snippet: request.snippet.clone(),
        url: request.url.clone(),
        occurred_at: request.occurred_at,
        metadata: request.metadata.clone(),
        linked_by: request.linked_by,
        confidence: request.confidence,
        link_reason: request.link_reason.clone(),
        created_at: Utc::now() + Duration::milliseconds(inner.tick),
        synthesized: false,
    };
    inner
        .links
        .entry(request.topic_id)
        .or_default()
        .push(item.clone());
    item
}

#[async_trait]
impl TopicStore for MockTopicStore {
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<LinkResponse> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request.clone());

        let key = request.key();
        if let Some(scripted) = inner.scripted.get(&key).cloned() {
            return match scripted {
                ScriptedResponse::TransportError => bail!("MockTopicStore: connection reset for {key}"),
                ScriptedResponse::ServerError => Ok(LinkResponse::Rejected {
                    status: 503,
                    error: "service unavailable".to_string(),
                    constraint_error: false,
                }),
                ScriptedResponse::ConstraintError => Ok(LinkResponse::Rejected {
                    status: 500,
                    error: "violates check constraint".to_string(),
                    constraint_error: true,
                }),
                ScriptedResponse::Conflict { same_topic } => Ok(LinkResponse::Conflict { same_topic }),
            };
        }

        let linked_here = inner
            .links
            .get(&request.topic_id)
            .is_some_and(|items| items.iter().any(|i| i.key() == key));
        if linked_here {
            return Ok(LinkResponse::Conflict { same_topic: true });
        }

        let linked_elsewhere = inner
            .links
            .iter()
            .any(|(topic, items)| *topic != request.topic_id && items.iter().any(|i| i.key() == key));
        if linked_elsewhere && !request.force {
            return Ok(LinkResponse::Conflict { same_topic: false });
        }

        Ok(LinkResponse::Created(insert_link(&mut inner, request)))
    }

    async fn list_links(&self, topic_id: Uuid) -> Result<Vec<LinkedItem>> {
        if self.inner.lock().unwrap().fail_listing {
            bail!("MockTopicStore: listing unavailable");
        }
        Ok(self.links_for(topic_id))
    }

    async fn unlink(&self, topic_id: Uuid, item_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let items = inner.links.entry(topic_id).or_default();
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() == before {
            bail!("MockTopicStore: no item {item_id} in topic {topic_id}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSourceProvider
// ---------------------------------------------------------------------------

pub struct MockSourceProvider {
    source: Source,
    items: Vec<CandidateItem>,
    accounts: Vec<SourceAccount>,
    error: Option<String>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl MockSourceProvider {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            items: Vec::new(),
            accounts: Vec::new(),
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_items(mut self, items: Vec<CandidateItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_account(mut self, id: &str) -> Self {
        self.accounts.push(SourceAccount {
            id: id.to_string(),
            source: self.source,
            label: id.to_string(),
        });
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceProvider for MockSourceProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(&self, request: &SearchRequest) -> Result<ProviderResults> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = &self.error {
            bail!("{error}");
        }
        Ok(ProviderResults {
            items: self.items.clone(),
            accounts: self.accounts.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockSuggestionGenerator
// ---------------------------------------------------------------------------

/// Returns queued batches in order, then empty batches. Ignores exclusions,
/// like a generator that does not follow instructions.
pub struct MockSuggestionGenerator {
    batches: Mutex<VecDeque<Vec<Suggestion>>>,
    exclusions: Mutex<Vec<Vec<String>>>,
}

impl MockSuggestionGenerator {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            exclusions: Mutex::new(Vec::new()),
        }
    }

    pub fn push_batch(&self, titles: &[&str]) {
        self.batches
            .lock()
            .unwrap()
            .push_back(titles.iter().map(|t| suggestion(t)).collect());
    }

    /// `exclude_titles` received on each call.
    pub fn exclusions(&self) -> Vec<Vec<String>> {
        self.exclusions.lock().unwrap().clone()
    }
}

impl Default for MockSuggestionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuggestionGenerator for MockSuggestionGenerator {
    async fn suggest(&self, exclude_titles: &[String]) -> Result<Vec<Suggestion>> {
        self.exclusions.lock().unwrap().push(exclude_titles.to_vec());
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockScorer
// ---------------------------------------------------------------------------

pub struct MockScorer {
    scores: HashMap<ItemKey, f32>,
    fail: bool,
}

impl MockScorer {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            fail: false,
        }
    }

    pub fn with_score(mut self, key: ItemKey, confidence: f32) -> Self {
        self.scores.insert(key, confidence);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateScorer for MockScorer {
    async fn score(
        &self,
        _topic_id: Uuid,
        candidates: &[CandidateItem],
    ) -> Result<Vec<CandidateScore>> {
        if self.fail {
            bail!("MockScorer: analysis unavailable");
        }
        Ok(candidates
            .iter()
            .filter_map(|c| {
                self.scores.get(&c.key()).map(|confidence| CandidateScore {
                    source: c.source,
                    external_id: c.external_id.clone(),
                    confidence: *confidence,
                    reason: Some(format!("scored {confidence}")),
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// RecordingEnricher
// ---------------------------------------------------------------------------

pub struct RecordingEnricher {
    calls: Mutex<Vec<Uuid>>,
    fail: bool,
}

impl RecordingEnricher {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<Uuid> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for RecordingEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enricher for RecordingEnricher {
    async fn reanalyze(&self, topic_id: Uuid) -> Result<()> {
        self.calls.lock().unwrap().push(topic_id);
        if self.fail {
            bail!("RecordingEnricher: analysis queue full");
        }
        Ok(())
    }
}
