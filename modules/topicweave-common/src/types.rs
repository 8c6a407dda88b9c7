use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

/// External content source a candidate was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Mail,
    Calendar,
    Files,
    Chat,
    Notes,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Mail,
        Source::Calendar,
        Source::Files,
        Source::Chat,
        Source::Notes,
    ];
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Mail => write!(f, "mail"),
            Source::Calendar => write!(f, "calendar"),
            Source::Files => write!(f, "files"),
            Source::Chat => write!(f, "chat"),
            Source::Notes => write!(f, "notes"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mail" => Ok(Source::Mail),
            "calendar" => Ok(Source::Calendar),
            "files" => Ok(Source::Files),
            "chat" => Ok(Source::Chat),
            "notes" => Ok(Source::Notes),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// Who created a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkedBy {
    #[default]
    User,
    Agent,
}

impl std::fmt::Display for LinkedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkedBy::User => write!(f, "user"),
            LinkedBy::Agent => write!(f, "agent"),
        }
    }
}

// --- Identity ---

/// Source-side identity of a content item. Stable across aggregator calls,
/// unlike titles, which the suggestion generator may rephrase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub source: Source,
    pub external_id: String,
}

impl ItemKey {
    pub fn new(source: Source, external_id: impl Into<String>) -> Self {
        Self {
            source,
            external_id: external_id.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.external_id)
    }
}

pub type Metadata = HashMap<String, serde_json::Value>;

// --- Candidates ---

/// Content discovered in an external source, not yet linked to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub source: Source,
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_account_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reason: Option<String>,
    /// Set by the aggregator when the active topic already holds this item.
    #[serde(default)]
    pub already_linked: bool,
}

impl CandidateItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, self.external_id.clone())
    }
}

/// A connected account on one source (a mailbox, a drive, a workspace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAccount {
    pub id: String,
    pub source: Source,
    #[serde(default)]
    pub label: String,
}

// --- Linked items ---

/// Association of an external item with a topic, owned by the topic store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedItem {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub source: Source,
    pub external_id: String,
    #[serde(default)]
    pub source_account_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub linked_by: LinkedBy,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub link_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Built locally from candidate fields after a same-topic conflict.
    /// The id is a placeholder until the next authoritative refresh.
    #[serde(skip)]
    pub synthesized: bool,
}

impl LinkedItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, self.external_id.clone())
    }

    /// Local stand-in for an item the store reported as already linked but
    /// did not echo back.
    pub fn synthesize(candidate: &CandidateItem, topic_id: Uuid, linked_by: LinkedBy) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic_id,
            source: candidate.source,
            external_id: candidate.external_id.clone(),
            source_account_id: candidate.source_account_id.clone(),
            title: candidate.title.clone(),
            snippet: candidate.snippet.clone(),
            url: candidate.url.clone(),
            occurred_at: candidate.occurred_at,
            metadata: candidate.metadata.clone(),
            linked_by,
            confidence: candidate.ai_confidence,
            link_reason: candidate.ai_reason.clone(),
            created_at: Utc::now(),
            synthesized: true,
        }
    }
}

// --- Topic store wire types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub topic_id: Uuid,
    pub external_id: String,
    pub source: Source,
    pub source_account_id: Option<String>,
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub linked_by: LinkedBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

impl CreateLinkRequest {
    pub fn from_candidate(
        candidate: &CandidateItem,
        topic_id: Uuid,
        linked_by: LinkedBy,
        force: bool,
    ) -> Self {
        Self {
            topic_id,
            external_id: candidate.external_id.clone(),
            source: candidate.source,
            source_account_id: candidate.source_account_id.clone(),
            title: candidate.title.clone(),
            snippet: candidate.snippet.clone(),
            url: candidate.url.clone(),
            occurred_at: candidate.occurred_at,
            metadata: candidate.metadata.clone(),
            linked_by,
            confidence: candidate.ai_confidence,
            link_reason: candidate.ai_reason.clone(),
            force,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, self.external_id.clone())
    }
}

/// What the topic store answered to a create-link request.
/// Transport failures are not represented here; they surface as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkResponse {
    /// 200: the association was created.
    Created(LinkedItem),
    /// 409: the key already exists, either under this topic or another.
    Conflict { same_topic: bool },
    /// Any other non-success status.
    Rejected {
        status: u16,
        error: String,
        constraint_error: bool,
    },
}

// --- Source search wire types ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: Source,
    #[serde(default)]
    pub items: Vec<CandidateItem>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SourceResult>,
    #[serde(default)]
    pub accounts: Vec<SourceAccount>,
}

// --- Suggestions ---

/// A topic idea proposed by the suggestion generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub reason: String,
}

/// Relevance score for one candidate, produced by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub source: Source,
    pub external_id: String,
    pub confidence: f32,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CandidateScore {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, self.external_id.clone())
    }
}
