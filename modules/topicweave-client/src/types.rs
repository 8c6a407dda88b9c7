use serde::{Deserialize, Serialize};

use topicweave_common::{CandidateItem, CandidateScore, LinkedItem, Suggestion};

/// 200 body of the create-link endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ItemEnvelope {
    pub item: LinkedItem,
}

/// 409 body of the create-link endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConflictBody {
    #[serde(default)]
    pub same_topic: bool,
}

/// Body of any other non-success response.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub constraint_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ItemsEnvelope {
    #[serde(default)]
    pub items: Vec<LinkedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SuggestRequest<'a> {
    pub exclude_titles: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuggestionsEnvelope {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoreRequest<'a> {
    pub candidates: &'a [CandidateItem],
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScoresEnvelope {
    #[serde(default)]
    pub scores: Vec<CandidateScore>,
}
