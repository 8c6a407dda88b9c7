pub mod error;
mod types;

pub use error::{ClientError, Result};

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use topicweave_common::{
    CandidateItem, CandidateScore, Config, CreateLinkRequest, LinkResponse, LinkedItem,
    SearchRequest, SearchResponse, Suggestion,
};
use types::{
    ConflictBody, ErrorBody, ItemEnvelope, ItemsEnvelope, ScoreRequest, ScoresEnvelope,
    SuggestRequest, SuggestionsEnvelope,
};

/// Client for the workspace API: topic links, source search, suggestions and analysis.
#[derive(Clone)]
pub struct TopicWeaveClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TopicWeaveClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api_url,
            &config.api_token,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Create a link. 409 and constraint rejections are answers, not errors;
    /// only transport and decoding problems come back as `Err`.
    pub async fn create_link(&self, request: &CreateLinkRequest) -> Result<LinkResponse> {
        let url = format!("{}/topics/{}/items", self.base_url, request.topic_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let envelope: ItemEnvelope = resp.json().await?;
            return Ok(LinkResponse::Created(envelope.item));
        }

        let body = resp.text().await?;
        if status == StatusCode::CONFLICT {
            let conflict: ConflictBody = serde_json::from_str(&body)?;
            tracing::debug!(
                topic_id = %request.topic_id,
                key = %request.key(),
                same_topic = conflict.same_topic,
                "Link conflict"
            );
            return Ok(LinkResponse::Conflict {
                same_topic: conflict.same_topic,
            });
        }

        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_else(|_| ErrorBody {
            error: body.clone(),
            constraint_error: false,
        });
        Ok(LinkResponse::Rejected {
            status: status.as_u16(),
            error: parsed.error,
            constraint_error: parsed.constraint_error,
        })
    }

    /// Authoritative list of items linked to a topic.
    pub async fn list_links(&self, topic_id: Uuid) -> Result<Vec<LinkedItem>> {
        let url = format!("{}/topics/{}/items", self.base_url, topic_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let envelope: ItemsEnvelope = parse(resp).await?;
        Ok(envelope.items)
    }

    pub async fn unlink(&self, topic_id: Uuid, item_id: Uuid) -> Result<()> {
        let url = format!("{}/topics/{}/items/{}", self.base_url, topic_id, item_id);
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        check(resp).await?;
        Ok(())
    }

    /// Unified search across connected sources. Per-source failures come back
    /// inside the response, not as an error.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = format!("{}/sources/search", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        parse(resp).await
    }

    pub async fn suggest(&self, exclude_titles: &[String]) -> Result<Vec<Suggestion>> {
        let url = format!("{}/suggestions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&SuggestRequest { exclude_titles })
            .send()
            .await?;

        let envelope: SuggestionsEnvelope = parse(resp).await?;
        Ok(envelope.suggestions)
    }

    pub async fn score(
        &self,
        topic_id: Uuid,
        candidates: &[CandidateItem],
    ) -> Result<Vec<CandidateScore>> {
        let url = format!("{}/topics/{}/score", self.base_url, topic_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&ScoreRequest { candidates })
            .send()
            .await?;

        let envelope: ScoresEnvelope = parse(resp).await?;
        Ok(envelope.scores)
    }

    /// Ask the analysis service to re-analyze a topic after new items landed.
    pub async fn reanalyze(&self, topic_id: Uuid) -> Result<()> {
        let url = format!("{}/topics/{}/analyze", self.base_url, topic_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        check(resp).await?;
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check(resp).await?;
    Ok(resp.json().await?)
}
