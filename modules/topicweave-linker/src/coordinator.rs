//! One idempotent link attempt per candidate.
//!
//! The store enforces a unique (topic, source, external_id) key and answers
//! duplicates with a 409 instead of a second row. The coordinator turns those
//! answers into outcomes:
//!
//! ```text
//! initial ── created ─────────────────────────────► Created
//!    │ ──── 409 same topic ───────────────────────► AlreadyLinkedSameTopic
//!    │ ──── 409 other topic ─► force_retry ─ created ► AlreadyLinkedOtherTopic
//!    │                              └──── 409 ────► Failed(ForcedConflict)
//!    └──── rejected / transport error ────────────► Failed
//! ```
//!
//! At most one forced retry is issued per call. The coordinator never writes
//! the mirror; it only reads it to decide whether a same-topic conflict needs
//! a synthesized entry.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use topicweave_common::{CandidateItem, CreateLinkRequest, LinkResponse, LinkedBy, LinkedItem};

use crate::reconciler::LinkedMirror;
use crate::traits::TopicStore;

/// Result of linking one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// The store created a new association.
    Created(LinkedItem),
    /// Already linked to this topic. Carries a locally built item when the
    /// mirror did not know about the link yet.
    AlreadyLinkedSameTopic { synthesized: Option<LinkedItem> },
    /// Linked elsewhere; the forced retry added it under this topic too.
    AlreadyLinkedOtherTopic(LinkedItem),
    Failed(LinkFailure),
}

impl LinkOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, LinkOutcome::Failed(_))
    }

    pub fn is_already_linked(&self) -> bool {
        matches!(
            self,
            LinkOutcome::AlreadyLinkedSameTopic { .. } | LinkOutcome::AlreadyLinkedOtherTopic(_)
        )
    }

    pub fn linked_item(&self) -> Option<&LinkedItem> {
        match self {
            LinkOutcome::Created(item) | LinkOutcome::AlreadyLinkedOtherTopic(item) => Some(item),
            LinkOutcome::AlreadyLinkedSameTopic { synthesized } => synthesized.as_ref(),
            LinkOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkFailure {
    /// The store rejected the row for a constraint or schema reason. Retrying
    /// will not help; the user needs a different message than for outages.
    Schema { status: u16, message: String },
    /// Network error or an ordinary server failure.
    Transient { message: String },
    /// The forced request conflicted as well.
    ForcedConflict,
}

impl LinkFailure {
    pub fn is_schema(&self) -> bool {
        matches!(self, LinkFailure::Schema { .. })
    }
}

impl std::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkFailure::Schema { status, message } => {
                write!(f, "rejected by store constraint (status {status}): {message}")
            }
            LinkFailure::Transient { message } => write!(f, "link request failed: {message}"),
            LinkFailure::ForcedConflict => write!(f, "forced link conflicted again"),
        }
    }
}

/// Where an attempt stands when the store's answer arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// First request, not forced.
    Initial,
    /// First request, forced by the caller.
    Forced,
    /// Second request, forced after a conflict under another topic.
    ForceRetry,
}

impl AttemptPhase {
    fn is_forced(self) -> bool {
        !matches!(self, AttemptPhase::Initial)
    }
}

/// What to do after one store answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Resolved(LinkOutcome),
    /// Linked under another topic; issue the forced retry.
    ConflictDetected,
}

pub struct LinkCoordinator {
    store: Arc<dyn TopicStore>,
    linked_by: LinkedBy,
}

impl LinkCoordinator {
    pub fn new(store: Arc<dyn TopicStore>, linked_by: LinkedBy) -> Self {
        Self { store, linked_by }
    }

    /// Link `candidate` to `topic_id`. Never panics or errors: every store
    /// answer maps to an outcome.
    pub async fn link(
        &self,
        candidate: &CandidateItem,
        topic_id: Uuid,
        force: bool,
        mirror: &LinkedMirror,
    ) -> LinkOutcome {
        let phase = if force {
            AttemptPhase::Forced
        } else {
            AttemptPhase::Initial
        };

        let answer = self.attempt(candidate, topic_id, phase).await;
        match self.resolve(phase, answer, candidate, topic_id, mirror) {
            Transition::Resolved(outcome) => outcome,
            Transition::ConflictDetected => {
                info!(
                    topic_id = %topic_id,
                    key = %candidate.key(),
                    "Linked under another topic, retrying with force"
                );
                let answer = self.attempt(candidate, topic_id, AttemptPhase::ForceRetry).await;
                match self.resolve(AttemptPhase::ForceRetry, answer, candidate, topic_id, mirror) {
                    Transition::Resolved(outcome) => outcome,
                    // resolve() never asks for another retry out of ForceRetry.
                    Transition::ConflictDetected => LinkOutcome::Failed(LinkFailure::ForcedConflict),
                }
            }
        }
    }

    async fn attempt(
        &self,
        candidate: &CandidateItem,
        topic_id: Uuid,
        phase: AttemptPhase,
    ) -> Result<LinkResponse> {
        let request =
            CreateLinkRequest::from_candidate(candidate, topic_id, self.linked_by, phase.is_forced());
        self.store.create_link(&request).await
    }

    /// Map one store answer to the next transition.
    pub fn resolve(
        &self,
        phase: AttemptPhase,
        answer: Result<LinkResponse>,
        candidate: &CandidateItem,
        topic_id: Uuid,
        mirror: &LinkedMirror,
    ) -> Transition {
        let response = match answer {
            Ok(response) => response,
            Err(e) => {
                warn!(topic_id = %topic_id, key = %candidate.key(), error = %e, "Link request failed");
                return Transition::Resolved(LinkOutcome::Failed(LinkFailure::Transient {
                    message: e.to_string(),
                }));
            }
        };

        let outcome = match (phase, response) {
            (AttemptPhase::ForceRetry, LinkResponse::Created(item)) => {
                LinkOutcome::AlreadyLinkedOtherTopic(item)
            }
            (_, LinkResponse::Created(item)) => LinkOutcome::Created(item),

            (AttemptPhase::ForceRetry, LinkResponse::Conflict { same_topic }) => {
                warn!(
                    topic_id = %topic_id,
                    key = %candidate.key(),
                    same_topic,
                    "Forced retry conflicted, giving up"
                );
                LinkOutcome::Failed(LinkFailure::ForcedConflict)
            }
            (_, LinkResponse::Conflict { same_topic: true }) => {
                let known = mirror.topic_id() == topic_id && mirror.contains(&candidate.key());
                let synthesized =
                    (!known).then(|| LinkedItem::synthesize(candidate, topic_id, self.linked_by));
                LinkOutcome::AlreadyLinkedSameTopic { synthesized }
            }
            (AttemptPhase::Initial, LinkResponse::Conflict { same_topic: false }) => {
                return Transition::ConflictDetected;
            }
            (AttemptPhase::Forced, LinkResponse::Conflict { same_topic: false }) => {
                LinkOutcome::Failed(LinkFailure::ForcedConflict)
            }

            (
                _,
                LinkResponse::Rejected {
                    status,
                    error,
                    constraint_error: true,
                },
            ) => {
                warn!(topic_id = %topic_id, key = %candidate.key(), status, error = error.as_str(), "Link rejected by store constraint");
                LinkOutcome::Failed(LinkFailure::Schema {
                    status,
                    message: error,
                })
            }
            (_, LinkResponse::Rejected { status, error, .. }) => {
                warn!(topic_id = %topic_id, key = %candidate.key(), status, error = error.as_str(), "Link rejected");
                LinkOutcome::Failed(LinkFailure::Transient {
                    message: format!("status {status}: {error}"),
                })
            }
        };
        Transition::Resolved(outcome)
    }
}
