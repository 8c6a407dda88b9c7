//! Drives the coordinator over a user's selection.
//!
//! Link attempts are issued strictly one after another. Two in-flight
//! requests for the same key would race on the store's unique constraint and
//! make its 409s ambiguous; sequential issuance also lets every candidate's
//! status settle on its own.
//!
//! ```text
//! idle → running → { linking → linked | already_linked | failed }* → refreshing → done
//! ```
//!
//! `done` is always reached. A failed refresh keeps the optimistic mirror and
//! is reported, not raised.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use topicweave_common::{CandidateItem, ItemKey, LinkedBy};

use crate::coordinator::{LinkCoordinator, LinkOutcome};
use crate::reconciler::{fold_outcome, LinkedMirror, StateReconciler};
use crate::report::BatchReport;
use crate::traits::{Enricher, TopicStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Running,
    Refreshing,
    Done { refresh_failed: bool },
}

/// Per-candidate status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Linking,
    Linked,
    AlreadyLinked,
    Failed,
}

impl From<&LinkOutcome> for CandidateStatus {
    fn from(outcome: &LinkOutcome) -> Self {
        match outcome {
            LinkOutcome::Created(_) => CandidateStatus::Linked,
            LinkOutcome::AlreadyLinkedSameTopic { .. } | LinkOutcome::AlreadyLinkedOtherTopic(_) => {
                CandidateStatus::AlreadyLinked
            }
            LinkOutcome::Failed(_) => CandidateStatus::Failed,
        }
    }
}

/// Progress events, sent as the batch advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchProgress {
    Phase { seq: u64, phase: BatchPhase },
    Candidate {
        seq: u64,
        key: ItemKey,
        status: CandidateStatus,
    },
}

/// What a batch hands back to its caller.
pub struct BatchRun {
    pub report: BatchReport,
    /// Mirror after folding outcomes and the authoritative refresh. Merge it
    /// into the caller's copy with `LinkedMirror::absorb`.
    pub mirror: LinkedMirror,
    /// Re-analysis triggered when something new was linked. Dropping the
    /// handle does not cancel it.
    pub enrichment: Option<JoinHandle<()>>,
}

pub struct BatchOrchestrator {
    coordinator: LinkCoordinator,
    reconciler: StateReconciler,
    enricher: Option<Arc<dyn Enricher>>,
    progress: Option<mpsc::UnboundedSender<BatchProgress>>,
    /// Next batch sequence number. Shared by every orchestrator built from
    /// the same `LinkerDeps`.
    next_seq: Arc<AtomicU64>,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn TopicStore>, linked_by: LinkedBy) -> Self {
        Self {
            coordinator: LinkCoordinator::new(store.clone(), linked_by),
            reconciler: StateReconciler::new(store),
            enricher: None,
            progress: None,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Draw batch sequence numbers from a shared counter.
    pub fn with_sequence(mut self, next_seq: Arc<AtomicU64>) -> Self {
        self.next_seq = next_seq;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<BatchProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn reconciler(&self) -> &StateReconciler {
        &self.reconciler
    }

    /// Allocate a sequence number newer than anything `mirror` reflects.
    fn allocate_seq(&self, mirror: &LinkedMirror) -> u64 {
        let floor = mirror.seq() + 1;
        let previous = self
            .next_seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| Some(next.max(floor) + 1))
            .unwrap_or_else(|next| next);
        previous.max(floor)
    }

    fn emit(&self, event: BatchProgress) {
        if let Some(tx) = &self.progress {
            // A closed receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    /// Link every selected candidate to `topic_id`, then refresh the mirror
    /// from the store.
    pub async fn run(
        &self,
        selection: &[CandidateItem],
        topic_id: Uuid,
        mirror: LinkedMirror,
    ) -> BatchRun {
        let mut mirror = if mirror.topic_id() == topic_id {
            mirror
        } else {
            warn!(
                topic_id = %topic_id,
                mirror_topic = %mirror.topic_id(),
                "Mirror belongs to another topic, starting empty"
            );
            LinkedMirror::new(topic_id)
        };

        let seq = self.allocate_seq(&mirror);
        let mut report = BatchReport::new(seq, topic_id);
        self.emit(BatchProgress::Phase {
            seq,
            phase: BatchPhase::Idle,
        });

        info!(seq, topic_id = %topic_id, selected = selection.len(), "Link batch started");
        self.emit(BatchProgress::Phase {
            seq,
            phase: BatchPhase::Running,
        });

        // Rows the store added under this topic, forced retries included.
        let mut new_rows = 0u32;
        for candidate in selection {
            let key = candidate.key();
            self.emit(BatchProgress::Candidate {
                seq,
                key: key.clone(),
                status: CandidateStatus::Linking,
            });

            let outcome = self.coordinator.link(candidate, topic_id, false, &mirror).await;

            self.emit(BatchProgress::Candidate {
                seq,
                key: key.clone(),
                status: CandidateStatus::from(&outcome),
            });
            if matches!(
                outcome,
                LinkOutcome::Created(_) | LinkOutcome::AlreadyLinkedOtherTopic(_)
            ) {
                new_rows += 1;
            }
            report.record(key, &outcome);
            mirror = fold_outcome(mirror, &outcome);
        }

        self.emit(BatchProgress::Phase {
            seq,
            phase: BatchPhase::Refreshing,
        });
        let (mirror, refresh) = self.reconciler.refresh(mirror, seq).await;
        let refresh_failed = refresh.is_failed();
        report.refresh = refresh;

        let enrichment = match &self.enricher {
            Some(enricher) if new_rows > 0 => {
                let enricher = enricher.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = enricher.reanalyze(topic_id).await {
                        warn!(topic_id = %topic_id, error = %e, "Topic re-analysis failed");
                    }
                }))
            }
            _ => None,
        };

        info!(
            seq,
            topic_id = %topic_id,
            linked = report.linked,
            already_linked = report.already_linked,
            failed = report.failed,
            schema_error = report.schema_error,
            refresh_failed,
            "Link batch done"
        );
        self.emit(BatchProgress::Phase {
            seq,
            phase: BatchPhase::Done { refresh_failed },
        });

        BatchRun {
            report,
            mirror,
            enrichment,
        }
    }
}
