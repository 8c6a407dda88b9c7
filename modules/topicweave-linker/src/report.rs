use std::collections::BTreeSet;

use uuid::Uuid;

use topicweave_common::ItemKey;

use crate::coordinator::LinkOutcome;
use crate::reconciler::RefreshStatus;

/// Summary of one batch run, the only thing surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub seq: u64,
    pub topic_id: Uuid,
    pub linked: u32,
    pub already_linked: u32,
    pub failed: u32,
    /// Candidates that ended linked or already linked.
    pub resolved: BTreeSet<ItemKey>,
    /// At least one failure was a store constraint/schema rejection.
    pub schema_error: bool,
    pub refresh: RefreshStatus,
}

impl BatchReport {
    pub fn new(seq: u64, topic_id: Uuid) -> Self {
        Self {
            seq,
            topic_id,
            linked: 0,
            already_linked: 0,
            failed: 0,
            resolved: BTreeSet::new(),
            schema_error: false,
            refresh: RefreshStatus::Stale,
        }
    }

    pub fn record(&mut self, key: ItemKey, outcome: &LinkOutcome) {
        match outcome {
            LinkOutcome::Created(_) => self.linked += 1,
            LinkOutcome::AlreadyLinkedSameTopic { .. } | LinkOutcome::AlreadyLinkedOtherTopic(_) => {
                self.already_linked += 1
            }
            LinkOutcome::Failed(failure) => {
                self.failed += 1;
                self.schema_error |= failure.is_schema();
                return;
            }
        }
        self.resolved.insert(key);
    }

    pub fn total(&self) -> u32 {
        self.linked + self.already_linked + self.failed
    }

    /// One-line message for the user.
    pub fn summary(&self) -> String {
        if self.total() == 0 {
            return "Nothing to link".to_string();
        }
        let mut parts = Vec::new();
        if self.linked > 0 {
            parts.push(format!("Linked {}", self.linked));
        }
        if self.already_linked > 0 {
            parts.push(format!("{} already linked", self.already_linked));
        }
        if self.failed > 0 {
            if self.schema_error {
                parts.push(format!(
                    "{} failed: the store rejected the item data, retrying will not help",
                    self.failed
                ));
            } else {
                parts.push(format!("{} failed, try again", self.failed));
            }
        }
        parts.join(", ")
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Link Batch {} Complete ===", self.seq)?;
        writeln!(f, "Topic:          {}", self.topic_id)?;
        writeln!(f, "Linked:         {}", self.linked)?;
        writeln!(f, "Already linked: {}", self.already_linked)?;
        writeln!(f, "Failed:         {}", self.failed)?;
        if self.schema_error {
            writeln!(f, "Schema errors:  yes")?;
        }
        match &self.refresh {
            RefreshStatus::Refreshed { count } => writeln!(f, "Refresh:        {count} items")?,
            RefreshStatus::Failed { error } => writeln!(f, "Refresh:        failed ({error})")?,
            RefreshStatus::Stale => writeln!(f, "Refresh:        superseded")?,
        }
        write!(f, "{}", self.summary())
    }
}
