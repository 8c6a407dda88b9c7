//! Local mirror of a topic's linked items and the ways it is allowed to change.
//!
//! The mirror is written only by three things: entries folded in from link
//! outcomes, an authoritative refresh from the topic store, and an explicit
//! unlink. Between refreshes it may run ahead of the store; after a refresh it
//! is set-equal to it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use topicweave_common::{ItemKey, LinkedItem, TopicWeaveError};

use crate::coordinator::LinkOutcome;
use crate::traits::TopicStore;

/// Linked items of one topic, most recent first.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedMirror {
    topic_id: Uuid,
    items: Vec<LinkedItem>,
    /// Sequence number of the batch whose refresh produced the current state.
    /// Zero until the first sequenced refresh.
    refreshed_seq: u64,
    /// Latest batch that wrote this mirror, whether or not its refresh
    /// succeeded.
    batch_seq: u64,
}

impl LinkedMirror {
    pub fn new(topic_id: Uuid) -> Self {
        Self {
            topic_id,
            items: Vec::new(),
            refreshed_seq: 0,
            batch_seq: 0,
        }
    }

    /// Seed from a store listing taken outside any batch.
    pub fn from_items(topic_id: Uuid, items: Vec<LinkedItem>) -> Self {
        let mut mirror = Self::new(topic_id);
        mirror.replace_items(items);
        mirror
    }

    pub fn topic_id(&self) -> Uuid {
        self.topic_id
    }

    pub fn items(&self) -> &[LinkedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn refreshed_seq(&self) -> u64 {
        self.refreshed_seq
    }

    pub fn batch_seq(&self) -> u64 {
        self.batch_seq
    }

    /// Newest batch reflected in this mirror, refreshed or not.
    pub fn seq(&self) -> u64 {
        self.refreshed_seq.max(self.batch_seq)
    }

    /// Record that batch `seq` wrote this mirror.
    pub fn mark_batch(&mut self, seq: u64) {
        self.batch_seq = self.batch_seq.max(seq);
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.items
            .iter()
            .any(|i| i.source == key.source && i.external_id == key.external_id)
    }

    pub fn get(&self, key: &ItemKey) -> Option<&LinkedItem> {
        self.items
            .iter()
            .find(|i| i.source == key.source && i.external_id == key.external_id)
    }

    pub fn keys(&self) -> HashSet<ItemKey> {
        self.items.iter().map(LinkedItem::key).collect()
    }

    /// Put an item at the front, replacing any entry with the same key.
    /// Items belonging to another topic are ignored.
    fn upsert_front(&mut self, item: LinkedItem) {
        if item.topic_id != self.topic_id {
            return;
        }
        let key = item.key();
        self.items.retain(|i| i.key() != key);
        self.items.insert(0, item);
    }

    fn replace_items(&mut self, mut items: Vec<LinkedItem>) {
        items.retain(|i| i.topic_id == self.topic_id);
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.items = items;
    }

    /// Apply an authoritative listing. Refreshes from a batch older than the
    /// newest one reflected in this mirror are discarded.
    pub fn apply_refresh(&mut self, seq: u64, items: Vec<LinkedItem>) -> RefreshStatus {
        if seq < self.seq() {
            warn!(
                topic_id = %self.topic_id,
                seq,
                current = self.seq(),
                "Discarding stale refresh"
            );
            return RefreshStatus::Stale;
        }
        self.replace_items(items);
        self.refreshed_seq = seq;
        RefreshStatus::Refreshed {
            count: self.items.len(),
        }
    }

    /// Adopt the mirror a batch handed back, unless a newer batch already
    /// wrote this one. Returns whether it was adopted.
    pub fn absorb(&mut self, incoming: LinkedMirror) -> bool {
        if incoming.topic_id != self.topic_id || incoming.seq() < self.seq() {
            warn!(
                topic_id = %self.topic_id,
                incoming_seq = incoming.seq(),
                current = self.seq(),
                "Ignoring superseded batch result"
            );
            return false;
        }
        *self = incoming;
        true
    }
}

/// How the post-batch refresh went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Refreshed { count: usize },
    /// The store could not be listed; the optimistic local state was kept.
    Failed { error: String },
    /// A newer batch had already refreshed the mirror.
    Stale,
}

impl RefreshStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, RefreshStatus::Failed { .. })
    }
}

/// Fold one link outcome into the mirror.
pub fn fold_outcome(mut mirror: LinkedMirror, outcome: &LinkOutcome) -> LinkedMirror {
    match outcome {
        LinkOutcome::Created(item) | LinkOutcome::AlreadyLinkedOtherTopic(item) => {
            mirror.upsert_front(item.clone());
        }
        LinkOutcome::AlreadyLinkedSameTopic {
            synthesized: Some(item),
        } => {
            if !mirror.contains(&item.key()) {
                mirror.upsert_front(item.clone());
            }
        }
        LinkOutcome::AlreadyLinkedSameTopic { synthesized: None } | LinkOutcome::Failed(_) => {}
    }
    mirror
}

/// Talks to the topic store on behalf of the mirror.
pub struct StateReconciler {
    store: Arc<dyn TopicStore>,
}

impl StateReconciler {
    pub fn new(store: Arc<dyn TopicStore>) -> Self {
        Self { store }
    }

    /// Replace the mirror with the store's listing on behalf of batch `seq`.
    /// On failure the mirror keeps its entries but is still marked with `seq`.
    pub async fn refresh(&self, mut mirror: LinkedMirror, seq: u64) -> (LinkedMirror, RefreshStatus) {
        mirror.mark_batch(seq);
        match self.store.list_links(mirror.topic_id).await {
            Ok(items) => {
                let status = mirror.apply_refresh(seq, items);
                if let RefreshStatus::Refreshed { count } = status {
                    info!(topic_id = %mirror.topic_id, seq, count, "Mirror refreshed");
                }
                (mirror, status)
            }
            Err(e) => {
                warn!(topic_id = %mirror.topic_id, seq, error = %e, "Refresh failed, keeping local state");
                (
                    mirror,
                    RefreshStatus::Failed {
                        error: e.to_string(),
                    },
                )
            }
        }
    }

    /// Delete a link in the store, then drop it from the mirror.
    pub async fn unlink(
        &self,
        mirror: &mut LinkedMirror,
        item_id: Uuid,
    ) -> Result<LinkedItem, TopicWeaveError> {
        let position = mirror
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| TopicWeaveError::Validation(format!("item {item_id} is not linked")))?;

        if mirror.items[position].synthesized {
            return Err(TopicWeaveError::Validation(format!(
                "item {item_id} has no store id yet; refresh before unlinking"
            )));
        }

        self.store
            .unlink(mirror.topic_id, item_id)
            .await
            .map_err(|e| TopicWeaveError::Store(e.to_string()))?;

        let removed = mirror.items.remove(position);
        info!(topic_id = %mirror.topic_id, key = %removed.key(), "Unlinked item");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::testing::*;
    use topicweave_common::{LinkedBy, Source};

    fn item(topic_id: Uuid, external_id: &str, age_minutes: i64) -> LinkedItem {
        let mut item = LinkedItem::synthesize(
            &candidate(Source::Mail, external_id, external_id),
            topic_id,
            LinkedBy::User,
        );
        item.synthesized = false;
        item.created_at = Utc::now() - Duration::minutes(age_minutes);
        item
    }

    #[test]
    fn refresh_orders_most_recent_first_and_drops_foreign_topics() {
        let topic = Uuid::new_v4();
        let mut mirror = LinkedMirror::new(topic);
        let status = mirror.apply_refresh(
            1,
            vec![
                item(topic, "old", 30),
                item(Uuid::new_v4(), "elsewhere", 1),
                item(topic, "new", 5),
            ],
        );

        assert_eq!(status, RefreshStatus::Refreshed { count: 2 });
        let ids: Vec<_> = mirror.items().iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn stale_refresh_is_discarded() {
        let topic = Uuid::new_v4();
        let mut mirror = LinkedMirror::new(topic);
        mirror.apply_refresh(5, vec![item(topic, "a", 1), item(topic, "b", 2)]);

        let status = mirror.apply_refresh(4, vec![item(topic, "a", 1)]);
        assert_eq!(status, RefreshStatus::Stale);
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror.refreshed_seq(), 5);
    }

    #[test]
    fn absorb_rejects_older_batch_result() {
        let topic = Uuid::new_v4();
        let mut canonical = LinkedMirror::new(topic);

        let mut older = canonical.clone();
        older.apply_refresh(1, vec![item(topic, "a", 1)]);
        let mut newer = canonical.clone();
        newer.apply_refresh(2, vec![item(topic, "a", 1), item(topic, "b", 2)]);

        assert!(canonical.absorb(newer));
        assert!(!canonical.absorb(older));
        assert_eq!(canonical.len(), 2);
    }

    #[test]
    fn fold_created_puts_item_first() {
        let topic = Uuid::new_v4();
        let mirror = LinkedMirror::from_items(topic, vec![item(topic, "a", 10)]);
        let mirror = fold_outcome(mirror, &LinkOutcome::Created(item(topic, "b", 0)));
        assert_eq!(mirror.items()[0].external_id, "b");
        assert_eq!(mirror.len(), 2);
    }

    #[test]
    fn fold_synthesized_only_when_missing() {
        let topic = Uuid::new_v4();
        let existing = item(topic, "a", 10);
        let existing_id = existing.id;
        let mirror = LinkedMirror::from_items(topic, vec![existing]);

        let mut synthesized = item(topic, "a", 0);
        synthesized.synthesized = true;
        let mirror = fold_outcome(
            mirror,
            &LinkOutcome::AlreadyLinkedSameTopic {
                synthesized: Some(synthesized),
            },
        );
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.items()[0].id, existing_id);
    }

    #[test]
    fn fold_ignores_failures() {
        let topic = Uuid::new_v4();
        let mirror = fold_outcome(
            LinkedMirror::new(topic),
            &LinkOutcome::Failed(crate::coordinator::LinkFailure::ForcedConflict),
        );
        assert!(mirror.is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_keeps_local_state() {
        let store = Arc::new(MockTopicStore::new());
        store.fail_listing(true);
        let topic = Uuid::new_v4();
        let mirror = LinkedMirror::from_items(topic, vec![item(topic, "a", 1)]);

        let reconciler = StateReconciler::new(store);
        let (mirror, status) = reconciler.refresh(mirror, 1).await;

        assert!(status.is_failed());
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.refreshed_seq(), 0);
        assert_eq!(mirror.batch_seq(), 1);
    }

    #[tokio::test]
    async fn absorb_keeps_newer_batch_whose_refresh_failed() {
        let store = Arc::new(MockTopicStore::new());
        let topic = Uuid::new_v4();
        let mut canonical = LinkedMirror::new(topic);
        let reconciler = StateReconciler::new(store.clone());

        let (older, _) = reconciler.refresh(canonical.clone(), 1).await;
        store.fail_listing(true);
        let newer = fold_outcome(canonical.clone(), &LinkOutcome::Created(item(topic, "m-2", 0)));
        let (newer, status) = reconciler.refresh(newer, 2).await;
        assert!(status.is_failed());

        assert!(canonical.absorb(newer));
        assert!(!canonical.absorb(older));
        assert!(canonical.contains(&ItemKey::new(Source::Mail, "m-2")));
    }

    #[test]
    fn refresh_older_than_last_batch_is_discarded() {
        let topic = Uuid::new_v4();
        let mut mirror = LinkedMirror::new(topic);
        mirror.mark_batch(3);

        let status = mirror.apply_refresh(2, vec![item(topic, "a", 1)]);
        assert_eq!(status, RefreshStatus::Stale);
        assert!(mirror.is_empty());
        assert_eq!(mirror.seq(), 3);
    }

    #[tokio::test]
    async fn unlink_removes_from_store_and_mirror() {
        let store = Arc::new(MockTopicStore::new());
        let topic = Uuid::new_v4();
        let linked = store.seed(topic, &candidate(Source::Files, "f-1", "Spec"));
        let mut mirror = LinkedMirror::from_items(topic, vec![linked.clone()]);

        let reconciler = StateReconciler::new(store.clone());
        let removed = reconciler.unlink(&mut mirror, linked.id).await.unwrap();

        assert_eq!(removed.id, linked.id);
        assert!(mirror.is_empty());
        assert_eq!(store.links_for(topic).len(), 0);
    }

    #[tokio::test]
    async fn unlink_rejects_synthesized_entries() {
        let store = Arc::new(MockTopicStore::new());
        let topic = Uuid::new_v4();
        let synthesized =
            LinkedItem::synthesize(&candidate(Source::Chat, "c-1", "Thread"), topic, LinkedBy::User);
        let id = synthesized.id;
        let mut mirror = LinkedMirror::from_items(topic, vec![synthesized]);

        let err = StateReconciler::new(store)
            .unlink(&mut mirror, id)
            .await
            .unwrap_err();
        assert!(matches!(err, TopicWeaveError::Validation(_)));
        assert_eq!(mirror.len(), 1);
    }
}
