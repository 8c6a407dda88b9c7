//! End-to-end linking scenarios against the in-memory topic store.
//!
//! search → select → batch link → refresh, with the store enforcing its
//! unique key and reporting conflicts the way the real one does.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use topicweave_common::{CandidateItem, ItemKey, LinkedBy, SearchRequest, Source};
use topicweave_linker::testing::*;
use topicweave_linker::traits::{SourceProvider, TopicStore};
use topicweave_linker::{BatchOrchestrator, CandidateAggregator, LinkedMirror, RefreshStatus};

fn five_candidates() -> Vec<CandidateItem> {
    vec![
        candidate(Source::Mail, "m-1", "Kickoff invite"),
        candidate(Source::Calendar, "ev-1", "Kickoff meeting"),
        candidate(Source::Files, "f-1", "Project charter"),
        candidate(Source::Chat, "c-1", "Kickoff thread"),
        candidate(Source::Notes, "n-1", "Kickoff notes"),
    ]
}

fn key_set(items: &[topicweave_common::LinkedItem]) -> HashSet<ItemKey> {
    items.iter().map(|i| i.key()).collect()
}

#[tokio::test]
async fn linking_twice_creates_one_item() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let orchestrator = BatchOrchestrator::new(store.clone(), LinkedBy::User);
    let selection = vec![candidate(Source::Mail, "m-1", "Kickoff invite")];

    let first = orchestrator.run(&selection, topic, LinkedMirror::new(topic)).await;
    assert_eq!(first.report.linked, 1);

    // Second attempt with a mirror that never saw the first one.
    let second = orchestrator.run(&selection, topic, LinkedMirror::new(topic)).await;
    assert_eq!(second.report.linked, 0);
    assert_eq!(second.report.already_linked, 1);

    assert_eq!(store.links_for(topic).len(), 1);
    assert_eq!(second.mirror.len(), 1);
    assert!(!second.mirror.items()[0].synthesized, "refresh replaced the synthesized entry");
}

#[tokio::test]
async fn one_transient_failure_does_not_stop_the_batch() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let selection = five_candidates();
    store.script(selection[1].key(), ScriptedResponse::TransportError);

    let run = BatchOrchestrator::new(store.clone(), LinkedBy::User)
        .run(&selection, topic, LinkedMirror::new(topic))
        .await;

    assert_eq!(run.report.linked + run.report.already_linked, 4);
    assert_eq!(run.report.failed, 1);
    assert!(!run.report.schema_error);
    assert!(!run.report.resolved.contains(&selection[1].key()));
    assert_eq!(store.requests().len(), 5, "every candidate was attempted");
}

#[tokio::test]
async fn constraint_failure_is_reported_separately() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let selection = five_candidates();
    store.script(selection[4].key(), ScriptedResponse::ConstraintError);

    let run = BatchOrchestrator::new(store, LinkedBy::User)
        .run(&selection, topic, LinkedMirror::new(topic))
        .await;

    assert_eq!(run.report.failed, 1);
    assert!(run.report.schema_error);
    assert!(run.report.summary().contains("retrying will not help"));
}

#[tokio::test]
async fn same_item_links_under_two_topics() {
    let store = Arc::new(MockTopicStore::new());
    let (topic_a, topic_b) = (Uuid::new_v4(), Uuid::new_v4());
    let orchestrator = BatchOrchestrator::new(store.clone(), LinkedBy::User);
    let selection = vec![candidate(Source::Files, "f-1", "Project charter")];

    let a = orchestrator.run(&selection, topic_a, LinkedMirror::new(topic_a)).await;
    let b = orchestrator.run(&selection, topic_b, LinkedMirror::new(topic_b)).await;

    assert_eq!(a.report.linked, 1);
    assert_eq!(b.report.already_linked, 1);

    let in_a = store.links_for(topic_a);
    let in_b = store.links_for(topic_b);
    assert_eq!((in_a.len(), in_b.len()), (1, 1));
    assert_ne!(in_a[0].id, in_b[0].id);
    assert_eq!(in_a[0].key(), in_b[0].key());
}

#[tokio::test]
async fn refresh_converges_with_store() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();

    // The mirror still holds an item removed elsewhere and misses one
    // linked elsewhere.
    let gone = store.seed(topic, &candidate(Source::Notes, "n-old", "Old notes"));
    let present = store.seed(topic, &candidate(Source::Mail, "m-kept", "Kept mail"));
    store.unlink(topic, gone.id).await.expect("unlink seeded item");
    let mirror = LinkedMirror::from_items(topic, vec![gone]);

    let run = BatchOrchestrator::new(store.clone(), LinkedBy::User)
        .run(&five_candidates(), topic, mirror)
        .await;

    assert!(matches!(run.report.refresh, RefreshStatus::Refreshed { .. }));
    assert_eq!(key_set(run.mirror.items()), key_set(&store.links_for(topic)));
    assert!(run.mirror.contains(&present.key()));
    assert!(!run.mirror.contains(&ItemKey::new(Source::Notes, "n-old")));
}

#[tokio::test]
async fn candidate_linked_elsewhere_end_to_end() {
    let store = Arc::new(MockTopicStore::new());
    let (other_topic, topic) = (Uuid::new_v4(), Uuid::new_v4());
    let selection = five_candidates();
    store.seed(other_topic, &selection[2]);

    let run = BatchOrchestrator::new(store.clone(), LinkedBy::User)
        .run(&selection, topic, LinkedMirror::new(topic))
        .await;

    assert_eq!(
        (run.report.linked, run.report.already_linked, run.report.failed),
        (4, 1, 0)
    );
    assert_eq!(run.report.resolved.len(), 5);
    assert_eq!(store.links_for(topic).len(), 5);
    assert_eq!(store.links_for(other_topic).len(), 1);
    assert_eq!(store.distinct_keys().len(), 5);
    assert_eq!(run.mirror.len(), 5);
}

#[tokio::test]
async fn older_batch_result_does_not_overwrite_newer() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let orchestrator = BatchOrchestrator::new(store.clone(), LinkedBy::User);
    let mut canonical = LinkedMirror::new(topic);

    let older = orchestrator
        .run(&five_candidates()[..2], topic, canonical.clone())
        .await;
    let newer = orchestrator
        .run(&five_candidates()[2..], topic, canonical.clone())
        .await;
    assert!(newer.report.seq > older.report.seq);

    // Results arrive out of order.
    assert!(canonical.absorb(newer.mirror));
    assert!(!canonical.absorb(older.mirror));
    assert_eq!(canonical.len(), 5);
    assert_eq!(key_set(canonical.items()), key_set(&store.links_for(topic)));
}

#[tokio::test]
async fn search_then_link_skips_already_linked() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let existing = candidate(Source::Mail, "m-1", "Kickoff invite");
    let mirror = LinkedMirror::from_items(topic, vec![store.seed(topic, &existing)]);

    let mail = Arc::new(MockSourceProvider::new(Source::Mail).with_items(vec![
        existing.clone(),
        candidate(Source::Mail, "m-2", "Kickoff follow-up"),
    ]));
    let chat = Arc::new(MockSourceProvider::new(Source::Chat).failing("workspace disconnected"));
    let aggregation = CandidateAggregator::new(vec![
        mail as Arc<dyn SourceProvider>,
        chat as Arc<dyn SourceProvider>,
    ])
        .search(
            &SearchRequest {
                query: "kickoff".to_string(),
                sources: vec![Source::Mail, Source::Chat],
                ..Default::default()
            },
            &mirror,
        )
        .await;
    assert_eq!(aggregation.warnings.len(), 1);

    let selection: Vec<_> = aggregation.linkable().cloned().collect();
    assert_eq!(selection.len(), 1);

    let run = BatchOrchestrator::new(store.clone(), LinkedBy::User)
        .run(&selection, topic, mirror)
        .await;
    assert_eq!(run.report.linked, 1);
    assert_eq!(run.mirror.len(), 2);
    assert_eq!(run.mirror.items()[0].external_id, "m-2", "most recent first");
}

#[tokio::test]
async fn newer_batch_with_failed_refresh_is_not_overwritten() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let orchestrator = BatchOrchestrator::new(store.clone(), LinkedBy::User);
    let mut canonical = LinkedMirror::new(topic);

    let older = orchestrator
        .run(&[candidate(Source::Mail, "m-1", "Kickoff invite")], topic, canonical.clone())
        .await;
    store.fail_listing(true);
    let newer = orchestrator
        .run(&[candidate(Source::Mail, "m-2", "Kickoff follow-up")], topic, canonical.clone())
        .await;
    assert!(newer.report.refresh.is_failed());

    assert!(canonical.absorb(newer.mirror));
    assert!(!canonical.absorb(older.mirror));
    assert!(canonical.contains(&ItemKey::new(Source::Mail, "m-2")));
}

#[tokio::test]
async fn fresh_orchestrator_still_converges_on_an_old_mirror() {
    let store = Arc::new(MockTopicStore::new());
    let topic = Uuid::new_v4();
    let first = BatchOrchestrator::new(store.clone(), LinkedBy::User);
    let mut mirror = LinkedMirror::new(topic);
    for picked in five_candidates().chunks(2) {
        mirror = first.run(picked, topic, mirror).await.mirror;
    }
    let removed = store.links_for(topic)[0].id;
    store.unlink(topic, removed).await.expect("unlink stored item");

    let run = BatchOrchestrator::new(store.clone(), LinkedBy::User)
        .run(&[candidate(Source::Files, "f-9", "Budget sheet")], topic, mirror)
        .await;

    assert!(matches!(run.report.refresh, RefreshStatus::Refreshed { .. }));
    assert_eq!(key_set(run.mirror.items()), key_set(&store.links_for(topic)));
}
