//! Approval state machine and trust promotion across threads.

use std::sync::Arc;

use arbor_core::{AuthorId, ChangeKind, NodeId, TreeId};
use arbor_events::InvalidationBus;
use arbor_storage::InMemoryTreeStore;
use arbor_test_utils::{init_tracing, CountFailingTreeStore, FailingTrustStore, RecordingHandler};
use arbor_threads::{
    AuthorTrustStore, CommentState, InMemoryTrustStore, NewComment, PromotionOutcome,
    PromotionPolicy, ThreadedApprovalStore,
};
use proptest::prelude::*;

fn setup(threshold: u32) -> (ThreadedApprovalStore, Arc<InMemoryTrustStore>) {
    init_tracing();
    let trust = Arc::new(InMemoryTrustStore::new());
    let threads = ThreadedApprovalStore::new(
        Arc::new(InMemoryTreeStore::new()),
        trust.clone(),
        PromotionPolicy::new(threshold),
    );
    (threads, trust)
}

fn submit_many(threads: &ThreadedApprovalStore, author: AuthorId, n: usize) -> Vec<NodeId> {
    (0..n)
        .map(|i| {
            // Spread over several documents: the count spans all threads.
            let thread = TreeId::new(format!("comments:doc-{}", i % 2));
            threads
                .submit(NewComment::new(thread, Some(author)))
                .expect("submit should succeed")
                .id
        })
        .collect()
}

#[test]
fn author_becomes_trusted_on_third_approval() {
    let (threads, trust) = setup(3);
    let author = arbor_core::new_node_id();
    let comments = submit_many(&threads, author, 3);

    threads.approve(comments[0]).unwrap();
    threads.approve(comments[1]).unwrap();
    assert!(!trust.get_trust(author).unwrap());

    let third = threads.approve(comments[2]).unwrap();
    assert_eq!(third.promotion, Some(PromotionOutcome::Promoted { approved_count: 3 }));
    assert!(trust.get_trust(author).unwrap());
}

#[test]
fn threshold_is_exact() {
    for threshold in 1..=6u32 {
        let (threads, trust) = setup(threshold);
        let author = arbor_core::new_node_id();
        let comments = submit_many(&threads, author, threshold as usize + 2);

        for (i, id) in comments.iter().enumerate() {
            threads.approve(*id).unwrap();
            let approved = i as u32 + 1;
            assert_eq!(
                trust.get_trust(author).unwrap(),
                approved >= threshold,
                "threshold {threshold}, approvals {approved}"
            );
        }
    }
}

#[test]
fn reapproving_after_unapprove_does_not_double_count() {
    let (threads, trust) = setup(2);
    let author = arbor_core::new_node_id();
    let comments = submit_many(&threads, author, 2);

    threads.approve(comments[0]).unwrap();
    threads.unapprove(comments[0]).unwrap();
    let again = threads.approve(comments[0]).unwrap();

    assert!(again.transitioned);
    assert_eq!(
        again.promotion,
        Some(PromotionOutcome::BelowThreshold {
            approved_count: 1,
            threshold: 2
        })
    );
    assert!(!trust.get_trust(author).unwrap());
}

#[test]
fn concurrent_approvals_reach_threshold() {
    const THRESHOLD: u32 = 8;
    let (threads, trust) = setup(THRESHOLD);
    let author = arbor_core::new_node_id();
    let comments = submit_many(&threads, author, THRESHOLD as usize);

    let outcomes: Vec<PromotionOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = comments
            .iter()
            .map(|id| {
                let threads = &threads;
                scope.spawn(move || threads.approve(*id).expect("approve should succeed"))
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().expect("approver thread panicked").promotion)
            .collect()
    });

    // The count-then-set check is not atomic: more than one approver may
    // see the threshold and write the flag. The flag itself is idempotent.
    let promoted = outcomes.iter().filter(|o| o.promoted()).count();
    assert!(promoted >= 1);
    assert_eq!(trust.trust_writes(), promoted as u64);
    assert!(trust.get_trust(author).unwrap());
    assert!(trust.state(author).unwrap().is_trusted);
}

#[test]
fn failing_trust_store_never_blocks_approval() {
    init_tracing();
    let trust = Arc::new(FailingTrustStore::default());
    let threads = ThreadedApprovalStore::new(
        Arc::new(InMemoryTreeStore::new()),
        trust.clone(),
        PromotionPolicy::new(1),
    );
    let author = arbor_core::new_node_id();
    let id = submit_many(&threads, author, 1)[0];

    let outcome = threads.approve(id).expect("approval should succeed");

    assert!(outcome.transitioned);
    assert!(matches!(outcome.promotion, Some(PromotionOutcome::Failed { .. })));
    assert_eq!(threads.state(id).unwrap(), CommentState::Approved);
    assert_eq!(trust.writes(), 0);
}

#[test]
fn failing_count_query_never_blocks_approval() {
    init_tracing();
    let trust = Arc::new(InMemoryTrustStore::new());
    let threads = ThreadedApprovalStore::new(
        Arc::new(CountFailingTreeStore::default()),
        trust.clone(),
        PromotionPolicy::new(1),
    );
    let author = arbor_core::new_node_id();
    let id = submit_many(&threads, author, 1)[0];

    let outcome = threads.approve(id).expect("approval should succeed");

    assert!(outcome.transitioned);
    assert!(matches!(outcome.promotion, Some(PromotionOutcome::Failed { .. })));
    assert_eq!(threads.state(id).unwrap(), CommentState::Approved);
    assert!(!trust.get_trust(author).unwrap());
    assert_eq!(trust.trust_writes(), 0);
}

#[test]
fn moderation_publishes_approval_events() {
    init_tracing();
    let bus = Arc::new(InvalidationBus::new());
    let recorder = Arc::new(RecordingHandler::default());
    bus.subscribe(recorder.clone());
    let threads = ThreadedApprovalStore::new(
        Arc::new(InMemoryTreeStore::with_event_sink(bus.clone())),
        Arc::new(InMemoryTrustStore::new()),
        PromotionPolicy::new(10),
    );
    let thread = TreeId::thread_for(arbor_core::new_node_id());

    let node = threads.submit(NewComment::new(thread.clone(), None)).unwrap();
    threads.approve(node.id).unwrap();
    threads.approve(node.id).unwrap();
    threads.reject(node.id).unwrap();

    let changes: Vec<ChangeKind> = recorder.events().iter().map(|e| e.change).collect();
    assert_eq!(
        changes,
        vec![
            ChangeKind::Created,
            ChangeKind::ApprovalChanged,
            ChangeKind::ApprovalChanged,
        ]
    );
    assert!(recorder.trees().iter().all(|t| t == &thread));
}

#[test]
fn thread_order_follows_submission() {
    let (threads, _) = setup(10);
    let thread = TreeId::thread_for(arbor_core::new_node_id());
    let mut submitted = Vec::new();
    for _ in 0..5 {
        submitted.push(threads.submit(NewComment::new(thread.clone(), None)).unwrap().id);
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    // Approval order must not change rendering order.
    for id in submitted.iter().rev() {
        threads.approve(*id).unwrap();
    }

    let listed: Vec<NodeId> = threads
        .approved_in_thread(&thread)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(listed, submitted);
}

#[derive(Debug, Clone)]
enum Action {
    Approve(usize),
    Reject(usize),
    Unapprove(usize),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0usize..6).prop_map(Action::Approve),
        (0usize..6).prop_map(Action::Reject),
        (0usize..6).prop_map(Action::Unapprove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Once trusted, no sequence of moderator actions untrusts an author.
    #[test]
    fn prop_trust_is_monotone(actions in proptest::collection::vec(action(), 1..40)) {
        let (threads, trust) = setup(2);
        let author = arbor_core::new_node_id();
        let comments = submit_many(&threads, author, 6);

        let mut trusted = false;
        for action in actions {
            match action {
                Action::Approve(i) => { threads.approve(comments[i]).unwrap(); }
                Action::Reject(i) => { threads.reject(comments[i]).unwrap(); }
                Action::Unapprove(i) => { threads.unapprove(comments[i]).unwrap(); }
            }
            let now = trust.get_trust(author).unwrap();
            prop_assert!(!(trusted && !now), "trust was revoked");
            trusted = now;
        }
    }
}
