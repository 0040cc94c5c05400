//! End-to-end tests for the threaded discussion engine.
//!
//! These tests verify complete workflows from discussion creation through
//! replies, voting, replication, broadcasting, and removal, ensuring all
//! components work together over the store implementations.

use colloquy::directory::StaticDirectory;
use colloquy::discussions::model::TopicDraft;
use colloquy::discussions::path;
use colloquy::discussions::{
    ActingUser, BroadcastCoordinator, CascadeRemover, DiscussionKind, DiscussionPatch,
    DiscussionService, EventTopic, HostId, ImprintReplicator, MemorySink, MessageDraft,
    MessageFilterBy, UserId, UserRole, VoteFilter, VoteLedger,
};
use colloquy::error::ColloquyError;
use colloquy::store::memory::{MemoryDiscussionStore, MemoryMessageStore};
use colloquy::store::rocks::RocksStorage;
use colloquy::store::{
    DiscussionStore, MessageOrderKey, MessageSort, MessageStore, Page, SortDirection,
};
use std::sync::Arc;

/// Everything a test needs, wired over in-memory stores.
struct Harness {
    discussions: Arc<MemoryDiscussionStore>,
    messages: Arc<MemoryMessageStore>,
    service: DiscussionService,
    replicator: ImprintReplicator,
    coordinator: BroadcastCoordinator,
    ledger: VoteLedger,
    remover: CascadeRemover,
    g1: HostId,
    g2: HostId,
    g3: HostId,
}

/// Enables log output for `RUST_LOG=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// tutor-a tutors g1 and g2; tutor-b tutors g3.
fn harness() -> Harness {
    init_tracing();
    let g1 = HostId::generate();
    let g2 = HostId::generate();
    let g3 = HostId::generate();
    let directory = Arc::new(
        StaticDirectory::new()
            .with_group(g1, "tutor-a")
            .with_group(g2, "tutor-a")
            .with_group(g3, "tutor-b"),
    );
    let discussions = Arc::new(MemoryDiscussionStore::new());
    let messages = Arc::new(MemoryMessageStore::new());

    Harness {
        service: DiscussionService::new(discussions.clone(), messages.clone(), directory.clone()),
        replicator: ImprintReplicator::new(discussions.clone(), directory.clone()),
        coordinator: BroadcastCoordinator::new(
            discussions.clone(),
            messages.clone(),
            directory.clone(),
        ),
        ledger: VoteLedger::new(messages.clone()),
        remover: CascadeRemover::new(discussions.clone(), messages.clone()),
        discussions,
        messages,
        g1,
        g2,
        g3,
    }
}

fn tutor_a() -> ActingUser {
    ActingUser::new("tutor-a", UserRole::Tutor)
}

fn learner(name: &str) -> ActingUser {
    ActingUser::new(name, UserRole::Learner)
}

// =============================================================================
// Reply Tree Workflow
// =============================================================================

/// Complete thread workflow: topic creation -> root post -> nested replies,
/// with the path codec agreeing with the actual ancestor chain at every
/// depth.
#[test]
fn test_nested_reply_workflow() {
    let h = harness();
    let topic = h
        .replicator
        .create_topic_for_groups(
            &TopicDraft::new("Week 1", "Goals for the week", h.g1),
            &UserId::from("tutor-a"),
        )
        .expect("Failed to create topic");

    let root = h
        .service
        .add_message(topic.discussion.id, MessageDraft::new("Kick-off"), &tutor_a())
        .expect("Failed to add root message")
        .message;

    // Build a chain of nested replies and track the expected ancestry.
    let mut ancestors = vec![root.id];
    let mut parent = root.clone();
    for depth in 1..=4 {
        let reply = h
            .service
            .reply_to_message(
                parent.id,
                MessageDraft::new(format!("reply at depth {}", depth)),
                &learner("student-1"),
            )
            .expect("Failed to reply")
            .message;

        assert_eq!(reply.nesting_level(), depth);
        assert_eq!(path::segments(&reply.path), ancestors);
        assert_eq!(path::pick_root(&reply.path), Some(root.id));
        assert_eq!(path::pick_parent(&reply.path), Some(parent.id));

        ancestors.push(reply.id);
        parent = reply;
    }

    // Root listing sees only the root message; offspring sees the chain.
    assert_eq!(
        h.service.count_messages(topic.discussion.id, None).unwrap(),
        1
    );
    assert_eq!(
        h.service
            .count_messages(
                topic.discussion.id,
                Some(MessageFilterBy::offspring_of(root.id))
            )
            .unwrap(),
        4
    );
    assert_eq!(h.service.total_replies(root.id).unwrap(), 1);
}

// =============================================================================
// Voting Workflow
// =============================================================================

/// The cached balance always equals the recomputed positive-minus-negative
/// tally, across fresh votes, idempotent repeats, and flips.
#[test]
fn test_vote_balance_audit() {
    let h = harness();
    let topic = h
        .replicator
        .create_topic_for_groups(
            &TopicDraft::new("Votes", "On voting", h.g1),
            &UserId::from("tutor-a"),
        )
        .unwrap();
    let message = h
        .service
        .add_message(topic.discussion.id, MessageDraft::new("vote on me"), &tutor_a())
        .unwrap()
        .message;

    let votes = [
        ("u1", true),
        ("u2", true),
        ("u3", false),
        ("u1", true),  // idempotent repeat
        ("u2", false), // flip
        ("u4", false),
        ("u3", true),  // flip back
    ];

    for (user, direction) in votes {
        h.ledger
            .put_vote(message.id, &UserId::from(user), direction)
            .expect("Failed to vote");

        let positive = h
            .ledger
            .count_votes(message.id, VoteFilter::positive())
            .unwrap() as i64;
        let negative = h
            .ledger
            .count_votes(message.id, VoteFilter::negative())
            .unwrap() as i64;
        let stored = h.messages.find_by_id(message.id).unwrap().unwrap();
        assert_eq!(stored.votes_balance, positive - negative);
    }

    let stored = h.messages.find_by_id(message.id).unwrap().unwrap();
    assert_eq!(stored.votes.len(), 4);
    assert_eq!(stored.votes_balance, 0); // u1+, u2-, u3+, u4-

    // Each user holds exactly one vote.
    for user in ["u1", "u2", "u3", "u4"] {
        assert!(h
            .ledger
            .find_vote_of_user(message.id, &UserId::from(user))
            .unwrap()
            .is_some());
    }
}

// =============================================================================
// Cascade Removal Workflow
// =============================================================================

/// Removing a message with K descendants removes exactly K+1 documents and
/// leaves no document referencing the removed root.
#[test]
fn test_cascade_removal_completeness() {
    let h = harness();
    let topic = h
        .replicator
        .create_topic_for_groups(
            &TopicDraft::new("Removal", "To be pruned", h.g1),
            &UserId::from("tutor-a"),
        )
        .unwrap();
    let discussion_id = topic.discussion.id;

    let root = h
        .service
        .add_message(discussion_id, MessageDraft::new("root"), &tutor_a())
        .unwrap()
        .message;
    let keep = h
        .service
        .add_message(discussion_id, MessageDraft::new("untouched"), &tutor_a())
        .unwrap()
        .message;

    // A small tree: two replies to root, one nested under the first.
    let r1 = h
        .service
        .reply_to_message(root.id, MessageDraft::new("r1"), &learner("s1"))
        .unwrap()
        .message;
    h.service
        .reply_to_message(root.id, MessageDraft::new("r2"), &learner("s2"))
        .unwrap();
    h.service
        .reply_to_message(r1.id, MessageDraft::new("r1.1"), &learner("s3"))
        .unwrap();

    let outcome = h
        .remover
        .remove_subtree(root.id, &UserId::from("tutor-a"))
        .expect("Failed to remove subtree");

    assert_eq!(outcome.removed, 4); // root + 3 descendants

    let survivors = h
        .messages
        .find_many(
            &colloquy::store::MessageFilter::new().discussion(discussion_id),
            &MessageSort::default(),
            &Page::all(),
        )
        .unwrap();
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].id, keep.id);
    assert!(survivors
        .iter()
        .all(|m| !path::contains_segment(&m.path, root.id)));
}

// =============================================================================
// Replication Workflow
// =============================================================================

/// Property run: replicated creation yields identical rows with one shared
/// imprint; sibling lookup works from any member; bulk update honors the
/// authorization and imprint rules.
#[test]
fn test_replication_and_bulk_update_matrix() {
    let h = harness();

    let topic = h
        .replicator
        .create_topic_for_groups(
            &TopicDraft::new("Shared topic", "Same everywhere", h.g1)
                .also_in(vec![h.g2]),
            &UserId::from("tutor-a"),
        )
        .expect("Failed to create replicated topic");
    assert_eq!(topic.created.len(), 2);

    let imprint = topic.created[0].imprint.clone().expect("missing imprint");
    for row in &topic.created {
        assert_eq!(row.imprint.as_ref(), Some(&imprint));
        assert_eq!(row.title.as_deref(), Some("Shared topic"));
        assert_eq!(row.description.as_deref(), Some("Same everywhere"));
        assert_eq!(row.kind, DiscussionKind::GroupTopicDiscussion);
    }

    // Sibling lookup from either member returns both.
    for row in &topic.created {
        let set = h.replicator.siblings(row.id).unwrap();
        assert_eq!(set.siblings.len(), 2);
    }

    // tutor-a tutors both hosts of the set.
    let relations = h
        .replicator
        .user_relations(topic.discussion.id, &UserId::from("tutor-a"))
        .unwrap();
    assert!(relations.all_tutored());

    // Bulk update across the set: both rows reflect the patch afterwards.
    let patch = DiscussionPatch {
        title: Some("Renamed topic".to_string()),
        description: None,
    };
    let updated = h
        .replicator
        .bulk_update(topic.discussion.id, &patch, &[h.g2], &UserId::from("tutor-a"))
        .expect("Failed to bulk update");
    assert_eq!(updated.updated, 2);

    let set = h.replicator.siblings(topic.discussion.id).unwrap();
    for row in &set.siblings {
        assert_eq!(row.title.as_deref(), Some("Renamed topic"));
        assert_eq!(row.description.as_deref(), Some("Same everywhere"));
    }

    // Requesting a host outside the tutor's reach fails Forbidden before
    // anything is written.
    let topic_all = h
        .replicator
        .create_replicated_discussions(
            DiscussionKind::GroupTopicDiscussion,
            &[h.g1, h.g2, h.g3],
            &colloquy::discussions::DiscussionDraft {
                title: Some("Wide".to_string()),
                description: None,
                week: None,
            },
        )
        .unwrap();
    let on_g1 = topic_all.iter().find(|d| d.host == h.g1).unwrap();
    let result = h.replicator.bulk_update(
        on_g1.id,
        &patch,
        &[h.g3],
        &UserId::from("tutor-a"),
    );
    assert!(matches!(result, Err(ColloquyError::Forbidden(_))));

    // Naming a host whose discussion has a different imprint fails
    // Unprocessable, distinctly from the authorization failure.
    let result = h.replicator.bulk_update(
        topic.discussion.id,
        &patch,
        &[h.g3],
        &UserId::from("tutor-a"),
    );
    assert!(matches!(result, Err(ColloquyError::Unprocessable(_))));
}

// =============================================================================
// Broadcast Workflow
// =============================================================================

/// Broadcast dedup: a host with an existing broadcasts discussion is reused,
/// the missing one is created, and both copies carry one fresh message
/// imprint.
#[test]
fn test_broadcast_dedup_workflow() {
    let h = harness();

    // First broadcast to g1 provisions its discussion.
    h.coordinator
        .broadcast(&MessageDraft::new("first"), &[h.g1], &tutor_a())
        .expect("Failed first broadcast");

    // Second broadcast covers g1 (existing) and g2 (missing).
    let outcome = h
        .coordinator
        .broadcast(
            &MessageDraft::new("second").pinned(),
            &[h.g1, h.g2],
            &tutor_a(),
        )
        .expect("Failed second broadcast");

    assert_eq!(outcome.created_discussions.len(), 1);
    assert_eq!(outcome.created_discussions[0].host, h.g2);
    assert_eq!(outcome.messages.len(), 2);

    let imprint = outcome.messages[0].imprint.clone().expect("missing imprint");
    for message in &outcome.messages {
        assert!(message.is_broadcast);
        assert!(message.is_pinned);
        assert_eq!(message.imprint.as_ref(), Some(&imprint));
    }

    // Exactly one broadcasts discussion per host, ever.
    for host in [h.g1, h.g2] {
        let count = h
            .discussions
            .count(
                &colloquy::store::DiscussionFilter::new()
                    .kind(DiscussionKind::GroupBroadcasts)
                    .hosts(vec![host]),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    // Events: one discussion-create (g2), then one message-create per host.
    let sink = MemorySink::new();
    colloquy::discussions::events::publish_all(&sink, &outcome.events);
    assert_eq!(
        sink.topics(),
        vec![
            EventTopic::DiscussionCreate,
            EventTopic::MessageCreate,
            EventTopic::MessageCreate,
        ]
    );
}

// =============================================================================
// Listing Workflow
// =============================================================================

/// Pinned messages come first in every listing, whatever the secondary sort
/// direction.
#[test]
fn test_pinned_first_ordering() {
    let h = harness();
    let topic = h
        .replicator
        .create_topic_for_groups(
            &TopicDraft::new("Ordering", "Pinned first", h.g1),
            &UserId::from("tutor-a"),
        )
        .unwrap();

    for i in 0..6 {
        let draft = if i % 3 == 0 {
            MessageDraft::new(format!("pinned {}", i)).pinned()
        } else {
            MessageDraft::new(format!("plain {}", i))
        };
        h.service
            .add_message(topic.discussion.id, draft, &tutor_a())
            .unwrap();
    }

    for direction in [SortDirection::Asc, SortDirection::Desc] {
        for key in [MessageOrderKey::CreatedAt, MessageOrderKey::VotesBalance] {
            let listed = h
                .service
                .fetch_messages(
                    topic.discussion.id,
                    None,
                    MessageSort::new(key, direction),
                    Page::all(),
                )
                .unwrap();

            assert_eq!(listed.len(), 6);
            let first_unpinned = listed
                .iter()
                .position(|m| !m.is_pinned)
                .expect("no unpinned messages");
            assert!(
                listed[first_unpinned..].iter().all(|m| !m.is_pinned),
                "unpinned message sorted before a pinned one ({:?} {:?})",
                key,
                direction
            );
        }
    }
}

// =============================================================================
// Persistent Store Workflow
// =============================================================================

/// The same engine works unchanged over the RocksDB-backed stores.
#[test]
fn test_workflow_over_rocksdb() {
    init_tracing();
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let storage = Arc::new(RocksStorage::open(temp_dir.path()).expect("Failed to open storage"));
    let discussions: Arc<dyn DiscussionStore> = storage.clone();
    let messages: Arc<dyn MessageStore> = storage.clone();

    let group = HostId::generate();
    let directory = Arc::new(StaticDirectory::new().with_group(group, "tutor-a"));
    let service = DiscussionService::new(discussions.clone(), messages.clone(), directory.clone());
    let replicator = ImprintReplicator::new(discussions.clone(), directory);
    let ledger = VoteLedger::new(messages.clone());

    let topic = replicator
        .create_topic_for_groups(
            &TopicDraft::new("Persistent", "On disk", group),
            &UserId::from("tutor-a"),
        )
        .expect("Failed to create topic");

    let root = service
        .add_message(topic.discussion.id, MessageDraft::new("root"), &tutor_a())
        .unwrap()
        .message;
    let reply = service
        .reply_to_message(root.id, MessageDraft::new("reply"), &learner("s1"))
        .unwrap()
        .message;
    assert_eq!(path::pick_parent(&reply.path), Some(root.id));

    ledger
        .put_vote(root.id, &UserId::from("s1"), true)
        .expect("Failed to vote");
    ledger
        .put_vote(root.id, &UserId::from("s1"), false)
        .expect("Failed to flip");
    let stored = messages.find_by_id(root.id).unwrap().unwrap();
    assert_eq!(stored.votes_balance, -1);

    let listed = service
        .fetch_messages(topic.discussion.id, None, MessageSort::default(), Page::all())
        .unwrap();
    assert_eq!(listed.len(), 1);

    let removed = CascadeRemover::new(discussions, messages.clone())
        .remove_subtree(root.id, &UserId::from("tutor-a"))
        .unwrap();
    assert_eq!(removed.removed, 2);
    assert_eq!(
        messages
            .count(&colloquy::store::MessageFilter::new().discussion(topic.discussion.id))
            .unwrap(),
        0
    );
}
