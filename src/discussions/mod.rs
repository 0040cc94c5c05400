//! Threaded, multi-host discussions with nested replies, voting, and
//! replication.
//!
//! ## Shape of the system
//!
//! Messages form a tree per discussion, addressed by a materialized path
//! (the [`path`] codec). Votes live on the message with an eagerly cached
//! balance (the [`ledger`]). Removal always takes whole subtrees (the
//! [`removal`] module). A discussion created for several hosts at once is a
//! *replication set*: its rows share one imprint and behave as one logical
//! discussion for bulk updates (the [`replication`] module). Broadcasts
//! ensure one implicit broadcasts discussion per host and replicate one
//! message across them (the [`broadcast`] module).
//!
//! Every mutating operation returns the ordered list of events to emit
//! (the [`events`] module); the caller publishes them after the write
//! commits.

pub mod broadcast;
pub mod events;
pub mod ledger;
pub mod model;
pub mod path;
pub mod policy;
pub mod removal;
pub mod replication;
pub mod service;
pub mod types;

pub use broadcast::{BroadcastCoordinator, BroadcastOutcome};
pub use events::{DiscussionEvent, EventSink, EventTopic, MemorySink};
pub use ledger::{VoteFilter, VoteLedger, VoteOutcome};
pub use model::{
    Discussion, DiscussionBounds, DiscussionDraft, DiscussionMessage, DiscussionPatch,
    MessageDraft, TopicDraft, Vote,
};
pub use path::PathMatch;
pub use policy::KindPolicy;
pub use removal::{CascadeRemover, RemovedDiscussion, RemovedSubtree};
pub use replication::{BulkUpdated, ImprintReplicator, SiblingSet, TopicCreated, UserRelations};
pub use service::{
    CloneOutcome, DiscussionService, FetchApproach, MessageFilterBy, MessageOutcome,
};
pub use types::{
    ActingUser, DiscussionId, DiscussionKind, HostId, Imprint, MessageId, SectionKind, UserId,
    UserRole, WeekId,
};
