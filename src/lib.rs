//! # Colloquy - Threaded Discussion Engine
//!
//! A discussion engine backing threaded, multi-host conversations: lesson
//! discussions, group topics, broadcasts, and introductions, with nested
//! replies, voting, and real-time event fan-out.
//!
//! ## Core ideas
//!
//! - **Materialized paths**: a message's position in its reply tree is a
//!   delimiter-separated string of ancestor ids, so direct replies,
//!   descendants, and whole subtrees are plain path predicates.
//! - **Vote ledger**: each message caches a positive-minus-negative vote
//!   balance, maintained by atomic per-document updates that commute under
//!   concurrent voters.
//! - **Imprint replication**: a discussion created across several hosts is
//!   stored as one row per host, bound by a shared imprint token. The set is
//!   one logical discussion for bulk updates and broadcast delivery.
//! - **Effects, not side effects**: every mutating operation returns the
//!   ordered list of events to publish; delivery stays with the caller.
//!
//! ## Example
//!
//! ```rust
//! use colloquy::directory::StaticDirectory;
//! use colloquy::discussions::{
//!     ActingUser, DiscussionService, HostId, MessageDraft, UserRole,
//! };
//! use colloquy::discussions::replication::ImprintReplicator;
//! use colloquy::discussions::model::TopicDraft;
//! use colloquy::store::memory::{MemoryDiscussionStore, MemoryMessageStore};
//! use std::sync::Arc;
//!
//! # fn main() -> colloquy::Result<()> {
//! let group = HostId::generate();
//! let directory = Arc::new(StaticDirectory::new().with_group(group, "tutor-1"));
//! let discussions = Arc::new(MemoryDiscussionStore::new());
//! let messages = Arc::new(MemoryMessageStore::new());
//!
//! let replicator = ImprintReplicator::new(discussions.clone(), directory.clone());
//! let topic = replicator.create_topic_for_groups(
//!     &TopicDraft::new("Week 1", "Introductions and goals", group),
//!     &"tutor-1".into(),
//! )?;
//!
//! let service = DiscussionService::new(discussions, messages, directory);
//! let tutor = ActingUser::new("tutor-1", UserRole::Tutor);
//! let posted = service.add_message(
//!     topic.discussion.id,
//!     MessageDraft::new("Welcome everyone!"),
//!     &tutor,
//! )?;
//! assert_eq!(posted.events.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod discussions;
pub mod error;
pub mod store;

pub use error::{ColloquyError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
