//! Broadcast coordination: one broadcasts discussion per host, one message
//! replicated across the set.
//!
//! Broadcasting ensures every requested host has its (single, implicit)
//! broadcasts discussion, creating the missing ones as a replicated set, and
//! then inserts one copy of the message per host. All copies carry the same
//! freshly generated message imprint so downstream consumers can correlate
//! them.
//!
//! A failure between discussion creation and message insertion leaves empty
//! broadcasts discussions behind. That state is legal and self-healing: the
//! host→discussion map is resolved from the store after creation, so the
//! next broadcast reuses whatever already exists instead of duplicating it.

use crate::directory::HostDirectory;
use crate::discussions::events::DiscussionEvent;
use crate::discussions::model::{Discussion, DiscussionDraft, DiscussionMessage, MessageDraft};
use crate::discussions::replication::ImprintReplicator;
use crate::discussions::types::{ActingUser, DiscussionId, DiscussionKind, HostId, Imprint, UserRole};
use crate::error::{ColloquyError, Result};
use crate::store::{DiscussionFilter, DiscussionStore, MessageStore};
use std::sync::Arc;
use tracing::info;

/// Result of a broadcast.
#[derive(Debug)]
pub struct BroadcastOutcome {
    /// Broadcasts discussions created for hosts that lacked one.
    pub created_discussions: Vec<Discussion>,
    /// The message copies, one per host.
    pub messages: Vec<DiscussionMessage>,
    /// Events to emit: discussion creations first, then message creations.
    pub events: Vec<DiscussionEvent>,
}

/// Delivers one message to the broadcasts discussion of every given host.
pub struct BroadcastCoordinator {
    discussions: Arc<dyn DiscussionStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn HostDirectory>,
    replicator: ImprintReplicator,
}

impl BroadcastCoordinator {
    /// Creates a coordinator over the stores and the host directory.
    pub fn new(
        discussions: Arc<dyn DiscussionStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn HostDirectory>,
    ) -> Self {
        let replicator = ImprintReplicator::new(discussions.clone(), directory.clone());
        Self {
            discussions,
            messages,
            directory,
            replicator,
        }
    }

    /// Broadcasts a message to the given hosts.
    ///
    /// # Errors
    /// - `Forbidden` if a tutor-role caller does not tutor every host
    ///   (privileged roles skip the check); the message lists the hosts
    /// - `NotFound` if any host is unknown; the message lists the hosts
    pub fn broadcast(
        &self,
        draft: &MessageDraft,
        hosts: &[HostId],
        acting: &ActingUser,
    ) -> Result<BroadcastOutcome> {
        let relations = self.directory.tutor_relations(&acting.id, hosts);
        if acting.role == UserRole::Tutor && !relations.is_tutor_in_all() {
            return Err(ColloquyError::forbidden(format!(
                "User is not a tutor in hosts: {}!",
                join_ids(&relations.not_tutored)
            )));
        }
        if !relations.not_found.is_empty() {
            return Err(ColloquyError::not_found(format!(
                "Hosts are not found: {}!",
                join_ids(&relations.not_found)
            )));
        }

        let without = self.hosts_without_broadcasts(hosts)?;
        let created_discussions = if without.is_empty() {
            Vec::new()
        } else {
            self.replicator.create_replicated_discussions(
                DiscussionKind::GroupBroadcasts,
                &without,
                &DiscussionDraft::default(),
            )?
        };

        // Resolved after creation so pre-existing discussions are reused.
        let discussion_ids = self.broadcast_discussion_ids(hosts)?;

        let imprint = Imprint::generate();
        let rows: Vec<DiscussionMessage> = discussion_ids
            .iter()
            .map(|discussion_id| {
                DiscussionMessage::new(*discussion_id, acting.id.clone(), draft.text.clone())
                    .with_pinned(draft.is_pinned)
                    .as_broadcast(imprint.clone())
            })
            .collect();
        let messages = self.messages.insert_many(rows)?;

        info!(
            hosts = hosts.len(),
            new_discussions = created_discussions.len(),
            delivered = messages.len(),
            imprint = %imprint,
            "broadcast delivered"
        );

        let mut events: Vec<DiscussionEvent> = created_discussions
            .iter()
            .map(|discussion| DiscussionEvent::DiscussionCreate {
                host: discussion.host,
                discussion: discussion.clone(),
                raised_by: acting.id.clone(),
            })
            .collect();
        events.extend(messages.iter().map(|message| DiscussionEvent::MessageCreate {
            message: message.clone(),
            raised_by: acting.id.clone(),
        }));

        Ok(BroadcastOutcome {
            created_discussions,
            messages,
            events,
        })
    }

    /// Returns the hosts among `hosts` that already have a broadcasts
    /// discussion.
    pub fn hosts_with_broadcasts(&self, hosts: &[HostId]) -> Result<Vec<HostId>> {
        let existing = self.discussions.find_many(
            &DiscussionFilter::new()
                .kind(DiscussionKind::GroupBroadcasts)
                .hosts(hosts.to_vec()),
        )?;
        Ok(existing.iter().map(|discussion| discussion.host).collect())
    }

    /// Returns the hosts among `hosts` that have no broadcasts discussion
    /// yet.
    pub fn hosts_without_broadcasts(&self, hosts: &[HostId]) -> Result<Vec<HostId>> {
        let with = self.hosts_with_broadcasts(hosts)?;
        Ok(hosts
            .iter()
            .filter(|host| !with.contains(host))
            .copied()
            .collect())
    }

    /// Returns the broadcasts discussion ids for the given hosts.
    pub fn broadcast_discussion_ids(&self, hosts: &[HostId]) -> Result<Vec<DiscussionId>> {
        let existing = self.discussions.find_many(
            &DiscussionFilter::new()
                .kind(DiscussionKind::GroupBroadcasts)
                .hosts(hosts.to_vec()),
        )?;
        Ok(existing.iter().map(|discussion| discussion.id).collect())
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
