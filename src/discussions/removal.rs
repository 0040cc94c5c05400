//! Cascading removal of message subtrees and whole discussions.
//!
//! Removing a message removes the entire subtree rooted at it: the message
//! plus every message whose path contains it as an ancestor segment, in one
//! batch. No orphaned replies survive. Removal is not atomic with the
//! notification side effects, but the store guarantees the whole matched
//! set is gone before the call returns.

use crate::discussions::events::DiscussionEvent;
use crate::discussions::path;
use crate::discussions::types::{DiscussionId, MessageId, UserId};
use crate::error::{ColloquyError, Result};
use crate::store::{DiscussionFilter, DiscussionStore, MessageFilter, MessageStore};
use std::sync::Arc;
use tracing::info;

/// Result of a subtree removal.
#[derive(Debug)]
pub struct RemovedSubtree {
    /// Number of messages removed (the target plus its descendants).
    pub removed: usize,
    /// Events to emit after the removal.
    pub events: Vec<DiscussionEvent>,
}

/// Result of a discussion removal.
#[derive(Debug)]
pub struct RemovedDiscussion {
    /// Number of messages removed along with the discussion.
    pub removed_messages: usize,
    /// Events to emit after the removal.
    pub events: Vec<DiscussionEvent>,
}

/// Removes message subtrees and discussions as units.
pub struct CascadeRemover {
    discussions: Arc<dyn DiscussionStore>,
    messages: Arc<dyn MessageStore>,
}

impl CascadeRemover {
    /// Creates a remover over the two stores.
    pub fn new(discussions: Arc<dyn DiscussionStore>, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            discussions,
            messages,
        }
    }

    /// Removes a message and every reply below it.
    ///
    /// # Errors
    /// Returns `NotFound` if the target message does not exist.
    pub fn remove_subtree(
        &self,
        message_id: MessageId,
        raised_by: &UserId,
    ) -> Result<RemovedSubtree> {
        let message = self.messages.find_by_id(message_id)?.ok_or_else(|| {
            ColloquyError::not_found(format!("Discussion message {} not found!", message_id))
        })?;

        let removed = self
            .messages
            .remove_many(&MessageFilter::new().in_subtree_of(message_id))?;

        info!(
            %message_id,
            discussion = %message.discussion,
            removed,
            "removed message subtree"
        );

        let events = vec![DiscussionEvent::MessageRemove {
            discussion: message.discussion,
            message: message.id,
            parent: path::pick_parent(&message.path),
            root: path::pick_root(&message.path),
            raised_by: raised_by.clone(),
        }];

        Ok(RemovedSubtree { removed, events })
    }

    /// Removes a discussion together with every message in it.
    ///
    /// # Errors
    /// Returns `NotFound` if the discussion does not exist.
    pub fn remove_discussion(
        &self,
        discussion_id: DiscussionId,
        raised_by: &UserId,
    ) -> Result<RemovedDiscussion> {
        let discussion = self.discussions.find_by_id(discussion_id)?.ok_or_else(|| {
            ColloquyError::not_found(format!("Discussion {} not found!", discussion_id))
        })?;

        let removed_messages = self
            .messages
            .remove_many(&MessageFilter::new().discussion(discussion_id))?;
        self.discussions
            .remove_many(&DiscussionFilter::new().ids(vec![discussion_id]))?;

        info!(
            discussion = %discussion_id,
            removed_messages,
            "removed discussion and its messages"
        );

        let events = vec![DiscussionEvent::DiscussionRemove {
            host: discussion.host,
            discussion,
            raised_by: raised_by.clone(),
        }];

        Ok(RemovedDiscussion {
            removed_messages,
            events,
        })
    }
}
