//! Client-facing message operations over a discussion.
//!
//! Posting and replying dispatch through the per-kind policies; everything
//! here returns its result together with the ordered events to emit, and
//! publishes nothing itself.

use crate::directory::HostDirectory;
use crate::discussions::events::DiscussionEvent;
use crate::discussions::model::{Discussion, DiscussionMessage, MessageDraft};
use crate::discussions::path::{self, PathMatch};
use crate::discussions::removal::{CascadeRemover, RemovedSubtree};
use crate::discussions::types::{
    current_timestamp_millis, ActingUser, DiscussionId, MessageId, UserRole,
};
use crate::error::{ColloquyError, Result};
use crate::store::{
    DiscussionStore, MessageFilter, MessagePatch, MessageSort, MessageStore, Page,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Which slice of a discussion's tree a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchApproach {
    /// Direct replies to one message.
    RepliesOnly,
    /// Every descendant of one message, at any depth.
    OffspringOnly,
}

/// Optional listing scope: without it, listings return root messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilterBy {
    /// The approach to apply.
    pub approach: FetchApproach,
    /// The message the approach is relative to.
    pub message_id: MessageId,
}

impl MessageFilterBy {
    /// Scopes a listing to direct replies of a message.
    pub fn replies_of(message_id: MessageId) -> Self {
        Self {
            approach: FetchApproach::RepliesOnly,
            message_id,
        }
    }

    /// Scopes a listing to all descendants of a message.
    pub fn offspring_of(message_id: MessageId) -> Self {
        Self {
            approach: FetchApproach::OffspringOnly,
            message_id,
        }
    }
}

/// A created or mutated message together with the events to emit.
#[derive(Debug)]
pub struct MessageOutcome {
    /// The message as stored after the operation.
    pub message: DiscussionMessage,
    /// Events to emit, in order.
    pub events: Vec<DiscussionEvent>,
}

/// A batch of cloned messages together with the events to emit.
#[derive(Debug)]
pub struct CloneOutcome {
    /// The created copies, one per target discussion.
    pub messages: Vec<DiscussionMessage>,
    /// Events to emit, in order.
    pub events: Vec<DiscussionEvent>,
}

/// Message-level operations on discussions.
pub struct DiscussionService {
    discussions: Arc<dyn DiscussionStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn HostDirectory>,
    remover: CascadeRemover,
}

impl DiscussionService {
    /// Creates a service over the stores and the host directory.
    pub fn new(
        discussions: Arc<dyn DiscussionStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn HostDirectory>,
    ) -> Self {
        let remover = CascadeRemover::new(discussions.clone(), messages.clone());
        Self {
            discussions,
            messages,
            directory,
            remover,
        }
    }

    /// Posts a root message into a discussion.
    ///
    /// # Errors
    /// - `NotFound` if the discussion (or its lesson section) is absent
    /// - `BadRequest` if the discussion is a broadcasts discussion
    /// - `Unprocessable` if the hosting lesson section is unsupported
    pub fn add_message(
        &self,
        discussion_id: DiscussionId,
        draft: MessageDraft,
        acting: &ActingUser,
    ) -> Result<MessageOutcome> {
        let discussion = self.require_discussion(discussion_id)?;
        let policy = discussion.kind.policy();

        if !policy.accepts_direct_messages() {
            return Err(ColloquyError::bad_request(
                "Use the broadcast operation to post into a broadcasts discussion!",
            ));
        }
        self.check_section(&discussion)?;

        let message = DiscussionMessage::new(discussion.id, acting.id.clone(), draft.text)
            .with_pinned(self.effective_pin(draft.is_pinned, acting));
        let message = self.messages.insert_one(message)?;
        debug!(discussion = %discussion.id, message_id = %message.id, "message added");

        let events = vec![DiscussionEvent::MessageCreate {
            message: message.clone(),
            raised_by: acting.id.clone(),
        }];
        Ok(MessageOutcome { message, events })
    }

    /// Replies to a message, nesting the reply under it.
    ///
    /// Replies are accepted on every discussion kind, broadcasts included;
    /// lesson-section checks still apply.
    ///
    /// # Errors
    /// - `NotFound` if the parent message or its discussion is absent
    /// - `Unprocessable` if the hosting lesson section is unsupported
    pub fn reply_to_message(
        &self,
        parent_id: MessageId,
        draft: MessageDraft,
        acting: &ActingUser,
    ) -> Result<MessageOutcome> {
        let parent = self.require_message(parent_id)?;
        let discussion = self.require_discussion(parent.discussion)?;
        self.check_section(&discussion)?;

        let reply = DiscussionMessage::new(discussion.id, acting.id.clone(), draft.text)
            .with_path(path::rebuild(&parent.path, parent.id))
            .with_pinned(self.effective_pin(draft.is_pinned, acting));
        let reply = self.messages.insert_one(reply)?;
        debug!(
            discussion = %discussion.id,
            parent = %parent.id,
            reply = %reply.id,
            "reply added"
        );

        let events = vec![
            DiscussionEvent::MessageCreate {
                message: reply.clone(),
                raised_by: acting.id.clone(),
            },
            DiscussionEvent::MessageReply {
                message: reply.clone(),
                to_user: parent.user.clone(),
                raised_by: acting.id.clone(),
            },
        ];
        Ok(MessageOutcome {
            message: reply,
            events,
        })
    }

    /// Edits a message's text. Only the owner may edit.
    ///
    /// # Errors
    /// - `NotFound` if the message is absent
    /// - `Unprocessable` if the acting user is not the owner
    pub fn update_message_text(
        &self,
        message_id: MessageId,
        text: impl Into<String>,
        acting: &ActingUser,
    ) -> Result<MessageOutcome> {
        let message = self.require_message(message_id)?;
        if message.user != acting.id {
            return Err(ColloquyError::unprocessable(
                "Only the owner can update a discussion message!",
            ));
        }

        let patch = MessagePatch::new()
            .text(text)
            .text_updated_at(current_timestamp_millis());
        self.messages.update_one(message_id, &patch)?;

        let message = self.require_message(message_id)?;
        let events = vec![DiscussionEvent::MessageUpdate {
            message: message.clone(),
            raised_by: acting.id.clone(),
        }];
        Ok(MessageOutcome { message, events })
    }

    /// Pins or unpins a message. Tutors, managers, and admins only.
    ///
    /// # Errors
    /// - `NotFound` if the message is absent
    /// - `Forbidden` for other roles
    pub fn set_pinned_state(
        &self,
        message_id: MessageId,
        is_pinned: bool,
        acting: &ActingUser,
    ) -> Result<MessageOutcome> {
        if acting.role != UserRole::Tutor && !acting.role.is_privileged() {
            return Err(ColloquyError::forbidden(format!(
                "Role {} cannot change the pinned state of discussion messages!",
                acting.role
            )));
        }
        self.require_message(message_id)?;

        self.messages
            .update_one(message_id, &MessagePatch::new().pinned(is_pinned))?;

        let message = self.require_message(message_id)?;
        let events = vec![DiscussionEvent::MessagePinChange {
            message: message.clone(),
            raised_by: acting.id.clone(),
        }];
        Ok(MessageOutcome { message, events })
    }

    /// Removes a message and its whole subtree. Owners may remove their own
    /// messages; admins and managers may remove any.
    ///
    /// # Errors
    /// - `NotFound` if the message is absent
    /// - `Unprocessable` if the acting user is neither owner nor privileged
    pub fn remove_message(
        &self,
        message_id: MessageId,
        acting: &ActingUser,
    ) -> Result<RemovedSubtree> {
        let message = self.require_message(message_id)?;
        if !acting.role.is_privileged() && message.user != acting.id {
            return Err(ColloquyError::unprocessable(
                "Only the owner/admin/manager can remove a discussion message!",
            ));
        }
        self.remover.remove_subtree(message_id, &acting.id)
    }

    /// Clones a message into other discussions as fresh root messages, each
    /// carrying an `origin` back-reference to the source.
    ///
    /// # Errors
    /// Returns `NotFound` if the source message or any target discussion is
    /// absent.
    pub fn clone_message_to_discussions(
        &self,
        message_id: MessageId,
        targets: &[DiscussionId],
        acting: &ActingUser,
    ) -> Result<CloneOutcome> {
        let source = self.require_message(message_id)?;
        let mut rows = Vec::with_capacity(targets.len());
        for target in targets {
            let discussion = self.require_discussion(*target)?;
            rows.push(
                DiscussionMessage::new(discussion.id, acting.id.clone(), source.text.clone())
                    .with_pinned(source.is_pinned)
                    .with_origin(source.id),
            );
        }

        let messages = self.messages.insert_many(rows)?;
        let events = messages
            .iter()
            .map(|message| DiscussionEvent::MessageCreate {
                message: message.clone(),
                raised_by: acting.id.clone(),
            })
            .collect();
        Ok(CloneOutcome { messages, events })
    }

    /// Looks up a discussion.
    ///
    /// # Errors
    /// Returns `NotFound` if it is absent.
    pub fn fetch_discussion(&self, discussion_id: DiscussionId) -> Result<Discussion> {
        self.require_discussion(discussion_id)
    }

    /// Looks up a message.
    ///
    /// # Errors
    /// Returns `NotFound` if it is absent.
    pub fn fetch_message(&self, message_id: MessageId) -> Result<DiscussionMessage> {
        self.require_message(message_id)
    }

    /// Lists messages of a discussion: root messages by default, or the
    /// replies/offspring of one message when `filter_by` is given. Pinned
    /// messages always come first.
    pub fn fetch_messages(
        &self,
        discussion_id: DiscussionId,
        filter_by: Option<MessageFilterBy>,
        sort: MessageSort,
        page: Page,
    ) -> Result<Vec<DiscussionMessage>> {
        let filter = Self::listing_filter(discussion_id, filter_by);
        self.messages.find_many(&filter, &sort, &page)
    }

    /// Counts what [`fetch_messages`](Self::fetch_messages) would return.
    pub fn count_messages(
        &self,
        discussion_id: DiscussionId,
        filter_by: Option<MessageFilterBy>,
    ) -> Result<usize> {
        let filter = Self::listing_filter(discussion_id, filter_by);
        self.messages.count(&filter)
    }

    /// Returns the parent message, or `None` for root messages.
    pub fn parent_of(&self, message: &DiscussionMessage) -> Result<Option<DiscussionMessage>> {
        match path::pick_parent(&message.path) {
            Some(parent_id) => self.messages.find_by_id(parent_id),
            None => Ok(None),
        }
    }

    /// Returns the root ancestor, or `None` for root messages.
    pub fn root_of(&self, message: &DiscussionMessage) -> Result<Option<DiscussionMessage>> {
        match path::pick_root(&message.path) {
            Some(root_id) => self.messages.find_by_id(root_id),
            None => Ok(None),
        }
    }

    /// Counts direct replies to a message.
    pub fn total_replies(&self, message_id: MessageId) -> Result<usize> {
        self.messages
            .count(&MessageFilter::new().path(PathMatch::DirectReplyTo(message_id)))
    }

    /// Counts all descendants of a message, at any depth.
    pub fn total_offspring(&self, message_id: MessageId) -> Result<usize> {
        self.messages
            .count(&MessageFilter::new().path(PathMatch::HasAncestorAny(vec![message_id])))
    }

    fn listing_filter(
        discussion_id: DiscussionId,
        filter_by: Option<MessageFilterBy>,
    ) -> MessageFilter {
        let path = match filter_by {
            None => PathMatch::Root,
            Some(by) => match by.approach {
                FetchApproach::RepliesOnly => PathMatch::DirectReplyTo(by.message_id),
                FetchApproach::OffspringOnly => PathMatch::HasAncestorAny(vec![by.message_id]),
            },
        };
        MessageFilter::new().discussion(discussion_id).path(path)
    }

    /// Pin requests are honored for tutors only; everyone else posts
    /// unpinned regardless of the draft.
    fn effective_pin(&self, requested: bool, acting: &ActingUser) -> bool {
        requested && acting.role == UserRole::Tutor
    }

    fn check_section(&self, discussion: &Discussion) -> Result<()> {
        let policy = discussion.kind.policy();
        if !policy.requires_section() {
            return Ok(());
        }
        let section = self.directory.section_kind(discussion.host).ok_or_else(|| {
            ColloquyError::not_found(format!("Lesson section {} not found!", discussion.host))
        })?;
        policy.check_section(section)
    }

    fn require_discussion(&self, discussion_id: DiscussionId) -> Result<Discussion> {
        self.discussions.find_by_id(discussion_id)?.ok_or_else(|| {
            ColloquyError::not_found(format!("Discussion {} not found!", discussion_id))
        })
    }

    fn require_message(&self, message_id: MessageId) -> Result<DiscussionMessage> {
        self.messages.find_by_id(message_id)?.ok_or_else(|| {
            ColloquyError::not_found(format!("Discussion message {} not found!", message_id))
        })
    }
}
