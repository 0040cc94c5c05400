//! Persistence façades for discussions and messages.
//!
//! The document store is an external collaborator: this crate consumes a
//! filter/sort/paginate interface and never assumes anything about query
//! execution. The [`DiscussionStore`] and [`MessageStore`] traits are that
//! boundary; two reference implementations ship with the crate:
//!
//! - [`memory`]: RwLock'd in-memory stores, used by tests and embedders
//! - [`rocks`]: persistent stores over RocksDB column families
//!
//! ## Update atomicity
//!
//! `update_one` applies its whole patch atomically per document. Balance
//! increments therefore commute: concurrent votes by different users never
//! lose an update. A patch can carry a [`MessagePatch::guard_vote`]
//! precondition; when the guard fails the patch is not applied and
//! `update_one` reports `false`.

pub mod memory;
pub mod rocks;
pub mod rocksdb;

use crate::discussions::model::{Discussion, DiscussionMessage, Vote};
use crate::discussions::path::PathMatch;
use crate::discussions::types::{DiscussionId, DiscussionKind, HostId, Imprint, MessageId, UserId};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Filter over discussion documents. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscussionFilter {
    /// Match ids in this set.
    pub ids: Option<Vec<DiscussionId>>,
    /// Match this kind.
    pub kind: Option<DiscussionKind>,
    /// Match hosts in this set.
    pub hosts: Option<Vec<HostId>>,
    /// Match this replication key.
    pub imprint: Option<Imprint>,
    /// Match this activation state.
    pub is_active: Option<bool>,
}

impl DiscussionFilter {
    /// Creates a match-all filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to an id set.
    pub fn ids(mut self, ids: Vec<DiscussionId>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Restricts to one kind.
    pub fn kind(mut self, kind: DiscussionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts to a host set.
    pub fn hosts(mut self, hosts: Vec<HostId>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Restricts to one replication key.
    pub fn imprint(mut self, imprint: Imprint) -> Self {
        self.imprint = Some(imprint);
        self
    }

    /// Restricts to an activation state.
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// Evaluates the filter against a document.
    pub fn matches(&self, discussion: &Discussion) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&discussion.id) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if discussion.kind != kind {
                return false;
            }
        }
        if let Some(hosts) = &self.hosts {
            if !hosts.contains(&discussion.host) {
                return false;
            }
        }
        if let Some(imprint) = &self.imprint {
            if discussion.imprint.as_ref() != Some(imprint) {
                return false;
            }
        }
        if let Some(is_active) = self.is_active {
            if discussion.is_active != is_active {
                return false;
            }
        }
        true
    }
}

/// Patch applied to discussion documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscussionUpdate {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New activation state.
    pub is_active: Option<bool>,
}

impl DiscussionUpdate {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the activation state.
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// Applies the patch in place.
    pub fn apply(&self, discussion: &mut Discussion) {
        if let Some(title) = &self.title {
            discussion.title = Some(title.clone());
        }
        if let Some(description) = &self.description {
            discussion.description = Some(description.clone());
        }
        if let Some(is_active) = self.is_active {
            discussion.is_active = is_active;
        }
    }
}

impl From<&crate::discussions::model::DiscussionPatch> for DiscussionUpdate {
    fn from(patch: &crate::discussions::model::DiscussionPatch) -> Self {
        Self {
            title: patch.title.clone(),
            description: patch.description.clone(),
            is_active: None,
        }
    }
}

/// Filter over message documents. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Match ids in this set.
    pub ids: Option<Vec<MessageId>>,
    /// Match the owning discussion.
    pub discussion: Option<DiscussionId>,
    /// Match the tree position.
    pub path: Option<PathMatch>,
    /// Match the author.
    pub user: Option<UserId>,
    /// Match messages carrying a vote by this user.
    pub voted_by: Option<UserId>,
    /// Match the subtree rooted at this message: the message itself plus
    /// every message with it as an ancestor segment, at any depth.
    pub in_subtree_of: Option<MessageId>,
    /// Match messages created strictly after this timestamp.
    pub created_after: Option<u64>,
    /// Match messages created strictly before this timestamp.
    pub created_before: Option<u64>,
}

impl MessageFilter {
    /// Creates a match-all filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to an id set.
    pub fn ids(mut self, ids: Vec<MessageId>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Restricts to one discussion.
    pub fn discussion(mut self, discussion: DiscussionId) -> Self {
        self.discussion = Some(discussion);
        self
    }

    /// Restricts to a tree position.
    pub fn path(mut self, path: PathMatch) -> Self {
        self.path = Some(path);
        self
    }

    /// Restricts to one author.
    pub fn user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// Restricts to messages voted on by a user.
    pub fn voted_by(mut self, user: UserId) -> Self {
        self.voted_by = Some(user);
        self
    }

    /// Restricts to the subtree rooted at a message (self included).
    pub fn in_subtree_of(mut self, root: MessageId) -> Self {
        self.in_subtree_of = Some(root);
        self
    }

    /// Restricts to messages created strictly after a timestamp.
    pub fn created_after(mut self, millis: u64) -> Self {
        self.created_after = Some(millis);
        self
    }

    /// Restricts to messages created strictly before a timestamp.
    pub fn created_before(mut self, millis: u64) -> Self {
        self.created_before = Some(millis);
        self
    }

    /// Evaluates the filter against a document.
    pub fn matches(&self, message: &DiscussionMessage) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&message.id) {
                return false;
            }
        }
        if let Some(discussion) = self.discussion {
            if message.discussion != discussion {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if !path.matches(&message.path) {
                return false;
            }
        }
        if let Some(user) = &self.user {
            if &message.user != user {
                return false;
            }
        }
        if let Some(voter) = &self.voted_by {
            if message.vote_of(voter).is_none() {
                return false;
            }
        }
        if let Some(root) = self.in_subtree_of {
            let in_subtree = message.id == root
                || crate::discussions::path::contains_segment(&message.path, root);
            if !in_subtree {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if message.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if message.created_at >= before {
                return false;
            }
        }
        true
    }
}

/// Secondary sort key for message listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrderKey {
    /// Creation timestamp.
    CreatedAt,
    /// Cached vote balance.
    VotesBalance,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort order for message listings.
///
/// Pinned messages always sort before unpinned ones; the key and direction
/// only order messages within the same pin state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSort {
    /// Secondary key applied after the pinned-first rule.
    pub key: MessageOrderKey,
    /// Direction of the secondary key.
    pub direction: SortDirection,
}

impl Default for MessageSort {
    fn default() -> Self {
        Self {
            key: MessageOrderKey::CreatedAt,
            direction: SortDirection::Asc,
        }
    }
}

impl MessageSort {
    /// Creates a sort order.
    pub fn new(key: MessageOrderKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Compares two messages: pinned first, then the secondary key.
    pub fn compare(&self, a: &DiscussionMessage, b: &DiscussionMessage) -> std::cmp::Ordering {
        // Pinned-first regardless of the secondary direction.
        let by_pin = b.is_pinned.cmp(&a.is_pinned);
        if by_pin != std::cmp::Ordering::Equal {
            return by_pin;
        }
        let by_key = match self.key {
            MessageOrderKey::CreatedAt => a.created_at.cmp(&b.created_at),
            MessageOrderKey::VotesBalance => a.votes_balance.cmp(&b.votes_balance),
        };
        match self.direction {
            SortDirection::Asc => by_key,
            SortDirection::Desc => by_key.reverse(),
        }
    }
}

/// Offset/limit window over a sorted listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Number of leading items to skip.
    pub offset: usize,
    /// Maximum number of items to return; `None` returns the rest.
    pub limit: Option<usize>,
}

impl Page {
    /// Returns everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a window.
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Applies the window to a sorted vector.
    pub fn clamp<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Patch applied to message documents.
///
/// The whole patch applies atomically to one document, or not at all when
/// the `guard_vote` precondition fails. `inc_votes_balance` is an atomic
/// increment: concurrent increments from different callers commute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Replace the text.
    pub set_text: Option<String>,
    /// Stamp the edit timestamp.
    pub set_text_updated_at: Option<u64>,
    /// Replace the pinned flag.
    pub set_pinned: Option<bool>,
    /// Atomically add to the vote balance.
    pub inc_votes_balance: i64,
    /// Add a vote unless the user already has one (set-add semantics).
    pub add_vote: Option<Vote>,
    /// Replace the user's existing vote entry in place.
    pub replace_vote: Option<Vote>,
    /// Precondition: the patch applies only if this exact vote (user and
    /// direction) is currently present on the document.
    pub guard_vote: Option<Vote>,
}

impl MessagePatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.set_text = Some(text.into());
        self
    }

    /// Stamps the edit timestamp.
    pub fn text_updated_at(mut self, millis: u64) -> Self {
        self.set_text_updated_at = Some(millis);
        self
    }

    /// Replaces the pinned flag.
    pub fn pinned(mut self, is_pinned: bool) -> Self {
        self.set_pinned = Some(is_pinned);
        self
    }

    /// Adds to the vote balance.
    pub fn inc_balance(mut self, delta: i64) -> Self {
        self.inc_votes_balance = delta;
        self
    }

    /// Adds a vote with set-add semantics.
    pub fn add_vote(mut self, vote: Vote) -> Self {
        self.add_vote = Some(vote);
        self
    }

    /// Replaces the user's vote entry in place.
    pub fn replace_vote(mut self, vote: Vote) -> Self {
        self.replace_vote = Some(vote);
        self
    }

    /// Guards the patch on the presence of an exact current vote.
    pub fn guard_vote(mut self, vote: Vote) -> Self {
        self.guard_vote = Some(vote);
        self
    }

    /// Applies the patch in place. Returns `false` (without modifying the
    /// document) when the guard precondition fails.
    pub fn apply(&self, message: &mut DiscussionMessage) -> bool {
        if let Some(guard) = &self.guard_vote {
            match message.vote_of(&guard.user) {
                Some(current) if current.is_positive == guard.is_positive => {}
                _ => return false,
            }
        }
        if let Some(text) = &self.set_text {
            message.text = text.clone();
        }
        if let Some(millis) = self.set_text_updated_at {
            message.text_updated_at = Some(millis);
        }
        if let Some(is_pinned) = self.set_pinned {
            message.is_pinned = is_pinned;
        }
        message.votes_balance += self.inc_votes_balance;
        if let Some(vote) = &self.add_vote {
            if message.vote_of(&vote.user).is_none() {
                message.votes.push(vote.clone());
            }
        }
        if let Some(vote) = &self.replace_vote {
            if let Some(slot) = message
                .votes
                .iter_mut()
                .find(|existing| existing.user == vote.user)
            {
                *slot = vote.clone();
            }
        }
        true
    }
}

/// Persistence façade for discussion documents.
pub trait DiscussionStore: Send + Sync {
    /// Inserts one discussion and returns it.
    fn insert_one(&self, discussion: Discussion) -> Result<Discussion>;

    /// Inserts a batch of discussions and returns them.
    ///
    /// The batch is not transactional: a failure may leave a prefix of the
    /// rows inserted.
    fn insert_many(&self, discussions: Vec<Discussion>) -> Result<Vec<Discussion>>;

    /// Looks up a discussion by id.
    fn find_by_id(&self, id: DiscussionId) -> Result<Option<Discussion>>;

    /// Returns the first discussion matching the filter.
    fn find_one(&self, filter: &DiscussionFilter) -> Result<Option<Discussion>>;

    /// Returns all discussions matching the filter, in creation order.
    fn find_many(&self, filter: &DiscussionFilter) -> Result<Vec<Discussion>>;

    /// Counts discussions matching the filter.
    fn count(&self, filter: &DiscussionFilter) -> Result<usize>;

    /// Returns the replication set sharing an imprint, in creation order.
    fn find_by_imprint(&self, imprint: &Imprint) -> Result<Vec<Discussion>>;

    /// Applies a patch to one discussion. Returns `false` if it is absent.
    fn update_one(&self, id: DiscussionId, patch: &DiscussionUpdate) -> Result<bool>;

    /// Applies a patch to every matching discussion; returns the count.
    fn update_many(&self, filter: &DiscussionFilter, patch: &DiscussionUpdate) -> Result<usize>;

    /// Removes every matching discussion; returns the count.
    fn remove_many(&self, filter: &DiscussionFilter) -> Result<usize>;
}

/// Persistence façade for message documents.
pub trait MessageStore: Send + Sync {
    /// Inserts one message and returns it.
    fn insert_one(&self, message: DiscussionMessage) -> Result<DiscussionMessage>;

    /// Inserts a batch of messages and returns them.
    ///
    /// The batch is not transactional: a failure may leave a prefix of the
    /// rows inserted.
    fn insert_many(&self, messages: Vec<DiscussionMessage>) -> Result<Vec<DiscussionMessage>>;

    /// Looks up a message by id.
    fn find_by_id(&self, id: MessageId) -> Result<Option<DiscussionMessage>>;

    /// Returns the first message matching the filter.
    fn find_one(&self, filter: &MessageFilter) -> Result<Option<DiscussionMessage>>;

    /// Returns matching messages, sorted pinned-first then by the secondary
    /// key, windowed by the page.
    fn find_many(
        &self,
        filter: &MessageFilter,
        sort: &MessageSort,
        page: &Page,
    ) -> Result<Vec<DiscussionMessage>>;

    /// Counts messages matching the filter.
    fn count(&self, filter: &MessageFilter) -> Result<usize>;

    /// Atomically applies a patch to one message. Returns `false` if the
    /// message is absent or the patch guard fails.
    fn update_one(&self, id: MessageId, patch: &MessagePatch) -> Result<bool>;

    /// Removes every matching message; returns the count.
    fn remove_many(&self, filter: &MessageFilter) -> Result<usize>;
}
