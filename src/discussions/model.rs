//! Domain entities and drafts for discussions and their messages.
//!
//! These are the persisted document shapes. Construction goes through the
//! `new`/`with_*` builders so defaults (active discussions, empty paths,
//! zero vote balance) are applied in exactly one place.

use crate::discussions::path;
use crate::discussions::types::{
    current_timestamp_millis, DiscussionId, DiscussionKind, HostId, Imprint, MessageId, UserId,
    WeekId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single user's vote on a message. At most one per (message, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The voting user.
    pub user: UserId,
    /// Upvote (`true`) or downvote (`false`).
    pub is_positive: bool,
}

impl Vote {
    /// Creates a vote.
    pub fn new(user: impl Into<UserId>, is_positive: bool) -> Self {
        Self {
            user: user.into(),
            is_positive,
        }
    }
}

/// Optional scoping bounds of a discussion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionBounds {
    /// Program week this discussion is bound to, if any.
    pub week: Option<WeekId>,
}

/// A discussion document: the container messages are posted into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discussion {
    /// Unique id of this discussion.
    pub id: DiscussionId,
    /// Type discriminator; drives message-acceptance policy.
    pub kind: DiscussionKind,
    /// The group or lesson section this discussion is attached to.
    pub host: HostId,
    /// Display title; `None` for implicit discussions (broadcasts, content).
    pub title: Option<String>,
    /// Display description.
    pub description: Option<String>,
    /// Replication key; set only for discussions created as a replicated set.
    pub imprint: Option<Imprint>,
    /// Inactive discussions are retained but no longer surfaced as current.
    pub is_active: bool,
    /// Optional scoping bounds.
    pub bounds: DiscussionBounds,
    /// Creation timestamp in milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl Discussion {
    /// Creates an active discussion with defaults.
    pub fn new(kind: DiscussionKind, host: HostId) -> Self {
        Self {
            id: DiscussionId::generate(),
            kind,
            host,
            title: None,
            description: None,
            imprint: None,
            is_active: true,
            bounds: DiscussionBounds::default(),
            created_at: current_timestamp_millis(),
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stamps the replication key.
    pub fn with_imprint(mut self, imprint: Imprint) -> Self {
        self.imprint = Some(imprint);
        self
    }

    /// Binds the discussion to a program week.
    pub fn with_week(mut self, week: Option<WeekId>) -> Self {
        self.bounds.week = week;
        self
    }
}

/// A message in a discussion's reply tree.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionMessage {
    /// Unique id of this message.
    pub id: MessageId,
    /// The owning discussion.
    pub discussion: DiscussionId,
    /// The author.
    pub user: UserId,
    /// Message text.
    pub text: String,
    /// Materialized ancestor path; empty for root messages.
    pub path: String,
    /// Votes, at most one per user.
    pub votes: Vec<Vote>,
    /// Cached positive-minus-negative vote count, maintained eagerly.
    pub votes_balance: i64,
    /// Pinned messages sort before all unpinned ones.
    pub is_pinned: bool,
    /// True for messages delivered through the broadcast operation.
    pub is_broadcast: bool,
    /// Id of the message this one was cloned from, if any.
    pub origin: Option<MessageId>,
    /// Broadcast correlation tag shared by the copies of one broadcast.
    pub imprint: Option<Imprint>,
    /// Set when the text was edited after creation.
    pub text_updated_at: Option<u64>,
    /// Creation timestamp in milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl fmt::Debug for DiscussionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscussionMessage")
            .field("id", &self.id)
            .field("discussion", &self.discussion)
            .field("user", &self.user)
            .field("path", &self.path)
            .field("text_len", &self.text.len())
            .field("votes_balance", &self.votes_balance)
            .field("is_pinned", &self.is_pinned)
            .finish()
    }
}

impl DiscussionMessage {
    /// Creates a root message with defaults.
    pub fn new(
        discussion: DiscussionId,
        user: impl Into<UserId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            discussion,
            user: user.into(),
            text: text.into(),
            path: String::new(),
            votes: Vec::new(),
            votes_balance: 0,
            is_pinned: false,
            is_broadcast: false,
            origin: None,
            imprint: None,
            text_updated_at: None,
            created_at: current_timestamp_millis(),
        }
    }

    /// Places the message at a position in the reply tree.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the pinned flag.
    pub fn with_pinned(mut self, is_pinned: bool) -> Self {
        self.is_pinned = is_pinned;
        self
    }

    /// Marks the message as a broadcast copy carrying a correlation tag.
    pub fn as_broadcast(mut self, imprint: Imprint) -> Self {
        self.is_broadcast = true;
        self.imprint = Some(imprint);
        self
    }

    /// Records the message this one was cloned from.
    pub fn with_origin(mut self, origin: MessageId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Returns this user's vote, if present.
    pub fn vote_of(&self, user: &UserId) -> Option<&Vote> {
        self.votes.iter().find(|vote| &vote.user == user)
    }

    /// Returns the nesting level (0 for root messages).
    pub fn nesting_level(&self) -> usize {
        path::count_units(&self.path)
    }
}

/// Caller-supplied content for a new message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Message text.
    pub text: String,
    /// Requested pin state; honored only for tutors.
    pub is_pinned: bool,
}

impl MessageDraft {
    /// Creates an unpinned draft.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_pinned: false,
        }
    }

    /// Requests the message to be pinned.
    pub fn pinned(mut self) -> Self {
        self.is_pinned = true;
        self
    }
}

/// Caller-supplied content for a topic discussion replicated across groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDraft {
    /// Topic title.
    pub title: String,
    /// Topic description.
    pub description: String,
    /// The primary group; the created discussion for it is returned.
    pub in_host: HostId,
    /// Additional groups receiving replicas.
    pub also_in_hosts: Vec<HostId>,
    /// Optional week binding; must reference an existing week.
    pub bind_to_week: Option<WeekId>,
}

impl TopicDraft {
    /// Creates a topic draft for a single group.
    pub fn new(title: impl Into<String>, description: impl Into<String>, in_host: HostId) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            in_host,
            also_in_hosts: Vec::new(),
            bind_to_week: None,
        }
    }

    /// Adds replica groups.
    pub fn also_in(mut self, hosts: Vec<HostId>) -> Self {
        self.also_in_hosts = hosts;
        self
    }

    /// Binds the topic to a week.
    pub fn bound_to_week(mut self, week: WeekId) -> Self {
        self.bind_to_week = Some(week);
        self
    }
}

/// Field payload for replicated discussion creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscussionDraft {
    /// Display title.
    pub title: Option<String>,
    /// Display description.
    pub description: Option<String>,
    /// Optional week binding.
    pub week: Option<WeekId>,
}

/// Title/description patch applied across a replication set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionPatch {
    /// New title, if changing.
    pub title: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
}

impl DiscussionPatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}
