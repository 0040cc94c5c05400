//! Events produced by discussion operations.
//!
//! Core operations never publish directly. Each mutating operation returns
//! its result together with an ordered list of events; the calling layer
//! publishes them through an [`EventSink`] after the write has committed.
//! This keeps core correctness independent of delivery and makes every
//! operation testable without a live fan-out system.
//!
//! Subscriber-side filtering (by discussion or host, excluding the acting
//! user) lives in the subscriber; events carry `raised_by` for that purpose.

use crate::discussions::model::{Discussion, DiscussionMessage};
use crate::discussions::types::{DiscussionId, HostId, MessageId, UserId};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Topic names of the fan-out channels this crate publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    MessageCreate,
    MessageUpdate,
    MessageVote,
    MessagePinChange,
    MessageRemove,
    MessageReply,
    DiscussionCreate,
    DiscussionUpdate,
    DiscussionRemove,
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTopic::MessageCreate => write!(f, "message-create"),
            EventTopic::MessageUpdate => write!(f, "message-update"),
            EventTopic::MessageVote => write!(f, "message-vote"),
            EventTopic::MessagePinChange => write!(f, "message-pin-change"),
            EventTopic::MessageRemove => write!(f, "message-remove"),
            EventTopic::MessageReply => write!(f, "message-reply"),
            EventTopic::DiscussionCreate => write!(f, "discussion-create"),
            EventTopic::DiscussionUpdate => write!(f, "discussion-update"),
            EventTopic::DiscussionRemove => write!(f, "discussion-remove"),
        }
    }
}

/// A single event to emit, with its full payload.
#[derive(Debug, Clone, Serialize)]
pub enum DiscussionEvent {
    /// A message was created (post, reply, clone, or broadcast copy).
    MessageCreate {
        message: DiscussionMessage,
        raised_by: UserId,
    },
    /// A message's text was edited.
    MessageUpdate {
        message: DiscussionMessage,
        raised_by: UserId,
    },
    /// A vote was applied to a message.
    MessageVote {
        message: DiscussionMessage,
        raised_by: UserId,
    },
    /// A message's pinned state changed.
    MessagePinChange {
        message: DiscussionMessage,
        raised_by: UserId,
    },
    /// A message subtree was removed. Carries the tree coordinates of the
    /// removed root so subscribers can prune without re-reading.
    MessageRemove {
        discussion: DiscussionId,
        message: MessageId,
        parent: Option<MessageId>,
        root: Option<MessageId>,
        raised_by: UserId,
    },
    /// A reply was posted; addressed to the parent message's author.
    MessageReply {
        message: DiscussionMessage,
        to_user: UserId,
        raised_by: UserId,
    },
    /// A discussion was created.
    DiscussionCreate {
        discussion: Discussion,
        host: HostId,
        raised_by: UserId,
    },
    /// A discussion's title/description changed.
    DiscussionUpdate {
        discussion: Discussion,
        host: HostId,
        raised_by: UserId,
    },
    /// A discussion and all its messages were removed.
    DiscussionRemove {
        discussion: Discussion,
        host: HostId,
        raised_by: UserId,
    },
}

impl DiscussionEvent {
    /// Returns the topic this event publishes on.
    pub fn topic(&self) -> EventTopic {
        match self {
            DiscussionEvent::MessageCreate { .. } => EventTopic::MessageCreate,
            DiscussionEvent::MessageUpdate { .. } => EventTopic::MessageUpdate,
            DiscussionEvent::MessageVote { .. } => EventTopic::MessageVote,
            DiscussionEvent::MessagePinChange { .. } => EventTopic::MessagePinChange,
            DiscussionEvent::MessageRemove { .. } => EventTopic::MessageRemove,
            DiscussionEvent::MessageReply { .. } => EventTopic::MessageReply,
            DiscussionEvent::DiscussionCreate { .. } => EventTopic::DiscussionCreate,
            DiscussionEvent::DiscussionUpdate { .. } => EventTopic::DiscussionUpdate,
            DiscussionEvent::DiscussionRemove { .. } => EventTopic::DiscussionRemove,
        }
    }

    /// Returns the user whose action raised this event.
    pub fn raised_by(&self) -> &UserId {
        match self {
            DiscussionEvent::MessageCreate { raised_by, .. }
            | DiscussionEvent::MessageUpdate { raised_by, .. }
            | DiscussionEvent::MessageVote { raised_by, .. }
            | DiscussionEvent::MessagePinChange { raised_by, .. }
            | DiscussionEvent::MessageRemove { raised_by, .. }
            | DiscussionEvent::MessageReply { raised_by, .. }
            | DiscussionEvent::DiscussionCreate { raised_by, .. }
            | DiscussionEvent::DiscussionUpdate { raised_by, .. }
            | DiscussionEvent::DiscussionRemove { raised_by, .. } => raised_by,
        }
    }

    /// Returns the discussion this event concerns.
    pub fn discussion_id(&self) -> DiscussionId {
        match self {
            DiscussionEvent::MessageCreate { message, .. }
            | DiscussionEvent::MessageUpdate { message, .. }
            | DiscussionEvent::MessageVote { message, .. }
            | DiscussionEvent::MessagePinChange { message, .. }
            | DiscussionEvent::MessageReply { message, .. } => message.discussion,
            DiscussionEvent::MessageRemove { discussion, .. } => *discussion,
            DiscussionEvent::DiscussionCreate { discussion, .. }
            | DiscussionEvent::DiscussionUpdate { discussion, .. }
            | DiscussionEvent::DiscussionRemove { discussion, .. } => discussion.id,
        }
    }

    /// Renders the payload for transport to the fan-out collaborator.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// The produced-to fan-out collaborator.
pub trait EventSink: Send + Sync {
    /// Publishes one event on its topic.
    fn publish(&self, event: &DiscussionEvent);
}

/// Publishes a batch of events in order.
pub fn publish_all(sink: &dyn EventSink, events: &[DiscussionEvent]) {
    for event in events {
        sink.publish(event);
    }
}

/// Recording sink for tests and in-process embedders.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiscussionEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the topics of all recorded events, in publish order.
    pub fn topics(&self) -> Vec<EventTopic> {
        self.events
            .lock()
            .expect("event sink poisoned")
            .iter()
            .map(DiscussionEvent::topic)
            .collect()
    }

    /// Removes and returns all recorded events.
    pub fn drain(&self) -> Vec<DiscussionEvent> {
        std::mem::take(&mut *self.events.lock().expect("event sink poisoned"))
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &DiscussionEvent) {
        self.events
            .lock()
            .expect("event sink poisoned")
            .push(event.clone());
    }
}
