//! Vote ledger: per-message vote sets and the cached balance counter.
//!
//! The balance is an eagerly-maintained cache of
//! `positive votes − negative votes`, kept consistent by expressing every
//! transition as a single atomic document update:
//!
//! - first vote: set-add the vote and increment the balance by ±1
//! - repeated vote in the same direction: no write at all
//! - flipped vote: adjust the balance by ±2 and replace the vote in place,
//!   guarded by the previous direction — if another writer flipped the same
//!   user's vote in between, the guard fails and this call becomes a no-op
//!   instead of double-applying the adjustment
//!
//! [`VoteLedger::count_votes`] recomputes tallies from the vote set itself
//! and exists as the independent cross-check for the cached balance.

use crate::discussions::events::DiscussionEvent;
use crate::discussions::model::{DiscussionMessage, Vote};
use crate::discussions::types::{MessageId, UserId};
use crate::error::{ColloquyError, Result};
use crate::store::{MessageFilter, MessagePatch, MessageStore};
use std::sync::Arc;
use tracing::debug;

/// Filter over a message's vote set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteFilter {
    /// Restrict to one direction.
    pub is_positive: Option<bool>,
}

impl VoteFilter {
    /// Matches every vote.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches positive votes only.
    pub fn positive() -> Self {
        Self {
            is_positive: Some(true),
        }
    }

    /// Matches negative votes only.
    pub fn negative() -> Self {
        Self {
            is_positive: Some(false),
        }
    }

    fn matches(&self, vote: &Vote) -> bool {
        match self.is_positive {
            Some(expected) => vote.is_positive == expected,
            None => true,
        }
    }
}

/// Outcome of a put-vote call.
#[derive(Debug)]
pub struct VoteOutcome {
    /// Whether the store was modified. Idempotent repeats and lost
    /// same-user races report `false`.
    pub changed: bool,
    /// The message as stored after the call.
    pub message: DiscussionMessage,
    /// Events to emit; empty when nothing changed.
    pub events: Vec<DiscussionEvent>,
}

/// Maintains vote sets and their cached balances.
pub struct VoteLedger {
    messages: Arc<dyn MessageStore>,
}

impl VoteLedger {
    /// Creates a ledger over a message store.
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }

    /// Applies a user's vote to a message.
    ///
    /// # Errors
    /// Returns `NotFound` if the message does not exist.
    pub fn put_vote(
        &self,
        message_id: MessageId,
        user: &UserId,
        is_positive: bool,
    ) -> Result<VoteOutcome> {
        let message = self.require(message_id)?;
        let vote = Vote::new(user.clone(), is_positive);

        let changed = match message.vote_of(user) {
            None => {
                let delta = if is_positive { 1 } else { -1 };
                let patch = MessagePatch::new().inc_balance(delta).add_vote(vote);
                self.messages.update_one(message_id, &patch)?
            }
            Some(previous) if previous.is_positive == is_positive => {
                // Idempotent repeat.
                false
            }
            Some(previous) => {
                let delta = if previous.is_positive { -2 } else { 2 };
                let patch = MessagePatch::new()
                    .inc_balance(delta)
                    .replace_vote(vote)
                    .guard_vote(previous.clone());
                let applied = self.messages.update_one(message_id, &patch)?;
                if !applied {
                    debug!(%message_id, user = %user, "vote flip lost a race, skipped");
                }
                applied
            }
        };

        let message = self.require(message_id)?;
        let events = if changed {
            debug!(
                %message_id,
                user = %user,
                balance = message.votes_balance,
                "vote applied"
            );
            vec![DiscussionEvent::MessageVote {
                message: message.clone(),
                raised_by: user.clone(),
            }]
        } else {
            Vec::new()
        };

        Ok(VoteOutcome {
            changed,
            message,
            events,
        })
    }

    /// Tallies matching votes directly from the vote set.
    ///
    /// This bypasses the cached balance on purpose: it is the recomputable
    /// source of truth used for auditing the cache.
    ///
    /// # Errors
    /// Returns `NotFound` if the message does not exist.
    pub fn count_votes(&self, message_id: MessageId, filter: VoteFilter) -> Result<usize> {
        let message = self.require(message_id)?;
        Ok(message
            .votes
            .iter()
            .filter(|vote| filter.matches(vote))
            .count())
    }

    /// Returns a user's vote on a message, if present.
    ///
    /// # Errors
    /// Returns `NotFound` if the message does not exist.
    pub fn find_vote_of_user(
        &self,
        message_id: MessageId,
        user: &UserId,
    ) -> Result<Option<Vote>> {
        self.require(message_id)?;
        let found = self.messages.find_one(
            &MessageFilter::new()
                .ids(vec![message_id])
                .voted_by(user.clone()),
        )?;
        Ok(found.and_then(|message| message.vote_of(user).cloned()))
    }

    fn require(&self, message_id: MessageId) -> Result<DiscussionMessage> {
        self.messages.find_by_id(message_id)?.ok_or_else(|| {
            ColloquyError::not_found(format!("Discussion message {} not found!", message_id))
        })
    }
}
