//! In-memory reference implementation of the store façades.
//!
//! Rows live in insertion-ordered vectors behind `RwLock`s. Every patch is
//! applied under the write lock, which gives the single-document atomicity
//! the ledger relies on: concurrent balance increments are serialized at the
//! document and therefore commute. There are no cross-document transactions,
//! matching the contract of the real store.

use crate::discussions::model::{Discussion, DiscussionMessage};
use crate::discussions::types::{DiscussionId, Imprint, MessageId};
use crate::error::{ColloquyError, Result};
use crate::store::{
    DiscussionFilter, DiscussionStore, DiscussionUpdate, MessageFilter, MessagePatch, MessageSort,
    MessageStore, Page,
};
use std::sync::RwLock;
use tracing::debug;

/// In-memory discussion store.
#[derive(Debug, Default)]
pub struct MemoryDiscussionStore {
    rows: RwLock<Vec<Discussion>>,
}

impl MemoryDiscussionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Discussion>>> {
        self.rows
            .read()
            .map_err(|_| ColloquyError::storage("discussion store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Discussion>>> {
        self.rows
            .write()
            .map_err(|_| ColloquyError::storage("discussion store lock poisoned"))
    }
}

impl DiscussionStore for MemoryDiscussionStore {
    fn insert_one(&self, discussion: Discussion) -> Result<Discussion> {
        self.write()?.push(discussion.clone());
        Ok(discussion)
    }

    fn insert_many(&self, discussions: Vec<Discussion>) -> Result<Vec<Discussion>> {
        let mut rows = self.write()?;
        rows.extend(discussions.iter().cloned());
        debug!(inserted = discussions.len(), "inserted discussion batch");
        Ok(discussions)
    }

    fn find_by_id(&self, id: DiscussionId) -> Result<Option<Discussion>> {
        Ok(self.read()?.iter().find(|row| row.id == id).cloned())
    }

    fn find_one(&self, filter: &DiscussionFilter) -> Result<Option<Discussion>> {
        Ok(self.read()?.iter().find(|row| filter.matches(row)).cloned())
    }

    fn find_many(&self, filter: &DiscussionFilter) -> Result<Vec<Discussion>> {
        Ok(self
            .read()?
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    fn count(&self, filter: &DiscussionFilter) -> Result<usize> {
        Ok(self.read()?.iter().filter(|row| filter.matches(row)).count())
    }

    fn find_by_imprint(&self, imprint: &Imprint) -> Result<Vec<Discussion>> {
        self.find_many(&DiscussionFilter::new().imprint(imprint.clone()))
    }

    fn update_one(&self, id: DiscussionId, patch: &DiscussionUpdate) -> Result<bool> {
        let mut rows = self.write()?;
        match rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                patch.apply(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_many(&self, filter: &DiscussionFilter, patch: &DiscussionUpdate) -> Result<usize> {
        let mut rows = self.write()?;
        let mut updated = 0;
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            patch.apply(row);
            updated += 1;
        }
        Ok(updated)
    }

    fn remove_many(&self, filter: &DiscussionFilter) -> Result<usize> {
        let mut rows = self.write()?;
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok(before - rows.len())
    }
}

/// In-memory message store.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    rows: RwLock<Vec<DiscussionMessage>>,
}

impl MemoryMessageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<DiscussionMessage>>> {
        self.rows
            .read()
            .map_err(|_| ColloquyError::storage("message store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<DiscussionMessage>>> {
        self.rows
            .write()
            .map_err(|_| ColloquyError::storage("message store lock poisoned"))
    }
}

impl MessageStore for MemoryMessageStore {
    fn insert_one(&self, message: DiscussionMessage) -> Result<DiscussionMessage> {
        self.write()?.push(message.clone());
        Ok(message)
    }

    fn insert_many(&self, messages: Vec<DiscussionMessage>) -> Result<Vec<DiscussionMessage>> {
        let mut rows = self.write()?;
        rows.extend(messages.iter().cloned());
        debug!(inserted = messages.len(), "inserted message batch");
        Ok(messages)
    }

    fn find_by_id(&self, id: MessageId) -> Result<Option<DiscussionMessage>> {
        Ok(self.read()?.iter().find(|row| row.id == id).cloned())
    }

    fn find_one(&self, filter: &MessageFilter) -> Result<Option<DiscussionMessage>> {
        Ok(self.read()?.iter().find(|row| filter.matches(row)).cloned())
    }

    fn find_many(
        &self,
        filter: &MessageFilter,
        sort: &MessageSort,
        page: &Page,
    ) -> Result<Vec<DiscussionMessage>> {
        let mut matched: Vec<DiscussionMessage> = self
            .read()?
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        // Stable sort keeps insertion order within equal keys.
        matched.sort_by(|a, b| sort.compare(a, b));
        Ok(page.clamp(matched))
    }

    fn count(&self, filter: &MessageFilter) -> Result<usize> {
        Ok(self.read()?.iter().filter(|row| filter.matches(row)).count())
    }

    fn update_one(&self, id: MessageId, patch: &MessagePatch) -> Result<bool> {
        let mut rows = self.write()?;
        match rows.iter_mut().find(|row| row.id == id) {
            Some(row) => Ok(patch.apply(row)),
            None => Ok(false),
        }
    }

    fn remove_many(&self, filter: &MessageFilter) -> Result<usize> {
        let mut rows = self.write()?;
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        let removed = before - rows.len();
        if removed > 0 {
            debug!(removed, "removed message batch");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discussions::model::Vote;
    use crate::discussions::path::{self, PathMatch};
    use crate::discussions::types::{DiscussionKind, HostId};
    use std::sync::Arc;

    #[test]
    fn test_discussion_roundtrip() {
        let store = MemoryDiscussionStore::new();
        let discussion =
            Discussion::new(DiscussionKind::GroupTopicDiscussion, HostId::generate());
        let id = discussion.id;

        store.insert_one(discussion).unwrap();
        let loaded = store.find_by_id(id).unwrap().expect("missing discussion");
        assert_eq!(loaded.id, id);
        assert!(store.find_by_id(DiscussionId::generate()).unwrap().is_none());
    }

    #[test]
    fn test_update_many_counts() {
        let store = MemoryDiscussionStore::new();
        let host = HostId::generate();
        for _ in 0..3 {
            store
                .insert_one(Discussion::new(DiscussionKind::GroupTopicDiscussion, host))
                .unwrap();
        }

        let updated = store
            .update_many(
                &DiscussionFilter::new().hosts(vec![host]),
                &DiscussionUpdate::new().active(false),
            )
            .unwrap();

        assert_eq!(updated, 3);
        assert_eq!(
            store
                .count(&DiscussionFilter::new().active(false))
                .unwrap(),
            3
        );
    }

    #[test]
    fn test_message_listing_sorted_and_paged() {
        let store = MemoryMessageStore::new();
        let discussion = DiscussionId::generate();
        for i in 0..5u64 {
            let mut message = DiscussionMessage::new(discussion, "author", format!("m{}", i));
            message.created_at = i;
            message.is_pinned = i == 3;
            store.insert_one(message).unwrap();
        }

        let listed = store
            .find_many(
                &MessageFilter::new().discussion(discussion),
                &MessageSort::default(),
                &Page::new(0, 3),
            )
            .unwrap();

        assert_eq!(listed.len(), 3);
        assert!(listed[0].is_pinned);
        assert!(listed[1].created_at < listed[2].created_at);
    }

    #[test]
    fn test_path_filter_evaluation() {
        let store = MemoryMessageStore::new();
        let discussion = DiscussionId::generate();
        let root = DiscussionMessage::new(discussion, "a", "root");
        let reply = DiscussionMessage::new(discussion, "b", "reply")
            .with_path(path::rebuild("", root.id));
        store.insert_one(root.clone()).unwrap();
        store.insert_one(reply).unwrap();

        let roots = store
            .find_many(
                &MessageFilter::new().discussion(discussion).path(PathMatch::Root),
                &MessageSort::default(),
                &Page::all(),
            )
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);

        let replies = store
            .count(&MessageFilter::new().path(PathMatch::DirectReplyTo(root.id)))
            .unwrap();
        assert_eq!(replies, 1);
    }

    #[test]
    fn test_update_one_missing_is_false() {
        let store = MemoryMessageStore::new();
        let applied = store
            .update_one(MessageId::generate(), &MessagePatch::new().pinned(true))
            .unwrap();
        assert!(!applied);
    }

    #[test]
    fn test_concurrent_increments_commute() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = DiscussionMessage::new(DiscussionId::generate(), "author", "voted");
        let id = message.id;
        store.insert_one(message).unwrap();

        let mut handles = Vec::new();
        for voter in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let patch = MessagePatch::new()
                    .inc_balance(1)
                    .add_vote(Vote::new(format!("voter-{}", voter), true));
                store.update_one(id, &patch).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.votes_balance, 8);
        assert_eq!(loaded.votes.len(), 8);
    }
}
