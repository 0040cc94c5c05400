//! Persistent RocksDB-backed implementation of the store façades.
//!
//! ## Storage layout
//!
//! Column families:
//! - `discussions`: discussion id -> serialized row
//! - `messages`: message id -> serialized row
//! - `idx_discussion_imprint`: `{imprint}:{discussion_id}` -> () (imprint
//!   lookup without a full scan)
//! - `idx_message_discussion`: `{discussion_id}:{message_id}` -> ()
//!   (per-discussion message listing without a full scan)
//!
//! One [`RocksStorage`] value implements both store traits; clone the `Arc`
//! and coerce per trait.
//!
//! ## Update atomicity
//!
//! RocksDB has no read-modify-write primitive for serialized rows, so each
//! collection carries a write mutex: `update_*` and `remove_*` hold it for
//! the read-apply-write cycle. That serializes writers per collection, which
//! is enough for the single-document atomicity the contract asks for;
//! readers never block.

use crate::discussions::model::{Discussion, DiscussionMessage};
use crate::discussions::types::{DiscussionId, Imprint, MessageId};
use crate::error::{ColloquyError, Result};
use crate::store::rocksdb::{composite_key, RocksDbConfig, RocksDbHandle};
use crate::store::{
    DiscussionFilter, DiscussionStore, DiscussionUpdate, MessageFilter, MessagePatch, MessageSort,
    MessageStore, Page,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Database subdirectory.
const DB_DIR: &str = "discussions_db";

/// Column family names.
const CF_DISCUSSIONS: &str = "discussions";
const CF_MESSAGES: &str = "messages";
const CF_IDX_DISCUSSION_IMPRINT: &str = "idx_discussion_imprint";
const CF_IDX_MESSAGE_DISCUSSION: &str = "idx_message_discussion";

/// RocksDB-backed discussion and message stores.
#[derive(Debug)]
pub struct RocksStorage {
    db: RocksDbHandle,
    discussions_lock: Mutex<()>,
    messages_lock: Mutex<()>,
}

impl RocksStorage {
    /// Opens (or creates) the storage under a data directory.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let db_path = data_dir.as_ref().join(DB_DIR);
        let config = RocksDbConfig::default();
        let column_families = &[
            CF_DISCUSSIONS,
            CF_MESSAGES,
            CF_IDX_DISCUSSION_IMPRINT,
            CF_IDX_MESSAGE_DISCUSSION,
        ];

        let db = RocksDbHandle::open(&db_path, &config, column_families)?;
        info!("Opened discussion RocksDB at {:?}", db_path);
        Ok(Self {
            db,
            discussions_lock: Mutex::new(()),
            messages_lock: Mutex::new(()),
        })
    }

    fn imprint_index_key(imprint: &Imprint, id: DiscussionId) -> Vec<u8> {
        composite_key(imprint.to_string().as_bytes(), id.as_bytes())
    }

    fn message_index_key(discussion: DiscussionId, id: MessageId) -> Vec<u8> {
        composite_key(discussion.as_bytes(), id.as_bytes())
    }

    fn put_discussion(&self, discussion: &Discussion) -> Result<()> {
        self.db
            .put(CF_DISCUSSIONS, discussion.id.as_bytes(), discussion)?;
        if let Some(imprint) = &discussion.imprint {
            self.db.put(
                CF_IDX_DISCUSSION_IMPRINT,
                &Self::imprint_index_key(imprint, discussion.id),
                &(),
            )?;
        }
        Ok(())
    }

    fn put_message(&self, message: &DiscussionMessage) -> Result<()> {
        self.db.put(CF_MESSAGES, message.id.as_bytes(), message)?;
        self.db.put(
            CF_IDX_MESSAGE_DISCUSSION,
            &Self::message_index_key(message.discussion, message.id),
            &(),
        )?;
        Ok(())
    }

    /// Collects discussions matching a filter, using the imprint index when
    /// the filter allows, in deterministic creation order.
    fn collect_discussions(&self, filter: &DiscussionFilter) -> Result<Vec<Discussion>> {
        let mut matched: Vec<Discussion> = Vec::new();

        if let Some(imprint) = &filter.imprint {
            let mut prefix = imprint.to_string().into_bytes();
            prefix.push(b':');
            for id in self.db.key_suffixes(CF_IDX_DISCUSSION_IMPRINT, &prefix)? {
                if let Some(discussion) = self.db.get::<Discussion>(CF_DISCUSSIONS, &id)? {
                    if filter.matches(&discussion) {
                        matched.push(discussion);
                    }
                }
            }
        } else {
            self.db.for_each_row::<Discussion, _>(CF_DISCUSSIONS, |discussion| {
                if filter.matches(&discussion) {
                    matched.push(discussion);
                }
                true
            })?;
        }

        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_bytes().cmp(b.id.as_bytes()))
        });
        Ok(matched)
    }

    /// Collects messages matching a filter, using the discussion index when
    /// the filter names one.
    fn collect_messages(&self, filter: &MessageFilter) -> Result<Vec<DiscussionMessage>> {
        let mut matched: Vec<DiscussionMessage> = Vec::new();

        if let Some(discussion) = filter.discussion {
            let mut prefix = discussion.as_bytes().to_vec();
            prefix.push(b':');
            for id in self.db.key_suffixes(CF_IDX_MESSAGE_DISCUSSION, &prefix)? {
                if let Some(message) = self.db.get::<DiscussionMessage>(CF_MESSAGES, &id)? {
                    if filter.matches(&message) {
                        matched.push(message);
                    }
                }
            }
        } else {
            self.db
                .for_each_row::<DiscussionMessage, _>(CF_MESSAGES, |message| {
                    if filter.matches(&message) {
                        matched.push(message);
                    }
                    true
                })?;
        }

        Ok(matched)
    }

    fn lock<'a>(&self, lock: &'a Mutex<()>) -> Result<std::sync::MutexGuard<'a, ()>> {
        lock.lock()
            .map_err(|_| ColloquyError::storage("store write lock poisoned"))
    }
}

impl DiscussionStore for RocksStorage {
    fn insert_one(&self, discussion: Discussion) -> Result<Discussion> {
        self.put_discussion(&discussion)?;
        Ok(discussion)
    }

    fn insert_many(&self, discussions: Vec<Discussion>) -> Result<Vec<Discussion>> {
        for discussion in &discussions {
            self.put_discussion(discussion)?;
        }
        Ok(discussions)
    }

    fn find_by_id(&self, id: DiscussionId) -> Result<Option<Discussion>> {
        self.db.get(CF_DISCUSSIONS, id.as_bytes())
    }

    fn find_one(&self, filter: &DiscussionFilter) -> Result<Option<Discussion>> {
        Ok(self.collect_discussions(filter)?.into_iter().next())
    }

    fn find_many(&self, filter: &DiscussionFilter) -> Result<Vec<Discussion>> {
        self.collect_discussions(filter)
    }

    fn count(&self, filter: &DiscussionFilter) -> Result<usize> {
        Ok(self.collect_discussions(filter)?.len())
    }

    fn find_by_imprint(&self, imprint: &Imprint) -> Result<Vec<Discussion>> {
        self.collect_discussions(&DiscussionFilter::new().imprint(imprint.clone()))
    }

    fn update_one(&self, id: DiscussionId, patch: &DiscussionUpdate) -> Result<bool> {
        let _guard = self.lock(&self.discussions_lock)?;
        match self.db.get::<Discussion>(CF_DISCUSSIONS, id.as_bytes())? {
            Some(mut discussion) => {
                patch.apply(&mut discussion);
                self.put_discussion(&discussion)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_many(&self, filter: &DiscussionFilter, patch: &DiscussionUpdate) -> Result<usize> {
        let _guard = self.lock(&self.discussions_lock)?;
        let matched = self.collect_discussions(filter)?;
        for mut discussion in matched.iter().cloned() {
            patch.apply(&mut discussion);
            self.put_discussion(&discussion)?;
        }
        Ok(matched.len())
    }

    fn remove_many(&self, filter: &DiscussionFilter) -> Result<usize> {
        let _guard = self.lock(&self.discussions_lock)?;
        let matched = self.collect_discussions(filter)?;
        for discussion in &matched {
            self.db.delete(CF_DISCUSSIONS, discussion.id.as_bytes())?;
            if let Some(imprint) = &discussion.imprint {
                self.db.delete(
                    CF_IDX_DISCUSSION_IMPRINT,
                    &Self::imprint_index_key(imprint, discussion.id),
                )?;
            }
        }
        Ok(matched.len())
    }
}

impl MessageStore for RocksStorage {
    fn insert_one(&self, message: DiscussionMessage) -> Result<DiscussionMessage> {
        self.put_message(&message)?;
        Ok(message)
    }

    fn insert_many(&self, messages: Vec<DiscussionMessage>) -> Result<Vec<DiscussionMessage>> {
        for message in &messages {
            self.put_message(message)?;
        }
        Ok(messages)
    }

    fn find_by_id(&self, id: MessageId) -> Result<Option<DiscussionMessage>> {
        self.db.get(CF_MESSAGES, id.as_bytes())
    }

    fn find_one(&self, filter: &MessageFilter) -> Result<Option<DiscussionMessage>> {
        Ok(self.collect_messages(filter)?.into_iter().next())
    }

    fn find_many(
        &self,
        filter: &MessageFilter,
        sort: &MessageSort,
        page: &Page,
    ) -> Result<Vec<DiscussionMessage>> {
        let mut matched = self.collect_messages(filter)?;
        // Deterministic order: requested sort, then creation time, then id.
        matched.sort_by(|a, b| {
            sort.compare(a, b)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.as_bytes().cmp(b.id.as_bytes()))
        });
        Ok(page.clamp(matched))
    }

    fn count(&self, filter: &MessageFilter) -> Result<usize> {
        Ok(self.collect_messages(filter)?.len())
    }

    fn update_one(&self, id: MessageId, patch: &MessagePatch) -> Result<bool> {
        let _guard = self.lock(&self.messages_lock)?;
        match self.db.get::<DiscussionMessage>(CF_MESSAGES, id.as_bytes())? {
            Some(mut message) => {
                if !patch.apply(&mut message) {
                    return Ok(false);
                }
                self.put_message(&message)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_many(&self, filter: &MessageFilter) -> Result<usize> {
        let _guard = self.lock(&self.messages_lock)?;
        let matched = self.collect_messages(filter)?;
        for message in &matched {
            self.db.delete(CF_MESSAGES, message.id.as_bytes())?;
            self.db.delete(
                CF_IDX_MESSAGE_DISCUSSION,
                &Self::message_index_key(message.discussion, message.id),
            )?;
        }
        Ok(matched.len())
    }
}
