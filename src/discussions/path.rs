//! Materialized-path codec for the message tree.
//!
//! A message's position in its reply tree is persisted as a single string:
//! the ids of its strict ancestors in root-to-immediate-parent order, joined
//! by the delimiter, with a leading and trailing delimiter when non-empty.
//! Root messages have the empty path.
//!
//! ```text
//! ""                  root message
//! ",a,"               direct reply to message a
//! ",a,b,"             reply to b, which is a reply to a
//! ```
//!
//! The leading and trailing delimiters make segment matching unambiguous: a
//! message id appears in a path if and only if `",{id},"` is a substring.
//!
//! Everything in this module is a pure string or predicate builder; nothing
//! here touches storage. A malformed path (a segment that is not an id) is a
//! programmer error, not a runtime condition, and fails fast with a panic.

use crate::discussions::types::MessageId;
use serde::{Deserialize, Serialize};

/// Delimiter between ancestor ids in a materialized path.
pub const PATH_DELIMITER: char = ',';

/// Builds the path of a reply from its parent's path and id.
pub fn rebuild(parent_path: &str, parent_id: MessageId) -> String {
    if parent_path.is_empty() {
        format!("{d}{id}{d}", d = PATH_DELIMITER, id = parent_id)
    } else {
        // Non-empty paths already end with the delimiter.
        format!("{path}{id}{d}", path = parent_path, id = parent_id, d = PATH_DELIMITER)
    }
}

/// Returns the full ancestor chain encoded in a path, root first.
///
/// # Panics
/// Panics if a segment is not a well-formed message id. Paths are only ever
/// produced by [`rebuild`], so a malformed path means corrupted data or a
/// caller bypassing the codec.
pub fn segments(path: &str) -> Vec<MessageId> {
    path.split(PATH_DELIMITER)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            MessageId::parse(segment).unwrap_or_else(|| {
                panic!("malformed path segment `{}` in `{}`", segment, path)
            })
        })
        .collect()
}

/// Returns the id of the immediate parent, or `None` for root messages.
pub fn pick_parent(path: &str) -> Option<MessageId> {
    segments(path).pop()
}

/// Returns the id of the root ancestor, or `None` for root messages.
pub fn pick_root(path: &str) -> Option<MessageId> {
    segments(path).first().copied()
}

/// Returns the nesting level: the number of ancestor ids encoded.
pub fn count_units(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        segments(path).len()
    }
}

/// Returns the one-element path of a direct reply to `id`.
pub fn direct_reply_path(id: MessageId) -> String {
    rebuild("", id)
}

/// Returns true if `id` appears as a segment anywhere in `path`.
pub fn contains_segment(path: &str, id: MessageId) -> bool {
    path.contains(&format!("{d}{id}{d}", d = PATH_DELIMITER, id = id))
}

/// Path predicate used by message store filters.
///
/// These are the predicate builders of the codec: each variant describes a
/// set of tree positions, and the stores evaluate them against persisted
/// paths without reconstructing the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathMatch {
    /// Root messages only (empty path).
    Root,
    /// Messages whose path equals the given string exactly.
    Exact(String),
    /// Direct replies to the given message (exact one-element path).
    DirectReplyTo(MessageId),
    /// Messages with any of the given ids as an ancestor, at any depth.
    HasAncestorAny(Vec<MessageId>),
}

impl PathMatch {
    /// Evaluates this predicate against a persisted path.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Root => path.is_empty(),
            PathMatch::Exact(expected) => path == expected,
            PathMatch::DirectReplyTo(id) => path == direct_reply_path(*id),
            PathMatch::HasAncestorAny(ids) => {
                ids.iter().any(|id| contains_segment(path, *id))
            }
        }
    }
}
