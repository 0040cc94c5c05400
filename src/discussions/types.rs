//! Identifier and discriminator types for the discussion system.
//!
//! All document ids are UUID newtypes so a discussion id can never be passed
//! where a message id is expected. `UserId` stays a string: user identities
//! are minted by an external account system and only flow through this crate.
//!
//! The `Imprint` is the replication key: every discussion created as part of
//! a replicated set carries the same imprint, and the set behaves as one
//! logical discussion for bulk updates. Discussions without an imprint are
//! replication sets of size one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Returns the current timestamp in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh, globally-unique id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parses an id from its canonical string form.
            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }

            /// Returns the raw UUID bytes, used for storage keys.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a discussion document.
    DiscussionId
);
uuid_id!(
    /// Identifier of a discussion message document.
    MessageId
);
uuid_id!(
    /// Identifier of the group or lesson section a discussion is attached to.
    HostId
);
uuid_id!(
    /// Identifier of a program week a discussion can be bound to.
    WeekId
);

/// Identity of a user as issued by the external account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wraps an external user identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Correlation token shared by all discussions that replicate one logical
/// discussion across multiple hosts, and stamped on broadcast messages for
/// downstream correlation.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Imprint(Uuid);

impl Imprint {
    /// Generates a fresh, globally-unique imprint.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for Imprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Imprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Imprint({})", self.0)
    }
}

/// Type discriminator for discussions.
///
/// The set is closed: every variant has a policy describing what messages it
/// accepts (see the `policy` module), so adding a kind is one new policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscussionKind {
    /// Discussion attached to a subject-discussion lesson section.
    LessonSubjectDiscussion,
    /// Discussion attached to the content of a lesson section.
    LessonContentDiscussion,
    /// Tutor-created topic discussion in a group, possibly replicated.
    GroupTopicDiscussion,
    /// The single implicit per-group destination for tutor broadcasts.
    GroupBroadcasts,
    /// The introduce-yourself discussion seeded into each group.
    GroupIntroductions,
}

impl fmt::Display for DiscussionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscussionKind::LessonSubjectDiscussion => write!(f, "LessonSubjectDiscussion"),
            DiscussionKind::LessonContentDiscussion => write!(f, "LessonContentDiscussion"),
            DiscussionKind::GroupTopicDiscussion => write!(f, "GroupTopicDiscussion"),
            DiscussionKind::GroupBroadcasts => write!(f, "GroupBroadcasts"),
            DiscussionKind::GroupIntroductions => write!(f, "GroupIntroductions"),
        }
    }
}

/// Role of the acting user, resolved by the external auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Learner,
    Tutor,
    Manager,
    Admin,
}

impl UserRole {
    /// Managers and admins bypass per-host tutoring checks.
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Manager)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Learner => write!(f, "Learner"),
            UserRole::Tutor => write!(f, "Tutor"),
            UserRole::Manager => write!(f, "Manager"),
            UserRole::Admin => write!(f, "Admin"),
        }
    }
}

/// Kind of the lesson section hosting a lesson discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Lecture,
    Assignment,
    SubjectDiscussion,
    Quiz,
    QuizAssessment,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKind::Lecture => write!(f, "Lecture"),
            SectionKind::Assignment => write!(f, "Assignment"),
            SectionKind::SubjectDiscussion => write!(f, "SubjectDiscussion"),
            SectionKind::Quiz => write!(f, "Quiz"),
            SectionKind::QuizAssessment => write!(f, "QuizAssessment"),
        }
    }
}

/// The authenticated user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    /// The user's identity.
    pub id: UserId,
    /// The user's role.
    pub role: UserRole,
}

impl ActingUser {
    /// Creates an acting user from identity and role.
    pub fn new(id: impl Into<UserId>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}
