//! Per-kind message acceptance policies.
//!
//! Discussion kinds differ in what they accept: broadcasts refuse directly
//! posted messages, lesson discussions validate the hosting section. Each
//! kind owns one policy object; dispatch is a closed match, so adding a kind
//! means adding one policy and one match arm.

use crate::discussions::types::{DiscussionKind, SectionKind};
use crate::error::{ColloquyError, Result};

/// Capability interface of one discussion kind.
pub trait KindPolicy: Send + Sync {
    /// Whether messages may be posted directly into the discussion.
    /// Replies are always allowed; this only gates root posting.
    fn accepts_direct_messages(&self) -> bool {
        true
    }

    /// Whether the discussion host must resolve to a lesson section.
    fn requires_section(&self) -> bool {
        false
    }

    /// Validates the hosting lesson section for posting and replying.
    fn check_section(&self, _section: SectionKind) -> Result<()> {
        Ok(())
    }
}

struct SubjectDiscussionPolicy;

impl KindPolicy for SubjectDiscussionPolicy {
    fn requires_section(&self) -> bool {
        true
    }

    fn check_section(&self, section: SectionKind) -> Result<()> {
        if section != SectionKind::SubjectDiscussion {
            return Err(ColloquyError::unprocessable(format!(
                "Lesson section must be {}!",
                SectionKind::SubjectDiscussion
            )));
        }
        Ok(())
    }
}

struct ContentDiscussionPolicy;

impl KindPolicy for ContentDiscussionPolicy {
    fn requires_section(&self) -> bool {
        true
    }

    fn check_section(&self, section: SectionKind) -> Result<()> {
        let unsupported = matches!(
            section,
            SectionKind::SubjectDiscussion | SectionKind::Quiz | SectionKind::QuizAssessment
        );
        if unsupported {
            return Err(ColloquyError::unprocessable(format!(
                "Lesson section {} is not supported by content discussions!",
                section
            )));
        }
        Ok(())
    }
}

struct TopicDiscussionPolicy;

impl KindPolicy for TopicDiscussionPolicy {}

struct IntroductionsPolicy;

impl KindPolicy for IntroductionsPolicy {}

struct BroadcastsPolicy;

impl KindPolicy for BroadcastsPolicy {
    fn accepts_direct_messages(&self) -> bool {
        false
    }
}

impl DiscussionKind {
    /// Returns the policy of this kind.
    pub fn policy(&self) -> &'static dyn KindPolicy {
        match self {
            DiscussionKind::LessonSubjectDiscussion => &SubjectDiscussionPolicy,
            DiscussionKind::LessonContentDiscussion => &ContentDiscussionPolicy,
            DiscussionKind::GroupTopicDiscussion => &TopicDiscussionPolicy,
            DiscussionKind::GroupBroadcasts => &BroadcastsPolicy,
            DiscussionKind::GroupIntroductions => &IntroductionsPolicy,
        }
    }
}
