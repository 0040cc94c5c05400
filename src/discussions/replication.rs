//! Imprint replication: one logical discussion across many hosts.
//!
//! Discussions created for several hosts at once share a freshly generated
//! imprint. The imprint is the join key that lets the independently stored
//! rows behave as one logical entity for bulk updates while keeping per-host
//! isolation for everything else (messages, activation state).
//!
//! A discussion without an imprint is a replication set of size one; every
//! query here degrades gracefully to that case.

use crate::directory::HostDirectory;
use crate::discussions::events::DiscussionEvent;
use crate::discussions::model::{Discussion, DiscussionDraft, DiscussionPatch, TopicDraft};
use crate::discussions::types::{DiscussionId, DiscussionKind, HostId, Imprint, UserId};
use crate::error::{ColloquyError, Result};
use crate::store::{DiscussionFilter, DiscussionStore, DiscussionUpdate};
use std::sync::Arc;
use tracing::{debug, info};

/// A discussion together with its full replication set (self included).
#[derive(Debug, Clone)]
pub struct SiblingSet {
    /// The discussion the lookup started from.
    pub current: Discussion,
    /// Every discussion sharing the imprint, the current one included.
    pub siblings: Vec<Discussion>,
}

impl SiblingSet {
    /// Ids of the whole set.
    pub fn ids(&self) -> Vec<DiscussionId> {
        self.siblings.iter().map(|d| d.id).collect()
    }

    /// Hosts of the whole set.
    pub fn hosts(&self) -> Vec<HostId> {
        self.siblings.iter().map(|d| d.host).collect()
    }
}

/// A replication set annotated with one user's tutoring relations.
#[derive(Debug, Clone)]
pub struct UserRelations {
    /// The discussion the lookup started from.
    pub current: Discussion,
    /// Every discussion sharing the imprint, the current one included.
    pub siblings: Vec<Discussion>,
    /// Hosts of the whole set.
    pub related_hosts: Vec<HostId>,
    /// Sibling discussion ids whose host the user tutors.
    pub tutored: Vec<DiscussionId>,
    /// Sibling discussion ids whose host the user does not tutor.
    pub not_tutored: Vec<DiscussionId>,
}

impl UserRelations {
    /// True when the user tutors every host of the set.
    pub fn all_tutored(&self) -> bool {
        self.not_tutored.is_empty()
    }
}

/// Result of creating a topic discussion across groups.
#[derive(Debug)]
pub struct TopicCreated {
    /// The discussion hosted in the primary group of the draft.
    pub discussion: Discussion,
    /// The whole created set, one per host.
    pub created: Vec<Discussion>,
    /// Events to emit after the creation.
    pub events: Vec<DiscussionEvent>,
}

/// Result of a bulk update across a replication set.
#[derive(Debug)]
pub struct BulkUpdated {
    /// Number of discussions the patch was applied to.
    pub updated: usize,
    /// Events to emit after the update.
    pub events: Vec<DiscussionEvent>,
}

/// Creates and queries replication sets of discussions sharing an imprint.
pub struct ImprintReplicator {
    discussions: Arc<dyn DiscussionStore>,
    directory: Arc<dyn HostDirectory>,
}

impl ImprintReplicator {
    /// Creates a replicator over a discussion store and a host directory.
    pub fn new(discussions: Arc<dyn DiscussionStore>, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            discussions,
            directory,
        }
    }

    /// Creates one discussion per host, all fields identical except the
    /// host, bound together by a single fresh imprint.
    pub fn create_replicated_discussions(
        &self,
        kind: DiscussionKind,
        hosts: &[HostId],
        draft: &DiscussionDraft,
    ) -> Result<Vec<Discussion>> {
        let imprint = Imprint::generate();
        let rows: Vec<Discussion> = hosts
            .iter()
            .map(|host| {
                let mut discussion = Discussion::new(kind, *host)
                    .with_imprint(imprint.clone())
                    .with_week(draft.week);
                discussion.title = draft.title.clone();
                discussion.description = draft.description.clone();
                discussion
            })
            .collect();

        info!(kind = %kind, hosts = hosts.len(), imprint = %imprint, "creating replicated discussions");
        self.discussions.insert_many(rows)
    }

    /// Loads a discussion and its full replication set.
    ///
    /// # Errors
    /// Returns `NotFound` if the discussion does not exist.
    pub fn siblings(&self, discussion_id: DiscussionId) -> Result<SiblingSet> {
        let current = self.require(discussion_id)?;
        let siblings = match &current.imprint {
            Some(imprint) => self.discussions.find_by_imprint(imprint)?,
            None => vec![current.clone()],
        };
        Ok(SiblingSet { current, siblings })
    }

    /// Extends [`siblings`](Self::siblings) with the user's tutoring
    /// relation on every sibling's host.
    pub fn user_relations(
        &self,
        discussion_id: DiscussionId,
        user: &UserId,
    ) -> Result<UserRelations> {
        let set = self.siblings(discussion_id)?;
        let mut tutored = Vec::new();
        let mut not_tutored = Vec::new();
        for sibling in &set.siblings {
            if self.directory.is_tutor_of(user, sibling.host) {
                tutored.push(sibling.id);
            } else {
                not_tutored.push(sibling.id);
            }
        }
        Ok(UserRelations {
            related_hosts: set.hosts(),
            current: set.current,
            siblings: set.siblings,
            tutored,
            not_tutored,
        })
    }

    /// Applies a title/description patch across a replication set.
    ///
    /// The target host set is the discussion's own host plus the explicitly
    /// requested additional hosts. The two-stage check exists because a
    /// caller may name a host that happens to carry an unrelated discussion:
    /// that is an imprint mismatch, reported distinctly from an
    /// authorization failure.
    ///
    /// # Errors
    /// - `NotFound` if the discussion does not exist
    /// - `Unprocessable` if a requested host's discussion has a different
    ///   imprint than the target
    /// - `Forbidden` if the acting user is not a tutor on every host in the
    ///   target set
    pub fn bulk_update(
        &self,
        discussion_id: DiscussionId,
        patch: &DiscussionPatch,
        also_in_hosts: &[HostId],
        acting_user: &UserId,
    ) -> Result<BulkUpdated> {
        let target = self.require(discussion_id)?;
        let relations = self.user_relations(discussion_id, acting_user)?;

        let mut requested_hosts = vec![target.host];
        for host in also_in_hosts {
            if !requested_hosts.contains(host) {
                requested_hosts.push(*host);
            }
        }

        let irrelevant: Vec<HostId> = requested_hosts
            .iter()
            .filter(|host| !relations.related_hosts.contains(host))
            .copied()
            .collect();
        if !irrelevant.is_empty() {
            return Err(ColloquyError::unprocessable(format!(
                "Discussion {} for hosts {} has a different imprint!",
                discussion_id,
                join_ids(&irrelevant)
            )));
        }

        let tutored_hosts = self.directory.tutored_host_ids(acting_user);
        let non_tutored: Vec<HostId> = requested_hosts
            .iter()
            .filter(|host| !tutored_hosts.contains(host))
            .copied()
            .collect();
        if !non_tutored.is_empty() {
            return Err(ColloquyError::forbidden(format!(
                "User {} is not a tutor in hosts {}!",
                acting_user,
                join_ids(&non_tutored)
            )));
        }

        // Discussion ids within the requested hosts, restricted to the
        // target's imprint.
        let target_ids: Vec<DiscussionId> = relations
            .siblings
            .iter()
            .filter(|sibling| requested_hosts.contains(&sibling.host))
            .map(|sibling| sibling.id)
            .collect();

        let updated = self.discussions.update_many(
            &DiscussionFilter::new().ids(target_ids.clone()),
            &DiscussionUpdate::from(patch),
        )?;
        debug!(discussion = %discussion_id, updated, "bulk update applied");

        let refreshed = self
            .discussions
            .find_many(&DiscussionFilter::new().ids(target_ids))?;
        let events = refreshed
            .into_iter()
            .map(|discussion| DiscussionEvent::DiscussionUpdate {
                host: discussion.host,
                discussion,
                raised_by: acting_user.clone(),
            })
            .collect();

        Ok(BulkUpdated { updated, events })
    }

    /// Creates a topic discussion replicated across the draft's groups.
    ///
    /// Deactivates the groups' current topic discussions first, so the new
    /// topic becomes the active one everywhere it lands.
    ///
    /// # Errors
    /// - `NotFound` if the bound week does not exist
    /// - `Forbidden` if the user does not tutor every requested group
    pub fn create_topic_for_groups(
        &self,
        draft: &TopicDraft,
        acting_user: &UserId,
    ) -> Result<TopicCreated> {
        if let Some(week) = draft.bind_to_week {
            if !self.directory.week_exists(week) {
                return Err(ColloquyError::not_found(format!(
                    "Week {} not found!",
                    week
                )));
            }
        }

        let mut requested_hosts = draft.also_in_hosts.clone();
        if !requested_hosts.contains(&draft.in_host) {
            requested_hosts.push(draft.in_host);
        }

        let tutored_hosts = self.directory.tutored_host_ids(acting_user);
        let non_tutored: Vec<HostId> = requested_hosts
            .iter()
            .filter(|host| !tutored_hosts.contains(host))
            .copied()
            .collect();
        if !non_tutored.is_empty() {
            return Err(ColloquyError::forbidden(format!(
                "User {} is not a tutor in hosts {}!",
                acting_user,
                join_ids(&non_tutored)
            )));
        }

        self.deactivate_topics_for_hosts(&requested_hosts)?;

        let created = self.create_replicated_discussions(
            DiscussionKind::GroupTopicDiscussion,
            &requested_hosts,
            &DiscussionDraft {
                title: Some(draft.title.clone()),
                description: Some(draft.description.clone()),
                week: draft.bind_to_week,
            },
        )?;

        let events: Vec<DiscussionEvent> = created
            .iter()
            .map(|discussion| DiscussionEvent::DiscussionCreate {
                host: discussion.host,
                discussion: discussion.clone(),
                raised_by: acting_user.clone(),
            })
            .collect();

        let discussion = created
            .iter()
            .find(|discussion| discussion.host == draft.in_host)
            .cloned()
            .ok_or_else(|| {
                ColloquyError::storage(format!(
                    "created topic set is missing primary host {}",
                    draft.in_host
                ))
            })?;

        Ok(TopicCreated {
            discussion,
            created,
            events,
        })
    }

    /// Seeds one introductions discussion per host. These are not
    /// replicated: each group's introductions thread is its own.
    pub fn create_introduction_discussions(&self, hosts: &[HostId]) -> Result<Vec<Discussion>> {
        let rows: Vec<Discussion> = hosts
            .iter()
            .map(|host| {
                Discussion::new(DiscussionKind::GroupIntroductions, *host)
                    .with_title("Introduce Yourself")
                    .with_description("Introduce Yourself Question")
            })
            .collect();
        self.discussions.insert_many(rows)
    }

    /// Marks every topic discussion on the given hosts inactive.
    pub fn deactivate_topics_for_hosts(&self, hosts: &[HostId]) -> Result<usize> {
        self.discussions.update_many(
            &DiscussionFilter::new()
                .kind(DiscussionKind::GroupTopicDiscussion)
                .hosts(hosts.to_vec()),
            &DiscussionUpdate::new().active(false),
        )
    }

    /// Marks a discussion active again.
    ///
    /// # Errors
    /// Returns `NotFound` if the discussion does not exist.
    pub fn mark_active(&self, discussion_id: DiscussionId) -> Result<bool> {
        self.require(discussion_id)?;
        self.discussions
            .update_one(discussion_id, &DiscussionUpdate::new().active(true))
    }

    fn require(&self, discussion_id: DiscussionId) -> Result<Discussion> {
        self.discussions.find_by_id(discussion_id)?.ok_or_else(|| {
            ColloquyError::not_found(format!("Discussion {} not found!", discussion_id))
        })
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::discussions::events::EventTopic;
    use crate::discussions::types::WeekId;
    use crate::store::memory::MemoryDiscussionStore;

    struct Fixture {
        replicator: ImprintReplicator,
        discussions: Arc<MemoryDiscussionStore>,
        g1: HostId,
        g2: HostId,
        g3: HostId,
    }

    /// Tutor "tutor-a" tutors g1 and g2; "tutor-b" tutors g3.
    fn fixture() -> Fixture {
        let g1 = HostId::generate();
        let g2 = HostId::generate();
        let g3 = HostId::generate();
        let directory = Arc::new(
            StaticDirectory::new()
                .with_group(g1, "tutor-a")
                .with_group(g2, "tutor-a")
                .with_group(g3, "tutor-b"),
        );
        let discussions = Arc::new(MemoryDiscussionStore::new());
        Fixture {
            replicator: ImprintReplicator::new(discussions.clone(), directory),
            discussions,
            g1,
            g2,
            g3,
        }
    }

    fn topic_draft() -> DiscussionDraft {
        DiscussionDraft {
            title: Some("Weekly topic".to_string()),
            description: Some("What did you learn?".to_string()),
            week: None,
        }
    }

    #[test]
    fn test_replicated_creation_is_identical_except_host() {
        let f = fixture();
        let created = f
            .replicator
            .create_replicated_discussions(
                DiscussionKind::GroupTopicDiscussion,
                &[f.g1, f.g2, f.g3],
                &topic_draft(),
            )
            .unwrap();

        assert_eq!(created.len(), 3);
        let imprint = created[0].imprint.clone().expect("missing imprint");
        for discussion in &created {
            assert_eq!(discussion.imprint.as_ref(), Some(&imprint));
            assert_eq!(discussion.title.as_deref(), Some("Weekly topic"));
            assert_eq!(
                discussion.description.as_deref(),
                Some("What did you learn?")
            );
            assert_eq!(discussion.kind, DiscussionKind::GroupTopicDiscussion);
        }
        let hosts: Vec<HostId> = created.iter().map(|d| d.host).collect();
        assert_eq!(hosts, vec![f.g1, f.g2, f.g3]);
    }

    #[test]
    fn test_siblings_from_any_member() {
        let f = fixture();
        let created = f
            .replicator
            .create_replicated_discussions(
                DiscussionKind::GroupTopicDiscussion,
                &[f.g1, f.g2, f.g3],
                &topic_draft(),
            )
            .unwrap();

        for member in &created {
            let set = f.replicator.siblings(member.id).unwrap();
            assert_eq!(set.current.id, member.id);
            assert_eq!(set.siblings.len(), 3);
            for other in &created {
                assert!(set.ids().contains(&other.id));
            }
        }
    }

    #[test]
    fn test_imprintless_discussion_is_singleton_set() {
        let f = fixture();
        let lonely = f
            .discussions
            .insert_one(Discussion::new(
                DiscussionKind::GroupIntroductions,
                f.g1,
            ))
            .unwrap();

        let set = f.replicator.siblings(lonely.id).unwrap();
        assert_eq!(set.siblings.len(), 1);
        assert_eq!(set.siblings[0].id, lonely.id);
    }

    #[test]
    fn test_user_relations_partition() {
        let f = fixture();
        let created = f
            .replicator
            .create_replicated_discussions(
                DiscussionKind::GroupTopicDiscussion,
                &[f.g1, f.g2, f.g3],
                &topic_draft(),
            )
            .unwrap();

        let relations = f
            .replicator
            .user_relations(created[0].id, &UserId::from("tutor-a"))
            .unwrap();

        assert_eq!(relations.tutored.len(), 2);
        assert_eq!(relations.not_tutored.len(), 1);
        assert!(!relations.all_tutored());
        assert_eq!(relations.related_hosts.len(), 3);

        // tutor-b only tutors g3.
        let relations = f
            .replicator
            .user_relations(created[0].id, &UserId::from("tutor-b"))
            .unwrap();
        assert_eq!(relations.tutored.len(), 1);
        assert_eq!(relations.not_tutored.len(), 2);
    }

    #[test]
    fn test_bulk_update_requires_tutoring_everywhere() {
        let f = fixture();
        let created = f
            .replicator
            .create_replicated_discussions(
                DiscussionKind::GroupTopicDiscussion,
                &[f.g1, f.g2, f.g3],
                &topic_draft(),
            )
            .unwrap();
        let on_g1 = created.iter().find(|d| d.host == f.g1).unwrap();

        let patch = DiscussionPatch {
            title: Some("Renamed".to_string()),
            description: None,
        };

        // Requesting g3, which tutor-a does not tutor, is Forbidden.
        let result =
            f.replicator
                .bulk_update(on_g1.id, &patch, &[f.g3], &UserId::from("tutor-a"));
        assert!(matches!(result, Err(ColloquyError::Forbidden(_))));

        // Restricted to tutored hosts the update succeeds everywhere asked.
        let outcome = f
            .replicator
            .bulk_update(on_g1.id, &patch, &[f.g2], &UserId::from("tutor-a"))
            .unwrap();
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.events.len(), 2);
        for event in &outcome.events {
            assert_eq!(event.topic(), EventTopic::DiscussionUpdate);
        }

        for host in [f.g1, f.g2] {
            let updated = f
                .discussions
                .find_one(&DiscussionFilter::new().hosts(vec![host]))
                .unwrap()
                .unwrap();
            assert_eq!(updated.title.as_deref(), Some("Renamed"));
        }
        // g3 was not touched.
        let untouched = f
            .discussions
            .find_one(&DiscussionFilter::new().hosts(vec![f.g3]))
            .unwrap()
            .unwrap();
        assert_eq!(untouched.title.as_deref(), Some("Weekly topic"));
    }

    #[test]
    fn test_bulk_update_rejects_foreign_imprint() {
        let f = fixture();
        let created = f
            .replicator
            .create_replicated_discussions(
                DiscussionKind::GroupTopicDiscussion,
                &[f.g1, f.g2],
                &topic_draft(),
            )
            .unwrap();
        // g3 hosts an unrelated topic discussion with its own imprint.
        f.replicator
            .create_replicated_discussions(
                DiscussionKind::GroupTopicDiscussion,
                &[f.g3],
                &topic_draft(),
            )
            .unwrap();
        let on_g1 = created.iter().find(|d| d.host == f.g1).unwrap();

        let patch = DiscussionPatch {
            title: Some("Renamed".to_string()),
            description: None,
        };
        let result =
            f.replicator
                .bulk_update(on_g1.id, &patch, &[f.g3], &UserId::from("tutor-a"));

        // Imprint mismatch is reported as Unprocessable, not Forbidden.
        assert!(matches!(result, Err(ColloquyError::Unprocessable(_))));
    }

    #[test]
    fn test_create_topic_for_groups() {
        let f = fixture();
        // An older topic in g1 is active before the new one arrives.
        let old = f
            .discussions
            .insert_one(
                Discussion::new(DiscussionKind::GroupTopicDiscussion, f.g1)
                    .with_title("Old topic"),
            )
            .unwrap();

        let draft = TopicDraft::new("New topic", "Fresh start", f.g1).also_in(vec![f.g2]);
        let outcome = f
            .replicator
            .create_topic_for_groups(&draft, &UserId::from("tutor-a"))
            .unwrap();

        assert_eq!(outcome.discussion.host, f.g1);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.events.len(), 2);

        let old = f.discussions.find_by_id(old.id).unwrap().unwrap();
        assert!(!old.is_active);
        assert!(outcome.created.iter().all(|d| d.is_active));
    }

    #[test]
    fn test_create_topic_rejects_non_tutored_group() {
        let f = fixture();
        let draft = TopicDraft::new("Topic", "Desc", f.g1).also_in(vec![f.g3]);

        let result = f
            .replicator
            .create_topic_for_groups(&draft, &UserId::from("tutor-a"));

        match result {
            Err(ColloquyError::Forbidden(message)) => {
                assert!(message.contains(&f.g3.to_string()));
            }
            other => panic!("expected Forbidden, got {:?}", other.map(|o| o.created.len())),
        }
    }

    #[test]
    fn test_create_topic_rejects_unknown_week() {
        let f = fixture();
        let draft =
            TopicDraft::new("Topic", "Desc", f.g1).bound_to_week(WeekId::generate());

        let result = f
            .replicator
            .create_topic_for_groups(&draft, &UserId::from("tutor-a"));
        assert!(matches!(result, Err(ColloquyError::NotFound(_))));
    }

    #[test]
    fn test_introduction_discussions_are_not_imprinted() {
        let f = fixture();
        let created = f
            .replicator
            .create_introduction_discussions(&[f.g1, f.g2])
            .unwrap();

        assert_eq!(created.len(), 2);
        for discussion in &created {
            assert_eq!(discussion.kind, DiscussionKind::GroupIntroductions);
            assert!(discussion.imprint.is_none());
            assert_eq!(discussion.title.as_deref(), Some("Introduce Yourself"));
        }
    }

    #[test]
    fn test_mark_active() {
        let f = fixture();
        let discussion = f
            .discussions
            .insert_one(Discussion::new(DiscussionKind::GroupTopicDiscussion, f.g1))
            .unwrap();
        f.replicator.deactivate_topics_for_hosts(&[f.g1]).unwrap();
        assert!(!f
            .discussions
            .find_by_id(discussion.id)
            .unwrap()
            .unwrap()
            .is_active);

        assert!(f.replicator.mark_active(discussion.id).unwrap());
        assert!(f
            .discussions
            .find_by_id(discussion.id)
            .unwrap()
            .unwrap()
            .is_active);

        let missing = f.replicator.mark_active(DiscussionId::generate());
        assert!(matches!(missing, Err(ColloquyError::NotFound(_))));
    }
}
