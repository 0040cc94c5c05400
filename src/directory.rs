//! Host directory: the consumed group/tutoring/section lookup collaborator.
//!
//! Group membership, tutoring assignments, lesson sections, and program
//! weeks are owned by external systems. This crate only ever asks the four
//! questions on [`HostDirectory`]; everything else about those systems is
//! out of scope.
//!
//! [`StaticDirectory`] is the in-crate implementation used by tests and
//! single-process embedders.

use crate::discussions::types::{HostId, SectionKind, UserId, WeekId};
use std::collections::{HashMap, HashSet};

/// Relation of one user to a set of hosts, as resolved by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TutorRelations {
    /// Requested hosts the directory does not know.
    pub not_found: Vec<HostId>,
    /// Known hosts where the user is not the tutor.
    pub not_tutored: Vec<HostId>,
}

impl TutorRelations {
    /// True when the user tutors every known requested host.
    pub fn is_tutor_in_all(&self) -> bool {
        self.not_tutored.is_empty()
    }
}

/// Lookup interface over groups, tutors, lesson sections, and weeks.
pub trait HostDirectory: Send + Sync {
    /// Returns the hosts (groups) tutored by a user.
    fn tutored_host_ids(&self, user: &UserId) -> Vec<HostId>;

    /// Partitions the given hosts by existence and tutoring relation.
    fn tutor_relations(&self, user: &UserId, hosts: &[HostId]) -> TutorRelations;

    /// Returns the kind of the lesson section behind a host, if the host is
    /// a lesson section at all.
    fn section_kind(&self, host: HostId) -> Option<SectionKind>;

    /// Returns whether a program week exists.
    fn week_exists(&self, week: WeekId) -> bool;

    /// Returns whether the user tutors the given host.
    fn is_tutor_of(&self, user: &UserId, host: HostId) -> bool {
        self.tutored_host_ids(user).contains(&host)
    }
}

/// Fixed in-memory directory.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    tutors: HashMap<HostId, UserId>,
    sections: HashMap<HostId, SectionKind>,
    weeks: HashSet<WeekId>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a group host with its tutor.
    pub fn with_group(mut self, host: HostId, tutor: impl Into<UserId>) -> Self {
        self.tutors.insert(host, tutor.into());
        self
    }

    /// Registers a lesson-section host.
    pub fn with_section(mut self, host: HostId, kind: SectionKind) -> Self {
        self.sections.insert(host, kind);
        self
    }

    /// Registers a program week.
    pub fn with_week(mut self, week: WeekId) -> Self {
        self.weeks.insert(week);
        self
    }
}

impl HostDirectory for StaticDirectory {
    fn tutored_host_ids(&self, user: &UserId) -> Vec<HostId> {
        self.tutors
            .iter()
            .filter(|(_, tutor)| *tutor == user)
            .map(|(host, _)| *host)
            .collect()
    }

    fn tutor_relations(&self, user: &UserId, hosts: &[HostId]) -> TutorRelations {
        let mut relations = TutorRelations::default();
        for host in hosts {
            match self.tutors.get(host) {
                None => relations.not_found.push(*host),
                Some(tutor) if tutor != user => relations.not_tutored.push(*host),
                Some(_) => {}
            }
        }
        relations
    }

    fn section_kind(&self, host: HostId) -> Option<SectionKind> {
        self.sections.get(&host).copied()
    }

    fn week_exists(&self, week: WeekId) -> bool {
        self.weeks.contains(&week)
    }
}
