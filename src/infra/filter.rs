//! Admission filters.

use std::collections::HashSet;

use crate::core::{AdmissionFilter, Cluster};

/// Admits every cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AdmissionFilter for AcceptAll {
    fn matches(&self, _cluster: &Cluster) -> bool {
        true
    }
}

/// Admits only clusters whose project is on an allow-list.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    projects: HashSet<String>,
}

impl ProjectFilter {
    /// Allow the given projects.
    pub fn new<I, S>(projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            projects: projects.into_iter().map(Into::into).collect(),
        }
    }
}

impl AdmissionFilter for ProjectFilter {
    fn matches(&self, cluster: &Cluster) -> bool {
        self.projects.contains(&cluster.id.project_id)
    }
}
