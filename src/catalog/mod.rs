//! Served projects, their indexes, groups and operational messages
//!
//! The catalog is built once from a [`CatalogConfig`]. A project whose index
//! cannot be opened stays listed but is reported unavailable to every search
//! that names it; the other projects keep serving.

mod groups;
mod messages;

pub use groups::{Group, GroupTree};
pub use messages::{
    AcceptedMessage, MessageLevel, MessageStore, NewMessage, TaggedMessages, MAIN_PAGE_TAG,
};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CatalogConfig, ProjectConfig};
use crate::error::SourcedexError;
use crate::query::SearchTarget;
use crate::segment::{IndexStats, ProjectIndex};
use crate::Result;

struct ProjectEntry {
    config: ProjectConfig,
    index: Option<Arc<ProjectIndex>>,
    failure: RwLock<Option<String>>,
}

impl ProjectEntry {
    fn unavailable_reason(&self) -> Option<String> {
        self.failure.read().clone()
    }
}

/// One project as listed to clients
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    pub tooltip: Option<String>,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
    pub messages: Vec<AcceptedMessage>,
}

/// A group with its own projects and nested subgroups
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupListing {
    pub name: String,
    pub messages: Vec<AcceptedMessage>,
    pub projects: Vec<ProjectSummary>,
    pub subgroups: Vec<GroupListing>,
}

/// Projects arranged by group
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedProjects {
    pub groups: Vec<GroupListing>,
    /// Projects no group selects
    pub ungrouped: Vec<ProjectSummary>,
}

pub struct Catalog {
    projects: BTreeMap<String, ProjectEntry>,
    groups: GroupTree,
    messages: MessageStore,
}

impl Catalog {
    /// Open every configured project index
    ///
    /// Configuration errors fail the catalog; index errors only mark the
    /// affected project unavailable.
    pub fn open(config: &CatalogConfig) -> Result<Self> {
        let groups = GroupTree::new(&config.groups)?;
        let mut projects = BTreeMap::new();
        for project in &config.projects {
            if project.name.is_empty() {
                return Err(SourcedexError::Config("project name cannot be empty".to_string()));
            }
            if projects.contains_key(&project.name) {
                return Err(SourcedexError::Config(format!(
                    "project {} is defined twice",
                    project.name
                )));
            }
            if groups.get(&project.name).is_some() {
                return Err(SourcedexError::Config(format!(
                    "{} is both a project and a group",
                    project.name
                )));
            }
            let opened = ProjectIndex::open(&project.name, config.index_dir(&project.name))
                .map(|index| index.with_verification(config.settings.verify_segments_on_commit));
            let (index, failure) = match opened {
                Ok(index) => (Some(Arc::new(index)), None),
                Err(e) => {
                    warn!(project = %project.name, error = %e, "project index unavailable");
                    (None, Some(e.to_string()))
                }
            };
            let entry = ProjectEntry {
                config: project.clone(),
                index,
                failure: RwLock::new(failure),
            };
            projects.insert(project.name.clone(), entry);
        }
        info!(projects = projects.len(), groups = config.groups.len(), "catalog opened");
        Ok(Self {
            projects,
            groups,
            messages: MessageStore::default(),
        })
    }

    pub fn project_names(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.get(name).map(|e| &e.config)
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectConfig> {
        self.projects.values().map(|e| &e.config)
    }

    /// Open index of `name`
    pub fn index(&self, name: &str) -> Result<Arc<ProjectIndex>> {
        let entry = self
            .projects
            .get(name)
            .ok_or_else(|| SourcedexError::UnknownProject(name.to_string()))?;
        match (&entry.index, entry.unavailable_reason()) {
            (Some(index), None) => Ok(Arc::clone(index)),
            (_, reason) => Err(SourcedexError::ProjectUnavailable {
                project: name.to_string(),
                reason: reason.unwrap_or_else(|| "index not open".to_string()),
            }),
        }
    }

    pub fn stats(&self, name: &str) -> Result<IndexStats> {
        self.index(name).map(|index| index.stats())
    }

    /// Take `name` out of service until [`Catalog::clear_failure`]
    pub fn mark_failed(&self, name: &str, reason: impl Into<String>) -> Result<()> {
        let entry = self
            .projects
            .get(name)
            .ok_or_else(|| SourcedexError::UnknownProject(name.to_string()))?;
        let reason = reason.into();
        warn!(project = name, reason = %reason, "project marked failed");
        *entry.failure.write() = Some(reason);
        Ok(())
    }

    /// Return `name` to service; a project whose index never opened stays out
    pub fn clear_failure(&self, name: &str) -> Result<()> {
        let entry = self
            .projects
            .get(name)
            .ok_or_else(|| SourcedexError::UnknownProject(name.to_string()))?;
        if entry.index.is_some() {
            *entry.failure.write() = None;
        }
        Ok(())
    }

    /// Resolve requested project and group names into search targets
    ///
    /// An empty request selects every project. Each target pins the
    /// project's generation at this moment and carries its source root
    /// for snippets.
    pub fn targets(&self, requested: &[String]) -> Result<Vec<SearchTarget>> {
        let names = self.resolve(requested)?;
        Ok(names
            .into_iter()
            .map(|name| match self.index(name) {
                Ok(index) => {
                    let target = SearchTarget::ready(name, index.snapshot());
                    match self.projects.get(name) {
                        Some(entry) => target.with_source_root(&entry.config.source_root),
                        None => target,
                    }
                }
                Err(SourcedexError::ProjectUnavailable { reason, .. }) => {
                    SearchTarget::unavailable(name, reason)
                }
                Err(e) => SearchTarget::unavailable(name, e.to_string()),
            })
            .collect())
    }

    fn resolve<'a>(&'a self, requested: &[String]) -> Result<BTreeSet<&'a str>> {
        let all: Vec<&str> = self.project_names().collect();
        if requested.iter().all(|r| r.trim().is_empty()) {
            return Ok(all.into_iter().collect());
        }
        let mut names = BTreeSet::new();
        for name in requested.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
            if let Some((key, _)) = self.projects.get_key_value(name) {
                names.insert(key.as_str());
            } else if self.groups.get(name).is_some() {
                names.extend(self.groups.projects_of(name, &all));
            } else {
                return Err(SourcedexError::UnknownProject(name.to_string()));
            }
        }
        Ok(names)
    }

    pub fn groups(&self) -> &GroupTree {
        &self.groups
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Every project in name order
    pub fn listing(&self) -> Vec<ProjectSummary> {
        self.projects.keys().map(|name| self.summary(name)).collect()
    }

    /// Projects arranged under the group hierarchy
    ///
    /// A project appears under every group whose pattern selects it.
    pub fn grouped_listing(&self) -> GroupedProjects {
        let groups = self
            .groups
            .roots()
            .map(|group| self.group_listing(group))
            .collect();
        let ungrouped = self
            .projects
            .keys()
            .filter(|name| self.groups.groups_of(name).is_empty())
            .map(|name| self.summary(name))
            .collect();
        GroupedProjects { groups, ungrouped }
    }

    fn group_listing(&self, group: &Group) -> GroupListing {
        GroupListing {
            name: group.name.clone(),
            messages: self.messages.messages(&group.name),
            projects: self
                .projects
                .keys()
                .filter(|name| group.matches(name))
                .map(|name| self.summary(name))
                .collect(),
            subgroups: self
                .groups
                .children(&group.name)
                .map(|child| self.group_listing(child))
                .collect(),
        }
    }

    fn summary(&self, name: &str) -> ProjectSummary {
        let entry = &self.projects[name];
        let unavailable = match (&entry.index, entry.unavailable_reason()) {
            (_, Some(reason)) => Some(reason),
            (None, None) => Some("index not open".to_string()),
            _ => None,
        };
        ProjectSummary {
            name: name.to_string(),
            tooltip: entry.config.description.clone(),
            indexed: entry.index.as_ref().is_some_and(|i| i.generation() > 0),
            unavailable,
            messages: self.messages.messages(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;

    fn project(name: &str) -> ProjectConfig {
        ProjectConfig {
            name: name.to_string(),
            source_root: std::path::PathBuf::from("/nonexistent"),
            description: Some(format!("{name} sources")),
        }
    }

    fn config(dir: &std::path::Path) -> CatalogConfig {
        CatalogConfig {
            data_dir: dir.to_path_buf(),
            projects: vec![project("c-lib"), project("c-tools"), project("docs")],
            groups: vec![GroupConfig {
                name: "c".to_string(),
                pattern: "c-.*".to_string(),
                parent: None,
            }],
            ..CatalogConfig::default()
        }
    }

    fn names(targets: &[SearchTarget]) -> Vec<&str> {
        targets.iter().map(|t| t.project.as_str()).collect()
    }

    #[test]
    fn test_targets_resolve_projects_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&config(dir.path())).unwrap();

        let all = catalog.targets(&[]).unwrap();
        assert_eq!(names(&all), vec!["c-lib", "c-tools", "docs"]);
        assert_eq!(
            all[0].source_root.as_deref(),
            Some(std::path::Path::new("/nonexistent"))
        );
        assert_eq!(
            names(&catalog.targets(&["c".to_string()]).unwrap()),
            vec!["c-lib", "c-tools"]
        );
        assert_eq!(
            names(&catalog.targets(&["docs".to_string(), "c-lib".to_string()]).unwrap()),
            vec!["c-lib", "docs"]
        );
        assert!(matches!(
            catalog.targets(&["nope".to_string()]),
            Err(SourcedexError::UnknownProject(_))
        ));
    }

    #[test]
    fn test_failed_project_becomes_unavailable_target() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&config(dir.path())).unwrap();
        catalog.mark_failed("docs", "checksum mismatch").unwrap();

        let targets = catalog.targets(&[]).unwrap();
        let docs = targets.iter().find(|t| t.project == "docs").unwrap();
        assert_eq!(docs.generation.as_ref().err().map(String::as_str), Some("checksum mismatch"));
        assert!(matches!(
            catalog.index("docs"),
            Err(SourcedexError::ProjectUnavailable { .. })
        ));

        catalog.clear_failure("docs").unwrap();
        assert!(catalog.index("docs").is_ok());
    }

    #[test]
    fn test_listing_and_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&config(dir.path())).unwrap();
        catalog
            .messages()
            .add(NewMessage::new(["c-lib"], "rebuilding"))
            .unwrap();

        let flat = catalog.listing();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].tooltip.as_deref(), Some("c-lib sources"));
        assert_eq!(flat[0].messages.len(), 1);
        assert!(!flat[0].indexed);

        let grouped = catalog.grouped_listing();
        assert_eq!(grouped.groups.len(), 1);
        assert_eq!(grouped.groups[0].projects.len(), 2);
        assert_eq!(grouped.ungrouped.len(), 1);
        assert_eq!(grouped.ungrouped[0].name, "docs");
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut duplicate = config(dir.path());
        duplicate.projects.push(project("docs"));
        assert!(matches!(Catalog::open(&duplicate), Err(SourcedexError::Config(_))));

        let mut clash = config(dir.path());
        clash.projects.push(project("c"));
        assert!(Catalog::open(&clash).is_err());
    }
}
