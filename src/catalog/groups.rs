//! Project groups: named regular expressions over project names
//!
//! Groups nest through their `parent`. A group's projects are the projects
//! its pattern matches plus those of all its descendants.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::config::GroupConfig;
use crate::error::SourcedexError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub parent: Option<String>,
    pattern: Option<Regex>,
}

impl Group {
    /// Whether the group's own pattern selects `project`
    ///
    /// The pattern must match the whole name; an empty pattern matches none.
    pub fn matches(&self, project: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(project))
    }
}

/// Validated group hierarchy
#[derive(Debug, Clone, Default)]
pub struct GroupTree {
    groups: BTreeMap<String, Group>,
}

impl GroupTree {
    pub fn new(configs: &[GroupConfig]) -> Result<Self> {
        let mut groups = BTreeMap::new();
        for config in configs {
            let pattern = if config.pattern.is_empty() {
                None
            } else {
                let anchored = format!("^(?:{})$", config.pattern);
                Some(Regex::new(&anchored).map_err(|e| {
                    SourcedexError::Config(format!("group {}: invalid pattern: {}", config.name, e))
                })?)
            };
            let group = Group {
                name: config.name.clone(),
                parent: config.parent.clone(),
                pattern,
            };
            if groups.insert(config.name.clone(), group).is_some() {
                return Err(SourcedexError::Config(format!(
                    "group {} is defined twice",
                    config.name
                )));
            }
        }

        let tree = Self { groups };
        for group in tree.groups.values() {
            if let Some(parent) = &group.parent {
                if !tree.groups.contains_key(parent) {
                    return Err(SourcedexError::Config(format!(
                        "group {} has unknown parent {}",
                        group.name, parent
                    )));
                }
            }
            if tree.ancestors(&group.name).contains(&group.name) {
                return Err(SourcedexError::Config(format!(
                    "group {} is its own ancestor",
                    group.name
                )));
            }
        }
        Ok(tree)
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups without a parent
    pub fn roots(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().filter(|g| g.parent.is_none())
    }

    /// Direct subgroups of `name`
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Group> + 'a {
        self.groups
            .values()
            .filter(move |g| g.parent.as_deref() == Some(name))
    }

    /// Parent chain of `name`, nearest first; stops at a repeated group
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = self.groups.get(name).and_then(|g| g.parent.clone());
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break;
            }
            current = self.groups.get(&parent).and_then(|g| g.parent.clone());
            chain.push(parent);
        }
        chain
    }

    /// Projects of `name` and all its descendants among `projects`
    pub fn projects_of<'p>(&self, name: &str, projects: &[&'p str]) -> BTreeSet<&'p str> {
        let mut selected = BTreeSet::new();
        let mut pending = vec![name.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(group_name) = pending.pop() {
            if !seen.insert(group_name.clone()) {
                continue;
            }
            if let Some(group) = self.groups.get(&group_name) {
                selected.extend(projects.iter().copied().filter(|p| group.matches(p)));
                pending.extend(self.children(&group_name).map(|g| g.name.clone()));
            }
        }
        selected
    }

    /// Groups whose own pattern selects `project`, plus their ancestors
    pub fn groups_of(&self, project: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for group in self.groups.values().filter(|g| g.matches(project)) {
            names.insert(group.name.clone());
            names.extend(self.ancestors(&group.name));
        }
        names
    }
}
