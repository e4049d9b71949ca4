// Faceted filter request
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One query against the catalog.
///
/// Labels selected within a group are OR-ed, groups are AND-ed. A group with
/// an empty selection (or no entry at all) imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Attribute group name -> selected labels
    #[serde(default)]
    pub selections: BTreeMap<String, BTreeSet<String>>,
    /// Free-text query, matched as a case-insensitive substring
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub geography: GeographySelection,
}

impl FilterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add labels to a group's selection
    pub fn select<I, S>(mut self, group: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selections
            .entry(group.to_string())
            .or_default()
            .extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.geography.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.geography.names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Groups whose selection is non-empty
    pub fn active_groups(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.selections
            .iter()
            .filter(|(_, labels)| !labels.is_empty())
            .map(|(group, labels)| (group.as_str(), labels))
    }

    /// True when nothing narrows the universe
    pub fn is_unconstrained(&self) -> bool {
        self.active_groups().next().is_none()
            && self.geography.is_empty()
            && self.text.trim().is_empty()
    }
}

/// Geography part of a request: selected scopes and selected place names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographySelection {
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub names: BTreeSet<String>,
}

impl GeographySelection {
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty() && self.names.is_empty()
    }
}
