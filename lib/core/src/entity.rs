use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use toolcat_schema::EntityField;

/// Identifier assigned by the source extract. Join key of every link table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Strict integer parse of a raw source value (surrounding whitespace allowed)
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(EntityId)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId(id)
    }
}

/// A catalog item
///
/// Descriptive fields are single-valued. Empty source values are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub highlights: [Option<String>; 3],
    pub cost: Option<String>,
    pub maintenance: Option<String>,
    pub support: Option<String>,
    pub validation: Option<String>,
    pub customizability: Option<String>,
    pub integration: Option<String>,
    pub multi_language: Option<String>,
    pub area_scope: Option<String>,
    pub area_of_focus: Option<String>,
    pub link: Option<String>,
}

impl Entity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Builder-style setter, mostly for tests and fixtures
    pub fn with(mut self, field: EntityField, value: &str) -> Self {
        self.set_field(field, Some(value.to_string()));
        self
    }

    pub fn field(&self, field: EntityField) -> Option<&str> {
        let value = match field {
            EntityField::Name => &self.name,
            EntityField::Description => &self.description,
            EntityField::Highlight1 => &self.highlights[0],
            EntityField::Highlight2 => &self.highlights[1],
            EntityField::Highlight3 => &self.highlights[2],
            EntityField::Cost => &self.cost,
            EntityField::Maintenance => &self.maintenance,
            EntityField::Support => &self.support,
            EntityField::Validation => &self.validation,
            EntityField::Customizability => &self.customizability,
            EntityField::Integration => &self.integration,
            EntityField::MultiLanguage => &self.multi_language,
            EntityField::AreaScope => &self.area_scope,
            EntityField::AreaOfFocus => &self.area_of_focus,
            EntityField::Link => &self.link,
        };
        value.as_deref()
    }

    /// Set a field, storing blank values as `None`
    pub fn set_field(&mut self, field: EntityField, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let slot = match field {
            EntityField::Name => &mut self.name,
            EntityField::Description => &mut self.description,
            EntityField::Highlight1 => &mut self.highlights[0],
            EntityField::Highlight2 => &mut self.highlights[1],
            EntityField::Highlight3 => &mut self.highlights[2],
            EntityField::Cost => &mut self.cost,
            EntityField::Maintenance => &mut self.maintenance,
            EntityField::Support => &mut self.support,
            EntityField::Validation => &mut self.validation,
            EntityField::Customizability => &mut self.customizability,
            EntityField::Integration => &mut self.integration,
            EntityField::MultiLanguage => &mut self.multi_language,
            EntityField::AreaScope => &mut self.area_scope,
            EntityField::AreaOfFocus => &mut self.area_of_focus,
            EntityField::Link => &mut self.link,
        };
        *slot = value;
    }

    /// Case-insensitive substring match over name, description and highlights.
    /// `needle` must already be lowercased.
    #[inline]
    pub fn matches_text(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        EntityField::SEARCHABLE
            .into_iter()
            .filter_map(|f| self.field(f))
            .any(|text| text.to_lowercase().contains(needle))
    }

    /// Display order: name case-insensitively, unnamed last, then id
    pub fn display_cmp(&self, other: &Entity) -> Ordering {
        match (&self.name, &other.name) {
            (Some(a), Some(b)) => a
                .to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| self.id.cmp(&other.id))
    }
}
