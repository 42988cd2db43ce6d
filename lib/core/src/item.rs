use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ItemId = String;

/// An ingested product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Free-text context recorded on every occurrence extracted from this item
    pub fn context(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// One extracted characteristic mention for an item.
///
/// Occurrences are append-only. `unit` may be absent, meaning the number is
/// dimensionless or unit-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Occurrence {
    pub item_id: ItemId,
    /// Raw attribute label as extracted, e.g. "сечение"
    pub name: String,
    /// Raw value text, e.g. "2.5"
    pub value: String,
    pub unit: Option<String>,
    pub number: Option<f64>,
    pub context: String,
}

impl Occurrence {
    #[inline]
    #[must_use]
    pub fn new(item_id: impl Into<ItemId>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            value: value.into(),
            unit: None,
            number: None,
            context: String::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_number(mut self, number: f64, unit: Option<&str>) -> Self {
        self.number = Some(number);
        self.unit = unit.map(str::to_string);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}
