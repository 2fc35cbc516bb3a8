use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::hhmm_serde;

/// Failures of item operations. Validation variants abort before any write.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("title cannot be empty")]
    EmptyTitle,
    #[error("date is required")]
    MissingDate,
    #[error("invalid date {0:?}: expected YYYY-MM-DD, today, tomorrow, yesterday, +Nd or a weekday")]
    InvalidDate(String),
    #[error("invalid time {0:?}: expected HH:MM")]
    InvalidTime(String),
    #[error("unknown category {0:?}: expected one of work, life, study, health, other")]
    UnknownCategory(String),
    #[error("item {0} not found")]
    NotFound(i64),
    #[error("batch mode is not active")]
    BatchInactive,
    #[error("no item ids left")]
    IdsExhausted,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ItemError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyTitle
                | Self::MissingDate
                | Self::InvalidDate(_)
                | Self::InvalidTime(_)
                | Self::UnknownCategory(_)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Life,
    Study,
    Health,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Work,
        Category::Life,
        Category::Study,
        Category::Health,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::Life => "life",
            Category::Study => "study",
            Category::Health => "health",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|cat| cat.as_str() == lower)
            .ok_or_else(|| ItemError::UnknownCategory(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,

    #[serde(alias = "text")]
    pub title: String,

    pub date: NaiveDate,

    #[serde(default, with = "hhmm_serde::option")]
    pub time: Option<NaiveTime>,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub completed: bool,

    #[serde(default = "unset_created_at")]
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Builds a validated, not yet completed item.
    pub fn new(
        id: i64,
        title: &str,
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        category: Category,
        now: DateTime<Utc>,
    ) -> Result<Self, ItemError> {
        let title = normalize_title(title)?;
        let date = date.ok_or(ItemError::MissingDate)?;
        Ok(Self {
            id,
            title,
            date,
            time,
            category,
            completed: false,
            created_at: now,
        })
    }

    /// Re-checks invariants on a record read back from storage, filling in a
    /// creation time derived from the millisecond id when it was absent.
    pub fn validated(mut self) -> Result<Self, ItemError> {
        self.title = normalize_title(&self.title)?;
        if self.created_at == unset_created_at() {
            self.created_at =
                DateTime::<Utc>::from_timestamp_millis(self.id).unwrap_or_else(unset_created_at);
        }
        Ok(self)
    }

    pub fn apply(&mut self, patch: &ItemPatch) -> Result<(), ItemError> {
        let title = match &patch.title {
            Some(raw) => Some(normalize_title(raw)?),
            None => None,
        };
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(time) = patch.time {
            self.time = time;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        Ok(())
    }
}

/// Mutable fields of an item; `None` leaves the field untouched.
/// `time: Some(None)` clears the time of day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<Option<NaiveTime>>,
    pub category: Option<Category>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.date.is_none() && self.time.is_none() && self.category.is_none()
    }
}

fn normalize_title(raw: &str) -> Result<String, ItemError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ItemError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

fn unset_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}
