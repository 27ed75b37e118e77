//! Entity store seam
//!
//! The pipeline never owns persistence. It talks to whatever backs tasks and
//! events through [`EntityStore`], scoped by [`UserId`], and every operation
//! comes back as a `Result` rather than a panic.

pub mod memory;

pub use memory::InMemoryStore;

use crate::core::types::{EntityId, EntityType, Priority, TaskStatus, UserId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("No task or event with id {0}")]
    NotFound(EntityId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stored task or calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub user_id: UserId,
    pub entity_type: EntityType,
    pub title: String,
    pub description: Option<String>,
    /// Only tasks carry a status
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// The date used by date-range filters: due date for tasks, start day
    /// for events
    pub fn date(&self) -> Option<NaiveDate> {
        match self.entity_type {
            EntityType::Task => self.due_date,
            EntityType::Event => self.start.map(|s| s.date()),
        }
    }

    /// Overwrite every field that is set in `fields`
    pub fn apply(&mut self, fields: &EntityFields) {
        if let Some(title) = &fields.title {
            self.title = title.clone();
        }
        if let Some(description) = &fields.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = fields.status {
            self.status = Some(status);
        }
        if let Some(priority) = fields.priority {
            self.priority = Some(priority);
        }
        if let Some(due) = fields.due_date {
            self.due_date = Some(due);
        }
        if let Some(start) = fields.start {
            self.start = Some(start);
        }
        if let Some(end) = fields.end {
            self.end = Some(end);
        }
        if let Some(location) = &fields.location {
            self.location = Some(location.clone());
        }
        if let Some(tags) = &fields.tags {
            self.tags = tags.clone();
        }
    }

    /// One-line rendering used in summaries and model context
    pub fn summary_line(&self) -> String {
        let mut details = Vec::new();
        match self.entity_type {
            EntityType::Task => {
                if let Some(due) = self.due_date {
                    details.push(format!("due {}", due));
                }
            }
            EntityType::Event => {
                if let Some(start) = self.start {
                    details.push(format!("at {}", start.format("%Y-%m-%d %H:%M")));
                }
                if let Some(location) = &self.location {
                    details.push(format!("in {}", location));
                }
            }
        }
        if let Some(priority) = self.priority {
            details.push(priority.to_string());
        }
        if let Some(status) = self.status {
            details.push(status.to_string());
        }
        if !self.tags.is_empty() {
            details.push(format!("#{}", self.tags.join(" #")));
        }

        if details.is_empty() {
            format!("\"{}\"", self.title)
        } else {
            format!("\"{}\" ({})", self.title, details.join(", "))
        }
    }
}

/// Field values for a create, or a patch for an update (`None` = unchanged)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl EntityFields {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Render the set fields as `field → value` pairs
    pub fn describe_changes(&self) -> String {
        let mut changes = Vec::new();
        if let Some(title) = &self.title {
            changes.push(format!("title → \"{}\"", title));
        }
        if self.description.is_some() {
            changes.push("description updated".to_string());
        }
        if let Some(status) = self.status {
            changes.push(format!("status → {}", status));
        }
        if let Some(priority) = self.priority {
            changes.push(format!("priority → {}", priority));
        }
        if let Some(due) = self.due_date {
            changes.push(format!("due → {}", due));
        }
        if let Some(start) = self.start {
            changes.push(format!("start → {}", start.format("%Y-%m-%d %H:%M")));
        }
        if let Some(end) = self.end {
            changes.push(format!("end → {}", end.format("%Y-%m-%d %H:%M")));
        }
        if let Some(location) = &self.location {
            changes.push(format!("location → {}", location));
        }
        if let Some(tags) = &self.tags {
            changes.push(format!("tags → {}", tags.join(", ")));
        }
        changes.join(", ")
    }
}

/// Predicate for [`EntityStore::search`]; every set field must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    /// Case-insensitive substring of the title
    pub title_contains: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// Case-insensitive exact tag
    pub tag: Option<String>,
    /// Inclusive lower bound on [`Entity::date`]
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on [`Entity::date`]
    pub date_to: Option<NaiveDate>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(needle) = &self.title_contains {
            if !entity
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }

        if let Some(status) = self.status {
            if entity.status != Some(status) {
                return false;
            }
        }

        if let Some(priority) = self.priority {
            if entity.priority != Some(priority) {
                return false;
            }
        }

        if let Some(tag) = &self.tag {
            if !entity.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = entity.date() else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }

        true
    }

    /// Human-readable rendering, e.g. `priority urgent, due 2024-05-01`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title_contains {
            parts.push(format!("title containing \"{}\"", title));
        }
        if let Some(status) = self.status {
            parts.push(format!("status {}", status));
        }
        if let Some(priority) = self.priority {
            parts.push(format!("priority {}", priority));
        }
        if let Some(tag) = &self.tag {
            parts.push(format!("tag #{}", tag));
        }
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) if from == to => parts.push(format!("on {}", from)),
            (Some(from), Some(to)) => parts.push(format!("between {} and {}", from, to)),
            (Some(from), None) => parts.push(format!("from {}", from)),
            (None, Some(to)) => parts.push(format!("until {}", to)),
            (None, None) => {}
        }

        if parts.is_empty() {
            "any criteria".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Persistence backend for tasks and events
///
/// Implementations must scope every call to `user`: another user's records
/// behave as if they did not exist.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create(
        &self,
        user: &UserId,
        entity_type: EntityType,
        fields: &EntityFields,
    ) -> StoreResult<Entity>;

    async fn get(&self, user: &UserId, id: EntityId) -> StoreResult<Entity>;

    /// Matches in a stable order, truncated to `limit` when given
    async fn search(
        &self,
        user: &UserId,
        entity_type: EntityType,
        criteria: &SearchCriteria,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Entity>>;

    async fn update(&self, user: &UserId, id: EntityId, fields: &EntityFields)
        -> StoreResult<Entity>;

    async fn delete(&self, user: &UserId, id: EntityId) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str) -> Entity {
        let now = Utc::now();
        Entity {
            id: EntityId::new(),
            user_id: UserId::new("u1"),
            entity_type: EntityType::Task,
            title: title.to_string(),
            description: None,
            status: Some(TaskStatus::Todo),
            priority: Some(Priority::Urgent),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 10),
            start: None,
            end: None,
            location: None,
            tags: vec!["Work".into()],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_title_match_is_case_insensitive() {
        let criteria = SearchCriteria {
            title_contains: Some("REPORT".into()),
            ..Default::default()
        };
        assert!(criteria.matches(&task("Quarterly report")));
        assert!(!criteria.matches(&task("Groceries")));
    }

    #[test]
    fn test_predicates_and_together() {
        let criteria = SearchCriteria {
            title_contains: Some("report".into()),
            priority: Some(Priority::Low),
            ..Default::default()
        };
        assert!(!criteria.matches(&task("Quarterly report")));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10);
        let criteria = SearchCriteria {
            date_from: day,
            date_to: day,
            ..Default::default()
        };
        assert!(criteria.matches(&task("a")));

        let later = SearchCriteria {
            date_from: NaiveDate::from_ymd_opt(2024, 5, 11),
            ..Default::default()
        };
        assert!(!later.matches(&task("a")));
    }

    #[test]
    fn test_date_filter_excludes_undated() {
        let mut undated = task("a");
        undated.due_date = None;
        let criteria = SearchCriteria {
            date_to: NaiveDate::from_ymd_opt(2030, 1, 1),
            ..Default::default()
        };
        assert!(!criteria.matches(&undated));
    }

    #[test]
    fn test_tag_match() {
        let criteria = SearchCriteria {
            tag: Some("work".into()),
            ..Default::default()
        };
        assert!(criteria.matches(&task("a")));
    }

    #[test]
    fn test_apply_patch_keeps_unset_fields() {
        let mut entity = task("Quarterly report");
        entity.apply(&EntityFields {
            status: Some(TaskStatus::Done),
            ..Default::default()
        });
        assert_eq!(entity.status, Some(TaskStatus::Done));
        assert_eq!(entity.title, "Quarterly report");
        assert_eq!(entity.priority, Some(Priority::Urgent));
    }

    #[test]
    fn test_describe() {
        let criteria = SearchCriteria {
            priority: Some(Priority::Urgent),
            ..Default::default()
        };
        assert_eq!(criteria.describe(), "priority urgent");
        assert_eq!(SearchCriteria::default().describe(), "any criteria");
    }
}
