//! In-memory entity store
//!
//! Backs the terminal front end and the test suite. Records live in a hash
//! map keyed by id; a sequence number keeps search results in creation order.

use super::{Entity, EntityFields, EntityStore, SearchCriteria, StoreError, StoreResult};
use crate::core::types::{EntityId, EntityType, TaskStatus, UserId};
use ahash::AHashMap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

struct Stored {
    seq: u64,
    entity: Entity,
}

#[derive(Default)]
struct Inner {
    entities: AHashMap<EntityId, Stored>,
    next_seq: u64,
}

/// Thread-safe store holding every record in memory
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record owned by `user`, in creation order
    pub async fn all(&self, user: &UserId) -> Vec<Entity> {
        let inner = self.inner.read().await;
        let mut owned: Vec<&Stored> = inner
            .entities
            .values()
            .filter(|s| &s.entity.user_id == user)
            .collect();
        owned.sort_by_key(|s| s.seq);
        owned.into_iter().map(|s| s.entity.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn validate_fields(entity_type: EntityType, fields: &EntityFields) -> StoreResult<()> {
    if let Some(title) = &fields.title {
        if title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".into()));
        }
    }

    if entity_type == EntityType::Event && fields.status.is_some() {
        return Err(StoreError::Validation("events do not have a status".into()));
    }

    if let (Some(start), Some(end)) = (fields.start, fields.end) {
        if end < start {
            return Err(StoreError::Validation(
                "event end must not be before its start".into(),
            ));
        }
    }

    Ok(())
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create(
        &self,
        user: &UserId,
        entity_type: EntityType,
        fields: &EntityFields,
    ) -> StoreResult<Entity> {
        validate_fields(entity_type, fields)?;

        let title = match &fields.title {
            Some(title) => title.trim().to_string(),
            None => return Err(StoreError::Validation("title is required".into())),
        };
        if entity_type == EntityType::Event && fields.start.is_none() {
            return Err(StoreError::Validation(
                "events need a start time".into(),
            ));
        }

        let now = Utc::now();
        let entity = Entity {
            id: EntityId::new(),
            user_id: user.clone(),
            entity_type,
            title,
            description: fields.description.clone(),
            status: match entity_type {
                EntityType::Task => Some(fields.status.unwrap_or(TaskStatus::Todo)),
                EntityType::Event => None,
            },
            priority: fields.priority,
            due_date: fields.due_date,
            start: fields.start,
            end: fields.end,
            location: fields.location.clone(),
            tags: fields.tags.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entities.insert(
            entity.id,
            Stored {
                seq,
                entity: entity.clone(),
            },
        );

        tracing::debug!(id = %entity.id, kind = %entity_type, "created entity");
        Ok(entity)
    }

    async fn get(&self, user: &UserId, id: EntityId) -> StoreResult<Entity> {
        let inner = self.inner.read().await;
        inner
            .entities
            .get(&id)
            .filter(|s| &s.entity.user_id == user)
            .map(|s| s.entity.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn search(
        &self,
        user: &UserId,
        entity_type: EntityType,
        criteria: &SearchCriteria,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Entity>> {
        let inner = self.inner.read().await;
        let mut matched: Vec<&Stored> = inner
            .entities
            .values()
            .filter(|s| {
                &s.entity.user_id == user
                    && s.entity.entity_type == entity_type
                    && criteria.matches(&s.entity)
            })
            .collect();
        matched.sort_by_key(|s| s.seq);

        let limit = limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|s| s.entity.clone())
            .collect())
    }

    async fn update(
        &self,
        user: &UserId,
        id: EntityId,
        fields: &EntityFields,
    ) -> StoreResult<Entity> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .entities
            .get_mut(&id)
            .filter(|s| &s.entity.user_id == user)
            .ok_or(StoreError::NotFound(id))?;

        validate_fields(stored.entity.entity_type, fields)?;
        if fields.is_empty() {
            return Err(StoreError::Validation("no fields to update".into()));
        }

        let mut updated = stored.entity.clone();
        updated.apply(fields);
        updated.title = updated.title.trim().to_string();
        if let (Some(start), Some(end)) = (updated.start, updated.end) {
            if end < start {
                return Err(StoreError::Validation(
                    "event end must not be before its start".into(),
                ));
            }
        }
        updated.updated_at = Utc::now();
        stored.entity = updated.clone();

        Ok(updated)
    }

    async fn delete(&self, user: &UserId, id: EntityId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .entities
            .get(&id)
            .is_some_and(|s| &s.entity.user_id == user);
        if !owned {
            return Err(StoreError::NotFound(id));
        }
        inner.entities.remove(&id);
        Ok(())
    }
}
