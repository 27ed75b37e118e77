//! Command execution - applies confirmed actions to the entity store

use crate::command::action::{ActionPayload, ActionStatus, ExecutionResult, ResolvedAction};
use crate::core::types::{EntityId, EntityType, UserId};
use crate::store::{Entity, EntityStore, StoreError, StoreResult};
use std::sync::Arc;

/// Executes accepted actions one at a time, each as its own unit of work
pub struct ActionExecutor {
    store: Arc<dyn EntityStore>,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// One result per input action, in input order
    ///
    /// A failing action is reported and the batch moves on; nothing is
    /// retried or rolled back. Actions that are not `accepted` are refused
    /// without touching the store.
    pub async fn execute(&self, actions: Vec<ResolvedAction>, user: &UserId) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            if action.status != ActionStatus::Accepted {
                tracing::warn!(action = %action.description, status = %action.status, "refusing unaccepted action");
                let status = action.status;
                results.push(ExecutionResult::failed(
                    action,
                    format!("action was not accepted (status {})", status),
                ));
                continue;
            }

            match self.dispatch(&action, user).await {
                Ok(entity) => {
                    tracing::info!(action = %action.description, "executed");
                    results.push(ExecutionResult::succeeded(action, entity));
                }
                Err(e) => {
                    tracing::warn!(action = %action.description, error = %e, "execution failed");
                    results.push(ExecutionResult::failed(action, e.to_string()));
                }
            }
        }

        results
    }

    /// The verb × entity-type dispatch; entity type travels as data
    async fn dispatch(&self, action: &ResolvedAction, user: &UserId) -> StoreResult<Option<Entity>> {
        match &action.payload {
            ActionPayload::Create { fields } => self
                .store
                .create(user, action.entity_type, fields)
                .await
                .map(Some),
            ActionPayload::Update { target, updates } => {
                self.check_kind(user, *target, action.entity_type).await?;
                self.store.update(user, *target, updates).await.map(Some)
            }
            ActionPayload::Delete { target } => {
                self.check_kind(user, *target, action.entity_type).await?;
                self.store.delete(user, *target).await.map(|_| None)
            }
            // Reads ran during resolution
            ActionPayload::Read { .. } => Ok(None),
        }
    }

    /// The target must still be the kind of record the user confirmed
    async fn check_kind(&self, user: &UserId, id: EntityId, kind: EntityType) -> StoreResult<()> {
        let entity = self.store.get(user, id).await?;
        if entity.entity_type != kind {
            return Err(StoreError::Validation(format!(
                "\"{}\" has type {}, expected {}",
                entity.title,
                entity.entity_type.noun(),
                kind.noun()
            )));
        }
        Ok(())
    }
}

/// How a batch went as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Empty,
    AllSucceeded,
    PartialFailure { succeeded: usize, failed: usize },
    AllFailed,
}

impl BatchOutcome {
    pub fn classify(results: &[ExecutionResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        match (succeeded, failed) {
            (0, 0) => Self::Empty,
            (_, 0) => Self::AllSucceeded,
            (0, _) => Self::AllFailed,
            (succeeded, failed) => Self::PartialFailure { succeeded, failed },
        }
    }
}

/// Itemised, user-facing report of a batch
pub fn summarize_results(results: &[ExecutionResult]) -> String {
    let headline = match BatchOutcome::classify(results) {
        BatchOutcome::Empty => return "Nothing was executed.".to_string(),
        BatchOutcome::AllSucceeded => format!("Done: {} of {} succeeded.", results.len(), results.len()),
        BatchOutcome::PartialFailure { succeeded, failed } => format!(
            "Partly done: {} succeeded, {} failed.",
            succeeded, failed
        ),
        BatchOutcome::AllFailed => format!("Failed: none of {} succeeded.", results.len()),
    };

    let mut s = headline;
    for result in results {
        if result.success {
            s.push_str(&format!("\n  ✓ {}", result.action.description));
        } else {
            s.push_str(&format!(
                "\n  ✗ {} ({})",
                result.action.description,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    s
}
