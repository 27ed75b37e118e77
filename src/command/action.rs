//! Resolved actions and the turn that carries them to the user

use crate::core::types::{EntityId, EntityType};
use crate::llm::parser::Verb;
use crate::store::{Entity, EntityFields, SearchCriteria};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a resolved action within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Confirmation lifecycle of a resolved action
///
/// `Pending -> Accepted -> Executed | Failed`, or `Pending -> Rejected`.
/// Reads are created as `Executed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Accepted,
    Rejected,
    Executed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Executed | Self::Failed)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a resolved action does, with exactly the data its verb needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPayload {
    Create {
        fields: EntityFields,
    },
    Read {
        criteria: SearchCriteria,
        results: Vec<Entity>,
    },
    Update {
        target: EntityId,
        updates: EntityFields,
    },
    Delete {
        target: EntityId,
    },
}

/// A proposal made concrete: one verb, at most one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAction {
    pub id: ActionId,
    pub entity_type: EntityType,
    pub payload: ActionPayload,
    pub description: String,
    pub status: ActionStatus,
}

impl ResolvedAction {
    pub fn create(entity_type: EntityType, fields: EntityFields) -> Self {
        let title = fields.title.as_deref().unwrap_or("(untitled)");
        let description = format!("Create {}: \"{}\"", entity_type.noun(), title);
        Self::pending(entity_type, ActionPayload::Create { fields }, description)
    }

    /// A read is executed at resolution time and never waits for confirmation
    pub fn read(entity_type: EntityType, criteria: SearchCriteria, results: Vec<Entity>) -> Self {
        let description = match results.len() {
            0 => format!("No {} matched {}", entity_type.plural(), criteria.describe()),
            1 => format!("Found 1 {}", entity_type.noun()),
            n => format!("Found {} {}", n, entity_type.plural()),
        };
        Self {
            id: ActionId::new(),
            entity_type,
            payload: ActionPayload::Read { criteria, results },
            description,
            status: ActionStatus::Executed,
        }
    }

    /// `label` names the target for the user, normally its title
    pub fn update(
        entity_type: EntityType,
        target: EntityId,
        label: &str,
        updates: EntityFields,
    ) -> Self {
        let changes = updates.describe_changes();
        let description = if changes.is_empty() {
            format!("Update {}: \"{}\"", entity_type.noun(), label)
        } else {
            format!("Update {}: \"{}\" ({})", entity_type.noun(), label, changes)
        };
        Self::pending(
            entity_type,
            ActionPayload::Update { target, updates },
            description,
        )
    }

    pub fn delete(entity_type: EntityType, target: EntityId, label: &str) -> Self {
        let description = format!("Delete {}: \"{}\"", entity_type.noun(), label);
        Self::pending(entity_type, ActionPayload::Delete { target }, description)
    }

    fn pending(entity_type: EntityType, payload: ActionPayload, description: String) -> Self {
        Self {
            id: ActionId::new(),
            entity_type,
            payload,
            description,
            status: ActionStatus::Pending,
        }
    }

    pub fn verb(&self) -> Verb {
        match self.payload {
            ActionPayload::Create { .. } => Verb::Create,
            ActionPayload::Read { .. } => Verb::Read,
            ActionPayload::Update { .. } => Verb::Update,
            ActionPayload::Delete { .. } => Verb::Delete,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self.payload, ActionPayload::Read { .. })
    }

    /// The single entity an UPDATE/DELETE acts on
    pub fn target(&self) -> Option<EntityId> {
        match self.payload {
            ActionPayload::Update { target, .. } | ActionPayload::Delete { target } => Some(target),
            _ => None,
        }
    }

    /// Results attached to a READ
    pub fn results(&self) -> &[Entity] {
        match &self.payload {
            ActionPayload::Read { results, .. } => results,
            _ => &[],
        }
    }
}

/// Everything produced for one user message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub user_message: String,
    /// Natural-language reply shown above the actions
    pub response: String,
    pub actions: Vec<ResolvedAction>,
    /// True iff at least one non-READ action exists
    pub needs_confirmation: bool,
    /// Intent label reported by the extractor, if any
    pub intent: Option<String>,
    pub confidence: f32,
    /// Degradations the user should know about (failed lookups, truncation)
    pub warnings: Vec<String>,
}

impl ConversationTurn {
    pub fn new(
        user_message: impl Into<String>,
        response: impl Into<String>,
        actions: Vec<ResolvedAction>,
    ) -> Self {
        let needs_confirmation = actions.iter().any(|a| !a.is_read());
        Self {
            user_message: user_message.into(),
            response: response.into(),
            actions,
            needs_confirmation,
            intent: None,
            confidence: 0.0,
            warnings: Vec::new(),
        }
    }

    /// A turn with no actions that only carries a reply
    pub fn reply_only(user_message: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(user_message, response, Vec::new())
    }

    pub fn pending_count(&self) -> usize {
        self.count(ActionStatus::Pending)
    }

    pub fn count(&self, status: ActionStatus) -> usize {
        self.actions.iter().filter(|a| a.status == status).count()
    }

    /// No action is waiting for a decision or for execution
    pub fn is_settled(&self) -> bool {
        self.actions
            .iter()
            .all(|a| !matches!(a.status, ActionStatus::Pending | ActionStatus::Accepted))
    }

    pub fn action(&self, id: ActionId) -> Option<&ResolvedAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut ResolvedAction> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    /// Response text followed by any warnings, one per line
    pub fn render_summary(&self) -> String {
        let mut s = self.response.clone();
        for warning in &self.warnings {
            if !s.is_empty() {
                s.push('\n');
            }
            s.push_str("Note: ");
            s.push_str(warning);
        }
        s
    }
}

/// Outcome of one executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The action with its final status
    pub action: ResolvedAction,
    pub success: bool,
    pub error: Option<String>,
    /// Record as stored after a create or update
    pub entity: Option<Entity>,
}

impl ExecutionResult {
    pub fn succeeded(mut action: ResolvedAction, entity: Option<Entity>) -> Self {
        action.status = ActionStatus::Executed;
        Self {
            action,
            success: true,
            error: None,
            entity,
        }
    }

    pub fn failed(mut action: ResolvedAction, error: impl Into<String>) -> Self {
        action.status = ActionStatus::Failed;
        Self {
            action,
            success: false,
            error: Some(error.into()),
            entity: None,
        }
    }
}
