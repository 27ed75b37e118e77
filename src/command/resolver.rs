//! Action resolution - turns proposals into concrete, single-target actions
//!
//! A proposal that names its targets by criteria ("all urgent tasks") is
//! expanded into one action per matching record, so every UPDATE/DELETE the
//! user confirms points at exactly one id. Reads run here and are done.

use crate::command::action::ResolvedAction;
use crate::core::error::{PipelineError, Result};
use crate::core::types::{EntityId, EntityType, UserId};
use crate::llm::parser::{criteria_from_fields, ActionProposal, Verb};
use crate::store::{Entity, EntityFields, EntityStore, SearchCriteria};
use ahash::AHashSet;
use std::sync::Arc;

/// Result of resolving a batch of proposals
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Resolved actions in proposal order
    pub actions: Vec<ResolvedAction>,
    /// Facts the turn summary should mention (no matches, truncation)
    pub notes: Vec<String>,
    /// Degradations caused by store failures
    pub warnings: Vec<String>,
}

/// How an UPDATE/DELETE names its target
enum Targeting {
    Direct(EntityId),
    Search(SearchCriteria),
    Unknown,
}

/// Resolves proposals against the entity store
pub struct ActionResolver {
    store: Arc<dyn EntityStore>,
    max_matches: usize,
    max_read_results: usize,
}

impl ActionResolver {
    pub fn new(store: Arc<dyn EntityStore>, max_matches: usize, max_read_results: usize) -> Self {
        Self {
            store,
            max_matches: max_matches.max(1),
            max_read_results: max_read_results.max(1),
        }
    }

    pub fn max_matches(&self) -> usize {
        self.max_matches
    }

    /// Store search with failures reported as resolution errors
    pub async fn search(
        &self,
        user: &UserId,
        entity_type: EntityType,
        criteria: &SearchCriteria,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        self.store
            .search(user, entity_type, criteria, Some(limit))
            .await
            .map_err(|e| PipelineError::Resolution(e.to_string()))
    }

    /// Resolve every proposal; a failure on one never affects the others
    pub async fn resolve(&self, proposals: &[ActionProposal], user: &UserId) -> Resolution {
        let mut resolution = Resolution::default();

        for proposal in proposals {
            match proposal.verb {
                Verb::Create => {
                    resolution.actions.push(ResolvedAction::create(
                        proposal.entity_type,
                        proposal.params.clone(),
                    ));
                }
                Verb::Read => self.resolve_read(proposal, user, &mut resolution).await,
                Verb::Update | Verb::Delete => {
                    self.resolve_targeted(proposal, user, &mut resolution).await
                }
            }
        }

        tracing::debug!(
            proposals = proposals.len(),
            actions = resolution.actions.len(),
            "resolved proposals"
        );
        resolution
    }

    async fn resolve_read(
        &self,
        proposal: &ActionProposal,
        user: &UserId,
        resolution: &mut Resolution,
    ) {
        let criteria = proposal.effective_criteria();
        let limit = self.max_read_results;

        match self
            .search(user, proposal.entity_type, &criteria, limit + 1)
            .await
        {
            Ok(mut results) => {
                if results.len() > limit {
                    results.truncate(limit);
                    resolution.notes.push(format!(
                        "Showing the first {} {} only.",
                        limit,
                        proposal.entity_type.plural()
                    ));
                }
                resolution.actions.push(ResolvedAction::read(
                    proposal.entity_type,
                    criteria,
                    results,
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "read lookup failed");
                resolution.warnings.push(format!(
                    "I couldn't look up your {} right now.",
                    proposal.entity_type.plural()
                ));
            }
        }
    }

    async fn resolve_targeted(
        &self,
        proposal: &ActionProposal,
        user: &UserId,
        resolution: &mut Resolution,
    ) {
        let kind = proposal.entity_type;

        let updates = match proposal.verb {
            Verb::Update => {
                let updates = proposal.effective_updates();
                if updates.is_empty() {
                    resolution.notes.push(format!(
                        "No changes were given for the {} update, so nothing was proposed.",
                        kind.noun()
                    ));
                    return;
                }
                Some(updates)
            }
            _ => None,
        };

        match targeting(proposal) {
            Targeting::Direct(id) => {
                let label = match self.store.get(user, id).await {
                    Ok(entity) if entity.entity_type != kind => {
                        tracing::warn!(%id, expected = %kind, found = %entity.entity_type, "target type mismatch");
                        resolution.notes.push(format!(
                            "\"{}\" is {} {}, not {} {}, so there is nothing to {}.",
                            entity.title,
                            article(entity.entity_type),
                            entity.entity_type.noun(),
                            article(kind),
                            kind.noun(),
                            proposal.verb
                        ));
                        return;
                    }
                    Ok(entity) => entity.title,
                    Err(e) => {
                        tracing::warn!(%id, error = %e, "could not load action target");
                        resolution
                            .warnings
                            .push(format!("I couldn't load {} {}: {}", kind.noun(), id, e));
                        id.to_string()
                    }
                };
                resolution
                    .actions
                    .push(targeted_action(kind, id, &label, updates.as_ref()));
            }
            Targeting::Search(criteria) => {
                let cap = self.max_matches;
                let matches = match self.search(user, kind, &criteria, cap + 1).await {
                    Ok(matches) => matches,
                    Err(e) => {
                        tracing::warn!(error = %e, "search expansion failed");
                        resolution.warnings.push(format!(
                            "I couldn't search your {} right now, so nothing was proposed.",
                            kind.plural()
                        ));
                        return;
                    }
                };

                if matches.is_empty() {
                    resolution.notes.push(format!(
                        "No {} matched {}, so there is nothing to {}.",
                        kind.plural(),
                        criteria.describe(),
                        proposal.verb
                    ));
                    return;
                }

                if matches.len() > cap {
                    resolution.notes.push(format!(
                        "More than {} {} matched; only the first {} are listed.",
                        cap,
                        kind.plural(),
                        cap
                    ));
                }

                let mut seen = AHashSet::new();
                for entity in matches.into_iter().take(cap) {
                    if seen.insert(entity.id) {
                        resolution.actions.push(targeted_action(
                            kind,
                            entity.id,
                            &entity.title,
                            updates.as_ref(),
                        ));
                    }
                }
            }
            Targeting::Unknown => {
                resolution.notes.push(format!(
                    "I couldn't tell which {} you meant to {}.",
                    kind.noun(),
                    proposal.verb
                ));
            }
        }
    }
}

fn targeting(proposal: &ActionProposal) -> Targeting {
    if let Some(id) = proposal.target_id {
        return Targeting::Direct(id);
    }
    if let Some(criteria) = &proposal.search_criteria {
        return Targeting::Search(criteria.clone());
    }
    let from_params = criteria_from_fields(&EntityFields {
        // Only identifying fields of the params can stand in as criteria
        title: proposal.params.title.clone(),
        tags: proposal.params.tags.clone(),
        ..Default::default()
    });
    if from_params.is_empty() {
        Targeting::Unknown
    } else {
        Targeting::Search(from_params)
    }
}

fn article(kind: EntityType) -> &'static str {
    match kind {
        EntityType::Event => "an",
        EntityType::Task => "a",
    }
}

fn targeted_action(
    kind: EntityType,
    id: EntityId,
    label: &str,
    updates: Option<&EntityFields>,
) -> ResolvedAction {
    match updates {
        Some(updates) => ResolvedAction::update(kind, id, label, updates.clone()),
        None => ResolvedAction::delete(kind, id, label),
    }
}
