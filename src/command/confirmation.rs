//! Confirmation gate between resolution and execution
//!
//! Nothing that changes stored data runs until the user accepts it. This
//! module owns the status transitions of a pending turn and is the only
//! producer of executor input.

use crate::command::action::{
    ActionId, ActionStatus, ConversationTurn, ExecutionResult, ResolvedAction,
};
use serde::{Deserialize, Serialize};

/// User decision on a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

/// Whether a decision changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Applied(ActionStatus),
    /// The action was not pending (already decided, executed, or a read)
    Skipped(ActionStatus),
    NotFound,
}

/// Stateless transition rules over a turn's actions
pub struct ConfirmationCoordinator;

impl ConfirmationCoordinator {
    /// Apply a decision to one action; only `pending` actions move
    pub fn decide(action: &mut ResolvedAction, decision: Decision) -> DecisionOutcome {
        if action.status != ActionStatus::Pending || action.is_read() {
            return DecisionOutcome::Skipped(action.status);
        }

        action.status = match decision {
            Decision::Accept => ActionStatus::Accepted,
            Decision::Reject => ActionStatus::Rejected,
        };
        tracing::debug!(action = %action.description, status = %action.status, "decided");
        DecisionOutcome::Applied(action.status)
    }

    /// Decide one action of a turn by id
    pub fn decide_in(
        turn: &mut ConversationTurn,
        id: ActionId,
        decision: Decision,
    ) -> DecisionOutcome {
        match turn.action_mut(id) {
            Some(action) => Self::decide(action, decision),
            None => DecisionOutcome::NotFound,
        }
    }

    /// Apply a decision to every still-pending action; returns how many moved
    ///
    /// Already-decided actions are left alone, so repeating the call is a no-op.
    pub fn decide_all(turn: &mut ConversationTurn, decision: Decision) -> usize {
        turn.actions
            .iter_mut()
            .map(|action| Self::decide(action, decision))
            .filter(|outcome| matches!(outcome, DecisionOutcome::Applied(_)))
            .count()
    }

    /// Copies of exactly the accepted actions, in turn order
    pub fn accepted(turn: &ConversationTurn) -> Vec<ResolvedAction> {
        turn.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Accepted)
            .cloned()
            .collect()
    }

    /// Write execution outcomes back into the turn
    ///
    /// Only `accepted` actions take a result; anything else keeps its status.
    pub fn record(turn: &mut ConversationTurn, results: &[ExecutionResult]) {
        for result in results {
            if let Some(action) = turn.action_mut(result.action.id) {
                if action.status == ActionStatus::Accepted {
                    action.status = if result.success {
                        ActionStatus::Executed
                    } else {
                        ActionStatus::Failed
                    };
                }
            }
        }
    }

    /// Drop undecided actions, e.g. when the user moves on without deciding
    pub fn expire(turn: &mut ConversationTurn) -> usize {
        Self::decide_all(turn, Decision::Reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EntityId, EntityType};
    use crate::store::{EntityFields, SearchCriteria};

    fn turn_with_deletes(n: usize) -> ConversationTurn {
        let actions = (0..n)
            .map(|i| ResolvedAction::delete(EntityType::Task, EntityId::new(), &format!("t{}", i)))
            .collect();
        ConversationTurn::new("delete stuff", "Confirm?", actions)
    }

    #[test]
    fn test_accept_then_reject_is_skipped() {
        let mut turn = turn_with_deletes(1);
        let action = &mut turn.actions[0];

        assert_eq!(
            ConfirmationCoordinator::decide(action, Decision::Accept),
            DecisionOutcome::Applied(ActionStatus::Accepted)
        );
        assert_eq!(
            ConfirmationCoordinator::decide(action, Decision::Reject),
            DecisionOutcome::Skipped(ActionStatus::Accepted)
        );
        assert_eq!(action.status, ActionStatus::Accepted);
    }

    #[test]
    fn test_reject_all_is_idempotent() {
        let mut turn = turn_with_deletes(3);
        assert_eq!(ConfirmationCoordinator::decide_all(&mut turn, Decision::Reject), 3);
        assert_eq!(ConfirmationCoordinator::decide_all(&mut turn, Decision::Reject), 0);
        assert_eq!(turn.count(ActionStatus::Rejected), 3);
        assert_eq!(turn.actions.len(), 3);
    }

    #[test]
    fn test_accept_all_skips_decided() {
        let mut turn = turn_with_deletes(3);
        let first = turn.actions[0].id;
        ConfirmationCoordinator::decide_in(&mut turn, first, Decision::Reject);

        assert_eq!(ConfirmationCoordinator::decide_all(&mut turn, Decision::Accept), 2);
        assert_eq!(turn.actions[0].status, ActionStatus::Rejected);

        let accepted = ConfirmationCoordinator::accepted(&turn);
        assert_eq!(accepted.len(), 2);
        assert!(accepted.iter().all(|a| a.id != first));
    }

    #[test]
    fn test_reads_are_never_decided() {
        let read = ResolvedAction::read(EntityType::Task, SearchCriteria::default(), vec![]);
        let mut turn = ConversationTurn::new("list", "Here", vec![read]);
        assert_eq!(ConfirmationCoordinator::decide_all(&mut turn, Decision::Accept), 0);
        assert!(ConfirmationCoordinator::accepted(&turn).is_empty());
    }

    #[test]
    fn test_unknown_id() {
        let mut turn = turn_with_deletes(1);
        assert_eq!(
            ConfirmationCoordinator::decide_in(&mut turn, ActionId::new(), Decision::Accept),
            DecisionOutcome::NotFound
        );
    }

    #[test]
    fn test_record_moves_accepted_to_terminal() {
        let create = ResolvedAction::create(EntityType::Task, EntityFields::titled("a"));
        let mut turn = ConversationTurn::new("x", "y", vec![create]);
        ConfirmationCoordinator::decide_all(&mut turn, Decision::Accept);

        let accepted = ConfirmationCoordinator::accepted(&turn);
        let results = vec![ExecutionResult::failed(accepted[0].clone(), "boom")];
        ConfirmationCoordinator::record(&mut turn, &results);

        assert_eq!(turn.actions[0].status, ActionStatus::Failed);
        assert!(ConfirmationCoordinator::accepted(&turn).is_empty());
        assert!(turn.is_settled());

        // A terminal action never moves again
        ConfirmationCoordinator::record(
            &mut turn,
            &[ExecutionResult::succeeded(accepted[0].clone(), None)],
        );
        assert_eq!(turn.actions[0].status, ActionStatus::Failed);
    }

    #[test]
    fn test_expire_rejects_pending_only() {
        let mut turn = turn_with_deletes(2);
        let first = turn.actions[0].id;
        ConfirmationCoordinator::decide_in(&mut turn, first, Decision::Accept);
        assert_eq!(ConfirmationCoordinator::expire(&mut turn), 1);
        assert_eq!(turn.actions[0].status, ActionStatus::Accepted);
        assert_eq!(turn.actions[1].status, ActionStatus::Rejected);
    }
}
