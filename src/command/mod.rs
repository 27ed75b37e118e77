//! Command pipeline
//!
//! Converts extracted proposals into confirmed store mutations:
//! ActionProposal -> ActionResolver -> ResolvedAction -> ConfirmationCoordinator -> ActionExecutor

pub mod action;
pub mod confirmation;
pub mod executor;
pub mod resolver;

pub use action::{
    ActionId, ActionPayload, ActionStatus, ConversationTurn, ExecutionResult, ResolvedAction,
};
pub use confirmation::{ConfirmationCoordinator, Decision, DecisionOutcome};
pub use executor::{summarize_results, ActionExecutor, BatchOutcome};
pub use resolver::{ActionResolver, Resolution};
