//! The conversational action pipeline, end to end
//!
//! utterance -> IntentExtractor -> ActionResolver -> pending turn
//! -> user decisions -> ActionExecutor -> result summary -> history
//!
//! Every collaborator is injected, and no failure in here escapes as an
//! error: each one ends up as text the user can read.

use crate::command::action::{ActionId, ConversationTurn, ExecutionResult};
use crate::command::confirmation::{ConfirmationCoordinator, Decision, DecisionOutcome};
use crate::command::executor::{summarize_results, ActionExecutor};
use crate::command::resolver::{ActionResolver, Resolution};
use crate::core::config::PipelineConfig;
use crate::core::error::PipelineError;
use crate::core::types::UserId;
use crate::llm::context::Message;
use crate::llm::extractor::{ExtractionRequest, IntentExtractor};
use crate::llm::parser::Extraction;
use crate::store::EntityStore;
use chrono::{Local, NaiveDate};
use std::sync::Arc;

/// Reply when the extractor's output could not be understood
pub const REPHRASE_MESSAGE: &str =
    "Sorry, I didn't quite understand that. Could you rephrase it?";

/// Reply when the generation backend is unavailable
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I'm having trouble thinking right now. Please try again in a moment.";

/// One user's conversation: history plus the turn awaiting decisions
#[derive(Debug, Clone)]
pub struct Conversation {
    pub user: UserId,
    history: Vec<Message>,
    pending: Option<ConversationTurn>,
}

impl Conversation {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            history: Vec::new(),
            pending: None,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// The most recent turn, while it is still on screen
    pub fn pending(&self) -> Option<&ConversationTurn> {
        self.pending.as_ref()
    }

    pub fn decide(&mut self, id: ActionId, decision: Decision) -> DecisionOutcome {
        match self.pending.as_mut() {
            Some(turn) => ConfirmationCoordinator::decide_in(turn, id, decision),
            None => DecisionOutcome::NotFound,
        }
    }

    /// Decide the `n`th action (1-based) of the pending turn
    pub fn decide_nth(&mut self, n: usize, decision: Decision) -> DecisionOutcome {
        let id = self
            .pending
            .as_ref()
            .and_then(|turn| turn.actions.get(n.checked_sub(1)?))
            .map(|action| action.id);
        match id {
            Some(id) => self.decide(id, decision),
            None => DecisionOutcome::NotFound,
        }
    }

    pub fn decide_all(&mut self, decision: Decision) -> usize {
        self.pending
            .as_mut()
            .map(|turn| ConfirmationCoordinator::decide_all(turn, decision))
            .unwrap_or(0)
    }
}

/// The pipeline facade
pub struct Assistant {
    extractor: Arc<dyn IntentExtractor>,
    resolver: ActionResolver,
    executor: ActionExecutor,
    config: PipelineConfig,
    fixed_date: Option<NaiveDate>,
}

impl Assistant {
    pub fn new(
        store: Arc<dyn EntityStore>,
        extractor: Arc<dyn IntentExtractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            resolver: ActionResolver::new(
                store.clone(),
                config.max_search_matches,
                config.max_read_results,
            ),
            executor: ActionExecutor::new(store),
            config,
            fixed_date: None,
        }
    }

    /// Pin "today" instead of reading the local clock
    pub fn with_fixed_date(mut self, date: NaiveDate) -> Self {
        self.fixed_date = Some(date);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.fixed_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Turn one utterance into a fully resolved turn; never fails
    pub async fn extract(
        &self,
        utterance: &str,
        recent: &[Message],
        user: &UserId,
    ) -> ConversationTurn {
        let request = ExtractionRequest {
            utterance,
            history: recent,
            user,
            today: self.today(),
        };

        let extraction = match self.extractor.extract(&request, &self.resolver).await {
            Ok(extraction) => extraction,
            Err(PipelineError::ExtractionParse(reason)) => {
                tracing::debug!(%reason, "unparsable extraction, asking to rephrase");
                return ConversationTurn::reply_only(utterance, REPHRASE_MESSAGE);
            }
            Err(PipelineError::Generation(reason)) => {
                tracing::warn!(%reason, "generation failed");
                return ConversationTurn::reply_only(utterance, APOLOGY_MESSAGE);
            }
            Err(e) => {
                tracing::error!(error = %e, "extraction failed");
                return ConversationTurn::reply_only(utterance, APOLOGY_MESSAGE);
            }
        };

        let resolution = self.resolver.resolve(&extraction.proposals, user).await;
        let response = compose_response(&extraction, &resolution);

        let Extraction {
            intent,
            confidence,
            dropped,
            mut warnings,
            ..
        } = extraction;
        let mut turn = ConversationTurn::new(utterance, response, resolution.actions);
        turn.intent = intent;
        turn.confidence = confidence;
        warnings.extend(resolution.warnings);
        if dropped > 0 {
            warnings.push(format!(
                "{} requested action(s) could not be understood and were left out.",
                dropped
            ));
        }
        turn.warnings = warnings;

        tracing::info!(
            intent = turn.intent.as_deref().unwrap_or("-"),
            actions = turn.actions.len(),
            needs_confirmation = turn.needs_confirmation,
            "turn ready"
        );
        turn
    }

    /// Process a user message within a conversation and make it the pending turn
    ///
    /// Whatever was still undecided in the previous turn is discarded, and
    /// accepted actions that were never confirmed are dropped with it.
    pub async fn handle_message<'c>(
        &self,
        conversation: &'c mut Conversation,
        utterance: &str,
    ) -> &'c ConversationTurn {
        if let Some(mut previous) = conversation.pending.take() {
            let expired = ConfirmationCoordinator::expire(&mut previous);
            let unconfirmed = ConfirmationCoordinator::accepted(&previous).len();
            if expired + unconfirmed > 0 {
                tracing::info!(expired, unconfirmed, "discarding undecided actions");
            }
        }

        let turn = self
            .extract(utterance, &conversation.history, &conversation.user)
            .await;

        conversation.history.push(Message::user(utterance));
        conversation
            .history
            .push(Message::assistant(turn.render_summary()));

        conversation.pending.insert(turn)
    }

    /// Execute every accepted action of the pending turn
    ///
    /// Results come back in turn order, one per accepted action. The
    /// itemised summary is appended to the conversation history.
    pub async fn confirm(&self, conversation: &mut Conversation) -> Vec<ExecutionResult> {
        let Some(turn) = conversation.pending.as_mut() else {
            return Vec::new();
        };

        let accepted = ConfirmationCoordinator::accepted(turn);
        if accepted.is_empty() {
            return Vec::new();
        }

        let results = self.executor.execute(accepted, &conversation.user).await;
        ConfirmationCoordinator::record(turn, &results);

        conversation
            .history
            .push(Message::assistant(summarize_results(&results)));
        results
    }
}

/// The model's reply, followed by resolver notes and read results
fn compose_response(extraction: &Extraction, resolution: &Resolution) -> String {
    let mut lines = Vec::new();

    let reply = extraction.response.trim();
    if !reply.is_empty() {
        lines.push(reply.to_string());
    } else if extraction.proposals.is_empty() {
        lines.push(REPHRASE_MESSAGE.to_string());
    }

    lines.extend(resolution.notes.iter().cloned());

    for action in resolution.actions.iter().filter(|a| a.is_read()) {
        let results = action.results();
        if results.is_empty() {
            lines.push(format!("{}.", action.description));
        } else {
            lines.push(format!("{}:", action.description));
            lines.extend(results.iter().map(|e| format!("  - {}", e.summary_line())));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::action::ActionStatus;
    use crate::core::types::EntityType;
    use crate::llm::client::ScriptedModel;
    use crate::llm::extractor::ModelExtractor;
    use crate::store::InMemoryStore;

    fn assistant(model: ScriptedModel, store: Arc<InMemoryStore>) -> Assistant {
        let config = PipelineConfig::default();
        let extractor = ModelExtractor::new(Arc::new(model), config.clone());
        Assistant::new(store, Arc::new(extractor), config)
            .with_fixed_date(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
    }

    #[tokio::test]
    async fn test_generation_failure_is_apology() {
        let store = Arc::new(InMemoryStore::new());
        let assistant = assistant(ScriptedModel::new().with_failure("quota"), store);

        let turn = assistant.extract("hi", &[], &UserId::new("u")).await;
        assert_eq!(turn.response, APOLOGY_MESSAGE);
        assert!(turn.actions.is_empty());
        assert!(!turn.needs_confirmation);
    }

    #[tokio::test]
    async fn test_truncated_json_is_clarification() {
        let store = Arc::new(InMemoryStore::new());
        let model = ScriptedModel::new().with_reply(r#"{"response": "Deleting", "actions": [{"verb": "DEL"#);
        let assistant = assistant(model, store);

        let turn = assistant.extract("delete stuff", &[], &UserId::new("u")).await;
        assert_eq!(turn.response, REPHRASE_MESSAGE);
        assert!(turn.actions.is_empty());
        assert!(!turn.needs_confirmation);
    }

    #[tokio::test]
    async fn test_new_message_discards_undecided() {
        let store = Arc::new(InMemoryStore::new());
        let model = ScriptedModel::new()
            .with_reply(r#"{"response": "Adding.", "actions": [{"verb": "CREATE", "entityType": "TASK", "params": {"title": "A"}}]}"#)
            .with_reply(r#"{"response": "Hello!", "actions": []}"#);
        let assistant = assistant(model, store.clone());
        let mut conversation = Conversation::new(UserId::new("u"));

        let turn = assistant.handle_message(&mut conversation, "add A").await;
        assert_eq!(turn.pending_count(), 1);
        assert_eq!(conversation.decide_all(Decision::Accept), 1);

        assistant.handle_message(&mut conversation, "hi").await;
        assert!(assistant.confirm(&mut conversation).await.is_empty());
        assert!(store.is_empty().await);
        assert_eq!(conversation.history().len(), 4);
    }

    #[tokio::test]
    async fn test_confirm_records_results_and_history() {
        let store = Arc::new(InMemoryStore::new());
        let model = ScriptedModel::new().with_reply(
            r#"{"response": "Adding.", "actions": [{"verb": "CREATE", "entityType": "TASK", "params": {"title": "A"}}]}"#,
        );
        let assistant = assistant(model, store.clone());
        let mut conversation = Conversation::new(UserId::new("u"));

        assistant.handle_message(&mut conversation, "add A").await;
        assert_eq!(
            conversation.decide_nth(1, Decision::Accept),
            DecisionOutcome::Applied(ActionStatus::Accepted)
        );
        assert_eq!(
            conversation.decide_nth(2, Decision::Accept),
            DecisionOutcome::NotFound
        );

        let results = assistant.confirm(&mut conversation).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(
            conversation.pending().unwrap().actions[0].status,
            ActionStatus::Executed
        );
        assert!(conversation
            .history()
            .last()
            .unwrap()
            .content
            .starts_with("Done: 1 of 1 succeeded."));

        // Executed actions are never run again
        assert!(assistant.confirm(&mut conversation).await.is_empty());
        let all = store
            .search(&UserId::new("u"), EntityType::Task, &Default::default(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_compose_response_lists_notes() {
        let extraction = Extraction::reply("Okay.");
        let resolution = Resolution {
            notes: vec!["No tasks matched priority urgent, so there is nothing to delete.".into()],
            ..Default::default()
        };
        assert_eq!(
            compose_response(&extraction, &resolution),
            "Okay.\nNo tasks matched priority urgent, so there is nothing to delete."
        );
    }
}
