//! Intent extraction strategies
//!
//! [`IntentExtractor`] is the seam the assistant calls. [`ModelExtractor`]
//! asks a language model and tolerates whatever comes back;
//! [`RuleExtractor`](crate::llm::rules::RuleExtractor) is the deterministic
//! alternative behind the same interface.

use crate::command::resolver::ActionResolver;
use crate::core::config::PipelineConfig;
use crate::core::error::{PipelineError, Result};
use crate::core::types::{EntityType, UserId};
use crate::llm::client::{GenerationOptions, LanguageModel};
use crate::llm::context::{ConversationContext, Message};
use crate::llm::parser::{parse_extraction, ContextQuery, Extraction, EXTRACTION_SYSTEM_PROMPT};
use crate::store::Entity;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Inputs of one extraction
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub utterance: &'a str,
    /// Conversation so far, oldest first, not including `utterance`
    pub history: &'a [Message],
    pub user: &'a UserId,
    pub today: NaiveDate,
}

/// Turns a user message into proposals
///
/// `resolver` gives access to the search primitive for strategies that need
/// stored facts before they can answer. Malformed model output surfaces as
/// [`PipelineError::ExtractionParse`]; backend failures as
/// [`PipelineError::Generation`].
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
        resolver: &ActionResolver,
    ) -> Result<Extraction>;
}

/// Language-model backed extractor with one bounded context round-trip
pub struct ModelExtractor {
    model: Arc<dyn LanguageModel>,
    config: PipelineConfig,
}

impl ModelExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, config: PipelineConfig) -> Self {
        Self { model, config }
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// One model call, bounded in time, parsed leniently
    async fn ask(&self, context: &ConversationContext, utterance: &str) -> Result<Extraction> {
        let mut prompt = context.summary();
        if context.has_lookup() {
            prompt.push_str(
                "\nThe database context above is everything relevant that is stored. \
                 Answer from it; do not request more context.\n",
            );
        }
        prompt.push_str(&format!(
            "\nUSER MESSAGE:\n{}\n\nRespond with JSON only:",
            utterance
        ));

        let call = self
            .model
            .generate(EXTRACTION_SYSTEM_PROMPT, &prompt, self.options());
        let reply = tokio::time::timeout(self.config.llm_timeout(), call)
            .await
            .map_err(|_| {
                PipelineError::Generation(format!(
                    "model did not answer within {}s",
                    self.config.llm_timeout_secs
                ))
            })??;

        tracing::debug!(reply = %reply, "model reply");
        parse_extraction(&reply, context.today)
    }

    /// Records the model asked about, split evenly when it named no type
    async fn gather(
        &self,
        query: &ContextQuery,
        user: &UserId,
        resolver: &ActionResolver,
    ) -> Result<Vec<Entity>> {
        let limit = self.config.max_context_entities.max(1);
        match query.entity_type {
            Some(kind) => resolver.search(user, kind, &query.criteria, limit).await,
            None => {
                let half = (limit / 2).max(1);
                let mut entities = resolver
                    .search(user, EntityType::Task, &query.criteria, half)
                    .await?;
                entities.extend(
                    resolver
                        .search(user, EntityType::Event, &query.criteria, half)
                        .await?,
                );
                Ok(entities)
            }
        }
    }
}

/// What to look up for a context round-trip
///
/// Prefers the model's explicit query, then the criteria of its first
/// proposal, then everything of the first proposal's type.
fn context_query(extraction: &Extraction) -> ContextQuery {
    if let Some(query) = &extraction.context_query {
        return query.clone();
    }
    match extraction.proposals.first() {
        Some(proposal) => ContextQuery {
            entity_type: Some(proposal.entity_type),
            criteria: proposal.search_criteria.clone().unwrap_or_default(),
        },
        None => ContextQuery {
            entity_type: None,
            criteria: Default::default(),
        },
    }
}

#[async_trait]
impl IntentExtractor for ModelExtractor {
    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
        resolver: &ActionResolver,
    ) -> Result<Extraction> {
        let context = ConversationContext::new(
            request.today,
            request.history,
            self.config.context_messages,
        );
        let first = self.ask(&context, request.utterance).await?;
        if !first.needs_context {
            return Ok(first);
        }

        let query = context_query(&first);
        tracing::info!(criteria = %query.criteria.describe(), "model requested context");

        let entities = match self.gather(&query, request.user, resolver).await {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(error = %e, "context lookup failed");
                let mut degraded = first;
                degraded.needs_context = false;
                degraded
                    .warnings
                    .push("I couldn't check your saved items, so this may be incomplete.".into());
                return Ok(degraded);
            }
        };

        let context = context.with_entities(entities);
        let mut second = self.ask(&context, request.utterance).await?;
        if second.needs_context {
            tracing::debug!("ignoring repeated context request");
            second.needs_context = false;
        }
        Ok(second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Priority;
    use crate::llm::client::ScriptedModel;
    use crate::llm::parser::Verb;
    use crate::store::{EntityFields, EntityStore, InMemoryStore};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn resolver(store: Arc<InMemoryStore>) -> ActionResolver {
        ActionResolver::new(store, 10, 50)
    }

    #[tokio::test]
    async fn test_single_call_without_context() {
        let model = Arc::new(ScriptedModel::new().with_reply(
            r#"{"response": "Added.", "actions": [{"verb": "CREATE", "entityType": "TASK", "params": {"title": "Milk"}}]}"#,
        ));
        let extractor = ModelExtractor::new(model.clone(), PipelineConfig::default());
        let user = UserId::new("u");
        let request = ExtractionRequest {
            utterance: "add milk",
            history: &[],
            user: &user,
            today: today(),
        };

        let extraction = extractor
            .extract(&request, &resolver(Arc::new(InMemoryStore::new())))
            .await
            .unwrap();

        assert_eq!(extraction.proposals.len(), 1);
        assert_eq!(extraction.proposals[0].verb, Verb::Create);
        assert_eq!(model.call_count(), 1);
        let prompt = &model.prompts()[0];
        assert!(prompt.prompt.contains("USER MESSAGE:\nadd milk"));
        assert!(prompt.prompt.contains("Today: 2024-05-10"));
    }

    #[tokio::test]
    async fn test_context_round_trip_is_bounded() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::new("u");
        let fields = EntityFields {
            priority: Some(Priority::Urgent),
            ..EntityFields::titled("Renew passport")
        };
        store.create(&user, EntityType::Task, &fields).await.unwrap();

        let needs = r#"{"response": "", "needsContext": true,
            "contextQuery": {"entityType": "TASK", "criteria": {"priority": "urgent"}}, "actions": []}"#;
        let model = Arc::new(
            ScriptedModel::new()
                .with_reply(needs)
                .with_reply(needs)
                .with_reply("never used"),
        );
        let extractor = ModelExtractor::new(model.clone(), PipelineConfig::default());
        let request = ExtractionRequest {
            utterance: "which tasks are urgent?",
            history: &[],
            user: &user,
            today: today(),
        };

        let extraction = extractor.extract(&request, &resolver(store)).await.unwrap();

        assert_eq!(model.call_count(), 2);
        assert!(!extraction.needs_context);
        let second = &model.prompts()[1];
        assert!(second.prompt.contains("Database Context:"));
        assert!(second.prompt.contains("Renew passport"));
    }

    #[tokio::test]
    async fn test_empty_lookup_changes_second_prompt() {
        let needs = r#"{"response": "", "needsContext": true,
            "contextQuery": {"entityType": "TASK", "criteria": {"priority": "urgent"}}, "actions": []}"#;
        let model = Arc::new(
            ScriptedModel::new()
                .with_reply(needs)
                .with_reply(r#"{"response": "You have no urgent tasks.", "actions": []}"#),
        );
        let extractor = ModelExtractor::new(model.clone(), PipelineConfig::default());
        let user = UserId::new("u");
        let request = ExtractionRequest {
            utterance: "which tasks are urgent?",
            history: &[],
            user: &user,
            today: today(),
        };

        let extraction = extractor
            .extract(&request, &resolver(Arc::new(InMemoryStore::new())))
            .await
            .unwrap();

        assert_eq!(extraction.response, "You have no urgent tasks.");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert_ne!(prompts[0].prompt, prompts[1].prompt);
        assert!(prompts[1].prompt.contains("Database Context:\nNo matching records."));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_parse_error() {
        let model = Arc::new(ScriptedModel::new().with_reply("Sorry, I can't help with that."));
        let extractor = ModelExtractor::new(model, PipelineConfig::default());
        let user = UserId::new("u");
        let request = ExtractionRequest {
            utterance: "???",
            history: &[],
            user: &user,
            today: today(),
        };

        let result = extractor
            .extract(&request, &resolver(Arc::new(InMemoryStore::new())))
            .await;
        assert!(matches!(result, Err(PipelineError::ExtractionParse(_))));
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn generate(&self, _: &str, _: &str, _: GenerationOptions) -> Result<String> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok("{}".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_model_times_out() {
        let extractor = ModelExtractor::new(Arc::new(SlowModel), PipelineConfig::default());
        let user = UserId::new("u");
        let request = ExtractionRequest {
            utterance: "hello",
            history: &[],
            user: &user,
            today: today(),
        };

        let result = extractor
            .extract(&request, &resolver(Arc::new(InMemoryStore::new())))
            .await;
        assert!(matches!(result, Err(PipelineError::Generation(ref m)) if m.contains("30s")));
    }
}
