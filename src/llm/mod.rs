//! Natural-language side of the pipeline: model gateway, prompt context and
//! intent extraction strategies

pub mod client;
pub mod context;
pub mod extractor;
pub mod parser;
pub mod rules;

pub use client::{GenerationOptions, LanguageModel, LlmClient, ScriptedModel};
pub use context::{ConversationContext, Message, Role};
pub use extractor::{ExtractionRequest, IntentExtractor, ModelExtractor};
pub use parser::{ActionProposal, Extraction, Verb};
pub use rules::RuleExtractor;
