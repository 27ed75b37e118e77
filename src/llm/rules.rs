//! Deterministic keyword extractor
//!
//! Used when no model is configured and in tests that need repeatable
//! proposals. It understands a small, fixed vocabulary ("add", "delete",
//! "mark ... done", "what's due today") and otherwise asks the user to
//! rephrase. It never needs stored context.

use crate::command::resolver::ActionResolver;
use crate::core::error::Result;
use crate::core::types::{EntityType, Priority, TaskStatus};
use crate::llm::extractor::{ExtractionRequest, IntentExtractor};
use crate::llm::parser::{parse_date, ActionProposal, Extraction, Verb};
use crate::store::{EntityFields, SearchCriteria};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

const DELETE_WORDS: &[&str] = &["delete", "remove", "cancel", "clear", "drop"];
const COMPLETE_WORDS: &[&str] = &["complete", "finish", "mark", "tick"];
const CREATE_WORDS: &[&str] = &["add", "create", "new", "schedule", "remind", "book"];
const READ_WORDS: &[&str] = &[
    "what", "what's", "whats", "show", "list", "find", "which", "any", "do",
];
const EVENT_WORDS: &[&str] = &[
    "event",
    "events",
    "meeting",
    "meetings",
    "appointment",
    "appointments",
    "calendar",
];
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "new", "task", "event", "me", "to", "for", "my", "please",
];
const DATE_WORDS: &[&str] = &["today", "tomorrow", "yesterday"];

/// Keyword-driven strategy behind the same interface as the model extractor
#[derive(Debug, Default, Clone)]
pub struct RuleExtractor;

impl RuleExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Pure keyword interpretation of one utterance
    pub fn interpret(&self, utterance: &str, today: NaiveDate) -> Extraction {
        let words = tokenize(utterance);
        if words.is_empty() {
            return Extraction::reply("Say something like \"add a task to call mom tomorrow\".");
        }

        let entity_type = if words.iter().any(|w| EVENT_WORDS.contains(&w.as_str())) {
            EntityType::Event
        } else {
            EntityType::Task
        };

        let Some((verb, verb_at)) = detect_verb(&words, utterance) else {
            return Extraction::reply(
                "I didn't catch an action there. I can add, list, complete or delete tasks and events.",
            );
        };

        let criteria = criteria_from_words(&words, utterance, today, verb);
        let proposal = match verb {
            Verb::Create => {
                let fields = create_fields(&words[verb_at + 1..], utterance, entity_type, today);
                ActionProposal::new(Verb::Create, entity_type).with_params(fields)
            }
            Verb::Read => ActionProposal::new(Verb::Read, entity_type).with_criteria(criteria),
            Verb::Update => {
                let updates = EntityFields {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                };
                targeted(Verb::Update, entity_type, criteria).with_updates(updates)
            }
            Verb::Delete => targeted(Verb::Delete, entity_type, criteria),
        };

        let response = match verb {
            Verb::Create => format!("I'll add that {}.", entity_type.noun()),
            Verb::Read => format!("Here are your {}.", entity_type.plural()),
            Verb::Update => format!("I'll mark the matching {} done.", entity_type.plural()),
            Verb::Delete => format!("These {} would be deleted.", entity_type.plural()),
        };

        Extraction {
            response,
            proposals: vec![proposal],
            intent: Some(format!("{}_{}", verb, entity_type.plural())),
            confidence: 0.5,
            needs_context: false,
            context_query: None,
            dropped: 0,
            warnings: Vec::new(),
        }
    }
}

#[async_trait]
impl IntentExtractor for RuleExtractor {
    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
        _resolver: &ActionResolver,
    ) -> Result<Extraction> {
        Ok(self.interpret(request.utterance, request.today))
    }
}

fn targeted(verb: Verb, entity_type: EntityType, criteria: SearchCriteria) -> ActionProposal {
    let proposal = ActionProposal::new(verb, entity_type);
    if criteria.is_empty() {
        proposal
    } else {
        proposal.with_criteria(criteria)
    }
}

/// Lowercased words with surrounding punctuation stripped
fn tokenize(utterance: &str) -> Vec<String> {
    utterance
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '#')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn detect_verb(words: &[String], utterance: &str) -> Option<(Verb, usize)> {
    let position = |set: &[&str]| words.iter().position(|w| set.contains(&w.as_str()));

    if let Some(i) = position(DELETE_WORDS) {
        return Some((Verb::Delete, i));
    }
    if let Some(i) = position(COMPLETE_WORDS) {
        let marks_done = words[i] != "mark" || words.iter().any(|w| w == "done" || w == "complete");
        if marks_done {
            return Some((Verb::Update, i));
        }
    }
    if let Some(i) = position(CREATE_WORDS) {
        return Some((Verb::Create, i));
    }
    if let Some(i) = position(READ_WORDS) {
        return Some((Verb::Read, i));
    }
    if utterance.trim_end().ends_with('?') {
        return Some((Verb::Read, 0));
    }
    None
}

fn quoted(utterance: &str) -> Option<String> {
    let start = utterance.find('"')?;
    let rest = &utterance[start + 1..];
    let end = rest.find('"')?;
    let text = rest[..end].trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn criteria_from_words(
    words: &[String],
    utterance: &str,
    today: NaiveDate,
    verb: Verb,
) -> SearchCriteria {
    let mut criteria = SearchCriteria {
        title_contains: quoted(utterance),
        ..Default::default()
    };

    let mut i = 0;
    while i < words.len() {
        let word = words[i].as_str();
        match word {
            "tagged" | "tag" | "labelled" | "labeled" if i + 1 < words.len() => {
                criteria.tag = Some(words[i + 1].trim_start_matches('#').to_string());
                i += 2;
                continue;
            }
            w if w.starts_with('#') && w.len() > 1 => {
                criteria.tag = Some(w[1..].to_string());
            }
            w if DATE_WORDS.contains(&w) => {
                let date = parse_date(w, today);
                criteria.date_from = date;
                criteria.date_to = date;
            }
            "overdue" => {
                criteria.date_to = today.pred_opt();
            }
            // "done" is the new status of an update, not a filter on it
            "done" | "completed" | "finished" if verb != Verb::Update => {
                criteria.status = Some(TaskStatus::Done);
            }
            "open" | "unfinished" => criteria.status = Some(TaskStatus::Todo),
            w => {
                if let Some(priority) = Priority::parse_loose(w) {
                    criteria.priority = Some(priority);
                }
            }
        }
        i += 1;
    }

    criteria
}

fn create_fields(
    after_verb: &[String],
    utterance: &str,
    entity_type: EntityType,
    today: NaiveDate,
) -> EntityFields {
    let mut date = None;
    let mut priority = None;
    let mut title_words = Vec::new();

    for word in after_verb {
        let w = word.as_str();
        if DATE_WORDS.contains(&w) {
            date = parse_date(w, today);
        } else if let Some(p) = Priority::parse_loose(w).filter(|p| *p >= Priority::High) {
            priority = Some(p);
        } else if title_words.is_empty() && FILLER_WORDS.contains(&w) {
            continue;
        } else {
            title_words.push(w);
        }
    }

    // Drop a trailing "on"/"for"/"at" left behind by a removed date word
    while title_words
        .last()
        .is_some_and(|w| matches!(*w, "on" | "for" | "at" | "by" | "due"))
    {
        title_words.pop();
    }

    let title = quoted(utterance).or_else(|| {
        let joined = title_words.join(" ");
        let mut chars = joined.chars();
        chars
            .next()
            .map(|first| first.to_uppercase().collect::<String>() + chars.as_str())
    });

    let mut fields = EntityFields {
        title,
        priority,
        ..Default::default()
    };
    match entity_type {
        EntityType::Task => fields.due_date = date,
        EntityType::Event => {
            let nine = NaiveTime::from_hms_opt(9, 0, 0);
            fields.start = nine.map(|t| date.unwrap_or(today).and_time(t));
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_delete_tagged() {
        let extraction = RuleExtractor::new().interpret("delete all tasks tagged urgent", today());
        assert_eq!(extraction.proposals.len(), 1);
        let proposal = &extraction.proposals[0];
        assert_eq!(proposal.verb, Verb::Delete);
        assert_eq!(proposal.entity_type, EntityType::Task);
        let criteria = proposal.search_criteria.as_ref().unwrap();
        assert_eq!(criteria.tag.as_deref(), Some("urgent"));
        assert_eq!(criteria.priority, None);
    }

    #[test]
    fn test_whats_due_today() {
        let extraction = RuleExtractor::new().interpret("what's due today?", today());
        let proposal = &extraction.proposals[0];
        assert_eq!(proposal.verb, Verb::Read);
        let criteria = proposal.search_criteria.as_ref().unwrap();
        assert_eq!(criteria.date_from, Some(today()));
        assert_eq!(criteria.date_to, Some(today()));
    }

    #[test]
    fn test_create_task_with_date() {
        let extraction =
            RuleExtractor::new().interpret("add a task to call mom tomorrow", today());
        let proposal = &extraction.proposals[0];
        assert_eq!(proposal.verb, Verb::Create);
        assert_eq!(proposal.params.title.as_deref(), Some("Call mom"));
        assert_eq!(proposal.params.due_date, NaiveDate::from_ymd_opt(2024, 5, 11));
    }

    #[test]
    fn test_create_event_gets_start() {
        let extraction = RuleExtractor::new().interpret("schedule a meeting \"Design review\"", today());
        let proposal = &extraction.proposals[0];
        assert_eq!(proposal.entity_type, EntityType::Event);
        assert_eq!(proposal.params.title.as_deref(), Some("Design review"));
        assert_eq!(
            proposal.params.start.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-05-10 09:00"
        );
    }

    #[test]
    fn test_mark_done() {
        let extraction = RuleExtractor::new().interpret("mark \"report\" done", today());
        let proposal = &extraction.proposals[0];
        assert_eq!(proposal.verb, Verb::Update);
        assert_eq!(proposal.updates.as_ref().unwrap().status, Some(TaskStatus::Done));
        let criteria = proposal.search_criteria.as_ref().unwrap();
        assert_eq!(criteria.title_contains.as_deref(), Some("report"));
        assert_eq!(criteria.status, None);
    }

    #[test]
    fn test_unknown_utterance_has_no_actions() {
        let extraction = RuleExtractor::new().interpret("hello there", today());
        assert!(extraction.proposals.is_empty());
        assert!(!extraction.response.is_empty());
    }
}
