//! Parse model replies into action proposals
//!
//! The model is asked for strict JSON but is never trusted to deliver it.
//! Replies are scanned for balanced JSON objects (code fences and chatter
//! around them are ignored), and each proposed action is converted on its
//! own: one malformed action is dropped without losing its siblings.

use crate::core::error::{PipelineError, Result};
use crate::core::types::{EntityId, EntityType, Priority, TaskStatus};
use crate::store::{EntityFields, SearchCriteria};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Operation requested against a task or event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
}

impl Verb {
    /// Lenient parse accepting the synonyms models tend to produce
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "create" | "add" | "new" | "schedule" | "insert" => Some(Self::Create),
            "read" | "list" | "find" | "search" | "show" | "get" | "query" => Some(Self::Read),
            "update" | "edit" | "modify" | "change" | "complete" | "reschedule" | "move" => {
                Some(Self::Update)
            }
            "delete" | "remove" | "cancel" | "drop" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Whether the verb changes stored data
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Candidate operation extracted from user text
///
/// UPDATE/DELETE proposals name their target either with `target_id` or with
/// `search_criteria`; the resolver turns the latter into one action per match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub verb: Verb,
    pub entity_type: EntityType,
    pub params: EntityFields,
    pub target_id: Option<EntityId>,
    pub search_criteria: Option<SearchCriteria>,
    pub updates: Option<EntityFields>,
}

impl ActionProposal {
    pub fn new(verb: Verb, entity_type: EntityType) -> Self {
        Self {
            verb,
            entity_type,
            params: EntityFields::default(),
            target_id: None,
            search_criteria: None,
            updates: None,
        }
    }

    pub fn with_params(mut self, params: EntityFields) -> Self {
        self.params = params;
        self
    }

    pub fn with_criteria(mut self, criteria: SearchCriteria) -> Self {
        self.search_criteria = Some(criteria);
        self
    }

    pub fn with_target(mut self, id: EntityId) -> Self {
        self.target_id = Some(id);
        self
    }

    pub fn with_updates(mut self, updates: EntityFields) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Field changes for an UPDATE; `params` stand in when `updates` is absent
    pub fn effective_updates(&self) -> EntityFields {
        match &self.updates {
            Some(updates) if !updates.is_empty() => updates.clone(),
            _ => {
                let mut params = self.params.clone();
                // The title in params usually identifies the target, not a rename
                if self.search_criteria.is_some() || self.target_id.is_none() {
                    params.title = None;
                }
                params
            }
        }
    }

    /// Criteria for a READ; falls back to the params
    pub fn effective_criteria(&self) -> SearchCriteria {
        self.search_criteria
            .clone()
            .unwrap_or_else(|| criteria_from_fields(&self.params))
    }
}

/// Search the model asked to see before answering
#[derive(Debug, Clone, PartialEq)]
pub struct ContextQuery {
    pub entity_type: Option<EntityType>,
    pub criteria: SearchCriteria,
}

/// Structured result of one extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub response: String,
    pub proposals: Vec<ActionProposal>,
    pub intent: Option<String>,
    pub confidence: f32,
    /// The model needs stored facts to finish its answer
    pub needs_context: bool,
    pub context_query: Option<ContextQuery>,
    /// Actions present in the reply that could not be understood
    pub dropped: usize,
    /// Degradations to surface alongside the response
    pub warnings: Vec<String>,
}

impl Extraction {
    pub fn reply(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            proposals: Vec::new(),
            intent: None,
            confidence: 0.0,
            needs_context: false,
            context_query: None,
            dropped: 0,
            warnings: Vec::new(),
        }
    }
}

/// Extract the first JSON object from a model reply (handles surrounding text)
pub fn extract_json(response: &str) -> Result<&str> {
    json_candidates(response)
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::ExtractionParse("No JSON object found in response".into()))
}

/// Every top-level balanced `{...}` span in `text`, in order
///
/// Braces inside JSON strings do not count, and escapes are honoured. An
/// object cut off before its closing brace yields nothing.
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if depth == 0 {
            if c == '{' {
                depth = 1;
                start = i;
                in_string = false;
                escaped = false;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    candidates.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    candidates
}

/// Parse a full model reply into an [`Extraction`]
///
/// `today` anchors relative dates such as "tomorrow".
pub fn parse_extraction(response: &str, today: NaiveDate) -> Result<Extraction> {
    let mut fallback: Option<Map<String, Value>> = None;

    for candidate in json_candidates(response) {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        if object.contains_key("actions") || object.contains_key("response") {
            return Ok(extraction_from_object(&object, today));
        }
        if fallback.is_none() {
            fallback = Some(object);
        }
    }

    match fallback {
        Some(object) => Ok(extraction_from_object(&object, today)),
        None => Err(PipelineError::ExtractionParse(format!(
            "No parsable JSON object in response ({} chars)",
            response.len()
        ))),
    }
}

fn extraction_from_object(object: &Map<String, Value>, today: NaiveDate) -> Extraction {
    let response = string_field(object, &["response", "message", "reply"]).unwrap_or_default();

    let mut proposals = Vec::new();
    let mut dropped = 0;
    let mut warnings = Vec::new();
    if let Some(Value::Array(actions)) = object.get("actions") {
        for raw in actions {
            // A filter or change that cannot be read would silently widen or
            // shrink the action, so the whole item is left out
            let unreadable = unreadable_values(raw, today);
            if !unreadable.is_empty() {
                tracing::debug!(action = %raw, "dropping action with unreadable values");
                warnings.push(format!(
                    "I couldn't understand {}, so that request was left out.",
                    unreadable.join(", ")
                ));
                continue;
            }
            match proposal_from_value(raw, today) {
                Some(proposal) => proposals.push(proposal),
                None => {
                    tracing::debug!(action = %raw, "dropping unrecognised action");
                    dropped += 1;
                }
            }
        }
    }

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);

    let needs_context = ["needsContext", "needs_context"]
        .iter()
        .find_map(|k| object.get(*k))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let context_query = ["contextQuery", "context_query"]
        .iter()
        .find_map(|k| object.get(*k))
        .and_then(Value::as_object)
        .map(|q| {
            let entity_type = string_field(q, &["entityType", "entity_type", "entity", "type"])
                .and_then(|s| EntityType::parse_loose(&s));
            let criteria = match q.get("criteria").and_then(Value::as_object) {
                Some(inner) => criteria_from_object(inner, today),
                None => criteria_from_object(q, today),
            };
            ContextQuery {
                entity_type,
                criteria,
            }
        });

    Extraction {
        response,
        proposals,
        intent: string_field(object, &["intent"]),
        confidence,
        needs_context,
        context_query,
        dropped,
        warnings,
    }
}

/// Convert one element of the `actions` array, or `None` if it is unusable
pub fn proposal_from_value(raw: &Value, today: NaiveDate) -> Option<ActionProposal> {
    let object = raw.as_object()?;

    let verb = string_field(object, &["verb", "action", "operation", "type"])
        .and_then(|s| Verb::parse_loose(&s))?;
    let entity_type = string_field(object, &["entityType", "entity_type", "entity"])
        .and_then(|s| EntityType::parse_loose(&s))?;

    let params_object = object.get("params").and_then(Value::as_object);
    let params = params_object
        .map(|p| fields_from_object(p, today))
        .unwrap_or_default();

    let target_id = string_field(object, &["id", "targetId", "target_id"])
        .or_else(|| params_object.and_then(|p| string_field(p, &["id"])))
        .and_then(|s| s.parse::<EntityId>().ok());

    let search_criteria = ["searchCriteria", "search_criteria", "criteria"]
        .iter()
        .find_map(|k| object.get(*k))
        .and_then(Value::as_object)
        .map(|c| criteria_from_object(c, today))
        .filter(|c| !c.is_empty());

    let updates = object
        .get("updates")
        .and_then(Value::as_object)
        .map(|u| fields_from_object(u, today))
        .filter(|u| !u.is_empty());

    Some(ActionProposal {
        verb,
        entity_type,
        params,
        target_id,
        search_criteria,
        updates,
    })
}

const STATUS_KEYS: &[&str] = &["status"];
const PRIORITY_KEYS: &[&str] = &["priority"];
const CRITERIA_DATE_KEYS: &[&str] = &[
    "date", "dueDate", "due_date", "on", "dateFrom", "date_from", "from", "after", "startDate",
    "dateTo", "date_to", "to", "before", "endDate",
];
const DUE_KEYS: &[&str] = &["dueDate", "due_date", "due", "date"];
const TIME_KEYS: &[&str] = &[
    "start", "startTime", "start_time", "startDate", "end", "endTime", "end_time", "endDate",
];

/// Criteria and update values of one raw action that are present but
/// cannot be read, rendered as `key "value"`
pub fn unreadable_values(raw: &Value, today: NaiveDate) -> Vec<String> {
    let mut unreadable = Vec::new();
    let Some(object) = raw.as_object() else {
        return unreadable;
    };

    let criteria = ["searchCriteria", "search_criteria", "criteria"]
        .iter()
        .find_map(|k| object.get(*k))
        .and_then(Value::as_object);
    if let Some(criteria) = criteria {
        note_unreadable(criteria, STATUS_KEYS, |s| TaskStatus::parse_loose(s).is_some(), &mut unreadable);
        note_unreadable(criteria, PRIORITY_KEYS, |s| Priority::parse_loose(s).is_some(), &mut unreadable);
        note_unreadable(criteria, CRITERIA_DATE_KEYS, |s| parse_date(s, today).is_some(), &mut unreadable);
    }

    if let Some(updates) = object.get("updates").and_then(Value::as_object) {
        note_unreadable(updates, STATUS_KEYS, |s| TaskStatus::parse_loose(s).is_some(), &mut unreadable);
        note_unreadable(updates, PRIORITY_KEYS, |s| Priority::parse_loose(s).is_some(), &mut unreadable);
        note_unreadable(updates, DUE_KEYS, |s| parse_date(s, today).is_some(), &mut unreadable);
        note_unreadable(updates, TIME_KEYS, |s| parse_datetime(s, today).is_some(), &mut unreadable);
    }

    unreadable
}

fn note_unreadable(
    object: &Map<String, Value>,
    keys: &[&str],
    readable: impl Fn(&str) -> bool,
    out: &mut Vec<String>,
) {
    for key in keys {
        if let Some(value) = string_field(object, &[*key]) {
            if !value.is_empty() && !readable(&value) {
                out.push(format!("{} \"{}\"", key, value));
            }
        }
    }
}

/// Read entity fields from a loosely-keyed JSON object
pub fn fields_from_object(object: &Map<String, Value>, today: NaiveDate) -> EntityFields {
    let start = string_field(object, &["start", "startTime", "start_time", "startDate"])
        .and_then(|s| parse_datetime(&s, today));
    let end = string_field(object, &["end", "endTime", "end_time", "endDate"])
        .and_then(|s| parse_datetime(&s, today));

    EntityFields {
        title: string_field(object, &["title", "name", "summary"]).filter(|t| !t.is_empty()),
        description: string_field(object, &["description", "notes", "details"]),
        status: string_field(object, &["status"]).and_then(|s| TaskStatus::parse_loose(&s)),
        priority: string_field(object, &["priority"]).and_then(|s| Priority::parse_loose(&s)),
        due_date: string_field(object, &["dueDate", "due_date", "due", "date"])
            .and_then(|s| parse_date(&s, today)),
        start,
        end,
        location: string_field(object, &["location", "place"]),
        tags: tags_field(object),
    }
}

/// Read a search predicate from a loosely-keyed JSON object
pub fn criteria_from_object(object: &Map<String, Value>, today: NaiveDate) -> SearchCriteria {
    let exact_date = string_field(object, &["date", "dueDate", "due_date", "on"])
        .and_then(|s| parse_date(&s, today));

    SearchCriteria {
        title_contains: string_field(
            object,
            &["title", "titleContains", "title_contains", "query", "keyword", "text"],
        )
        .filter(|t| !t.is_empty()),
        status: string_field(object, &["status"]).and_then(|s| TaskStatus::parse_loose(&s)),
        priority: string_field(object, &["priority"]).and_then(|s| Priority::parse_loose(&s)),
        tag: string_field(object, &["tag", "label"])
            .or_else(|| tags_field(object).and_then(|tags| tags.into_iter().next())),
        date_from: string_field(object, &["dateFrom", "date_from", "from", "after", "startDate"])
            .and_then(|s| parse_date(&s, today))
            .or(exact_date),
        date_to: string_field(object, &["dateTo", "date_to", "to", "before", "endDate"])
            .and_then(|s| parse_date(&s, today))
            .or(exact_date),
    }
}

/// Treat create-style params as a search predicate
pub fn criteria_from_fields(fields: &EntityFields) -> SearchCriteria {
    let date = fields.due_date.or(fields.start.map(|s| s.date()));
    SearchCriteria {
        title_contains: fields.title.clone(),
        status: fields.status,
        priority: fields.priority,
        tag: fields.tags.as_ref().and_then(|t| t.first().cloned()),
        date_from: date,
        date_to: date,
    }
}

/// ISO date, or one of `today`, `tomorrow`, `yesterday`
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    match raw.to_lowercase().as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    parse_datetime(raw, today).map(|dt| dt.date())
}

/// ISO date-time with or without seconds, `T` or space separated; a bare
/// date means midnight
pub fn parse_datetime(raw: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_end_matches('Z');
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    let midnight = NaiveTime::from_hms_opt(0, 0, 0)?;
    match raw.to_lowercase().as_str() {
        "today" | "tomorrow" | "yesterday" => parse_date(raw, today).map(|d| d.and_time(midnight)),
        _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(midnight)),
    }
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match object.get(*k) {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn tags_field(object: &Map<String, Value>) -> Option<Vec<String>> {
    match object.get("tags")? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().trim_start_matches('#').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(|t| t.trim().trim_start_matches('#').to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

/// System prompt for intent extraction
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are the action planner of a personal assistant that manages the user's TASKS and calendar EVENTS.
Turn the user's message into structured JSON. You never change data yourself: every
CREATE, UPDATE and DELETE you propose is shown to the user for confirmation first.

VERBS:
- CREATE: add a new task or event (put its fields in "params")
- READ: look up tasks or events (put the filter in "searchCriteria")
- UPDATE: change existing items (target with "id" or "searchCriteria", new values in "updates")
- DELETE: remove existing items (target with "id" or "searchCriteria")

FIELDS (params / updates):
  title, description, status (todo|in_progress|done, tasks only),
  priority (low|medium|high|urgent), dueDate (YYYY-MM-DD, tasks),
  start / end (YYYY-MM-DDTHH:MM, events), location, tags (array of strings)

SEARCH CRITERIA (all optional, combined with AND):
  title (substring), status, priority, tag, dateFrom, dateTo (YYYY-MM-DD, inclusive)

Bulk requests ("delete all urgent tasks") use searchCriteria, never invented ids.
Only use an "id" that appears in the DATABASE CONTEXT.
If you cannot answer without knowing what is stored, set "needsContext": true and
describe the lookup in "contextQuery".

OUTPUT FORMAT (JSON only, no explanation):
{
  "response": "short reply to show the user",
  "intent": "short label such as create_task, delete_tasks, list_events, chat",
  "confidence": 0.0-1.0,
  "needsContext": false,
  "contextQuery": {"entityType": "TASK|EVENT", "criteria": {}} or null,
  "actions": [
    {"verb": "CREATE|READ|UPDATE|DELETE", "entityType": "TASK|EVENT",
     "params": {}, "id": null, "searchCriteria": null, "updates": null}
  ]
}

Examples:
"remind me to pay rent on the 1st" -> {"response": "I'll add that task.", "intent": "create_task", "confidence": 0.9, "needsContext": false, "contextQuery": null, "actions": [{"verb": "CREATE", "entityType": "TASK", "params": {"title": "Pay rent", "dueDate": "2024-06-01"}}]}
"delete all urgent tasks" -> {"response": "Here are the urgent tasks to delete.", "intent": "delete_tasks", "confidence": 0.9, "needsContext": false, "contextQuery": null, "actions": [{"verb": "DELETE", "entityType": "TASK", "params": {}, "searchCriteria": {"priority": "urgent"}}]}
"what's due today" -> {"response": "Here is what is due today.", "intent": "list_tasks", "confidence": 0.95, "needsContext": false, "contextQuery": null, "actions": [{"verb": "READ", "entityType": "TASK", "params": {}, "searchCriteria": {"dateFrom": "today", "dateTo": "today"}}]}
"hi there" -> {"response": "Hello! What can I do for you?", "intent": "chat", "confidence": 0.9, "needsContext": false, "contextQuery": null, "actions": []}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_extract_json_simple() {
        let response = r#"{"response": "ok", "actions": []}"#;
        let json = extract_json(response).unwrap();
        assert_eq!(json, response);
    }

    #[test]
    fn test_extract_json_with_code_fence() {
        let response = "Sure!\n```json\n{\"response\": \"ok\", \"actions\": []}\n```\nAnything else?";
        let json = extract_json(response).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let response = r#"{"response": "use {braces} and \"quotes\"", "actions": []} trailing }"#;
        let json = extract_json(response).unwrap();
        assert_eq!(
            json,
            r#"{"response": "use {braces} and \"quotes\"", "actions": []}"#
        );
    }

    #[test]
    fn test_prose_apostrophes_before_json() {
        let response = r#"Here's what I'd do: {"response": "ok"} and that's it"#;
        assert_eq!(extract_json(response).unwrap(), r#"{"response": "ok"}"#);
    }

    #[test]
    fn test_truncated_json_has_no_candidate() {
        let response = r#"{"response": "ok", "actions": [{"verb": "DELETE""#;
        assert!(extract_json(response).is_err());
        assert!(parse_extraction(response, today()).is_err());
    }

    #[test]
    fn test_prose_only_is_parse_error() {
        let result = parse_extraction("I don't understand", today());
        assert!(matches!(result, Err(PipelineError::ExtractionParse(_))));
    }

    #[test]
    fn test_later_candidate_used_when_first_is_invalid() {
        let response = r#"{not json} then {"response": "ok", "actions": []}"#;
        let extraction = parse_extraction(response, today()).unwrap();
        assert_eq!(extraction.response, "ok");
    }

    #[test]
    fn test_full_extraction() {
        let response = r#"{
            "response": "Here are the urgent tasks.",
            "intent": "delete_tasks",
            "confidence": 0.85,
            "needsContext": false,
            "actions": [
                {"verb": "remove", "entityType": "todo", "params": {}, "searchCriteria": {"priority": "urgent"}},
                {"verb": "FLY", "entityType": "TASK"},
                {"verb": "CREATE", "entityType": "EVENT",
                 "params": {"title": "Dentist", "start": "2024-05-11T09:30", "tags": "health, #personal"}}
            ]
        }"#;
        let extraction = parse_extraction(response, today()).unwrap();
        assert_eq!(extraction.intent.as_deref(), Some("delete_tasks"));
        assert!((extraction.confidence - 0.85).abs() < 0.001);
        assert_eq!(extraction.proposals.len(), 2);
        assert_eq!(extraction.dropped, 1);

        let delete = &extraction.proposals[0];
        assert_eq!(delete.verb, Verb::Delete);
        assert_eq!(delete.entity_type, EntityType::Task);
        assert_eq!(
            delete.search_criteria.as_ref().unwrap().priority,
            Some(Priority::Urgent)
        );

        let create = &extraction.proposals[1];
        assert_eq!(create.params.title.as_deref(), Some("Dentist"));
        assert_eq!(
            create.params.tags,
            Some(vec!["health".to_string(), "personal".to_string()])
        );
        assert_eq!(
            create.params.start.unwrap().format("%H:%M").to_string(),
            "09:30"
        );
    }

    #[test]
    fn test_direct_id_from_params() {
        let id = EntityId::new();
        let raw = serde_json::json!({
            "verb": "DELETE", "entityType": "TASK", "params": {"id": id.to_string()}
        });
        let proposal = proposal_from_value(&raw, today()).unwrap();
        assert_eq!(proposal.target_id, Some(id));
        assert!(proposal.search_criteria.is_none());
    }

    #[test]
    fn test_unreadable_filter_drops_action() {
        let response = r#"{"response": "Deleting.", "actions": [
            {"verb": "DELETE", "entityType": "TASK",
             "searchCriteria": {"tag": "home", "status": "overdue", "dateTo": "last week"}},
            {"verb": "DELETE", "entityType": "TASK", "searchCriteria": {"tag": "home", "status": "done"}}
        ]}"#;
        let extraction = parse_extraction(response, today()).unwrap();

        assert_eq!(extraction.proposals.len(), 1);
        assert_eq!(
            extraction.proposals[0].search_criteria.as_ref().unwrap().status,
            Some(TaskStatus::Done)
        );
        assert_eq!(
            extraction.warnings,
            vec![
                "I couldn't understand status \"overdue\", dateTo \"last week\", so that request was left out."
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_unreadable_update_value() {
        let raw = serde_json::json!({
            "verb": "UPDATE", "entityType": "TASK", "id": EntityId::new().to_string(),
            "updates": {"dueDate": "someday", "priority": "high"}
        });
        assert_eq!(unreadable_values(&raw, today()), vec!["dueDate \"someday\"".to_string()]);
    }

    #[test]
    fn test_empty_criteria_is_none() {
        let raw = serde_json::json!({
            "verb": "DELETE", "entityType": "TASK", "searchCriteria": {}
        });
        let proposal = proposal_from_value(&raw, today()).unwrap();
        assert!(proposal.search_criteria.is_none());
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(parse_date("today", today()), Some(today()));
        assert_eq!(
            parse_date("Tomorrow", today()),
            NaiveDate::from_ymd_opt(2024, 5, 11)
        );
        assert_eq!(
            parse_date("2024-05-12T10:00:00Z", today()),
            NaiveDate::from_ymd_opt(2024, 5, 12)
        );
        assert_eq!(parse_date("next blue moon", today()), None);
    }

    #[test]
    fn test_single_date_criteria_is_inclusive_range() {
        let object = serde_json::json!({"date": "today"});
        let criteria = criteria_from_object(object.as_object().unwrap(), today());
        assert_eq!(criteria.date_from, Some(today()));
        assert_eq!(criteria.date_to, Some(today()));
    }

    #[test]
    fn test_context_query() {
        let response = r#"{"response": "", "needsContext": true,
            "contextQuery": {"entityType": "TASK", "criteria": {"priority": "urgent"}}, "actions": []}"#;
        let extraction = parse_extraction(response, today()).unwrap();
        assert!(extraction.needs_context);
        let query = extraction.context_query.unwrap();
        assert_eq!(query.entity_type, Some(EntityType::Task));
        assert_eq!(query.criteria.priority, Some(Priority::Urgent));
    }

    #[test]
    fn test_update_params_title_is_not_a_rename() {
        let proposal = ActionProposal::new(Verb::Update, EntityType::Task)
            .with_params(EntityFields {
                title: Some("report".into()),
                status: Some(TaskStatus::Done),
                ..Default::default()
            })
            .with_criteria(SearchCriteria {
                title_contains: Some("report".into()),
                ..Default::default()
            });
        let updates = proposal.effective_updates();
        assert_eq!(updates.title, None);
        assert_eq!(updates.status, Some(TaskStatus::Done));
    }

    #[test]
    fn test_verb_synonyms() {
        assert_eq!(Verb::parse_loose("Remove"), Some(Verb::Delete));
        assert_eq!(Verb::parse_loose("list"), Some(Verb::Read));
        assert_eq!(Verb::parse_loose("fly"), None);
        assert!(!Verb::Read.is_mutation());
    }
}
