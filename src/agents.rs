//! Pipeline Stages
//!
//! The three chat-model calls of a turn:
//!
//! ```text
//! Analyst    message + window + known facts ──► Extraction {facts, meta, signals, contacts}
//! Strategist message + history + facts + score ──► Plan {directive, message_count}
//! Texter     history + meta + plan ──► reply message(s)
//! ```
//!
//! Every stage absorbs its own failures (API errors, malformed JSON) and
//! returns a fixed fallback, so a turn always completes. No retries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::facts::FactSnapshot;
use crate::llm::{extract_json_object, ChatMessage, ChatModel, ChatRequest, LlmError};
use crate::prompts;
use crate::store::{Role, StoredMessage};

/// Contact reported by the analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDraft {
    pub name: String,
    pub relationship: Option<String>,
    pub info: Option<String>,
    pub potential: Option<String>,
}

/// Lead signal reported by the analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDraft {
    pub text: String,
    pub category: Option<String>,
}

/// Structured analyst output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub facts: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
    pub signals: Vec<SignalDraft>,
    pub contacts: Vec<ContactDraft>,
}

impl Extraction {
    /// Lenient parse: missing or mistyped sections are empty. List sections
    /// may arrive JSON-encoded inside a string; malformed ones become empty.
    pub fn from_value(value: &Value) -> Self {
        Self {
            facts: object_section(value.get("facts")),
            meta: object_section(value.get("meta")),
            signals: list_section(value.get("signals"))
                .iter()
                .filter_map(signal_from_value)
                .collect(),
            contacts: list_section(value.get("contacts"))
                .iter()
                .filter_map(contact_from_value)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.meta.is_empty()
            && self.signals.is_empty()
            && self.contacts.is_empty()
    }
}

fn object_section(section: Option<&Value>) -> BTreeMap<String, Value> {
    match section {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

fn list_section(section: Option<&Value>) -> Vec<Value> {
    match section {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn signal_from_value(value: &Value) -> Option<SignalDraft> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(SignalDraft {
            text: s.trim().to_string(),
            category: None,
        }),
        Value::Object(_) => Some(SignalDraft {
            text: text_field(value, "text").or_else(|| text_field(value, "signal"))?,
            category: text_field(value, "category"),
        }),
        _ => None,
    }
}

fn contact_from_value(value: &Value) -> Option<ContactDraft> {
    Some(ContactDraft {
        name: text_field(value, "name")?,
        relationship: text_field(value, "relationship"),
        info: text_field(value, "info"),
        potential: text_field(value, "potential"),
    })
}

/// Render stored messages as `role: content` lines
fn transcript(messages: &[StoredMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn snapshot_text(snapshot: &FactSnapshot) -> String {
    serde_json::to_string_pretty(snapshot).unwrap_or_else(|_| "{}".to_string())
}

fn history_messages(history: &[StoredMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|m| ChatMessage::new(m.role.as_str(), &m.content))
        .collect()
}

/// Stage 1: fact extraction
pub struct Analyst {
    model: Arc<dyn ChatModel>,
}

impl Analyst {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    async fn try_extract(
        &self,
        text: &str,
        window: &[StoredMessage],
        known: &FactSnapshot,
    ) -> Result<Extraction, String> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(prompts::ANALYST_SYSTEM),
            ChatMessage::user(&prompts::analyst_input(
                text,
                &transcript(window),
                &snapshot_text(known),
            )),
        ])
        .temperature(0.0)
        .json();

        let raw = self.model.chat(request).await.map_err(|e| e.to_string())?;
        let value = extract_json_object(&raw).ok_or_else(|| "malformed JSON".to_string())?;
        Ok(Extraction::from_value(&value))
    }

    /// Extract facts; any failure yields an empty extraction
    pub async fn extract(
        &self,
        text: &str,
        window: &[StoredMessage],
        known: &FactSnapshot,
    ) -> Extraction {
        match self.try_extract(text, window, known).await {
            Ok(extraction) => {
                debug!(
                    "Extraction: {} facts, {} meta, {} signals, {} contacts",
                    extraction.facts.len(),
                    extraction.meta.len(),
                    extraction.signals.len(),
                    extraction.contacts.len()
                );
                extraction
            }
            Err(e) => {
                warn!("Analyst failed: {}", e);
                Extraction::default()
            }
        }
    }
}

/// Planned next move
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub directive: String,
    /// 1 unless the strategist explicitly planned two messages
    pub message_count: u8,
}

impl Plan {
    /// Parse strategist output; the marker line is removed from the directive
    pub fn from_directive(raw: &str) -> Self {
        let marker = prompts::DOUBLE_MESSAGE_MARKER.to_uppercase();
        let mut double = false;
        let directive = raw
            .lines()
            .filter(|line| {
                let is_marker = line.trim().to_uppercase() == marker;
                double |= is_marker;
                !is_marker
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        Self {
            directive,
            message_count: if double { 2 } else { 1 },
        }
    }

    pub fn fallback() -> Self {
        Self {
            directive: prompts::FALLBACK_DIRECTIVE.to_string(),
            message_count: 1,
        }
    }
}

/// Stage 2: strategy planning
pub struct Strategist {
    model: Arc<dyn ChatModel>,
}

impl Strategist {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Plan the next move; failures yield the neutral directive
    pub async fn plan(
        &self,
        text: &str,
        history: &[StoredMessage],
        snapshot: &FactSnapshot,
        score: f64,
    ) -> Plan {
        // the last entry is the message being answered
        let last_bot_message = match history.len() {
            n if n > 1 && history[n - 2].role == Role::Assistant => history[n - 2].content.as_str(),
            _ => "",
        };

        let request = ChatRequest::new(vec![
            ChatMessage::system(prompts::STRATEGIST_SYSTEM),
            ChatMessage::user(&prompts::strategist_input(
                text,
                last_bot_message,
                history.len(),
                &snapshot_text(snapshot),
                score,
            )),
        ])
        .temperature(0.5)
        .max_tokens(200);

        match self.model.chat(request).await {
            Ok(raw) => {
                let plan = Plan::from_directive(&raw);
                if plan.directive.is_empty() {
                    return Plan::fallback();
                }
                debug!("Strategy: {} (messages: {})", plan.directive, plan.message_count);
                plan
            }
            Err(e) => {
                warn!("Strategist failed: {}", e);
                Plan::fallback()
            }
        }
    }
}

/// Stage 3: in-character rendering
pub struct Texter {
    model: Arc<dyn ChatModel>,
}

impl Texter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    async fn complete(
        &self,
        history: &[StoredMessage],
        style: Option<&str>,
        directive: &str,
        double: bool,
    ) -> Result<String, LlmError> {
        let mut messages = vec![ChatMessage::system(&prompts::texter_system(
            style,
            Some(directive),
            double,
        ))];
        messages.extend(history_messages(history));

        let request = ChatRequest::new(messages).temperature(0.85).max_tokens(200);
        self.model.chat(request).await
    }

    /// Render the reply; failures yield the generic reply
    pub async fn render(
        &self,
        history: &[StoredMessage],
        meta: &BTreeMap<String, String>,
        plan: &Plan,
    ) -> Vec<String> {
        let style = meta
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("kommunikationsstil"))
            .map(|(_, v)| v.as_str())
            .unwrap_or("normal");
        let double = plan.message_count > 1;

        match self.complete(history, Some(style), &plan.directive, double).await {
            Ok(text) => split_reply(&text, if double { 2 } else { 1 }),
            Err(e) => {
                warn!("Texter failed: {}", e);
                vec![prompts::FALLBACK_REPLY.to_string()]
            }
        }
    }

    /// Unprompted message based on the recent history
    pub async fn proactive(&self, history: &[StoredMessage]) -> Result<String, LlmError> {
        let directive = prompts::proactive_directive(history.len());
        self.complete(history, None, directive, false).await
    }
}

/// Split rendered text into at most `max` messages at `---` lines
pub fn split_reply(text: &str, max: usize) -> Vec<String> {
    let text = text.trim();
    if max < 2 {
        return vec![text.to_string()];
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim() == prompts::MESSAGE_SPLIT && parts.len() + 1 < max {
            parts.push(current.join("\n").trim().to_string());
            current.clear();
        } else {
            current.push(line);
        }
    }
    parts.push(current.join("\n").trim().to_string());
    parts.retain(|p| !p.is_empty());

    if parts.is_empty() {
        vec![prompts::FALLBACK_REPLY.to_string()]
    } else {
        parts
    }
}
