//! Fact Model
//!
//! Per-subject key/value attributes and the merge policy applied when the
//! analyst stage reports new values for a key.
//!
//! Single-value keys (identity-like: name, age, residence, ...) are replaced.
//! All other keys accumulate: a new value is appended with `", "` unless it is
//! already a substring of the stored value.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::config::Policy;

/// Separator used when accumulating multi-value facts
pub const VALUE_SEPARATOR: &str = ", ";

/// Storage key of the persisted lead score
pub const LEAD_SCORE_KEY: &str = "lead_score";

/// Storage key of the persisted persona label
pub const LEAD_PERSONA_KEY: &str = "lead_persona";

/// Values the analyst uses for "no information"
const UNKNOWN_SENTINELS: &[&str] = &["unbekannt", "unknown"];

/// Category tag of a stored fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactCategory {
    /// Hard fact (name, residence, job ...)
    #[serde(rename = "fact")]
    Fact,
    /// Psychological meta (style, mood ...)
    #[serde(rename = "meta")]
    Meta,
    /// Derived score values
    #[serde(rename = "score")]
    Score,
    #[serde(rename = "signal")]
    Signal,
    #[serde(rename = "contact-list")]
    ContactList,
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Meta => "meta",
            Self::Score => "score",
            Self::Signal => "signal",
            Self::ContactList => "contact-list",
        }
    }

    /// Parse a stored tag; unknown tags are read as plain facts
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "meta" => Self::Meta,
            "score" => Self::Score,
            "signal" => Self::Signal,
            "contact-list" => Self::ContactList,
            _ => Self::Fact,
        }
    }
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored fact row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub subject_id: i64,
    pub key: String,
    pub value: String,
    pub category: FactCategory,
    /// Unix milliseconds
    pub updated_at: i64,
}

/// Facts of one subject grouped by category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactSnapshot {
    pub facts: BTreeMap<String, String>,
    pub meta: BTreeMap<String, String>,
    pub scores: BTreeMap<String, String>,
}

impl FactSnapshot {
    /// Route a stored row into its bucket. Signal and contact-list tags are
    /// only kept for compatibility with older rows and read as facts.
    pub fn insert(&mut self, key: String, value: String, category: FactCategory) {
        match category {
            FactCategory::Meta => self.meta.insert(key, value),
            FactCategory::Score => self.scores.insert(key, value),
            _ => self.facts.insert(key, value),
        };
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.meta.is_empty() && self.scores.is_empty()
    }
}

/// Turn an analyst value into the stored string form.
///
/// Strings are trimmed, numbers and booleans stringified, arrays joined with
/// [`VALUE_SEPARATOR`], objects JSON-encoded. Returns `None` for values that
/// must not be written: null, empty strings and the "unknown" sentinels.
pub fn normalize_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Array(_) => {
            let items = fact_values(value);
            if items.is_empty() {
                None
            } else {
                Some(items.join(VALUE_SEPARATOR))
            }
        }
        other => normalize_scalar(other),
    }
}

/// Individual values of a reported fact: one per array element, deduplicated,
/// or the single normalized value.
pub fn fact_values(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => {
            let mut values: Vec<String> = Vec::new();
            for item in items.iter().filter_map(normalize_scalar) {
                if !values.contains(&item) {
                    values.push(item);
                }
            }
            values
        }
        other => normalize_scalar(other).into_iter().collect(),
    }
}

fn normalize_scalar(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(items) if items.is_empty() => return None,
        serde_json::Value::Object(map) if map.is_empty() => return None,
        other => other.to_string(),
    };

    if is_discardable(&text) {
        None
    } else {
        Some(text)
    }
}

/// Empty or sentinel "unknown" values are never written
pub fn is_discardable(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || UNKNOWN_SENTINELS
            .iter()
            .any(|s| trimmed.eq_ignore_ascii_case(s))
}

/// What to do with a reported value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing is written
    Skip,
    /// Stored value already covers the new one; only the timestamp moves
    Unchanged(String),
    /// Write this value
    Write(String),
}

/// Merge rules for hard facts
#[derive(Debug, Clone)]
pub struct MergePolicy {
    single_value_keys: HashSet<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::from_policy(&Policy::default())
    }
}

impl MergePolicy {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            single_value_keys: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            single_value_keys: policy.single_value_set(),
        }
    }

    /// Whether `key` holds exactly one value (case-insensitive)
    pub fn is_single_value(&self, key: &str) -> bool {
        self.single_value_keys.contains(&key.trim().to_lowercase())
    }

    /// Decide the stored value for `key` given the old and new values.
    ///
    /// The "already known" test is plain substring containment against the
    /// stored value.
    pub fn merge(&self, key: &str, old: Option<&str>, new: &str) -> MergeOutcome {
        if is_discardable(new) {
            return MergeOutcome::Skip;
        }
        let new = new.trim();

        match old {
            Some(old) if !old.is_empty() && !self.is_single_value(key) => {
                if old.contains(new) {
                    MergeOutcome::Unchanged(old.to_string())
                } else {
                    MergeOutcome::Write(format!("{}{}{}", old, VALUE_SEPARATOR, new))
                }
            }
            _ => MergeOutcome::Write(new.to_string()),
        }
    }
}
