//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Startup configuration errors (fatal, the process does not start)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to read policy file {path}: {reason}")]
    PolicyFile { path: String, reason: String },
}

/// Which lead scorer implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Deterministic keyword heuristic
    Heuristic,
    /// Chat-model judgement (falls back to the heuristic on failure)
    Llm,
}

impl std::str::FromStr for ScorerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::InvalidValue {
                name: "ERGOBOT_SCORER",
                value: other.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token, handed to the transport explicitly
    pub telegram_token: String,

    /// Chat-completion API key (optional - stages fall back without it)
    pub openai_api_key: Option<String>,

    /// Chat-completion base URL (OpenAI compatible)
    pub openai_base_url: String,

    /// Model used for all stages
    pub model: String,

    /// SQLite database path
    pub db_path: PathBuf,

    /// Lead scorer implementation
    pub scorer: ScorerKind,

    /// Hours added to the local clock before quiet-hours evaluation
    pub time_offset_hours: i64,

    /// Quiet window assigned to new subjects
    pub default_quiet_start: u8,
    pub default_quiet_end: u8,

    /// Messages fed to planning and rendering
    pub history_limit: usize,

    /// Messages fed to extraction
    pub extraction_window: usize,

    /// Fact keys and scorer keywords
    pub policy: Policy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let telegram_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let model = std::env::var("ERGOBOT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let db_path = std::env::var("ERGOBOT_DB_PATH")
            .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("ergobot")
                    .join("chat.db")
            });

        let scorer = match std::env::var("ERGOBOT_SCORER") {
            Ok(v) => v.parse()?,
            Err(_) => ScorerKind::Heuristic,
        };

        let time_offset_hours = parse_env("ERGOBOT_TIME_OFFSET_HOURS", 0i64)?;
        let default_quiet_start = parse_hour("ERGOBOT_DEFAULT_QUIET_START", 0)?;
        let default_quiet_end = parse_hour("ERGOBOT_DEFAULT_QUIET_END", 7)?;
        let history_limit = parse_env("ERGOBOT_HISTORY_LIMIT", 50usize)?;
        let extraction_window = parse_env("ERGOBOT_EXTRACTION_WINDOW", 6usize)?;

        let policy = match std::env::var("ERGOBOT_POLICY_FILE") {
            Ok(path) => {
                let expanded = shellexpand::tilde(&path).into_owned();
                Policy::load(Path::new(&expanded))?
            }
            Err(_) => Policy::default(),
        };

        Ok(Self {
            telegram_token,
            openai_api_key,
            openai_base_url,
            model,
            db_path,
            scorer,
            time_offset_hours,
            default_quiet_start,
            default_quiet_end,
            history_limit,
            extraction_window,
            policy,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_hour(name: &'static str, default: u8) -> Result<u8, ConfigError> {
    let hour = parse_env(name, default)?;
    if hour > 23 {
        return Err(ConfigError::InvalidValue {
            name,
            value: hour.to_string(),
        });
    }
    Ok(hour)
}

/// Product data: which fact keys are single-valued and which keywords the
/// heuristic scorer looks for. Loaded from TOML, every table optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub single_value_keys: Vec<String>,
    pub scoring: ScoringKeywords,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            single_value_keys: [
                "name",
                "vorname",
                "alter",
                "geburtstag",
                "wohnort",
                "stadt",
                "adresse",
                "beziehungsstatus",
                "email",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            scoring: ScoringKeywords::default(),
        }
    }
}

impl Policy {
    /// Load a policy file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&raw).map_err(|reason| ConfigError::PolicyFile {
            path: path.display().to_string(),
            reason,
        })
    }

    /// Parse policy TOML
    pub fn from_toml(raw: &str) -> std::result::Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    /// Lowercased single-value key set
    pub fn single_value_set(&self) -> HashSet<String> {
        self.single_value_keys
            .iter()
            .map(|k| k.trim().to_lowercase())
            .collect()
    }
}

/// Keyword lists used by the heuristic scorer. All matching is
/// case-insensitive substring matching.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringKeywords {
    /// Fact keys holding the age
    pub age_keys: Vec<String>,
    /// Fact keys holding the occupation
    pub occupation_keys: Vec<String>,
    /// Occupations that do not count
    pub occupation_exclusions: Vec<String>,
    /// Substrings marking an income-related fact key
    pub income_keys: Vec<String>,
    /// Property, luxury cars, luxury, travel
    pub wealth: Vec<String>,
    /// Savings and investments
    pub savings: Vec<String>,
    /// Future orientation (meta)
    pub future: Vec<String>,
    /// Financial uncertainty or stress (meta)
    pub uncertainty: Vec<String>,
    /// Openness (meta)
    pub openness: Vec<String>,
    /// Contact potential ratings that count for the network component
    pub contact_potential: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ScoringKeywords {
    fn default() -> Self {
        Self {
            age_keys: strings(&["alter", "age"]),
            occupation_keys: strings(&["beruf", "job", "occupation", "arbeit", "tätigkeit"]),
            occupation_exclusions: strings(&[
                "arbeitslos",
                "unemployed",
                "student",
                "schüler",
                "pupil",
                "rentner",
                "retired",
                "rente",
            ]),
            income_keys: strings(&["einkommen", "gehalt", "verdienst", "income", "salary"]),
            wealth: strings(&[
                "eigentum",
                "eigenheim",
                "immobilie",
                "porsche",
                "mercedes",
                "bmw",
                "audi",
                "tesla",
                "luxus",
                "luxury",
                "urlaub",
                "reise",
                "vacation",
                "trip",
            ]),
            savings: strings(&["spar", "invest", "aktie", "etf", "depot", "savings"]),
            future: strings(&["zukunft", "ziel", "karriere", "plant", "future", "goal"]),
            uncertainty: strings(&[
                "unsicher",
                "sorge",
                "stress",
                "angst",
                "geldsorgen",
                "uncertain",
                "worried",
            ]),
            openness: strings(&["offen", "neugierig", "aufgeschlossen", "open", "curious"]),
            contact_potential: strings(&["high", "medium", "hoch", "mittel"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_keys() {
        let policy = Policy::default();
        let set = policy.single_value_set();
        assert!(set.contains("alter"));
        assert!(set.contains("wohnort"));
        assert!(!set.contains("hobbys"));
    }

    #[test]
    fn test_policy_from_toml_partial() {
        let policy = Policy::from_toml(
            r#"
            single_value_keys = ["Name", "Lieblingsfarbe"]

            [scoring]
            wealth = ["yacht"]
            "#,
        )
        .unwrap();

        let set = policy.single_value_set();
        assert!(set.contains("name"));
        assert!(set.contains("lieblingsfarbe"));
        assert_eq!(policy.scoring.wealth, vec!["yacht".to_string()]);
        // untouched tables keep their defaults
        assert!(policy.scoring.age_keys.contains(&"alter".to_string()));
    }

    #[test]
    fn test_policy_from_toml_invalid() {
        assert!(Policy::from_toml("single_value_keys = 3").is_err());
    }

    #[test]
    fn test_scorer_kind_parse() {
        assert_eq!("LLM".parse::<ScorerKind>().unwrap(), ScorerKind::Llm);
        assert_eq!(" heuristic ".parse::<ScorerKind>().unwrap(), ScorerKind::Heuristic);
        assert!("magic".parse::<ScorerKind>().is_err());
    }
}
