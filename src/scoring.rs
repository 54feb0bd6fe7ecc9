//! Lead Scoring
//!
//! Turns the accumulated profile of a subject into a bounded score (0-10)
//! plus a persona label and a short reasoning.
//!
//! Two interchangeable implementations sit behind [`LeadScorer`]:
//!
//! - [`HeuristicScorer`]: deterministic, additive keyword weights
//! - [`LlmScorer`]: asks the chat model; falls back to the heuristic
//!
//! Heuristic weights:
//!
//! ```text
//! demographic   max 2.0   age 25-45 +1.5 | age 18-55 +0.5 | occupation +0.5
//! financial     max 3.0   income key +1.5 | wealth 0.3 each (cap 1.0) | savings +0.5
//! psychological max 2.0   future +0.7 | uncertainty +0.8 | openness +0.5
//! signals       max 2.0   0.4 per signal
//! network       max 1.0   0.5 per high/medium contact
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ScoringKeywords;
use crate::llm::{extract_json_object, ChatMessage, ChatModel, ChatRequest};
use crate::prompts;
use crate::store::{Contact, LeadSignal};

pub const MAX_SCORE: f64 = 10.0;

const DEMOGRAPHIC_CAP: f64 = 2.0;
const WEALTH_STEP: f64 = 0.3;
const WEALTH_CAP: f64 = 1.0;
const SIGNAL_STEP: f64 = 0.4;
const SIGNAL_CAP: f64 = 2.0;
const CONTACT_STEP: f64 = 0.5;
const CONTACT_CAP: f64 = 1.0;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,3}").expect("valid regex"));

/// Everything the scorer looks at
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub facts: BTreeMap<String, String>,
    pub meta: BTreeMap<String, String>,
    pub signals: Vec<LeadSignal>,
    pub contacts: Vec<Contact>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.meta.is_empty()
            && self.signals.is_empty()
            && self.contacts.is_empty()
    }
}

/// Lowercased `key: value` lines of a mapping
fn projection(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase()
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
}

fn count_matches(haystack: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
        .count()
}

/// Round to one decimal
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-component contributions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub demographic: f64,
    pub financial: f64,
    pub psychological: f64,
    pub signals: f64,
    pub network: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.demographic + self.financial + self.psychological + self.signals + self.network
    }

    /// Component with the largest contribution (ties resolved in field order)
    fn dominant(&self) -> Option<Persona> {
        let parts = [
            (self.demographic, Persona::Prospect),
            (self.financial, Persona::Established),
            (self.psychological, Persona::Seeker),
            (self.signals, Persona::Engaged),
            (self.network, Persona::Connector),
        ];
        let mut best: Option<(f64, Persona)> = None;
        for (value, persona) in parts {
            if value > 0.0 && best.map_or(true, |(b, _)| value > b) {
                best = Some((value, persona));
            }
        }
        best.map(|(_, p)| p)
    }
}

/// Profile segment derived from the dominant score component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    /// Nothing known yet
    Unprofiled,
    /// Fits the target age band / has a job
    Prospect,
    /// Income or assets
    Established,
    /// Future plans or money worries
    Seeker,
    /// Shows explicit interest
    Engaged,
    /// Brings a valuable network
    Connector,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprofiled => "unprofiled",
            Self::Prospect => "prospect",
            Self::Established => "established",
            Self::Seeker => "seeker",
            Self::Engaged => "engaged",
            Self::Connector => "connector",
        }
    }
}

/// Scorer output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    /// One decimal, clamped to [0, 10]
    pub score: f64,
    pub persona: String,
    pub reasoning: String,
    /// Only filled by the heuristic
    pub breakdown: Option<ScoreBreakdown>,
}

impl ScoreResult {
    /// Integer score for display
    pub fn level(&self) -> u8 {
        self.score.round().clamp(0.0, MAX_SCORE) as u8
    }
}

/// Lead scoring capability
#[async_trait]
pub trait LeadScorer: Send + Sync {
    /// Implementation name for logs
    fn name(&self) -> &'static str;

    /// Score a profile. Never fails; implementations degrade internally.
    async fn score(&self, profile: &Profile) -> ScoreResult;
}

/// Deterministic keyword scorer
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer {
    keywords: ScoringKeywords,
}

impl HeuristicScorer {
    pub fn new(keywords: ScoringKeywords) -> Self {
        Self { keywords }
    }

    fn is_key_in(key: &str, keys: &[String]) -> bool {
        let key = key.to_lowercase();
        keys.iter().any(|k| key == k.to_lowercase())
    }

    /// Best age band over every age key
    fn age_points(&self, profile: &Profile) -> f64 {
        profile
            .facts
            .iter()
            .filter(|(k, _)| Self::is_key_in(k, &self.keywords.age_keys))
            .filter_map(|(_, v)| NUMBER_RE.find(v).and_then(|m| m.as_str().parse::<u32>().ok()))
            .map(|age| match age {
                25..=45 => 1.5,
                18..=55 => 0.5,
                _ => 0.0,
            })
            .fold(0.0, f64::max)
    }

    /// Any occupation key holding a job that counts
    fn has_occupation(&self, profile: &Profile) -> bool {
        profile.facts.iter().any(|(k, v)| {
            let job = v.trim().to_lowercase();
            Self::is_key_in(k, &self.keywords.occupation_keys)
                && !job.is_empty()
                && !contains_any(&job, &self.keywords.occupation_exclusions)
        })
    }

    fn demographic(&self, profile: &Profile) -> f64 {
        let mut score = self.age_points(profile);
        if self.has_occupation(profile) {
            score += 0.5;
        }
        f64::min(score, DEMOGRAPHIC_CAP)
    }

    fn financial(&self, profile: &Profile, facts_text: &str) -> f64 {
        let mut score = 0.0;

        let has_income = profile.facts.keys().any(|k| {
            let key = k.to_lowercase();
            contains_any(&key, &self.keywords.income_keys)
        });
        if has_income {
            score += 1.5;
        }

        let wealth_hits = count_matches(facts_text, &self.keywords.wealth);
        score += f64::min(wealth_hits as f64 * WEALTH_STEP, WEALTH_CAP);

        if contains_any(facts_text, &self.keywords.savings) {
            score += 0.5;
        }

        score
    }

    fn psychological(&self, meta_text: &str) -> f64 {
        let mut score = 0.0;
        if contains_any(meta_text, &self.keywords.future) {
            score += 0.7;
        }
        // uncertainty is an opening, not a disqualifier
        if contains_any(meta_text, &self.keywords.uncertainty) {
            score += 0.8;
        }
        if contains_any(meta_text, &self.keywords.openness) {
            score += 0.5;
        }
        score
    }

    fn network(&self, contacts: &[Contact]) -> f64 {
        let valuable = contacts
            .iter()
            .filter(|c| {
                c.potential
                    .as_deref()
                    .map(|p| {
                        let p = p.trim().to_lowercase();
                        self.keywords
                            .contact_potential
                            .iter()
                            .any(|k| p == k.to_lowercase())
                    })
                    .unwrap_or(false)
            })
            .count();
        f64::min(valuable as f64 * CONTACT_STEP, CONTACT_CAP)
    }

    /// Component scores for a profile
    pub fn breakdown(&self, profile: &Profile) -> ScoreBreakdown {
        let facts_text = projection(&profile.facts);
        let meta_text = projection(&profile.meta);

        ScoreBreakdown {
            demographic: self.demographic(profile),
            financial: self.financial(profile, &facts_text),
            psychological: self.psychological(&meta_text),
            signals: f64::min(profile.signals.len() as f64 * SIGNAL_STEP, SIGNAL_CAP),
            network: self.network(&profile.contacts),
        }
    }

    /// Pure scoring
    pub fn evaluate(&self, profile: &Profile) -> ScoreResult {
        let breakdown = self.breakdown(profile);
        let score = round1(breakdown.total()).clamp(0.0, MAX_SCORE);
        let persona = if score <= 0.0 {
            Persona::Unprofiled
        } else {
            breakdown.dominant().unwrap_or(Persona::Unprofiled)
        };

        let reasoning = format!(
            "demografie {:.1}, finanzen {:.1}, psychologie {:.1}, signale {:.1}, netzwerk {:.1}",
            breakdown.demographic,
            breakdown.financial,
            breakdown.psychological,
            breakdown.signals,
            breakdown.network
        );

        ScoreResult {
            score,
            persona: persona.as_str().to_string(),
            reasoning,
            breakdown: Some(breakdown),
        }
    }
}

#[async_trait]
impl LeadScorer for HeuristicScorer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn score(&self, profile: &Profile) -> ScoreResult {
        self.evaluate(profile)
    }
}

#[derive(Debug, Deserialize)]
struct LlmVerdict {
    score: f64,
    #[serde(default)]
    persona: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Chat-model judgement with heuristic fallback
pub struct LlmScorer {
    model: Arc<dyn ChatModel>,
    fallback: HeuristicScorer,
}

impl LlmScorer {
    pub fn new(model: Arc<dyn ChatModel>, fallback: HeuristicScorer) -> Self {
        Self { model, fallback }
    }

    async fn ask(&self, profile: &Profile) -> anyhow::Result<ScoreResult> {
        let profile_json = serde_json::to_string_pretty(profile)?;
        let request = ChatRequest::new(vec![
            ChatMessage::system(prompts::SCORER_SYSTEM),
            ChatMessage::user(&prompts::scorer_input(&profile_json)),
        ])
        .temperature(0.2)
        .max_tokens(300)
        .json();

        let raw = self.model.chat(request).await?;
        let object = extract_json_object(&raw)
            .ok_or_else(|| anyhow::anyhow!("no JSON object in scorer output"))?;
        let verdict: LlmVerdict = serde_json::from_value(object)?;
        if !verdict.score.is_finite() {
            anyhow::bail!("scorer returned a non-finite score");
        }

        Ok(ScoreResult {
            score: round1(verdict.score).clamp(0.0, MAX_SCORE),
            persona: verdict
                .persona
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| Persona::Unprofiled.as_str().to_string()),
            reasoning: verdict.reasoning.unwrap_or_default(),
            breakdown: None,
        })
    }
}

#[async_trait]
impl LeadScorer for LlmScorer {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn score(&self, profile: &Profile) -> ScoreResult {
        match self.ask(profile).await {
            Ok(result) => {
                debug!("LLM score {:.1} ({})", result.score, result.persona);
                result
            }
            Err(e) => {
                warn!("LLM scoring failed: {}, using heuristic", e);
                self.fallback.evaluate(profile)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    fn facts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn signal(text: &str) -> LeadSignal {
        LeadSignal {
            subject_id: 1,
            text: text.to_string(),
            category: None,
            created_at: 0,
        }
    }

    fn contact(potential: Option<&str>) -> Contact {
        Contact {
            subject_id: 1,
            name: "Tom".to_string(),
            relationship: None,
            info: None,
            potential: potential.map(str::to_string),
            created_at: 0,
        }
    }

    #[test]
    fn test_empty_profile_scores_zero() {
        let result = HeuristicScorer::default().evaluate(&Profile::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.level(), 0);
        assert_eq!(result.persona, "unprofiled");
    }

    #[test]
    fn test_core_age_band_adds_exactly_one_and_a_half() {
        let profile = Profile {
            facts: facts(&[("alter", "30")]),
            ..Default::default()
        };
        let result = HeuristicScorer::default().evaluate(&profile);
        assert_eq!(result.score, 1.5);
        assert_eq!(result.persona, "prospect");
    }

    #[test]
    fn test_wide_age_band() {
        let scorer = HeuristicScorer::default();
        let young = Profile {
            facts: facts(&[("alter", "21"), ("wohnort", "München")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&young).score, 0.5);

        let too_young = Profile {
            facts: facts(&[("Alter", "16 Jahre")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&too_young).score, 0.0);
    }

    #[test]
    fn test_occupation_exclusions() {
        let scorer = HeuristicScorer::default();
        let employed = Profile {
            facts: facts(&[("beruf", "Elektriker")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&employed).score, 0.5);

        let student = Profile {
            facts: facts(&[("beruf", "Student (BWL)")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&student).score, 0.0);
    }

    #[test]
    fn test_financial_component() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            facts: facts(&[
                ("gehalt", "4000 netto"),
                ("auto", "Porsche und BMW"),
                ("urlaub", "Malediven"),
                ("geldanlage", "ETF Sparplan"),
            ]),
            ..Default::default()
        };
        let breakdown = scorer.breakdown(&profile);
        // income 1.5 + wealth (porsche, bmw, urlaub -> 0.9) + savings 0.5
        assert!((breakdown.financial - 2.9).abs() < 1e-9);
        assert_eq!(scorer.evaluate(&profile).persona, "established");
    }

    #[test]
    fn test_wealth_cap() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            facts: facts(&[(
                "besitz",
                "Eigentum, Porsche, Mercedes, Tesla, Luxus-Uhr, Reise nach Dubai",
            )]),
            ..Default::default()
        };
        assert_eq!(scorer.breakdown(&profile).financial, 1.0);
    }

    #[test]
    fn test_psychological_component() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            meta: facts(&[
                ("ziele", "will Karriere machen"),
                ("stimmung", "Geldsorgen, etwas Stress"),
                ("persönlichkeit", "sehr offen"),
            ]),
            ..Default::default()
        };
        let result = scorer.evaluate(&profile);
        assert_eq!(result.score, 2.0);
        assert_eq!(result.persona, "seeker");
    }

    #[test]
    fn test_signals_and_network_caps() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            signals: (0..8).map(|i| signal(&format!("signal {}", i))).collect(),
            contacts: vec![
                contact(Some("high")),
                contact(Some("Mittel")),
                contact(Some("low")),
                contact(None),
                contact(Some("hoch")),
            ],
            ..Default::default()
        };
        let breakdown = scorer.breakdown(&profile);
        assert_eq!(breakdown.signals, 2.0);
        assert_eq!(breakdown.network, 1.0);
    }

    #[test]
    fn test_score_never_exceeds_ten() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            facts: facts(&[
                ("alter", "35"),
                ("beruf", "Ingenieur"),
                ("einkommen", "hoch"),
                ("besitz", "Eigentum, Porsche, Luxus, Urlaub"),
                ("sparen", "ETF"),
            ]),
            meta: facts(&[("typ", "zukunft, unsicher, offen")]),
            signals: (0..20).map(|i| signal(&i.to_string())).collect(),
            contacts: (0..20).map(|_| contact(Some("high"))).collect(),
        };
        let result = scorer.evaluate(&profile);
        assert!(result.score <= MAX_SCORE);
        assert_eq!(result.level(), 10);
    }

    #[test]
    fn test_adding_positive_signal_is_monotone() {
        let scorer = HeuristicScorer::default();
        let mut profile = Profile {
            facts: facts(&[("alter", "40"), ("hobbys", "Reisen")]),
            ..Default::default()
        };
        let before = scorer.evaluate(&profile).score;
        profile.signals.push(signal("will mehr wissen"));
        let after = scorer.evaluate(&profile).score;
        assert!(after >= before);
        assert!((after - before - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_second_age_key_keeps_best_band() {
        let scorer = HeuristicScorer::default();
        let mut profile = Profile {
            facts: facts(&[("alter", "30")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&profile).score, 1.5);

        // "age" sorts before "alter"
        profile.facts.insert("age".to_string(), "50".to_string());
        assert_eq!(scorer.evaluate(&profile).score, 1.5);
    }

    #[test]
    fn test_any_counting_occupation_key_scores() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            facts: facts(&[("arbeit", "Student"), ("beruf", "Werkstudent"), ("job", "Kellner")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&profile).score, 0.5);

        let excluded = Profile {
            facts: facts(&[("arbeit", "arbeitslos"), ("job", "   ")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&excluded).score, 0.0);
    }

    #[test]
    fn test_malformed_values_tolerated() {
        let scorer = HeuristicScorer::default();
        let profile = Profile {
            facts: facts(&[("alter", "weiß nicht"), ("beruf", "   ")]),
            ..Default::default()
        };
        assert_eq!(scorer.evaluate(&profile).score, 0.0);
    }

    #[tokio::test]
    async fn test_llm_scorer_parses_verdict() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            r#"Hier: {"score": 12.34, "persona": "Macher", "reasoning": "viel Potenzial"}"#
                .to_string(),
        )]));
        let scorer = LlmScorer::new(model, HeuristicScorer::default());
        let result = scorer.score(&Profile::default()).await;
        assert_eq!(result.score, 10.0);
        assert_eq!(result.persona, "Macher");
        assert!(result.breakdown.is_none());
    }

    #[tokio::test]
    async fn test_llm_scorer_falls_back_on_garbage() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("kein json".to_string())]));
        let scorer = LlmScorer::new(model, HeuristicScorer::default());
        let profile = Profile {
            facts: facts(&[("alter", "30")]),
            ..Default::default()
        };
        let result = scorer.score(&profile).await;
        assert_eq!(result.score, 1.5);
        assert!(result.breakdown.is_some());
    }
}
