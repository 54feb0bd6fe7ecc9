//! Pipeline Orchestrator
//!
//! One turn per inbound message:
//!
//! ```text
//! upsert subject ─► persist user message ─► active? ─► quiet hours?
//!     ─► Analyst ─► merge facts/meta, append contacts/signals
//!     ─► score + persist ─► Strategist ─► Texter
//!     ─► per reply: human delay ─► send ─► persist
//! ```
//!
//! Turns of one subject are serialised by a per-subject async lock; turns of
//! different subjects run concurrently. The store lock is never held across
//! an `.await`.

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::{Analyst, Extraction, Strategist, Texter};
use crate::config::{Config, Policy, ScorerKind};
use crate::facts::{
    fact_values, normalize_value, FactCategory, MergePolicy, LEAD_PERSONA_KEY, LEAD_SCORE_KEY,
};
use crate::humanize::{self, DelayPlan};
use crate::llm::ChatModel;
use crate::prompts;
use crate::quiet_hours::{self, Clock, QuietWindow, SystemClock};
use crate::scoring::{HeuristicScorer, LeadScorer, LlmScorer, ScoreResult};
use crate::store::{now_millis, Role, Store};
use crate::transport::Transport;

/// Messages fed to the proactive opener
const PROACTIVE_HISTORY: usize = 20;

/// An inbound text from the transport
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub subject_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    pub fn text(subject_id: i64, text: &str) -> Self {
        Self {
            subject_id,
            username: None,
            first_name: None,
            text: text.to_string(),
        }
    }
}

/// Why a turn produced no reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    QuietHours,
}

/// Result of one turn
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Replied {
        messages: Vec<String>,
        score: ScoreResult,
    },
    Skipped(SkipReason),
}

/// Result of a dashboard-triggered proactive message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProactiveOutcome {
    Sent(String),
    UnknownSubject,
    ModelFailed(String),
}

/// What an extraction added to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub facts: usize,
    pub meta: usize,
    pub signals: usize,
    pub contacts: usize,
}

/// Shared store handle
pub type SharedStore = Arc<Mutex<Store>>;

/// Pipeline builder
pub struct PipelineBuilder {
    store: SharedStore,
    model: Arc<dyn ChatModel>,
    transport: Arc<dyn Transport>,
    policy: Policy,
    scorer: Option<Arc<dyn LeadScorer>>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    extraction_window: usize,
}

impl PipelineBuilder {
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn LeadScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn extraction_window(mut self, window: usize) -> Self {
        self.extraction_window = window;
        self
    }

    pub fn build(self) -> Pipeline {
        let scorer = self
            .scorer
            .unwrap_or_else(|| Arc::new(HeuristicScorer::new(self.policy.scoring.clone())));

        Pipeline {
            store: self.store,
            merge: MergePolicy::from_policy(&self.policy),
            scorer,
            analyst: Analyst::new(self.model.clone()),
            strategist: Strategist::new(self.model.clone()),
            texter: Texter::new(self.model),
            transport: self.transport,
            clock: self.clock,
            history_limit: self.history_limit,
            extraction_window: self.extraction_window,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }
}

/// The conversational pipeline
pub struct Pipeline {
    store: SharedStore,
    merge: MergePolicy,
    scorer: Arc<dyn LeadScorer>,
    analyst: Analyst,
    strategist: Strategist,
    texter: Texter,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    extraction_window: usize,
    turn_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn builder(
        store: SharedStore,
        model: Arc<dyn ChatModel>,
        transport: Arc<dyn Transport>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            store,
            model,
            transport,
            policy: Policy::default(),
            scorer: None,
            clock: Arc::new(SystemClock::default()),
            history_limit: 50,
            extraction_window: 6,
        }
    }

    /// Wire a pipeline from configuration
    pub fn from_config(
        config: &Config,
        store: SharedStore,
        model: Arc<dyn ChatModel>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let heuristic = HeuristicScorer::new(config.policy.scoring.clone());
        let scorer: Arc<dyn LeadScorer> = match config.scorer {
            ScorerKind::Heuristic => Arc::new(heuristic),
            ScorerKind::Llm => Arc::new(LlmScorer::new(model.clone(), heuristic)),
        };
        info!("Lead scorer: {}", scorer.name());

        Self::builder(store, model, transport)
            .policy(config.policy.clone())
            .scorer(scorer)
            .clock(Arc::new(SystemClock::new(config.time_offset_hours)))
            .history_limit(config.history_limit)
            .extraction_window(config.extraction_window)
            .build()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn turn_lock(&self, subject_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.turn_locks
            .lock()
            .entry(subject_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Process one inbound message end to end
    pub async fn handle_incoming(&self, incoming: IncomingMessage) -> Result<TurnOutcome> {
        let lock = self.turn_lock(incoming.subject_id);
        let _turn = lock.lock().await;

        let span = info_span!(
            "turn",
            subject = incoming.subject_id,
            turn_id = %Uuid::new_v4()
        );
        self.run_turn(incoming).instrument(span).await
    }

    async fn run_turn(&self, incoming: IncomingMessage) -> Result<TurnOutcome> {
        let id = incoming.subject_id;

        let subject = {
            let store = self.store.lock();
            store.upsert_subject(
                id,
                incoming.username.as_deref(),
                incoming.first_name.as_deref(),
            )?;
            store.append_message(id, Role::User, &incoming.text)?;
            store.get_subject(id)?
        };
        let Some(subject) = subject else {
            anyhow::bail!("subject {} missing after upsert", id);
        };

        if !subject.active {
            info!("Subject {} inactive, no reply", subject.display_name());
            return Ok(TurnOutcome::Skipped(SkipReason::Inactive));
        }

        if subject.human_mode {
            let window = QuietWindow::new(subject.quiet_start, subject.quiet_end);
            let check = quiet_hours::evaluate(id, window, self.clock.now());
            if check.inside {
                info!(
                    "Quiet hours for {} ({}-{}, jitter {:+}/{:+} min), no reply",
                    subject.display_name(),
                    window.start_hour,
                    window.end_hour,
                    check.offset_start,
                    check.offset_end
                );
                return Ok(TurnOutcome::Skipped(SkipReason::QuietHours));
            }
        }

        // Stage 1: extraction
        let (window, known) = {
            let store = self.store.lock();
            (
                store.recent_messages(id, self.extraction_window)?,
                store.fact_snapshot(id)?,
            )
        };
        let extraction = self.analyst.extract(&incoming.text, &window, &known).await;
        let merged = self.apply_extraction(id, &extraction)?;
        debug!("Merged extraction: {:?}", merged);

        let score = self.rescore(id).await?;

        // Stage 2: planning
        let (history, snapshot) = {
            let store = self.store.lock();
            (
                store.recent_messages(id, self.history_limit)?,
                store.fact_snapshot(id)?,
            )
        };
        let plan = self
            .strategist
            .plan(&incoming.text, &history, &snapshot, score.score)
            .await;

        // Stage 3: rendering
        let replies = self.texter.render(&history, &snapshot.meta, &plan).await;

        let mut previous_at = history
            .len()
            .checked_sub(2)
            .map(|i| history[i].timestamp);

        for reply in &replies {
            if subject.human_mode {
                let delay = DelayPlan::compute(previous_at, now_millis(), reply, &mut rand::thread_rng());
                humanize::simulate(self.transport.as_ref(), id, delay).await;
            }

            self.transport.send_text(id, reply).await?;
            self.store.lock().append_message(id, Role::Assistant, reply)?;
            previous_at = Some(now_millis());
        }

        info!(
            "Replied to {} with {} message(s), score {:.1} ({})",
            subject.display_name(),
            replies.len(),
            score.score,
            score.persona
        );

        Ok(TurnOutcome::Replied {
            messages: replies,
            score,
        })
    }

    /// Write an extraction into the store.
    ///
    /// Hard facts go through the merge policy; meta values are last-write-wins;
    /// contacts and signals are appended.
    pub fn apply_extraction(&self, subject_id: i64, extraction: &Extraction) -> Result<MergeSummary> {
        let store = self.store.lock();
        let mut summary = MergeSummary::default();

        for (key, value) in &extraction.facts {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            // list-shaped values merge element by element on multi-value keys
            let values = if self.merge.is_single_value(key) {
                normalize_value(value).into_iter().collect()
            } else {
                fact_values(value)
            };
            let mut written = false;
            for value in &values {
                written |= store.apply_fact(&self.merge, subject_id, key, value)?.is_some();
            }
            if written {
                summary.facts += 1;
            }
        }

        for (key, value) in &extraction.meta {
            let key = key.trim();
            let Some(value) = normalize_value(value) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            store.put_fact(subject_id, key, &value, FactCategory::Meta)?;
            summary.meta += 1;
        }

        for signal in &extraction.signals {
            store.add_signal(subject_id, &signal.text, signal.category.as_deref())?;
            summary.signals += 1;
        }

        for contact in &extraction.contacts {
            store.add_contact(
                subject_id,
                &contact.name,
                contact.relationship.as_deref(),
                contact.info.as_deref(),
                contact.potential.as_deref(),
            )?;
            summary.contacts += 1;
        }

        Ok(summary)
    }

    /// Recompute the lead score and persist it as score facts.
    /// Waits for an in-flight turn of the subject to finish.
    pub async fn score_subject(&self, subject_id: i64) -> Result<ScoreResult> {
        let lock = self.turn_lock(subject_id);
        let _turn = lock.lock().await;
        self.rescore(subject_id).await
    }

    /// Last persisted score and persona, if the subject was ever scored
    pub fn stored_score(&self, subject_id: i64) -> Result<Option<(f64, String)>> {
        let scores = self.store.lock().fact_snapshot(subject_id)?.scores;
        let score = scores.get(LEAD_SCORE_KEY).and_then(|s| s.parse::<f64>().ok());
        Ok(score.map(|score| {
            let persona = scores.get(LEAD_PERSONA_KEY).cloned().unwrap_or_default();
            (score, persona)
        }))
    }

    async fn rescore(&self, subject_id: i64) -> Result<ScoreResult> {
        let profile = self.store.lock().profile(subject_id)?;
        let result = self.scorer.score(&profile).await;

        {
            let store = self.store.lock();
            store.put_fact(
                subject_id,
                LEAD_SCORE_KEY,
                &format!("{:.1}", result.score),
                FactCategory::Score,
            )?;
            store.put_fact(subject_id, LEAD_PERSONA_KEY, &result.persona, FactCategory::Score)?;
        }

        debug!(
            "Score for {}: {:.1} ({}) via {}",
            subject_id,
            result.score,
            result.persona,
            self.scorer.name()
        );
        Ok(result)
    }

    /// `/start`: register the subject and send the greeting
    pub async fn greet(
        &self,
        subject_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        self.store
            .lock()
            .upsert_subject(subject_id, username, first_name)?;
        self.transport.send_text(subject_id, prompts::GREETING).await?;
        self.store
            .lock()
            .append_message(subject_id, Role::Assistant, prompts::GREETING)?;
        Ok(())
    }

    /// Operator-written message; sent and persisted as the assistant's
    pub async fn send_manual(&self, subject_id: i64, text: &str) -> Result<()> {
        let lock = self.turn_lock(subject_id);
        let _turn = lock.lock().await;

        self.transport.send_text(subject_id, text).await?;
        self.store
            .lock()
            .append_message(subject_id, Role::Assistant, text)?;
        info!("Manual message sent to {}", subject_id);
        Ok(())
    }

    /// Generate and send an unprompted message. No human delay.
    pub async fn trigger_proactive(&self, subject_id: i64) -> Result<ProactiveOutcome> {
        let lock = self.turn_lock(subject_id);
        let _turn = lock.lock().await;

        let history = {
            let store = self.store.lock();
            if store.get_subject(subject_id)?.is_none() {
                return Ok(ProactiveOutcome::UnknownSubject);
            }
            store.recent_messages(subject_id, PROACTIVE_HISTORY)?
        };

        let text = match self.texter.proactive(&history).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Proactive message for {} failed: {}", subject_id, e);
                return Ok(ProactiveOutcome::ModelFailed(e.to_string()));
            }
        };

        self.transport.send_text(subject_id, &text).await?;
        self.store
            .lock()
            .append_message(subject_id, Role::Assistant, &text)?;
        info!("Proactive message sent to {}", subject_id);
        Ok(ProactiveOutcome::Sent(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ContactDraft, SignalDraft};
    use crate::llm::testing::ScriptedModel;
    use crate::quiet_hours::FixedClock;
    use crate::transport::RecordingTransport;
    use chrono::NaiveDate;
    use serde_json::json;

    fn noon() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ))
    }

    fn pipeline(model: Arc<ScriptedModel>, transport: Arc<RecordingTransport>) -> Pipeline {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        Pipeline::builder(store, model, transport).clock(noon()).build()
    }

    #[test]
    fn test_apply_extraction() {
        let p = pipeline(
            Arc::new(ScriptedModel::default()),
            Arc::new(RecordingTransport::new()),
        );
        p.store().lock().upsert_subject(1, None, None).unwrap();

        let mut extraction = Extraction::default();
        extraction.facts.insert("alter".into(), json!(21));
        extraction.facts.insert("name".into(), json!("unbekannt"));
        extraction.meta.insert("stimmung".into(), json!("gut"));
        extraction.signals.push(SignalDraft {
            text: "will sparen".into(),
            category: None,
        });
        extraction.contacts.push(ContactDraft {
            name: "Lisa".into(),
            relationship: None,
            info: None,
            potential: Some("high".into()),
        });

        let summary = p.apply_extraction(1, &extraction).unwrap();
        assert_eq!(
            summary,
            MergeSummary {
                facts: 1,
                meta: 1,
                signals: 1,
                contacts: 1
            }
        );

        let store = p.store().lock();
        assert_eq!(store.get_fact(1, "alter").unwrap().unwrap().value, "21");
        assert!(store.get_fact(1, "name").unwrap().is_none());
        assert_eq!(
            store.get_fact(1, "stimmung").unwrap().unwrap().category,
            FactCategory::Meta
        );
    }

    #[test]
    fn test_meta_is_last_write_wins() {
        let p = pipeline(
            Arc::new(ScriptedModel::default()),
            Arc::new(RecordingTransport::new()),
        );
        p.store().lock().upsert_subject(1, None, None).unwrap();

        for mood in ["gut", "gestresst"] {
            let mut extraction = Extraction::default();
            extraction.meta.insert("stimmung".into(), json!(mood));
            p.apply_extraction(1, &extraction).unwrap();
        }
        assert_eq!(
            p.store().lock().get_fact(1, "stimmung").unwrap().unwrap().value,
            "gestresst"
        );
    }

    #[tokio::test]
    async fn test_score_persisted() {
        let p = pipeline(
            Arc::new(ScriptedModel::default()),
            Arc::new(RecordingTransport::new()),
        );
        {
            let store = p.store().lock();
            store.upsert_subject(1, None, None).unwrap();
            store.put_fact(1, "alter", "30", FactCategory::Fact).unwrap();
        }

        let result = p.score_subject(1).await.unwrap();
        assert!((result.score - 1.5).abs() < 1e-9);

        let snap = p.store().lock().fact_snapshot(1).unwrap();
        assert_eq!(snap.scores.get(LEAD_SCORE_KEY).map(String::as_str), Some("1.5"));
        assert!(snap.scores.contains_key(LEAD_PERSONA_KEY));
        // score facts never feed back into the profile
        assert_eq!(snap.facts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_subject_waits_for_running_turn() {
        let transport = Arc::new(RecordingTransport::new());
        let p = pipeline(Arc::new(ScriptedModel::default()), transport.clone());
        p.store().lock().upsert_subject(1, None, None).unwrap();
        assert!(p.stored_score(1).unwrap().is_none());

        // human mode on: the turn sleeps before sending
        let (turn, score) = tokio::join!(
            p.handle_incoming(IncomingMessage::text(1, "Hallo")),
            async {
                tokio::task::yield_now().await;
                let result = p.score_subject(1).await;
                (result, transport.texts(1).len())
            }
        );
        turn.unwrap();
        let (result, sent_before_scoring) = score;
        assert_eq!(result.unwrap().score, 0.0);
        assert_eq!(sent_before_scoring, 1);

        let (stored, persona) = p.stored_score(1).unwrap().unwrap();
        assert_eq!(stored, 0.0);
        assert_eq!(persona, "unprofiled");
    }

    #[tokio::test]
    async fn test_greet() {
        let transport = Arc::new(RecordingTransport::new());
        let p = pipeline(Arc::new(ScriptedModel::default()), transport.clone());

        p.greet(5, Some("maxi"), Some("Max")).await.unwrap();
        assert_eq!(transport.texts(5), vec![prompts::GREETING]);
        assert_eq!(p.store().lock().full_chat(5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_proactive_unknown_subject() {
        let transport = Arc::new(RecordingTransport::new());
        let p = pipeline(Arc::new(ScriptedModel::default()), transport.clone());

        let outcome = p.trigger_proactive(404).await.unwrap();
        assert_eq!(outcome, ProactiveOutcome::UnknownSubject);
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn test_proactive_model_failure_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let p = pipeline(Arc::new(ScriptedModel::default()), transport.clone());
        p.store().lock().upsert_subject(1, None, None).unwrap();

        let outcome = p.trigger_proactive(1).await.unwrap();
        assert!(matches!(outcome, ProactiveOutcome::ModelFailed(_)));
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn test_proactive_opener_for_new_chat() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Na?".into())]));
        let transport = Arc::new(RecordingTransport::new());
        let p = pipeline(model.clone(), transport.clone());
        p.store().lock().upsert_subject(1, None, None).unwrap();

        let outcome = p.trigger_proactive(1).await.unwrap();
        assert_eq!(outcome, ProactiveOutcome::Sent("Na?".into()));
        assert_eq!(transport.texts(1), vec!["Na?"]);
        assert!(model.requests()[0].messages[0].content.contains("'Hey'"));
    }

    #[tokio::test]
    async fn test_send_manual() {
        let transport = Arc::new(RecordingTransport::new());
        let p = pipeline(Arc::new(ScriptedModel::default()), transport.clone());
        p.store().lock().upsert_subject(1, None, None).unwrap();

        p.send_manual(1, "Hier schreibt ein Mensch").await.unwrap();
        let chat = p.store().lock().full_chat(1).unwrap();
        assert_eq!(chat[0].role, Role::Assistant);
        assert_eq!(transport.texts(1), vec!["Hier schreibt ein Mensch"]);
    }
}
