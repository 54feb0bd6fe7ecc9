//! ErgoBot
//!
//! Persona chat bot driven by a multi-stage LLM pipeline.
//!
//! # Features
//!
//! - **Fact accumulation**: per-subject facts with single-value replace and
//!   multi-value append rules
//! - **Lead scoring**: heuristic or LLM-backed scorer behind one trait
//! - **Human timing**: per-day jittered quiet hours, reply delay and typing
//! - **Dashboard**: local HTTP API and UI for operators
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► Pipeline ──► Analyst ──► Store (facts, contacts, signals)
//!                 │            │
//!                 │            └──► LeadScorer
//!                 ├── Strategist ──► Texter
//!                 ├── QuietHours / HumanDelay
//!                 └── Transport ──► Telegram
//!
//! Dashboard (axum) ──► Store / Pipeline
//! ```

pub mod agents;
pub mod config;
pub mod dashboard;
pub mod facts;
pub mod humanize;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod quiet_hours;
pub mod scoring;
pub mod store;
pub mod telegram;
pub mod transport;

pub use agents::{Analyst, Extraction, Plan, Strategist, Texter};
pub use config::{Config, ConfigError, Policy, ScorerKind, ScoringKeywords};
pub use dashboard::{DashboardConfig, DashboardServer};
pub use facts::{Fact, FactCategory, FactSnapshot, MergeOutcome, MergePolicy};
pub use humanize::DelayPlan;
pub use llm::{ChatMessage, ChatModel, ChatRequest, LlmError, OpenAiClient};
pub use pipeline::{
    IncomingMessage, Pipeline, PipelineBuilder, ProactiveOutcome, SharedStore, SkipReason,
    TurnOutcome,
};
pub use quiet_hours::{Clock, FixedClock, QuietCheck, QuietWindow, SystemClock};
pub use scoring::{HeuristicScorer, LeadScorer, LlmScorer, Profile, ScoreResult};
pub use store::{Contact, LeadSignal, Role, Store, StoredMessage, Subject};
pub use transport::{RecordingTransport, TelegramTransport, Transport, TransportError};
