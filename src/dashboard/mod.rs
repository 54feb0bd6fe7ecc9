//! Web Dashboard Module
//!
//! Local operator interface: read a subject's chat, facts and score, flip
//! its flags, set quiet hours, write manually or trigger a proactive message.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Dashboard Server                │
//! ├─────────────────────────────────────────────┤
//! │  GET /                    → Static files    │
//! │  GET /api/health          → Health check    │
//! │  GET /api/subjects        → Subject list    │
//! │  GET /api/subjects/{id}/* → Snapshots       │
//! │  POST/PUT ...             → Controls        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod server;

pub use api::{api_router, DashboardApiState};
pub use config::DashboardConfig;
pub use server::DashboardServer;
