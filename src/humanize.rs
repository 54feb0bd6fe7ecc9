//! Human Delay
//!
//! Reply timing for subjects with human mode on: a pause before "typing",
//! then a typing indicator for a duration proportional to the reply length.
//! Only the calling task is suspended.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::transport::Transport;

/// Gap below which the conversation counts as in-flow
pub const IN_FLOW_WINDOW_SECS: i64 = 300;

/// Upper bound of the typing duration
pub const MAX_TYPING_SECS: f64 = 12.0;

/// Timing for one outgoing reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelayPlan {
    pub in_flow: bool,
    pub delay: Duration,
    pub typing: Duration,
}

impl DelayPlan {
    /// Plan timing from the previous message's timestamp (unix millis)
    pub fn compute<R: Rng + ?Sized>(
        previous_at: Option<i64>,
        now: i64,
        reply: &str,
        rng: &mut R,
    ) -> Self {
        let in_flow = previous_at
            .map(|prev| (now - prev) < IN_FLOW_WINDOW_SECS * 1000)
            .unwrap_or(false);

        let delay_secs: u64 = if in_flow {
            rng.gen_range(3..=8)
        } else {
            rng.gen_range(15..=60)
        };

        Self {
            in_flow,
            delay: Duration::from_secs(delay_secs),
            typing: Duration::from_secs_f64(typing_secs(reply.chars().count())),
        }
    }

    pub fn total(&self) -> Duration {
        self.delay + self.typing
    }
}

/// `min(12, 1.5 + 0.05 * len)` seconds
pub fn typing_secs(reply_len: usize) -> f64 {
    (1.5 + reply_len as f64 * 0.05).min(MAX_TYPING_SECS)
}

/// Sleep, show "typing", sleep again. Does not send the reply.
/// A failed typing indicator is logged and does not stop the turn.
pub async fn simulate(transport: &dyn Transport, subject_id: i64, plan: DelayPlan) {
    debug!(
        "Human delay for {}: in_flow={}, delay={:?}, typing={:?}",
        subject_id, plan.in_flow, plan.delay, plan.typing
    );

    tokio::time::sleep(plan.delay).await;

    if let Err(e) = transport.send_typing(subject_id).await {
        warn!("Typing indicator failed for {}: {}", subject_id, e);
    }

    tokio::time::sleep(plan.typing).await;
}
