//! Chat Transport
//!
//! Outbound primitives the pipeline needs: send a text, show "typing".

use async_trait::async_trait;
use parking_lot::Mutex;
use teloxide::prelude::*;
use teloxide::types::ChatAction;

/// Error types for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Outbound side of a chat channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (telegram, recording, ...)
    fn name(&self) -> &'static str;

    async fn send_text(&self, subject_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_typing(&self, subject_id: i64) -> Result<(), TransportError>;
}

/// Telegram transport backed by a teloxide `Bot`
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Build from the configured token
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send_text(&self, subject_id: i64, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(ChatId(subject_id), text)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn send_typing(&self, subject_id: i64) -> Result<(), TransportError> {
        self.bot
            .send_chat_action(ChatId(subject_id), ChatAction::Typing)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// What a [`RecordingTransport`] saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text { subject_id: i64, text: String },
    Typing { subject_id: i64 },
}

/// In-memory transport for tests; optionally fails every send
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    /// Texts sent to `subject_id`, in order
    pub fn texts(&self, subject_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|o| match o {
                Outbound::Text { subject_id: id, text } if *id == subject_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn typing_count(&self, subject_id: i64) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|o| matches!(o, Outbound::Typing { subject_id: id } if *id == subject_id))
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_text(&self, subject_id: i64, text: &str) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::SendFailed("recording transport set to fail".into()));
        }
        self.sent.lock().push(Outbound::Text {
            subject_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_typing(&self, subject_id: i64) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::SendFailed("recording transport set to fail".into()));
        }
        self.sent.lock().push(Outbound::Typing { subject_id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_transport() {
        let transport = RecordingTransport::new();
        transport.send_typing(1).await.unwrap();
        transport.send_text(1, "hi").await.unwrap();
        transport.send_text(2, "other").await.unwrap();

        assert_eq!(transport.texts(1), vec!["hi"]);
        assert_eq!(transport.typing_count(1), 1);
        assert_eq!(transport.events().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_transport() {
        let transport = RecordingTransport::failing();
        assert!(transport.send_text(1, "hi").await.is_err());
        assert!(transport.events().is_empty());
    }
}
