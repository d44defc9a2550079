use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::errors::ControlError;
use crate::events::{ControlEvent, EventEmitter};
use crate::session::MediaSession;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum MessageOrigin {
    Local,
    Remote { identity: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub origin: MessageOrigin,
}

/// Gates chat input on session activity and agent presence.
pub struct ChatGate {
    session: Arc<dyn MediaSession>,
    emitter: EventEmitter,
    /// Transcript of the current session, oldest first.
    messages: Mutex<Vec<ChatMessage>>,
}

impl ChatGate {
    pub fn new(session: Arc<dyn MediaSession>, emitter: EventEmitter) -> Self {
        Self {
            session,
            emitter,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// True when some remote participant is an agent.
    pub fn is_agent_available(&self) -> bool {
        self.session.remote_participants().iter().any(|p| p.is_agent())
    }

    pub fn can_send(&self) -> bool {
        self.session.is_active() && self.is_agent_available()
    }

    /// Validate and forward `text` to the session's chat channel.
    ///
    /// Resolves once the channel accepted the message; delivery to the agent
    /// is not tracked.
    pub async fn send(&self, text: &str) -> Result<ChatMessage, ControlError> {
        if text.trim().is_empty() {
            return Err(ControlError::EmptyMessage);
        }
        if !self.session.is_active() {
            return Err(ControlError::SessionEnded);
        }
        if !self.is_agent_available() {
            return Err(ControlError::NoAgent);
        }

        self.session.send_chat_message(text).await.map_err(|e| {
            tracing::warn!("chat send failed: {e}");
            e
        })?;

        let msg = ChatMessage {
            text: text.to_string(),
            sent_at: Utc::now(),
            origin: MessageOrigin::Local,
        };
        self.messages.lock().await.push(msg.clone());
        self.emitter.emit(ControlEvent::ChatMessageSent(msg.clone()));
        tracing::debug!("chat message sent ({} chars)", msg.text.len());

        Ok(msg)
    }

    /// Record a message received from a remote participant.
    pub(crate) async fn record_incoming(
        &self,
        identity: &str,
        text: &str,
        sent_at: DateTime<Utc>,
    ) -> ChatMessage {
        let msg = ChatMessage {
            text: text.to_string(),
            sent_at,
            origin: MessageOrigin::Remote {
                identity: identity.to_string(),
            },
        };
        self.messages.lock().await.push(msg.clone());
        self.emitter.emit(ControlEvent::ChatMessageReceived(msg.clone()));
        msg
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    /// Clear the transcript (on session end).
    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ParticipantKind;
    use crate::testing::{Call, EventCapture, FakeSession};

    fn gate(session: &Arc<FakeSession>) -> ChatGate {
        ChatGate::new(session.clone(), EventEmitter::new())
    }

    #[tokio::test]
    async fn empty_and_blank_messages_are_rejected() {
        let session = Arc::new(FakeSession::new());
        session.add_remote("agent", ParticipantKind::Agent);
        let chat = gate(&session);

        assert_eq!(chat.send("").await.unwrap_err(), ControlError::EmptyMessage);
        assert_eq!(chat.send("   ").await.unwrap_err(), ControlError::EmptyMessage);
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn no_agent_rejects_message() {
        let session = Arc::new(FakeSession::new());
        session.add_remote("human", ParticipantKind::Standard);
        let chat = gate(&session);

        assert!(!chat.can_send());
        assert_eq!(chat.send("hello").await.unwrap_err(), ControlError::NoAgent);
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn inactive_session_rejects_message() {
        let session = Arc::new(FakeSession::new());
        session.add_remote("agent", ParticipantKind::Agent);
        session.set_active(false);
        let chat = gate(&session);

        assert!(!chat.can_send());
        assert_eq!(chat.send("hello").await.unwrap_err(), ControlError::SessionEnded);
    }

    #[tokio::test]
    async fn message_is_forwarded_and_recorded() {
        let session = Arc::new(FakeSession::new());
        session.add_remote("agent", ParticipantKind::Agent);
        let emitter = EventEmitter::new();
        let events = EventCapture::new();
        emitter.add_listener(events.clone());
        let chat = ChatGate::new(session.clone(), emitter);

        assert!(chat.can_send());
        let msg = chat.send("hello").await.unwrap();
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.origin, MessageOrigin::Local);
        assert_eq!(session.calls(), vec![Call::Chat("hello".into())]);
        assert_eq!(chat.messages().await.len(), 1);
        assert!(matches!(events.events()[0], ControlEvent::ChatMessageSent(_)));
    }

    #[tokio::test]
    async fn transcript_keeps_order_and_clears() {
        let session = Arc::new(FakeSession::new());
        session.add_remote("agent", ParticipantKind::Agent);
        let chat = gate(&session);

        chat.send("hi").await.unwrap();
        chat.record_incoming("agent", "hello there", Utc::now()).await;

        let messages = chat.messages().await;
        assert_eq!(messages[0].origin, MessageOrigin::Local);
        assert_eq!(
            messages[1].origin,
            MessageOrigin::Remote { identity: "agent".into() }
        );

        chat.clear().await;
        assert!(chat.messages().await.is_empty());
    }
}
