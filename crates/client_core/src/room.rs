use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::Lawyer;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::timing::{FlowTimings, Navigation};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Connecting,
    Connected,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Client,
    Lawyer,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub speaker: Speaker,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(speaker: Speaker, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            body: body.into(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    StateChanged(RoomState),
    Message(ChatMessage),
    Navigate(Navigation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("the lawyer has not joined yet")]
    NotConnected,
    #[error("this consultation has ended")]
    Ended,
    #[error("message is empty")]
    EmptyMessage,
}

/// Produces the lawyer side of a simulated conversation.
pub trait ReplyGenerator: Send + Sync {
    fn greeting(&self, lawyer: &Lawyer) -> String;
    fn reply(&self, client_message: &str) -> String;
}

/// Cycles through a fixed list of answers.
pub struct CannedReplies {
    replies: Vec<String>,
    next: AtomicUsize,
}

impl CannedReplies {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self::new(
            [
                "I understand. Could you tell me more about the timeline?",
                "Do you have any written agreement or other evidence?",
                "Based on what you describe, you have a reasonable claim.",
                "I suggest we go over the documents in detail next.",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

impl ReplyGenerator for CannedReplies {
    fn greeting(&self, lawyer: &Lawyer) -> String {
        format!("Hello, I am {}. How can I help you today?", lawyer.name)
    }

    fn reply(&self, _client_message: &str) -> String {
        if self.replies.is_empty() {
            return "Noted.".to_string();
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[index].clone()
    }
}

struct RoomInner {
    state: RoomState,
    transcript: Vec<ChatMessage>,
}

/// Simulated consultation with one lawyer.
///
/// The room owns two tokens: `lifetime` covers every timer and is cancelled
/// on drop; `replies` is its child and is cancelled when the room ends.
pub struct ConsultationRoom {
    lawyer: Lawyer,
    inner: Arc<Mutex<RoomInner>>,
    events: broadcast::Sender<RoomEvent>,
    lifetime: CancellationToken,
    replies: CancellationToken,
    timings: FlowTimings,
    replier: Arc<dyn ReplyGenerator>,
}

impl ConsultationRoom {
    /// Starts connecting right away. Must be called inside a tokio runtime.
    pub fn open(lawyer: Lawyer, timings: FlowTimings, replier: Arc<dyn ReplyGenerator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let lifetime = CancellationToken::new();
        let replies = lifetime.child_token();
        let room = Self {
            lawyer,
            inner: Arc::new(Mutex::new(RoomInner {
                state: RoomState::Connecting,
                transcript: Vec::new(),
            })),
            events,
            lifetime,
            replies,
            timings,
            replier,
        };
        room.spawn_connect();
        room
    }

    pub fn lawyer(&self) -> &Lawyer {
        &self.lawyer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> RoomState {
        self.inner.lock().await.state
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.transcript.clone()
    }

    /// Appends a client message and schedules the lawyer's reply.
    pub async fn send(&self, text: &str) -> Result<ChatMessage, RoomError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::EmptyMessage);
        }

        let message = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                RoomState::Connecting => return Err(RoomError::NotConnected),
                RoomState::Ended => return Err(RoomError::Ended),
                RoomState::Connected => {}
            }
            let message = ChatMessage::new(Speaker::Client, text);
            inner.transcript.push(message.clone());
            let _ = self.events.send(RoomEvent::Message(message.clone()));
            message
        };

        let delay = self.timings.reply_delay();
        let reply = self.replier.reply(text);
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let cancel = self.replies.clone();
        debug!(delay_ms = delay.as_millis() as u64, "scheduled simulated reply");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let mut inner = inner.lock().await;
                    if inner.state != RoomState::Connected {
                        return;
                    }
                    let message = ChatMessage::new(Speaker::Lawyer, reply);
                    inner.transcript.push(message.clone());
                    let _ = events.send(RoomEvent::Message(message));
                }
            }
        });

        Ok(message)
    }

    /// Ends the consultation, drops pending replies and schedules the
    /// redirect. Ending twice is an error.
    pub async fn end(&self) -> Result<(), RoomError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == RoomState::Ended {
                return Err(RoomError::Ended);
            }
            inner.state = RoomState::Ended;
            self.replies.cancel();
            let notice = ChatMessage::new(Speaker::System, "The consultation has ended.");
            inner.transcript.push(notice.clone());
            let _ = self.events.send(RoomEvent::StateChanged(RoomState::Ended));
            let _ = self.events.send(RoomEvent::Message(notice));
        }
        info!(lawyer_id = self.lawyer.id.0, "consultation ended");

        let events = self.events.clone();
        let cancel = self.lifetime.clone();
        let delay = self.timings.end_redirect_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(RoomEvent::Navigate(Navigation::Home));
                }
            }
        });
        Ok(())
    }

    fn spawn_connect(&self) {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let cancel = self.lifetime.clone();
        let delay = self.timings.connect_delay;
        let greeting = self.replier.greeting(&self.lawyer);
        let lawyer_id = self.lawyer.id.0;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let mut inner = inner.lock().await;
                    if inner.state != RoomState::Connecting {
                        return;
                    }
                    inner.state = RoomState::Connected;
                    let message = ChatMessage::new(Speaker::Lawyer, greeting);
                    inner.transcript.push(message.clone());
                    let _ = events.send(RoomEvent::StateChanged(RoomState::Connected));
                    let _ = events.send(RoomEvent::Message(message));
                    info!(lawyer_id, "consultation connected");
                }
            }
        });
    }
}

impl Drop for ConsultationRoom {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

#[cfg(test)]
#[path = "tests/room_tests.rs"]
mod tests;
