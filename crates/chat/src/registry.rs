//! Live chat sessions and open stream delivery channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedloom_core::message::SessionId;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::event::{EventSender, StreamEvent};
use crate::tool_chat::ToolCallingChatSession;

/// A session behind its own lock; turns on one session run one at a time.
pub type SharedSession = Arc<Mutex<ToolCallingChatSession>>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Option<SharedSession>;

    async fn put(&self, id: SessionId, session: SharedSession);

    async fn remove(&self, id: &SessionId) -> Option<SharedSession>;

    async fn len(&self) -> usize;
}

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

/// Sessions in memory, dropped after `ttl` idle or when `max_sessions` is
/// exceeded (least recently used first).
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    fn evict(&self, sessions: &mut HashMap<SessionId, Entry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < self.ttl);

        while sessions.len() > self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted chat sessions");
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        if now.duration_since(entry.last_used) >= self.ttl {
            sessions.remove(id);
            debug!(session_id = %id, "Session expired");
            return None;
        }
        entry.last_used = now;
        Some(entry.session.clone())
    }

    async fn put(&self, id: SessionId, session: SharedSession) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Entry { session, last_used: now });
        self.evict(&mut sessions, now);
    }

    async fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions.write().await.remove(id).map(|e| e.session)
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Delivery channels opened by clients before they start a streaming turn.
#[derive(Default)]
pub struct ActiveStreams {
    senders: RwLock<HashMap<SessionId, EventSender>>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel for `id`, replacing any previous one.
    pub async fn open(&self, id: SessionId, capacity: usize) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if self.senders.write().await.insert(id.clone(), tx).is_some() {
            debug!(session_id = %id, "Replaced delivery channel");
        }
        rx
    }

    /// The open channel for `id`. Channels whose receiver went away are dropped.
    pub async fn get(&self, id: &SessionId) -> Result<EventSender> {
        let mut senders = self.senders.write().await;
        match senders.get(id) {
            Some(tx) if !tx.is_closed() => Ok(tx.clone()),
            Some(_) => {
                senders.remove(id);
                Err(ChatError::NoActiveConnection(id.to_string()))
            }
            None => Err(ChatError::NoActiveConnection(id.to_string())),
        }
    }

    pub async fn close(&self, id: &SessionId) {
        self.senders.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }
}
