use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::qa::ConversationHistory;
use crate::quiz::QuizItem;
use crate::settings::QaContext;

/// Per-browser-session state; nothing here outlives the process
#[derive(Debug, Clone)]
pub struct Session {
    pub material: Option<String>,
    pub digest: Option<String>,
    pub history: ConversationHistory,
    pub quiz: Option<QuizItem>,
    pub last_accessed: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            material: None,
            digest: None,
            history: ConversationHistory::new(),
            quiz: None,
            last_accessed: Instant::now(),
        }
    }

    /// Text Q&A and quiz generation are grounded on
    pub fn context(&self, source: QaContext) -> Option<&str> {
        match source {
            QaContext::Material => self.material.as_deref(),
            QaContext::Digest => self.digest.as_deref(),
        }
    }
}

/// In-memory session map with idle expiry
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, Session::new());
        tracing::debug!(session = %id, "session created");
        id
    }

    /// Snapshot of a session; touching it counts as activity
    pub async fn get(&self, id: Uuid) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        session.last_accessed = Instant::now();
        Some(session.clone())
    }

    /// Apply `f` to a session; `None` if it does not exist
    pub async fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        session.last_accessed = Instant::now();
        Some(f(session))
    }

    pub async fn clear_history(&self, id: Uuid) -> bool {
        self.update(id, |s| s.history = ConversationHistory::new()).await.is_some()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than the TTL; returns how many were removed
    pub async fn prune_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_accessed.elapsed() < self.ttl);
        before - sessions.len()
    }
}

/// Periodically prune idle sessions
pub async fn prune_loop(store: SessionStore, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = store.prune_idle().await;
        if removed > 0 {
            tracing::info!(removed, "pruned idle sessions");
        }
    }
}
