use crate::session::{CallSession, SessionConfig, SessionStats};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

/// Shared application state for HTTP handlers and media sockets
#[derive(Clone)]
pub struct AppState {
    /// Active call sessions (connection_id → session)
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<Mutex<CallSession>>>>>,

    /// Streaming parameters handed to every new session
    pub session_config: Arc<SessionConfig>,
}

impl AppState {
    pub fn new(session_config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_config: Arc::new(session_config),
        }
    }

    /// Add a session when its connection is accepted
    pub async fn register(&self, session: Arc<Mutex<CallSession>>) -> Uuid {
        let connection_id = session.lock().await.connection_id();
        let mut sessions = self.sessions.write().await;
        sessions.insert(connection_id, session);
        info!("Registered session {} ({} active)", connection_id, sessions.len());
        connection_id
    }

    /// Remove a session when its connection closes
    pub async fn unregister(&self, connection_id: Uuid) -> Option<Arc<Mutex<CallSession>>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&connection_id);
        info!("Removed session {} ({} active)", connection_id, sessions.len());
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Statistics for every registered session
    pub async fn stats(&self) -> Vec<SessionStats> {
        let sessions: Vec<Arc<Mutex<CallSession>>> =
            self.sessions.read().await.values().cloned().collect();

        let mut stats = Vec::with_capacity(sessions.len());
        for session in sessions {
            stats.push(session.lock().await.stats());
        }
        stats
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
