//! Session shard registry
//!
//! Distinct session keys (for example one per user or per watched
//! directory) get fully independent [`SessionContext`] instances. At most
//! `max_sessions` shards are kept; creating one more evicts the shard whose
//! newest event is oldest, empty shards first.

use super::context::SessionContext;
use crate::config::SessionConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key used when a request carries no session key.
pub const DEFAULT_SESSION: &str = "default";

/// Registry of per-key session contexts
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionContext>>>>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get the session for a key, creating it on first use
    pub async fn get_or_create(&self, key: Option<&str>) -> Arc<SessionContext> {
        let key = key.unwrap_or(DEFAULT_SESSION);

        if let Some(session) = self.sessions.read().await.get(key) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(key) && sessions.len() >= self.config.max_sessions.max(1) {
            let mut idle: Option<(Option<DateTime<Utc>>, &String)> = None;
            for (k, session) in sessions.iter() {
                let candidate = (session.latest().await, k);
                if idle.as_ref().map_or(true, |best| candidate < *best) {
                    idle = Some(candidate);
                }
            }
            if let Some(evicted) = idle.map(|(_, k)| k.clone()) {
                sessions.remove(&evicted);
                tracing::debug!("Evicted idle session context '{}'", evicted);
            }
        }
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!("Created session context '{}'", key);
                Arc::new(SessionContext::new(&self.config))
            })
            .clone()
    }

    /// Get an existing session without creating one
    pub async fn get(&self, key: Option<&str>) -> Option<Arc<SessionContext>> {
        self.sessions
            .read()
            .await
            .get(key.unwrap_or(DEFAULT_SESSION))
            .cloned()
    }

    /// Drop a session shard
    pub async fn remove(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
