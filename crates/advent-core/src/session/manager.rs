//! Registry of sessions keyed by identity.
//!
//! At most one live session exists per identity. Expired entries are not
//! swept; they are replaced the next time their identity is looked up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::instance::Session;
use crate::config::SessionConfig;
use crate::error::AdventResult;

/// The map itself, shared with sessions so they can deregister.
pub(crate) struct Registry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl Registry {
    /// Remove `id` only if it still maps to the session with `serial`.
    pub(crate) async fn deregister(&self, id: &str, serial: u64) {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(id).is_some_and(|s| s.serial() == serial) {
            sessions.remove(id);
            debug!(session = %id, "session deregistered");
        }
    }
}

/// Creates, reuses and forgets sessions.
pub struct SessionManager {
    config: SessionConfig,
    registry: Arc<Registry>,
    next_serial: AtomicU64,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry {
                sessions: Mutex::new(HashMap::new()),
            }),
            next_serial: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether `id` has a live session.
    pub async fn has_session(&self, id: &str) -> bool {
        self.get_session(id).await.is_some()
    }

    /// The live session for `id`, if any. Never starts a game.
    pub async fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.registry.sessions.lock().await;
        sessions.get(id).filter(|s| s.is_live()).cloned()
    }

    /// Return the live session for `id`, starting a new game if there is none.
    ///
    /// The lookup and the registration happen under one lock, so concurrent
    /// callers for the same identity never spawn two games. If the game
    /// cannot be started nothing is registered.
    pub async fn get_or_create_session(&self, id: &str) -> AdventResult<Arc<Session>> {
        let mut sessions = self.registry.sessions.lock().await;
        if let Some(session) = sessions.get(id) {
            if session.is_live() {
                return Ok(Arc::clone(session));
            }
        }

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.registry);
        let session = Session::start(id, serial, &self.config, registry).await?;
        sessions.insert(id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Drop the entry for `id`, live or not. The session itself keeps running.
    pub async fn remove_session(&self, id: &str) {
        let mut sessions = self.registry.sessions.lock().await;
        if sessions.remove(id).is_some() {
            debug!(session = %id, "session removed");
        }
    }

    /// Number of registered entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.registry.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Save and close every registered session.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.registry.sessions.lock().await;
            sessions.values().cloned().collect()
        };

        info!(count = sessions.len(), "closing all sessions");
        for session in sessions {
            if let Err(e) = session.close().await {
                warn!(session = %session.id(), error = %e, "failed to close session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdventError;
    use crate::test_support::fake_config;
    use std::path::PathBuf;
    use std::time::Duration;

    fn manager(dir: &tempfile::TempDir) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(fake_config(
            dir.path(),
            Duration::from_secs(60),
        )))
    }

    #[tokio::test]
    async fn concurrent_creation_yields_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..100 {
            let manager = Arc::clone(&manager);
            tasks.spawn(async move { manager.get_or_create_session("room").await });
        }

        let mut sessions = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            sessions.push(joined.unwrap().unwrap());
        }

        assert_eq!(sessions.len(), 100);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(manager.len().await, 1);

        sessions[0].close().await.unwrap();
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn has_session_tracks_registration() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        assert!(!manager.has_session("room").await);

        let session = manager.get_or_create_session("room").await.unwrap();
        assert!(manager.has_session("room").await);
        assert!(!manager.has_session("other").await);

        manager.remove_session("room").await;
        manager.remove_session("room").await;
        assert!(!manager.has_session("room").await);

        // Still live, just unregistered.
        assert!(session.is_live());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_session_only_looks_up() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        assert!(manager.get_session("room").await.is_none());
        assert!(manager.is_empty().await);

        let session = manager.get_or_create_session("room").await.unwrap();
        let found = manager.get_session("room").await.unwrap();
        assert!(Arc::ptr_eq(&session, &found));

        session.close().await.unwrap();
        assert!(manager.get_session("room").await.is_none());
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn expired_entry_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let first = manager.get_or_create_session("room").await.unwrap();
        first.close().await.unwrap();

        let second = manager.get_or_create_session("room").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_live());
        assert!(manager.has_session("room").await);

        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_close_keeps_replacement_registered() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let stale = manager.get_or_create_session("room").await.unwrap();
        manager.remove_session("room").await;
        let fresh = manager.get_or_create_session("room").await.unwrap();

        stale.close().await.unwrap();
        assert!(manager.has_session("room").await);

        fresh.close().await.unwrap();
        assert!(!manager.has_session("room").await);
    }

    #[tokio::test]
    async fn failed_start_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(SessionConfig {
            executable: PathBuf::from("/nonexistent/advent"),
            args: Vec::new(),
            ..fake_config(dir.path(), Duration::from_secs(60))
        });

        let result = manager.get_or_create_session("room").await;
        assert!(matches!(result, Err(AdventError::Spawn(_))));
        assert!(manager.is_empty().await);
        assert!(!manager.has_session("room").await);
    }

    #[tokio::test]
    async fn shutdown_saves_every_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let a = manager.get_or_create_session("a").await.unwrap();
        let b = manager.get_or_create_session("b").await.unwrap();
        manager.shutdown().await;

        assert!(manager.is_empty().await);
        assert!(!a.is_live());
        assert!(!b.is_live());
        assert!(a.save_file().is_file());
        assert!(b.save_file().is_file());
    }
}
