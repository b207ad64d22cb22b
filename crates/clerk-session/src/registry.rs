//! Process-wide table of live sessions.

use std::{collections::HashMap, sync::Arc};

use clerk_core::{SessionError, SessionId, new_session_id};
use tokio::sync::RwLock;

use crate::session::{Session, SessionConfig};

/// Registry of sessions keyed by id.
///
/// Lookups and removals never block a session's own operations.
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry handing `config` to every new session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh id and register an idle session under it.
    pub async fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(new_session_id(), &self.config));
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), Arc::clone(&session));
        tracing::debug!(session_id = %session.id(), "session registered");
        session
    }

    /// Look up a session.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] for an unknown id.
    pub async fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Stop and forget a session. Unknown ids are a no-op.
    ///
    /// Returns whether a session was removed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.stop();
                tracing::debug!(session_id = %id, "session removed");
                true
            }
            None => false,
        }
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use clerk_core::{Drained, EventKind, SessionControl, SessionState, Worker, WorkerError};
    use futures::StreamExt;
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    /// Worker that scans once and reports what the scan returned.
    struct ScanOnce(mpsc::UnboundedSender<Result<Value, SessionError>>);

    #[async_trait]
    impl Worker for ScanOnce {
        async fn run(&self, control: Arc<dyn SessionControl>) -> Result<String, WorkerError> {
            let scanned = control.scan_page().await;
            self.0.send(scanned.clone()).ok();
            scanned?;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = SessionRegistry::default();
        let a = registry.create().await;
        let b = registry.create().await;

        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len().await, 2);
        assert_eq!(a.state(), SessionState::Idle);
        let found = assert_ok!(registry.get(a.id()).await);
        assert!(Arc::ptr_eq(&a, &found));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let registry = SessionRegistry::default();
        assert_eq!(
            registry.get("nope").await.unwrap_err(),
            SessionError::NotFound("nope".to_string())
        );
        assert!(!registry.remove("nope").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_stops_session() {
        let registry = SessionRegistry::default();
        let session = registry.create().await;
        let id = session.id().to_string();

        assert!(registry.remove(&id).await);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_err!(registry.get(&id).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_remove_wakes_blocked_worker() {
        let registry = SessionRegistry::default();
        let session = registry.create().await;
        let mut stream = session.event_stream();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_ok!(session.start(Arc::new(ScanOnce(tx))));

        loop {
            match stream.next().await {
                Some(Drained::Event(event)) if event.kind == EventKind::ScanRequest => break,
                Some(_) => {}
                None => panic!("stream ended before the scan request"),
            }
        }
        assert!(registry.remove(session.id()).await);

        let scanned = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("worker still blocked after remove");
        assert_eq!(scanned, Some(Err(SessionError::Stopped)));

        let mut last = None;
        while let Some(item) = stream.next().await {
            if let Drained::Event(event) = item {
                last = Some(event.kind);
            }
        }
        assert_eq!(last, Some(EventKind::Stopped));
        session.join().await;
        assert_eq!(session.state(), SessionState::Stopped);
    }
}
