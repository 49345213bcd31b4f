use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::Session;
use crate::config::SessionConfig;
use crate::device::{DeviceConfig, DeviceState};
use crate::frontend::FrontendRegistry;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_EXPIRED};
use crate::{Error, Result};

/// Active sessions keyed by token.
///
/// The map lock only covers map access; frontend construction and teardown
/// run on the blocking pool. Creation is serialized by a separate lock so
/// that two requests never race for the same device.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    provision_lock: tokio::sync::Mutex<()>,
    frontends: Arc<FrontendRegistry>,
    config: SessionConfig,
    last_sweep: Mutex<Instant>,
    teardowns: TaskTracker,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(frontends: Arc<FrontendRegistry>, config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            provision_lock: tokio::sync::Mutex::new(()),
            frontends,
            config,
            last_sweep: Mutex::new(Instant::now()),
            teardowns: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn frontends(&self) -> &Arc<FrontendRegistry> {
        &self.frontends
    }

    /// Create a session for `request` and register it.
    ///
    /// On failure nothing is registered and any acquired device is released.
    pub async fn provision(&self, request: DeviceState) -> Result<Arc<Session>> {
        let _guard = self.provision_lock.lock().await;

        let frontends = Arc::clone(&self.frontends);
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || {
            Session::provision(&frontends, &request, &config)
        })
        .await
        .map_err(|e| Error::Internal(format!("provision task failed: {e}")))??;

        let session = Arc::new(session);
        let mut sessions = self.sessions.lock();
        sessions.insert(session.id().to_string(), Arc::clone(&session));
        SESSIONS_ACTIVE.set(sessions.len() as i64);
        Ok(session)
    }

    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(token).cloned()
    }

    /// Remove a session from the map without stopping it
    pub fn remove(&self, token: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(token);
        SESSIONS_ACTIVE.set(sessions.len() as i64);
        removed
    }

    /// Remove and fully stop a session.
    ///
    /// Returns once the device has been released.
    pub async fn destroy(&self, token: &str) -> Result<()> {
        let session = self
            .remove(token)
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))?;

        self.teardown(session)
            .await
            .map_err(|e| Error::Internal(format!("teardown task failed: {e}")))?;
        info!(session_id = %token, "Session destroyed");
        Ok(())
    }

    /// Stop `session` on the blocking pool.
    pub fn teardown(&self, session: Arc<Session>) -> JoinHandle<bool> {
        self.teardowns.spawn_blocking(move || session.full_stop())
    }

    pub fn keep_alive(&self, token: &str) -> Result<()> {
        let session = self
            .lookup(token)
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))?;
        session.keep_alive();
        Ok(())
    }

    /// Forward a configuration to the session's frontend.
    pub async fn tune(&self, token: &str, config: DeviceConfig) -> Result<DeviceConfig> {
        let session = self
            .lookup(token)
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))?;
        tokio::task::spawn_blocking(move || session.tune(config))
            .await
            .map_err(|e| Error::Internal(format!("tune task failed: {e}")))?
    }

    /// Remove every expired session and stop them in the background.
    ///
    /// Returns the removed tokens.
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock();
            let tokens: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.expired_at(now))
                .map(|(token, _)| token.clone())
                .collect();
            let expired = tokens
                .iter()
                .filter_map(|token| sessions.remove(token))
                .collect();
            SESSIONS_ACTIVE.set(sessions.len() as i64);
            expired
        };
        *self.last_sweep.lock() = now;

        expired
            .into_iter()
            .map(|session| {
                let token = session.id().to_string();
                info!(session_id = %token, "Session expired");
                SESSIONS_EXPIRED.inc();
                drop(self.teardown(session));
                token
            })
            .collect()
    }

    /// Sweep if at least `sweep_interval` has passed since the last one.
    pub fn sweep_if_due(&self) -> Vec<String> {
        if self.last_sweep.lock().elapsed() < self.config.sweep_interval() {
            return Vec::new();
        }
        self.sweep_expired()
    }

    /// Run the periodic sweep until `cancel` fires.
    pub fn start_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            info!("Session sweeper started");
            *registry.last_sweep.lock() = Instant::now();
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(registry.config.sweep_check_interval()) => {
                        let expired = registry.sweep_if_due();
                        if !expired.is_empty() {
                            debug!(count = expired.len(), "Sweep removed sessions");
                        }
                    }
                }
            }
            warn!("Session sweeper stopped");
        })
    }

    /// Stop every session and wait for all pending teardowns.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock();
            let drained = sessions.drain().map(|(_, s)| s).collect();
            SESSIONS_ACTIVE.set(0);
            drained
        };
        info!(count = sessions.len(), "Stopping all sessions");
        for session in sessions {
            drop(self.teardown(session));
        }

        self.teardowns.close();
        self.teardowns.wait().await;
        self.teardowns.reopen();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Sessions with a streaming call attached
    #[must_use]
    pub fn streaming_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.is_streaming())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{scripted_registry, scripted_request, test_session_config};
    use std::time::Duration;

    fn registry() -> (
        Arc<SessionRegistry>,
        Arc<Mutex<Vec<Arc<crate::test_helpers::ScriptedFrontend>>>>,
    ) {
        let (frontends, created) = scripted_registry();
        (
            Arc::new(SessionRegistry::new(frontends, test_session_config())),
            created,
        )
    }

    #[tokio::test]
    async fn test_provision_lookup_destroy() {
        let (registry, created) = registry();
        let session = registry.provision(scripted_request()).await.unwrap();
        let token = session.id().to_string();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&token).is_some());
        registry.keep_alive(&token).unwrap();

        registry.destroy(&token).await.unwrap();
        assert!(registry.is_empty());
        assert!(session.is_full_stopped());
        assert_eq!(created.lock()[0].stop_count(), 1);

        assert!(matches!(
            registry.destroy(&token).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(registry.keep_alive(&token), Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_provision_leaves_registry_unchanged() {
        let (registry, _) = registry();
        let mut request = scripted_request();
        request.info.kind = "airspy".to_string();

        let err = registry.provision(request).await.unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_tune_unknown_session() {
        let (registry, _) = registry();
        let err = registry
            .tune("missing", DeviceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let (registry, created) = registry();
        let idle = registry.provision(scripted_request()).await.unwrap();
        let active = registry.provision(scripted_request()).await.unwrap();

        tokio::time::advance(Duration::from_secs(100)).await;
        active.keep_alive();
        tokio::time::advance(Duration::from_secs(21)).await;

        let expired = registry.sweep_expired();
        assert_eq!(expired, vec![idle.id().to_string()]);
        assert!(registry.lookup(idle.id()).is_none());
        assert!(registry.lookup(active.id()).is_some());

        registry.shutdown().await;
        assert!(idle.is_full_stopped());
        assert!(active.is_full_stopped());
        for frontend in created.lock().iter() {
            assert_eq!(frontend.stop_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_if_due_respects_interval() {
        let (registry, _) = registry();
        let session = registry.provision(scripted_request()).await.unwrap();
        registry.sweep_expired();

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(session.expired());
        // Last sweep was 121s ago, so a sweep is due
        assert_eq!(registry.sweep_if_due().len(), 1);

        let second = registry.provision(scripted_request()).await.unwrap();
        tokio::time::advance(Duration::from_secs(121)).await;
        registry.sweep_expired();
        assert!(registry.lookup(second.id()).is_none());
        assert!(registry.sweep_if_due().is_empty());
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_destroy_and_sweep_stop_once() {
        let (frontends, created) = scripted_registry();
        let config = SessionConfig {
            idle_timeout_ms: 1,
            ..test_session_config()
        };
        let registry = Arc::new(SessionRegistry::new(frontends, config));

        for _ in 0..16 {
            let session = registry.provision(scripted_request()).await.unwrap();
            let token = session.id().to_string();
            tokio::time::sleep(Duration::from_millis(5)).await;

            let destroyer = {
                let registry = Arc::clone(&registry);
                let token = token.clone();
                tokio::spawn(async move { registry.destroy(&token).await })
            };
            let sweeper = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.sweep_expired() })
            };

            let destroyed = destroyer.await.unwrap();
            let swept = sweeper.await.unwrap();
            let swept_this = swept.contains(&token);

            // Exactly one of the two removed the session
            assert_ne!(destroyed.is_ok(), swept_this);
            if destroyed.is_err() {
                assert!(matches!(destroyed, Err(Error::SessionNotFound(_))));
            }
        }

        registry.shutdown().await;
        for frontend in created.lock().iter() {
            assert_eq!(frontend.stop_count(), 1);
            assert_eq!(frontend.destroys.load(std::sync::atomic::Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_expires_idle_sessions() {
        let (frontends, _) = scripted_registry();
        let registry = Arc::new(SessionRegistry::new(frontends, test_session_config()));
        let cancel = CancellationToken::new();
        let sweeper = registry.start_sweeper(cancel.clone());

        let session = registry.provision(scripted_request()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(135)).await;

        assert!(registry.lookup(session.id()).is_none());
        cancel.cancel();
        sweeper.await.unwrap();
        registry.shutdown().await;
        assert!(session.is_full_stopped());
    }
}
