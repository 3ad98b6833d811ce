//! In-process registry of live sessions.
//!
//! Every lookup refreshes a session's last-access time. `run_session_sweeper`
//! drops sessions that stay idle past the configured TTL, together with their
//! stored records and report files.

use std::collections::HashMap;
use std::sync::Arc;

use fitcheck_core::config::SessionsConfig;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::workflow::{Pipeline, Session};

pub type SessionHandle = Arc<Mutex<Session>>;

struct Entry {
    handle: SessionHandle,
    last_access: Instant,
}

pub struct SessionRegistry {
    pipeline: Arc<Pipeline>,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let session = Session::new(self.pipeline.clone());
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(
            id,
            Entry {
                handle: handle.clone(),
                last_access: Instant::now(),
            },
        );
        tracing::info!(session = %id, "Session created");
        (id, handle)
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_access = Instant::now();
        Some(entry.handle.clone())
    }

    /// Drop a session, its stored records and its report files. Returns false for unknown ids.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_none() {
            return false;
        }
        if let Err(e) = self.pipeline.store.remove_session(id).await {
            tracing::warn!(session = %id, error = %e, "Failed to remove session records");
        }
        if let Err(e) = self.pipeline.reports.discard(id).await {
            tracing::warn!(session = %id, error = %e, "Failed to remove report directory");
        }
        tracing::info!(session = %id, "Session closed");
        true
    }

    /// Remove sessions idle for at least `ttl`. Sessions busy with a request are kept.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let expired: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, e)| e.last_access.elapsed() >= ttl && e.handle.try_lock().is_ok())
                .map(|(id, _)| *id)
                .collect()
        };

        let mut evicted = 0;
        for id in expired {
            if self.remove(id).await {
                evicted += 1;
            }
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Called from main.rs: periodically evict idle sessions until shutdown.
pub async fn run_session_sweeper(
    registry: &SessionRegistry,
    config: SessionsConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let ttl = Duration::from_secs(config.idle_ttl_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        ttl_secs = config.idle_ttl_secs,
        interval_secs = config.sweep_interval_secs,
        "Session sweeper started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = registry.evict_idle(ttl).await;
                if evicted > 0 {
                    let remaining = registry.len().await;
                    tracing::info!(evicted, remaining, "Idle sessions evicted");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Session sweeper shutting down");
                break;
            }
        }
    }
}
