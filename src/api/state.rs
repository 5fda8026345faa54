//! Shared state handed to every handler.
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{RegoError, RegoResult};
use crate::service::RegoService;
use crate::store::SessionPool;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegoService>,
    pub sessions: SessionPool,
}

impl AppState {
    pub fn new(service: RegoService, config: &AppConfig) -> Self {
        Self {
            service: Arc::new(service),
            sessions: SessionPool::new(config.max_sessions, config.session_timeout),
        }
    }

    /// Run a blocking engine call while holding a session.
    pub async fn run<T, F>(&self, f: F) -> RegoResult<T>
    where
        F: FnOnce(&RegoService) -> RegoResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.sessions.acquire().await?;
        let service = self.service.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let _session = session;
            f(&service)
        })
        .await;
        joined.map_err(|e| RegoError::Internal(format!("engine task failed: {e}")))?
    }
}
