use std::future::Future;
use std::sync::Arc;

use stash_config::ServerSettings;
use stash_service::StorageService;
use tokio::net::TcpListener;

use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Stash HTTP server.
pub struct StashServer {
    settings: ServerSettings,
    service: Arc<StorageService>,
}

impl StashServer {
    /// Serve `service` with the server settings of its current configuration.
    pub fn new(service: Arc<StorageService>) -> Self {
        let settings = service.registry().snapshot().config.server.clone();
        Self { settings, service }
    }

    pub fn config(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn service(&self) -> &Arc<StorageService> {
        &self.service
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.service.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(&self.settings.bind_addr).await?;
        tracing::info!("stash server listening on {}", self.settings.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

impl std::fmt::Debug for StashServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StashServer")
            .field("bind_addr", &self.settings.bind_addr)
            .finish_non_exhaustive()
    }
}
