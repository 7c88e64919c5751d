use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use stash_service::StorageService;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router with all stash endpoints.
///
/// The request body limit follows `server.max_blob_size` of the
/// configuration current at build time.
pub fn build_router(service: Arc<StorageService>) -> Router {
    let limit = service.registry().snapshot().config.server.max_blob_size;
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/storage/:ns/blobs", post(handler::write_blob_handler))
        .route("/v1/storage/:ns/blobs/*locator", get(handler::read_blob_handler))
        .route("/v1/storage/:ns/nodes", get(handler::find_nodes_handler))
        .route(
            "/v1/storage/:ns/refs/*name",
            put(handler::write_ref_handler)
                .get(handler::read_ref_handler)
                .delete(handler::delete_ref_handler),
        )
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
