use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use stash_service::{
    BlobLocator, ByteRange, NamespaceId, NodeHandle, ReadBlobResponse, RefName, RefOptions, StorageService,
};
use tokio_util::io::ReaderStream;

use crate::api::{
    AliasQuery, HealthResponse, InfoResponse, NodeBody, NodesBody, RangeQuery, RefBody, StalenessQuery,
    WriteBlobBody, WriteRefRequest,
};
use crate::error::{ServerError, ServerResult};

pub type AppState = Arc<StorageService>;

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler(State(service): State<AppState>) -> Json<InfoResponse> {
    let snapshot = service.registry().snapshot();
    Json(InfoResponse {
        name: "stash-server".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        host: snapshot.config.host.to_string(),
        instance: service.instance_id().to_string(),
        revision: snapshot.revision.as_str().to_string(),
        namespaces: snapshot.namespaces.keys().map(|ns| ns.to_string()).collect(),
    })
}

// ---- Blobs ----

/// Store a blob. An empty body asks the backend for an upload URL.
pub async fn write_blob_handler(
    State(service): State<AppState>,
    Path(ns): Path<String>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<WriteBlobBody>)> {
    let ns = namespace(&ns)?;
    let payload = (!body.is_empty()).then_some(body);
    let written = service.write_blob(&ns, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(WriteBlobBody {
            locator: written.locator.to_string(),
            upload_url: written.upload_url,
        }),
    ))
}

pub async fn read_blob_handler(
    State(service): State<AppState>,
    Path((ns, locator)): Path<(String, String)>,
    Query(range): Query<RangeQuery>,
) -> ServerResult<Response> {
    let ns = namespace(&ns)?;
    let locator: BlobLocator = locator
        .trim_start_matches('/')
        .parse()
        .map_err(|e| ServerError::InvalidRequest(format!("{e}")))?;
    let range = match (range.offset, range.length) {
        (None, None) => None,
        (offset, length) => Some(ByteRange {
            offset: offset.unwrap_or(0),
            length: length.unwrap_or(u64::MAX),
        }),
    };

    match service.read_blob(&ns, &locator, range).await? {
        ReadBlobResponse::Redirect(url) => Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response()),
        ReadBlobResponse::Stream(reader) => Ok((
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from_stream(ReaderStream::new(reader)),
        )
            .into_response()),
    }
}

pub async fn find_nodes_handler(
    State(service): State<AppState>,
    Path(ns): Path<String>,
    Query(query): Query<AliasQuery>,
) -> ServerResult<Json<NodesBody>> {
    let ns = namespace(&ns)?;
    let nodes = service.find_nodes_by_alias(&ns, &query.alias).await?;
    Ok(Json(NodesBody {
        nodes: nodes.iter().map(NodeBody::from).collect(),
    }))
}

// ---- Refs ----

pub async fn write_ref_handler(
    State(service): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
    Json(request): Json<WriteRefRequest>,
) -> ServerResult<Json<RefBody>> {
    let ns = namespace(&ns)?;
    let name = ref_name(&name)?;
    let target = NodeHandle::try_from(request.target).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    let options = RefOptions {
        lifetime: request.lifetime_secs.map(Duration::from_secs),
        extend: request.extend,
    };
    let info = service.write_ref(&ns, &name, target, options).await?;
    Ok(Json(RefBody {
        name: info.name.to_string(),
        target: NodeBody::from(&info.target),
        expires_at: info.expires_at.map(|t| t.to_rfc3339()),
    }))
}

pub async fn read_ref_handler(
    State(service): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
    Query(query): Query<StalenessQuery>,
) -> ServerResult<Json<RefBody>> {
    let ns = namespace(&ns)?;
    let name = ref_name(&name)?;
    let staleness = query.staleness_secs.map(Duration::from_secs);
    let target = service
        .read_ref(&ns, &name, staleness)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("ref {name} in namespace {ns}")))?;
    Ok(Json(RefBody {
        name: name.to_string(),
        target: NodeBody::from(&target),
        expires_at: None,
    }))
}

pub async fn delete_ref_handler(
    State(service): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    let ns = namespace(&ns)?;
    let name = ref_name(&name)?;
    if service.delete_ref(&ns, &name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("ref {name} in namespace {ns}")))
    }
}

fn namespace(raw: &str) -> ServerResult<NamespaceId> {
    NamespaceId::new(raw).map_err(|e| ServerError::InvalidRequest(e.to_string()))
}

fn ref_name(raw: &str) -> ServerResult<RefName> {
    RefName::new(raw.trim_start_matches('/')).map_err(|e| ServerError::InvalidRequest(e.to_string()))
}
