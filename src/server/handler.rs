//! Request handlers

use crate::engine::RawRenderOptions;
use crate::error::MapmergeError;
use crate::pipeline::{ArtifactInfo, Pipeline};
use crate::server::response::ApiError;
use crate::store::{CompositeKey, ContentKey};
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

/// Shared handler state
pub type AppState = Arc<Pipeline>;

/// Form field carrying the uploaded map
const UPLOAD_FIELD: &str = "map";

/// `?hashes=a_b_c`
#[derive(Debug, Default, Deserialize)]
pub struct MergeQuery {
    #[serde(default)]
    pub hashes: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub hash: String,
    /// Uploads never expire
    pub lifetime: i64,
}

/// Health check handler.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Store one uploaded map and return its hash.
pub async fn upload(
    State(pipeline): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let key = pipeline.store().store(&bytes).await.map_err(|e| {
            error!("Failed to store upload '{}': {}", name, e);
            ApiError::Internal("Upload failed.")
        })?;
        info!("Uploaded '{}' ({} bytes) as {}", name, bytes.len(), key);

        return Ok(Json(UploadResponse {
            hash: key.to_string(),
            lifetime: -1,
        }));
    }

    Err(MapmergeError::MissingUpload.into())
}

/// Size and remaining lifetime of a merged store.
pub async fn merged_info(
    State(pipeline): State<AppState>,
    Query(query): Query<MergeQuery>,
) -> Result<Json<ArtifactInfo>, ApiError> {
    let keys = CompositeKey::parse(&query.hashes)?;
    Ok(Json(pipeline.merged_info(&keys).await?))
}

/// The merged store itself, as a download.
pub async fn merged_store(
    State(pipeline): State<AppState>,
    Query(query): Query<MergeQuery>,
) -> Result<Response, ApiError> {
    let keys = CompositeKey::parse(&query.hashes)?;
    let path = pipeline.merged_store(&keys).await?;

    let (body, length) = open_artifact(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/vnd.sqlite3")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"merged.sqlite\""),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        body,
    )
        .into_response())
}

/// Render of a merged store.
pub async fn merged_render(
    State(pipeline): State<AppState>,
    Query(query): Query<MergeQuery>,
    Query(raw): Query<RawRenderOptions>,
) -> Result<Response, ApiError> {
    let keys = CompositeKey::parse(&query.hashes)?;
    let options = raw.into_options()?;
    let path = pipeline.merged_render(&keys, &options).await?;
    png(&path).await
}

/// Render of a single upload: `/maps/<hash>.png`.
pub async fn single_render(
    State(pipeline): State<AppState>,
    Path(file): Path<String>,
    Query(raw): Query<RawRenderOptions>,
) -> Result<Response, ApiError> {
    let candidate = file.strip_suffix(".png").unwrap_or(&file);
    let key = ContentKey::parse(candidate)
        .map_err(|_| ApiError::NotFound(format!("Illegal map hash '{}'.", candidate)))?;
    let options = raw.into_options()?;

    match pipeline.single_render(&key, &options).await {
        Ok(path) => png(&path).await,
        Err(e) if matches!(e.root(), MapmergeError::UnknownInput(_)) => {
            Err(ApiError::NotFound(format!("Map {} not found.", key)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn png(path: &FsPath) -> Result<Response, ApiError> {
    let (body, length) = open_artifact(path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        body,
    )
        .into_response())
}

/// Open an artifact and stream it as the response body
///
/// The open handle keeps the content readable even if expiry unlinks the
/// file while the response is still being sent.
async fn open_artifact(path: &FsPath) -> Result<(Body, u64), ApiError> {
    let file = File::open(path)
        .await
        .map_err(|e| MapmergeError::io(format!("opening {}", path.display()), e))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| MapmergeError::io(format!("reading metadata of {}", path.display()), e))?
        .len();

    Ok((Body::from_stream(ReaderStream::new(file)), length))
}
