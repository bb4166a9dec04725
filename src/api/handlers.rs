use axum::{
    Json,
    body::Body,
    extract::{Extension, Multipart, Query},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::error::ApiError;
use super::node::PeerNode;
use super::protocol::{
    FilenameQuery, HealthResponse, PEER_FETCH_HEADER, UPLOAD_FIELD, UploadResponse,
};
use crate::presence::types::PeerId;

fn required_filename(query: FilenameQuery) -> Result<String, ApiError> {
    query
        .filename
        .ok_or_else(|| ApiError::BadRequest("missing query parameter: filename".to_string()))
}

/// Escapes `filename` for use inside a quoted `Content-Disposition` parameter.
fn quote_filename(filename: &str) -> String {
    let mut quoted = String::with_capacity(filename.len());
    for c in filename.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
}

pub async fn handle_upload(
    Extension(node): Extension<Arc<PeerNode>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("upload is missing a filename".to_string()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

        let mut reader: &[u8] = &data;
        let response = node.upload(&filename, &mut reader).await?;
        return Ok((StatusCode::CREATED, Json(response)));
    }

    Err(ApiError::BadRequest(format!(
        "multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

/// Serves the file as an attachment. Requests from other peers never trigger a fetch.
pub async fn handle_download(
    Extension(node): Extension<Arc<PeerNode>>,
    headers: HeaderMap,
    Query(query): Query<FilenameQuery>,
) -> Result<Response, ApiError> {
    let filename = required_filename(query)?;
    let allow_remote = !headers.contains_key(PEER_FETCH_HEADER);

    let mut file = node.download(&filename, allow_remote).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read {}: {}", filename, e)))?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        quote_filename(&filename)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(data),
    )
        .into_response())
}

pub async fn handle_discover(
    Extension(node): Extension<Arc<PeerNode>>,
    Query(query): Query<FilenameQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let filename = required_filename(query)?;
    Ok(Json(node.discover(&filename).await?))
}

pub async fn handle_peers(
    Extension(node): Extension<Arc<PeerNode>>,
) -> Result<Json<BTreeMap<PeerId, String>>, ApiError> {
    Ok(Json(node.peers().await?))
}

pub async fn handle_files(
    Extension(node): Extension<Arc<PeerNode>>,
) -> Result<Json<BTreeMap<String, Vec<String>>>, ApiError> {
    Ok(Json(node.files().await?))
}

pub async fn handle_health(Extension(node): Extension<Arc<PeerNode>>) -> Json<HealthResponse> {
    Json(node.health())
}

pub async fn handle_unknown_endpoint() -> ApiError {
    ApiError::NotFound("no such endpoint".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_filename() {
        assert_eq!(quote_filename("report.txt"), "report.txt");
        assert_eq!(quote_filename("say \"hi\".txt"), "say \\\"hi\\\".txt");
        assert_eq!(quote_filename("a\\b"), "a\\\\b");
    }
}
