use axum::{
    Router,
    extract::{DefaultBodyLimit, Extension, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    handle_discover, handle_download, handle_files, handle_health, handle_peers,
    handle_unknown_endpoint, handle_upload,
};
use super::node::PeerNode;
use super::protocol::{
    ENDPOINT_DISCOVER, ENDPOINT_DOWNLOAD, ENDPOINT_FILES, ENDPOINT_HEALTH, ENDPOINT_PEERS,
    ENDPOINT_UPLOAD,
};

/// Full HTTP surface of one peer.
pub fn router(node: Arc<PeerNode>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(ENDPOINT_UPLOAD, post(handle_upload))
        .route(ENDPOINT_DOWNLOAD, get(handle_download))
        .route(ENDPOINT_DISCOVER, get(handle_discover))
        .route(ENDPOINT_PEERS, get(handle_peers))
        .route(ENDPOINT_FILES, get(handle_files))
        .route(ENDPOINT_HEALTH, get(handle_health))
        .fallback(handle_unknown_endpoint)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(Extension(node))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors))
}

/// Allows any origin. Preflight requests are answered here with 204 and never reach a route.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
