//! Peer HTTP Protocol
//!
//! Endpoints and Data Transfer Objects (DTOs) served by every peer. The same endpoints are
//! used by browser clients and by other peers fetching a missing file.

use crate::presence::types::{HeartbeatStats, PeerId, RegistrationState};

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Multipart upload; the file is taken from the `file` field.
pub const ENDPOINT_UPLOAD: &str = "/upload";
/// File download by `?filename=`. Fetches from other holders on a local miss.
pub const ENDPOINT_DOWNLOAD: &str = "/download";
/// Holder addresses of `?filename=`.
pub const ENDPOINT_DISCOVER: &str = "/discover";
/// Live peers as `{ id: address }`.
pub const ENDPOINT_PEERS: &str = "/peers";
/// Every indexed file as `{ filename: [holders] }`.
pub const ENDPOINT_FILES: &str = "/files";
/// Identity and registration state of this peer.
pub const ENDPOINT_HEALTH: &str = "/health";

/// Marks a download issued by another peer. Such requests are answered from the local
/// cache only, so fetches never chain from peer to peer.
pub const PEER_FETCH_HEADER: &str = "x-peer-fetch";

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

// --- Data Transfer Objects ---

/// Query string of `/download` and `/discover`.
///
/// `filename` is optional here so that its absence maps to our own 400 body instead of the
/// extractor's rejection.
#[derive(Debug, Serialize, Deserialize)]
pub struct FilenameQuery {
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub filename: String,
    pub peer_id: PeerId,
    /// Holder address recorded in the index.
    pub address: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub id: PeerId,
    pub address: String,
    pub registration: RegistrationState,
    pub stats: HeartbeatStats,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}
