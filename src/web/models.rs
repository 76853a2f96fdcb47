//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

/// Represents the body of a /api/v1/command request.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Command line to broadcast; surrounding whitespace is trimmed.
    pub cmd: String,
}

/// Represents the response for the /api/v1/ports endpoint.
#[derive(Debug, Serialize)]
pub struct PortsResponse {
    pub ports: Vec<String>,
}
