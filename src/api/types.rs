//! API request and response types.

use serde::{Deserialize, Serialize};

/// Request to create a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    /// Required; validated by the gateway so a missing title is a 400.
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// Query parameters for task listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Clamped to the configured page size
    pub limit: Option<usize>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Processing statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Events the consumer finished handling
    pub tasks_processed: i64,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
