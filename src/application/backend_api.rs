// Backend REST capability used by the console services
use crate::domain::telemetry::{SaveReceipt, SaveStatus, SystemStatus, TelemetrySample};
use crate::domain::toolpath::PathPoint;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Parsed tool path as served by `GET /api/nc/path`. Bounds are recomputed
/// locally from the points.
#[derive(Debug, Clone, Deserialize)]
pub struct NcPathData {
    pub path_points: Vec<PathPoint>,
}

/// Latest frame of one camera, with the content type the backend declared
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    /// True when the backend root answers
    async fn is_reachable(&self) -> bool;

    async fn system_status(&self) -> BackendResult<SystemStatus>;

    /// Newest stored sample; `None` while the backend holds none
    async fn latest_sample(&self) -> BackendResult<Option<TelemetrySample>>;

    async fn sample_history(&self, limit: usize) -> BackendResult<Vec<TelemetrySample>>;

    async fn start_save(&self, folder_name: &str) -> BackendResult<SaveReceipt>;

    async fn stop_save(&self) -> BackendResult<SaveReceipt>;

    async fn save_status(&self) -> BackendResult<SaveStatus>;

    async fn camera_image(&self, camera_id: &str) -> BackendResult<CameraFrame>;

    /// The currently parsed tool path; `None` while nothing has been parsed
    async fn tool_path(&self) -> BackendResult<Option<NcPathData>>;
}
