// Scripted backend for service tests
use crate::application::backend_api::{BackendApi, BackendError, BackendResult, CameraFrame, NcPathData};
use crate::domain::telemetry::{SaveReceipt, SaveStatus, SystemStatus, TelemetrySample};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<String>>,
    pub status: Mutex<SystemStatus>,
    pub latest: Mutex<Option<TelemetrySample>>,
    pub history: Mutex<Vec<TelemetrySample>>,
    pub path: Mutex<Option<NcPathData>>,
    pub saving: AtomicBool,
    pub fail: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, endpoint: &str) -> BackendResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(endpoint.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn is_reachable(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }

    async fn system_status(&self) -> BackendResult<SystemStatus> {
        self.record("status")?;
        Ok(self.status.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn latest_sample(&self) -> BackendResult<Option<TelemetrySample>> {
        self.record("latest")?;
        Ok(self.latest.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn sample_history(&self, limit: usize) -> BackendResult<Vec<TelemetrySample>> {
        self.record(&format!("history:{}", limit))?;
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.len().saturating_sub(limit);
        Ok(history[skip..].to_vec())
    }

    async fn start_save(&self, folder_name: &str) -> BackendResult<SaveReceipt> {
        self.record(&format!("start:{}", folder_name))?;
        self.saving.store(true, Ordering::SeqCst);
        Ok(SaveReceipt {
            message: "Started".to_string(),
            save_path: format!("data/{}", folder_name),
            timestamp: "2025-03-07T09:00:00".to_string(),
        })
    }

    async fn stop_save(&self) -> BackendResult<SaveReceipt> {
        self.record("stop")?;
        self.saving.store(false, Ordering::SeqCst);
        Ok(SaveReceipt {
            message: "Stopped".to_string(),
            save_path: String::new(),
            timestamp: "2025-03-07T09:30:00".to_string(),
        })
    }

    async fn save_status(&self) -> BackendResult<SaveStatus> {
        self.record("save_status")?;
        Ok(SaveStatus {
            is_saving: self.saving.load(Ordering::SeqCst),
            save_path: None,
            timestamp: String::new(),
        })
    }

    async fn camera_image(&self, camera_id: &str) -> BackendResult<CameraFrame> {
        self.record(&format!("image:{}", camera_id))?;
        Ok(CameraFrame {
            content_type: Some("image/png".to_string()),
            bytes: Bytes::from_static(b"\x89PNG"),
        })
    }

    async fn tool_path(&self) -> BackendResult<Option<NcPathData>> {
        self.record("path")?;
        Ok(self.path.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}
