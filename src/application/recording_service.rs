// Recording service - operator-driven save start/stop and session reset
use crate::application::backend_api::{BackendApi, BackendError};
use crate::application::live_console::LiveConsole;
use crate::application::session_monitor::SessionMonitor;
use crate::domain::stream_event::ConnectionState;
use crate::domain::telemetry::{SaveReceipt, SaveStatus};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("backend stream is not connected")]
    Disconnected,

    #[error("blocked by exception: {0}")]
    ExceptionActive(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Folder name used when the operator does not supply one
pub fn default_folder_name(now: DateTime<Local>) -> String {
    format!("monitoring_{}", now.format("%Y-%m-%dT%H-%M-%S"))
}

#[derive(Clone)]
pub struct RecordingService {
    backend: Arc<dyn BackendApi>,
    console: Arc<LiveConsole>,
    monitor: Arc<SessionMonitor>,
    connection: watch::Receiver<ConnectionState>,
}

impl RecordingService {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        console: Arc<LiveConsole>,
        monitor: Arc<SessionMonitor>,
        connection: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            backend,
            console,
            monitor,
            connection,
        }
    }

    pub async fn start(&self, folder_name: Option<String>) -> Result<SaveReceipt, ConsoleError> {
        self.ensure_ready()?;
        let folder_name = folder_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_folder_name(Local::now()));

        let receipt = self.backend.start_save(&folder_name).await.map_err(|e| {
            self.console.record_error(format!("Failed to start saving: {}", e));
            e
        })?;
        tracing::info!(%folder_name, save_path = %receipt.save_path, "recording started");
        self.console.set_save_status(SaveStatus {
            is_saving: true,
            save_path: Some(receipt.save_path.clone()),
            timestamp: receipt.timestamp.clone(),
        });
        Ok(receipt)
    }

    /// Stop saving and return the session machine to Idle
    pub async fn stop(&self) -> Result<SaveReceipt, ConsoleError> {
        if *self.connection.borrow() != ConnectionState::Connected {
            return Err(ConsoleError::Disconnected);
        }

        let receipt = self.backend.stop_save().await.map_err(|e| {
            self.console.record_error(format!("Failed to stop saving: {}", e));
            e
        })?;
        tracing::info!("recording stopped");
        self.console.set_save_status(SaveStatus {
            is_saving: false,
            save_path: None,
            timestamp: receipt.timestamp.clone(),
        });
        self.monitor.reset();
        Ok(receipt)
    }

    /// Start when idle, stop when saving
    pub async fn toggle(&self, folder_name: Option<String>) -> Result<SaveReceipt, ConsoleError> {
        if self.console.is_saving() {
            self.stop().await
        } else {
            self.start(folder_name).await
        }
    }

    pub fn reset_session(&self) {
        self.monitor.reset();
        self.console.clear_error();
    }

    fn ensure_ready(&self) -> Result<(), ConsoleError> {
        if *self.connection.borrow() != ConnectionState::Connected {
            return Err(ConsoleError::Disconnected);
        }
        let session = self.monitor.status();
        if session.has_exception() {
            let message = session.error.unwrap_or_else(|| "exception raised".to_string());
            return Err(ConsoleError::ExceptionActive(message));
        }
        Ok(())
    }
}
