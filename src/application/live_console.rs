// Live console - the operator's view of the stream, fed by transport events
use crate::application::backend_api::BackendApi;
use crate::application::progress_tracker::ProgressTracker;
use crate::domain::history::TelemetryHistory;
use crate::domain::stream_event::{EventKind, StreamEvent};
use crate::domain::telemetry::{Channel, SaveStatus, SystemStatus, TelemetrySample};
use crate::infrastructure::realtime_transport::RealtimeTransport;
use crate::infrastructure::subscribers::SubscriptionId;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinHandle;

pub struct LiveConsole {
    history: RwLock<TelemetryHistory>,
    /// Newest sample reported over REST; never part of the history
    latest_snapshot: RwLock<Option<TelemetrySample>>,
    system_status: RwLock<Option<SystemStatus>>,
    save_status: RwLock<Option<SaveStatus>>,
    last_error: RwLock<Option<String>>,
    progress: Arc<ProgressTracker>,
    /// Samples pulled from REST after a reconnect; 0 disables seeding
    seed_limit: usize,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveConsole {
    pub fn new(history_capacity: usize, seed_limit: usize, progress: Arc<ProgressTracker>) -> Self {
        Self {
            history: RwLock::new(TelemetryHistory::new(history_capacity)),
            latest_snapshot: RwLock::new(None),
            system_status: RwLock::new(None),
            save_status: RwLock::new(None),
            last_error: RwLock::new(None),
            progress,
            seed_limit,
            refresh_task: Mutex::new(None),
        }
    }

    /// Subscribe to every event kind the console renders
    pub fn attach(
        self: &Arc<Self>,
        transport: &RealtimeTransport,
        backend: Arc<dyn BackendApi>,
    ) -> Vec<(EventKind, SubscriptionId)> {
        [
            EventKind::SensorData,
            EventKind::StatusUpdate,
            EventKind::SaveStatus,
            EventKind::Connection,
            EventKind::Error,
        ]
        .into_iter()
        .map(|kind| {
            let console = Arc::clone(self);
            let backend = Arc::clone(&backend);
            let id = transport.on(kind, move |event| {
                console.apply_event(event, &backend);
                Ok(())
            });
            (kind, id)
        })
        .collect()
    }

    /// Undo [`attach`](Self::attach) and stop any refresh still in flight
    pub fn detach(&self, transport: &RealtimeTransport, subscriptions: &[(EventKind, SubscriptionId)]) {
        for &(kind, id) in subscriptions {
            transport.off(kind, id);
        }
        if let Some(task) = self.refresh_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }

    pub fn apply_event(self: &Arc<Self>, event: &StreamEvent, backend: &Arc<dyn BackendApi>) {
        match event {
            StreamEvent::SensorData(sample) => self.ingest(sample.clone()),
            StreamEvent::StatusUpdate(status) => {
                *self.system_status.write().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
            }
            StreamEvent::SaveStatus(status) => self.set_save_status(status.clone()),
            // Greeting from the backend itself; the transport announces the handshake
            StreamEvent::Connection {
                connected: true,
                message: Some(message),
            } => tracing::debug!(%message, "backend greeting"),
            StreamEvent::Connection {
                connected: true,
                message: None,
            } => {
                self.clear_error();
                self.schedule_refresh(Arc::clone(backend));
            }
            StreamEvent::Connection {
                connected: false,
                message,
            } => {
                let reason = message.as_deref().unwrap_or("connection closed");
                self.record_error(format!("Disconnected: {}", reason));
            }
            StreamEvent::Error(message) => self.record_error(message.clone()),
        }
    }

    /// Run [`refresh`](Self::refresh) in the background, replacing a refresh
    /// from an earlier handshake that has not finished yet
    fn schedule_refresh(self: &Arc<Self>, backend: Arc<dyn BackendApi>) {
        let console = Arc::clone(self);
        let task = tokio::spawn(async move { console.refresh(backend.as_ref()).await });
        if let Some(previous) = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            previous.abort();
        }
    }

    pub fn ingest(&self, sample: TelemetrySample) {
        if let Some((x, y)) = sample.planar_position() {
            self.progress.update_position(x, y);
        }
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .append(sample);
    }

    /// Pull status, save status and the latest sample over REST, and backfill
    /// the history with samples older than anything streamed so far.
    pub async fn refresh(&self, backend: &dyn BackendApi) {
        if self.seed_limit > 0 {
            match backend.sample_history(self.seed_limit).await {
                Ok(fetched) => self.backfill(fetched),
                Err(e) => tracing::warn!(error = %e, "history seed failed"),
            }
        }

        match backend.system_status().await {
            Ok(status) => {
                *self.system_status.write().unwrap_or_else(PoisonError::into_inner) = Some(status)
            }
            Err(e) => self.record_error(e.to_string()),
        }

        match backend.save_status().await {
            Ok(status) => self.set_save_status(status),
            Err(e) => self.record_error(e.to_string()),
        }

        match backend.latest_sample().await {
            Ok(sample) => *self.latest_snapshot.write().unwrap_or_else(PoisonError::into_inner) = sample,
            Err(e) => tracing::debug!(error = %e, "no latest sample"),
        }
    }

    fn backfill(&self, fetched: Vec<TelemetrySample>) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let was_empty = history.is_empty();
        let position = fetched.iter().rev().find_map(TelemetrySample::planar_position);
        let taken = history.backfill(fetched);
        drop(history);

        if taken > 0 {
            tracing::info!(samples = taken, "history seeded");
        }
        // Streamed positions are newer than anything fetched
        if was_empty {
            if let Some((x, y)) = position {
                self.progress.update_position(x, y);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<TelemetrySample> {
        self.history.read().unwrap_or_else(PoisonError::into_inner).snapshot()
    }

    /// Newest streamed sample, or the REST snapshot before anything streamed
    pub fn latest(&self) -> Option<TelemetrySample> {
        let streamed = self
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest()
            .cloned();
        streamed.or_else(|| {
            self.latest_snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    pub fn history_len(&self) -> usize {
        self.history.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.read().unwrap_or_else(PoisonError::into_inner).capacity()
    }

    /// `(index, value)` pairs for one channel, skipping samples without it
    pub fn series(&self, channel: Channel) -> Vec<(usize, f64)> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .series(move |sample| channel.extract(sample))
            .collect()
    }

    pub fn system_status(&self) -> Option<SystemStatus> {
        self.system_status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.save_status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_save_status(&self, status: SaveStatus) {
        *self.save_status.write().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub fn is_saving(&self) -> bool {
        self.save_status().is_some_and(|s| s.is_saving)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "console error");
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    pub fn clear_error(&self) {
        self.last_error.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }
}
