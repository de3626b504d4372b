// Progress tracker - keeps the job path and the latest CNC position together
use crate::application::backend_api::{BackendApi, BackendResult};
use crate::domain::toolpath::{PathProgress, ToolPath};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Default)]
struct TrackerState {
    path: Option<Arc<ToolPath>>,
    position: Option<(f64, f64)>,
    cached: Option<PathProgress>,
    stale: bool,
}

/// Positions arrive with every sample, but the nearest-point search is linear
/// in the path length, so progress is only recomputed when someone reads it
/// and something changed since the last read.
#[derive(Default)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new job path (or clear it). Returns false if it is the same
    /// path already loaded.
    pub fn set_path(&self, path: Option<ToolPath>) -> bool {
        let mut state = self.lock();
        let unchanged = match (&state.path, &path) {
            (Some(current), Some(new)) => current.as_ref() == new,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }
        state.path = path.map(Arc::new);
        state.stale = true;
        true
    }

    pub fn path(&self) -> Option<Arc<ToolPath>> {
        self.lock().path.clone()
    }

    pub fn update_position(&self, x: f64, y: f64) {
        let mut state = self.lock();
        if state.position != Some((x, y)) {
            state.position = Some((x, y));
            state.stale = true;
        }
    }

    /// Current progress; `None` without a non-empty path or a known position
    pub fn progress(&self) -> Option<PathProgress> {
        let mut state = self.lock();
        if state.stale {
            state.cached = match (&state.path, state.position) {
                (Some(path), Some((x, y))) => path.progress_at(x, y),
                _ => None,
            };
            state.stale = false;
        }
        state.cached
    }

    /// Pull the backend's parsed path once. Returns whether it changed.
    pub async fn refresh_from_backend(&self, backend: &dyn BackendApi) -> BackendResult<bool> {
        let path = backend
            .tool_path()
            .await?
            .map(|data| ToolPath::new(data.path_points));
        let points = path.as_ref().map_or(0, ToolPath::len);
        let changed = self.set_path(path);
        if changed {
            tracing::info!(points, "tool path updated");
        }
        Ok(changed)
    }

    /// Keep the path in sync with the backend, so a newly parsed job replaces
    /// the previous one.
    pub fn spawn_backend_refresh(
        self: Arc<Self>,
        backend: Arc<dyn BackendApi>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh_from_backend(backend.as_ref()).await {
                    tracing::debug!(error = %e, "tool path refresh failed");
                }
            }
        })
    }
}
