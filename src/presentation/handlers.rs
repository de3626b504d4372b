// HTTP request handlers
use crate::application::backend_api::BackendError;
use crate::application::recording_service::ConsoleError;
use crate::domain::session::{LogKind, SessionStatus};
use crate::domain::stream_event::ConnectionState;
use crate::domain::telemetry::{Channel, SaveReceipt, SaveStatus, SystemStatus, TelemetrySample};
use crate::domain::toolpath::{PathBounds, PathPoint, PathProgress};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Console(#[from] ConsoleError),

    #[error("{0}")]
    NotFound(String),
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        ApiError::Console(ConsoleError::Backend(e))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Console(ConsoleError::Disconnected) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Console(ConsoleError::ExceptionActive(_)) => StatusCode::CONFLICT,
            ApiError::Console(ConsoleError::Backend(_)) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        tracing::debug!(status = status.as_u16(), error = %self, "request failed");
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
pub struct ConsoleStatusView {
    pub connection: ConnectionState,
    pub reconnect_attempts: u32,
    pub session: SessionStatus,
    pub system_status: Option<SystemStatus>,
    pub save_status: Option<SaveStatus>,
    pub last_error: Option<String>,
    pub latest: Option<TelemetrySample>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub progress: Option<PathProgress>,
}

#[derive(Serialize)]
pub struct SeriesView {
    pub channel: Channel,
    pub points: Vec<(usize, f64)>,
}

#[derive(Serialize)]
pub struct ProgressView {
    pub path_loaded: bool,
    pub progress: Option<PathProgress>,
}

#[derive(Serialize)]
pub struct BoundsView {
    #[serde(flatten)]
    pub bounds: PathBounds,
    pub x_range: f64,
    pub y_range: f64,
    pub z_range: f64,
}

impl From<PathBounds> for BoundsView {
    fn from(bounds: PathBounds) -> Self {
        Self {
            x_range: bounds.x_range(),
            y_range: bounds.y_range(),
            z_range: bounds.z_range(),
            bounds,
        }
    }
}

#[derive(Serialize)]
pub struct PathView {
    pub path_points: Vec<PathPoint>,
    pub bounds: BoundsView,
    pub total_points: usize,
    pub total_distance: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRecordingRequest {
    pub folder_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InjectLogRequest {
    pub line: String,
}

#[derive(Debug, Serialize)]
pub struct InjectedLogView {
    pub path: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Everything the header and status panels show, in one read
pub async fn console_status(State(state): State<Arc<AppState>>) -> Json<ConsoleStatusView> {
    let console = &state.console;
    Json(ConsoleStatusView {
        connection: state.transport.state(),
        reconnect_attempts: state.transport.reconnect_attempts(),
        session: state.monitor.status(),
        system_status: console.system_status(),
        save_status: console.save_status(),
        last_error: console.last_error(),
        latest: console.latest(),
        history_len: console.history_len(),
        history_capacity: console.history_capacity(),
        progress: console.progress().progress(),
    })
}

pub async fn console_history(State(state): State<Arc<AppState>>) -> Json<Vec<TelemetrySample>> {
    Json(state.console.snapshot())
}

pub async fn channel_series(
    Path(channel): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SeriesView>, ApiError> {
    let channel: Channel = channel.parse().map_err(ApiError::NotFound)?;
    Ok(Json(SeriesView {
        channel,
        points: state.console.series(channel),
    }))
}

pub async fn path_progress(State(state): State<Arc<AppState>>) -> Json<ProgressView> {
    let tracker = state.console.progress();
    Json(ProgressView {
        path_loaded: tracker.path().is_some_and(|p| !p.is_empty()),
        progress: tracker.progress(),
    })
}

pub async fn tool_path(State(state): State<Arc<AppState>>) -> Result<Json<PathView>, ApiError> {
    let path = state
        .console
        .progress()
        .path()
        .ok_or_else(|| ApiError::NotFound("no tool path loaded".to_string()))?;
    Ok(Json(PathView {
        path_points: path.points().to_vec(),
        bounds: path.bounds().into(),
        total_points: path.len(),
        total_distance: path.total_distance(),
    }))
}

/// Proxy the latest camera frame from the backend
pub async fn camera_image(
    Path(camera_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let frame = state.backend.camera_image(&camera_id).await?;
    let content_type = frame
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], frame.bytes).into_response())
}

pub async fn start_recording(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRecordingRequest>>,
) -> Result<Json<SaveReceipt>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    Ok(Json(state.recording.start(request.folder_name).await?))
}

pub async fn stop_recording(State(state): State<Arc<AppState>>) -> Result<Json<SaveReceipt>, ApiError> {
    Ok(Json(state.recording.stop().await?))
}

/// The single record button: stops when saving, starts otherwise
pub async fn toggle_recording(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRecordingRequest>>,
) -> Result<Json<SaveReceipt>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    Ok(Json(state.recording.toggle(request.folder_name).await?))
}

pub async fn reset_session(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    state.recording.reset_session();
    Json(state.monitor.status())
}

/// Append a line to today's in-memory log; only available with memory logs
pub async fn inject_log_line(
    Path(log): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<InjectLogRequest>,
) -> Result<(StatusCode, Json<InjectedLogView>), ApiError> {
    let injector = state
        .log_injector
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("log injection needs in-memory logs".to_string()))?;
    let kind: LogKind = log.parse().map_err(ApiError::NotFound)?;
    let path = injector
        .append(kind, Local::now().date_naive(), &request.line)
        .ok_or_else(|| ApiError::NotFound("no log roots configured".to_string()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(InjectedLogView {
            path: path.display().to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend_api::BackendApi;
    use crate::application::live_console::LiveConsole;
    use crate::application::progress_tracker::ProgressTracker;
    use crate::application::recording_service::RecordingService;
    use crate::application::session_monitor::SessionMonitor;
    use crate::application::test_support::FakeBackend;
    use crate::domain::session::SessionState;
    use crate::domain::toolpath::{MoveType, ToolPath};
    use crate::infrastructure::config::{BackendSettings, TransportSettings};
    use crate::infrastructure::log_source::{LogInjector, LogLayout, MemoryLineSource};
    use crate::infrastructure::realtime_transport::{RealtimeTransport, TransportConfig};
    use std::path::PathBuf;

    fn state_with_logs(in_memory: bool) -> (Arc<AppState>, Arc<FakeBackend>) {
        let fake = Arc::new(FakeBackend::new());
        let backend: Arc<dyn BackendApi> = fake.clone();
        let console = Arc::new(LiveConsole::new(10, 0, Arc::new(ProgressTracker::new())));
        let source = Arc::new(MemoryLineSource::new());
        let layout = LogLayout::new(vec![PathBuf::from("/logs")]);
        let monitor = Arc::new(SessionMonitor::new(source.clone(), layout.clone()));
        let transport = Arc::new(RealtimeTransport::new(TransportConfig::from_settings(
            &BackendSettings::default(),
            &TransportSettings::default(),
        )));
        let recording = RecordingService::new(
            backend.clone(),
            console.clone(),
            monitor.clone(),
            transport.subscribe_state(),
        );
        let state = Arc::new(AppState {
            console,
            recording,
            monitor,
            transport,
            backend,
            log_injector: in_memory.then(|| LogInjector::new(source, layout)),
        });
        (state, fake)
    }

    fn state() -> (Arc<AppState>, Arc<FakeBackend>) {
        state_with_logs(false)
    }

    #[tokio::test]
    async fn test_status_reports_disconnected_idle_console() {
        let (state, _) = state();
        let Json(view) = console_status(State(state)).await;
        assert_eq!(view.connection, ConnectionState::Disconnected);
        assert_eq!(view.session, SessionStatus::idle());
        assert_eq!(view.history_len, 0);
        assert_eq!(view.history_capacity, 10);
        assert!(view.progress.is_none());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let (state, _) = state();
        let err = channel_series(Path("humidity".into()), State(state.clone()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let Json(view) = channel_series(Path("laser_output_power".into()), State(state))
            .await
            .unwrap();
        assert_eq!(view.channel, Channel::LaserOutputPower);
        assert!(view.points.is_empty());
    }

    #[tokio::test]
    async fn test_path_endpoints() {
        let (state, _) = state();
        let err = tool_path(State(state.clone())).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        state.console.progress().set_path(Some(ToolPath::new(vec![
            PathPoint { x: 1.0, y: 2.0, z: 0.0, line_number: 1, move_type: MoveType::Move },
            PathPoint { x: 4.0, y: 6.0, z: 0.5, line_number: 2, move_type: MoveType::Linear },
        ])));
        let Json(view) = tool_path(State(state.clone())).await.unwrap();
        assert_eq!(view.total_points, 2);
        assert_eq!(view.total_distance, 5.0);
        assert_eq!(view.bounds.x_range, 3.0);
        assert_eq!(view.bounds.y_range, 4.0);
        assert_eq!(view.bounds.z_range, 0.5);

        let json = serde_json::to_value(&view.bounds).unwrap();
        assert_eq!(json["x_min"], 1.0);
        assert_eq!(json["y_range"], 4.0);

        let Json(progress) = path_progress(State(state)).await;
        assert!(progress.path_loaded);
        assert!(progress.progress.is_none());
    }

    #[tokio::test]
    async fn test_recording_refused_while_disconnected() {
        let (state, fake) = state();
        let err = start_recording(State(state.clone()), None).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = toggle_recording(State(state), None).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_camera_image_forwards_content_type() {
        let (state, fake) = state();
        let response = camera_image(Path("basler".into()), State(state)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(fake.calls(), vec!["image:basler"]);
    }

    #[tokio::test]
    async fn test_backend_failures_map_to_bad_gateway() {
        let (state, fake) = state();
        fake.set_failing(true);
        let err = camera_image(Path("camera".into()), State(state)).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_injected_trace_line_drives_the_session() {
        let (state, _) = state_with_logs(true);
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let request = InjectLogRequest {
            line: format!("{},NC_CS5Axis,StartNormal,step,10", stamp),
        };

        let (status, Json(view)) = inject_log_line(Path("trace".into()), State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(view.path.contains("Trace_"));

        state.monitor.poll().await;
        assert_eq!(state.monitor.status().state, SessionState::Recording);
    }

    #[tokio::test]
    async fn test_log_injection_unavailable_for_real_logs() {
        let (state, _) = state();
        let request = InjectLogRequest { line: "t,x".into() };
        let err = inject_log_line(Path("trace".into()), State(state), Json(request))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let (state, _) = state_with_logs(true);
        let request = InjectLogRequest { line: "t,x".into() };
        let err = inject_log_line(Path("audit".into()), State(state), Json(request))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_exception_maps_to_conflict() {
        let response = ApiError::from(ConsoleError::ExceptionActive("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
