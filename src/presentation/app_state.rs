// Application state for HTTP handlers
use crate::application::backend_api::BackendApi;
use crate::application::live_console::LiveConsole;
use crate::application::recording_service::RecordingService;
use crate::application::session_monitor::SessionMonitor;
use crate::infrastructure::log_source::LogInjector;
use crate::infrastructure::realtime_transport::RealtimeTransport;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub console: Arc<LiveConsole>,
    pub recording: RecordingService,
    pub monitor: Arc<SessionMonitor>,
    pub transport: Arc<RealtimeTransport>,
    pub backend: Arc<dyn BackendApi>,
    /// Present only when the session logs live in memory
    pub log_injector: Option<LogInjector>,
}
