// Auto-save coordinator - starts and stops backend recordings from session effects
use crate::application::backend_api::BackendApi;
use crate::application::live_console::LiveConsole;
use crate::domain::session::SessionEffect;
use crate::domain::telemetry::SaveStatus;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct AutoSaveCoordinator {
    backend: Arc<dyn BackendApi>,
    console: Arc<LiveConsole>,
    /// Session whose recording this coordinator started
    active: Option<String>,
    /// Set by an exception, cleared by reset
    blocked: bool,
}

impl AutoSaveCoordinator {
    pub fn new(backend: Arc<dyn BackendApi>, console: Arc<LiveConsole>) -> Self {
        Self {
            backend,
            console,
            active: None,
            blocked: false,
        }
    }

    pub async fn handle(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::RecordingStarted { session_id } => {
                if self.blocked {
                    tracing::warn!(%session_id, "auto-save blocked until the exception is reset");
                    return;
                }
                if self.active.is_some() {
                    // A new job started without completion of the previous one
                    self.stop_active().await;
                }
                self.start(session_id).await;
            }
            SessionEffect::RecordingStopped { reason } => {
                tracing::info!(?reason, "session finished");
                self.stop_active().await;
            }
            SessionEffect::ExceptionRaised { message } => {
                tracing::warn!(%message, "exception raised, auto-save halted");
                self.blocked = true;
                self.stop_active().await;
            }
            // The operator owns the recording from here; nothing to stop
            SessionEffect::Reset => {
                self.blocked = false;
                if let Some(session_id) = self.active.take() {
                    tracing::info!(%session_id, "auto-save released by reset");
                }
            }
        }
    }

    pub fn spawn(mut self, mut effects: mpsc::UnboundedReceiver<SessionEffect>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(effect) = effects.recv().await {
                self.handle(effect).await;
            }
            tracing::debug!("session effect channel closed");
        })
    }

    async fn start(&mut self, session_id: String) {
        match self.backend.start_save(&session_id).await {
            Ok(receipt) => {
                tracing::info!(%session_id, save_path = %receipt.save_path, "auto-save started");
                self.console.set_save_status(SaveStatus {
                    is_saving: true,
                    save_path: Some(receipt.save_path),
                    timestamp: receipt.timestamp,
                });
                self.active = Some(session_id);
            }
            Err(e) => self
                .console
                .record_error(format!("Auto-save start failed: {}", e)),
        }
    }

    async fn stop_active(&mut self) {
        let Some(session_id) = self.active.take() else {
            return;
        };
        match self.backend.stop_save().await {
            Ok(receipt) => {
                tracing::info!(%session_id, "auto-save stopped");
                self.console.set_save_status(SaveStatus {
                    is_saving: false,
                    save_path: None,
                    timestamp: receipt.timestamp,
                });
            }
            Err(e) => self
                .console
                .record_error(format!("Auto-save stop failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::progress_tracker::ProgressTracker;
    use crate::application::test_support::FakeBackend;
    use crate::domain::session::StopReason;

    fn setup() -> (AutoSaveCoordinator, Arc<FakeBackend>, Arc<LiveConsole>) {
        let fake = Arc::new(FakeBackend::new());
        let console = Arc::new(LiveConsole::new(10, 0, Arc::new(ProgressTracker::new())));
        let coordinator = AutoSaveCoordinator::new(fake.clone(), console.clone());
        (coordinator, fake, console)
    }

    fn started(id: &str) -> SessionEffect {
        SessionEffect::RecordingStarted {
            session_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_and_complete() {
        let (mut coordinator, fake, console) = setup();

        coordinator.handle(started("session_a")).await;
        assert_eq!(coordinator.active.as_deref(), Some("session_a"));
        assert!(console.is_saving());
        assert_eq!(console.save_status().unwrap().save_path.as_deref(), Some("data/session_a"));

        coordinator
            .handle(SessionEffect::RecordingStopped {
                reason: StopReason::Completed,
            })
            .await;
        assert!(coordinator.active.as_deref().is_none());
        assert!(!console.is_saving());
        assert_eq!(fake.calls(), vec!["start:session_a", "stop"]);
    }

    #[tokio::test]
    async fn test_stop_without_active_recording_is_a_no_op() {
        let (mut coordinator, fake, _) = setup();
        coordinator
            .handle(SessionEffect::RecordingStopped {
                reason: StopReason::Shutdown,
            })
            .await;
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_stops_previous_recording_first() {
        let (mut coordinator, fake, _) = setup();
        coordinator.handle(started("session_a")).await;
        coordinator.handle(started("session_b")).await;
        assert_eq!(fake.calls(), vec!["start:session_a", "stop", "start:session_b"]);
        assert_eq!(coordinator.active.as_deref(), Some("session_b"));
    }

    #[tokio::test]
    async fn test_exception_stops_and_blocks_until_reset() {
        let (mut coordinator, fake, _) = setup();
        coordinator.handle(started("session_a")).await;
        coordinator
            .handle(SessionEffect::ExceptionRaised {
                message: "SocketServer down".into(),
            })
            .await;
        coordinator.handle(started("session_b")).await;
        assert_eq!(fake.calls(), vec!["start:session_a", "stop"]);

        coordinator.handle(SessionEffect::Reset).await;
        coordinator.handle(started("session_c")).await;
        assert_eq!(fake.calls(), vec!["start:session_a", "stop", "start:session_c"]);
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported_not_tracked() {
        let (mut coordinator, fake, console) = setup();
        fake.set_failing(true);
        coordinator.handle(started("session_a")).await;
        assert!(coordinator.active.as_deref().is_none());
        assert!(console.last_error().unwrap().starts_with("Auto-save start failed"));
    }

    #[tokio::test]
    async fn test_spawned_coordinator_drains_channel() {
        let (coordinator, fake, _) = setup();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = coordinator.spawn(rx);
        tx.send(started("session_a")).unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(fake.calls(), vec!["start:session_a"]);
    }
}
