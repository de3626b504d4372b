// Session monitor - polls the vendor logs and drives the session state machine
use crate::application::line_source::LineSource;
use crate::domain::session::{self, LogKind, LogLine, SessionEffect, SessionStatus, Transition};
use crate::infrastructure::log_source::LogLayout;
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;

pub struct SessionMonitor {
    source: Arc<dyn LineSource>,
    layout: LogLayout,
    status: watch::Sender<SessionStatus>,
    /// Last line acted upon, per log file
    seen: Mutex<HashMap<PathBuf, String>>,
    effects: Option<mpsc::UnboundedSender<SessionEffect>>,
}

impl SessionMonitor {
    pub fn new(source: Arc<dyn LineSource>, layout: LogLayout) -> Self {
        let (status, _) = watch::channel(SessionStatus::idle());
        Self {
            source,
            layout,
            status,
            seen: Mutex::new(HashMap::new()),
            effects: None,
        }
    }

    /// Forward transition side effects to `effects`
    pub fn with_effects(mut self, effects: mpsc::UnboundedSender<SessionEffect>) -> Self {
        self.effects = Some(effects);
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Poll both logs once, for today's files
    pub async fn poll(&self) -> Vec<Transition> {
        self.poll_for(Local::now().date_naive()).await
    }

    /// Poll both logs once. The trace log is evaluated first so an exception
    /// seen in the same round always wins.
    pub async fn poll_for(&self, date: NaiveDate) -> Vec<Transition> {
        let mut seen = self.seen.lock().await;
        let mut transitions = Vec::new();

        for kind in [LogKind::Trace, LogKind::Exception] {
            let Some((path, raw)) = self.read_latest(kind, date).await else {
                continue;
            };
            if seen.get(&path) == Some(&raw) {
                continue;
            }
            seen.insert(path, raw.clone());

            let Some(line) = LogLine::parse(&raw) else {
                continue;
            };
            let current = self.status();
            let Some(transition) = session::apply(&current, kind, &line) else {
                tracing::trace!(log = kind.name(), message = %line.message, "log line without transition");
                continue;
            };

            tracing::info!(
                log = kind.name(),
                from = %transition.from,
                to = %transition.next.state,
                session_id = transition.next.session_id.as_deref().unwrap_or("-"),
                "session transition"
            );
            self.status.send_replace(transition.next.clone());
            if let Some(effect) = &transition.effect {
                self.emit(effect.clone());
            }
            transitions.push(transition);
        }

        transitions
    }

    /// Operator reset: Idle, no session, no exception, whatever the state.
    /// Lines already seen stay seen, so a stale exception does not come back.
    pub fn reset(&self) {
        let previous = self.status.send_replace(session::reset());
        tracing::info!(from = %previous.state, "session reset");
        self.emit(SessionEffect::Reset);
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(ticker);
            while ticks.next().await.is_some() {
                self.poll().await;
            }
        })
    }

    fn emit(&self, effect: SessionEffect) {
        if let Some(effects) = &self.effects {
            if effects.send(effect).is_err() {
                tracing::debug!("session effect dropped, no consumer");
            }
        }
    }

    /// First candidate that yields a line. Unreadable candidates are skipped
    /// quietly; missing files are routine, anything else is worth a debug line.
    async fn read_latest(&self, kind: LogKind, date: NaiveDate) -> Option<(PathBuf, String)> {
        for path in self.layout.candidates(kind, date) {
            match self.source.read_last_line(&path).await {
                Ok(Some(line)) => return Some((path, line)),
                Ok(None) => tracing::trace!(log = kind.name(), path = %path.display(), "log is empty"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::trace!(log = kind.name(), path = %path.display(), "log not found")
                }
                Err(e) => {
                    tracing::debug!(log = kind.name(), path = %path.display(), error = %e, "log unreadable")
                }
            }
        }
        None
    }
}
