// Session lifecycle inference from vendor trace/exception log lines
//
// Everything here is pure: the monitor feeds it lines, it answers with the
// next status and what the rest of the console should do about it.
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const START_MARKER: &str = "NC_CS5Axis,StartNormal";
pub const START_STEP_MARKER: &str = "step,10";
pub const COMPLETION_MARKER: &str = "NC_CS5AXIS,IsRunning,False";
pub const SHUTDOWN_MARKER: &str = "UnInit Completed";
pub const SOCKET_SERVER_MARKER: &str = "SocketServer";
pub const EXCEPTION_MARKER: &str = "Exception";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Exception,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Exception => "exception",
        };
        f.write_str(name)
    }
}

/// Which of the two vendor logs a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Trace,
    Exception,
}

impl LogKind {
    pub fn name(self) -> &'static str {
        match self {
            LogKind::Trace => "trace",
            LogKind::Exception => "exception",
        }
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [LogKind::Trace, LogKind::Exception]
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown log: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub last_trace_time: Option<String>,
    pub error: Option<String>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            last_trace_time: None,
            error: None,
        }
    }

    pub fn has_exception(&self) -> bool {
        self.state == SessionState::Exception
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// One `timestamp,message` record. The message is everything after the first
/// comma, since vendor messages contain commas themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: String,
    pub message: String,
}

impl LogLine {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let (timestamp, message) = raw.split_once(',').unwrap_or((raw, ""));
        Some(Self {
            timestamp: timestamp.trim().to_string(),
            message: message.trim().to_string(),
        })
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    RecordingStarted { session_id: String },
    RecordingStopped { reason: StopReason },
    ExceptionRaised { message: String },
    /// Operator forced the session back to Idle
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub next: SessionStatus,
    pub effect: Option<SessionEffect>,
}

/// Derive a session id from a trace timestamp, e.g.
/// `2025-03-01 10:00:00.125` becomes `session_2025-03-01 10-00-00-125`.
pub fn session_id_for(timestamp: &str) -> String {
    format!("session_{}", timestamp.replace([':', '.'], "-"))
}

/// Apply one genuinely new log line to the current status.
///
/// Returns `None` when the line changes nothing. In Exception only a new
/// start line or [`reset`] moves the state on.
pub fn apply(status: &SessionStatus, kind: LogKind, line: &LogLine) -> Option<Transition> {
    match kind {
        LogKind::Trace => apply_trace(status, line),
        LogKind::Exception => apply_exception(status, line),
    }
}

/// A start line begins a fresh session from any state, Exception included.
/// Completion and shutdown only end a running recording.
fn apply_trace(status: &SessionStatus, line: &LogLine) -> Option<Transition> {
    let message = line.message.as_str();
    if message.contains(START_MARKER) && message.contains(START_STEP_MARKER) {
        let session_id = session_id_for(&line.timestamp);
        return Some(Transition {
            from: status.state,
            next: SessionStatus {
                state: SessionState::Recording,
                session_id: Some(session_id.clone()),
                last_trace_time: Some(line.timestamp.clone()),
                error: None,
            },
            effect: Some(SessionEffect::RecordingStarted { session_id }),
        });
    }

    let reason = if message.contains(COMPLETION_MARKER) {
        StopReason::Completed
    } else if message.contains(SHUTDOWN_MARKER) {
        StopReason::Shutdown
    } else {
        return None;
    };

    if status.state != SessionState::Recording {
        return None;
    }

    Some(Transition {
        from: status.state,
        next: SessionStatus {
            state: SessionState::Idle,
            session_id: None,
            last_trace_time: None,
            error: None,
        },
        effect: Some(SessionEffect::RecordingStopped { reason }),
    })
}

fn apply_exception(status: &SessionStatus, line: &LogLine) -> Option<Transition> {
    let message = line.message.as_str();
    if !message.contains(SOCKET_SERVER_MARKER) && !message.contains(EXCEPTION_MARKER) {
        return None;
    }

    let surfaced = format!("Exception raised: {}", message);
    if status.has_exception() && status.error.as_deref() == Some(surfaced.as_str()) {
        return None;
    }

    Some(Transition {
        from: status.state,
        next: SessionStatus {
            state: SessionState::Exception,
            session_id: None,
            last_trace_time: status.last_trace_time.clone(),
            error: Some(surfaced.clone()),
        },
        effect: Some(SessionEffect::ExceptionRaised { message: surfaced }),
    })
}

/// Operator reset: back to Idle from anywhere, all flags cleared
pub fn reset() -> SessionStatus {
    SessionStatus::idle()
}
