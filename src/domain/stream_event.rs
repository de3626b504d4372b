// Events fanned out by the realtime transport
use crate::domain::telemetry::{SaveStatus, SystemStatus, TelemetrySample};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Discriminant used to register subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SensorData,
    StatusUpdate,
    SaveStatus,
    Connection,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    SensorData(TelemetrySample),
    StatusUpdate(SystemStatus),
    SaveStatus(SaveStatus),
    Connection {
        connected: bool,
        message: Option<String>,
    },
    Error(String),
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::SensorData(_) => EventKind::SensorData,
            StreamEvent::StatusUpdate(_) => EventKind::StatusUpdate,
            StreamEvent::SaveStatus(_) => EventKind::SaveStatus,
            StreamEvent::Connection { .. } => EventKind::Connection,
            StreamEvent::Error(_) => EventKind::Error,
        }
    }
}
