// Classification of inbound stream frames
use crate::domain::stream_event::StreamEvent;
use crate::domain::telemetry::{SaveStatus, SystemStatus, TelemetrySample};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// What an inbound text frame turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(StreamEvent),
    /// Backend keep-alive; consumed by the transport
    Ping,
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0} message carries no data")]
    MissingData(&'static str),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

pub fn classify(text: &str) -> Result<Inbound, MessageError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let event = match envelope.kind.as_str() {
        "sensor_data" => StreamEvent::SensorData(payload::<TelemetrySample>("sensor_data", envelope.data)?),
        "status_update" => StreamEvent::StatusUpdate(payload::<SystemStatus>("status_update", envelope.data)?),
        "save_status" => StreamEvent::SaveStatus(payload::<SaveStatus>("save_status", envelope.data)?),
        "connection" => {
            let connected = envelope
                .data
                .as_ref()
                .and_then(|d| d.get("connected"))
                .and_then(Value::as_bool)
                .unwrap_or(true);
            StreamEvent::Connection {
                connected,
                message: envelope.message,
            }
        }
        "error" => {
            let message = envelope
                .message
                .or_else(|| envelope.data.as_ref().and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "backend reported an unspecified error".to_string());
            StreamEvent::Error(message)
        }
        "ping" => return Ok(Inbound::Ping),
        other => return Ok(Inbound::Unknown(other.to_string())),
    };

    Ok(Inbound::Event(event))
}

fn payload<T: DeserializeOwned>(kind: &'static str, data: Option<Value>) -> Result<T, MessageError> {
    let data = data.ok_or(MessageError::MissingData(kind))?;
    Ok(serde_json::from_value(data)?)
}
