//! Wire grammar for frames exchanged with the control server.
//!
//! The link layer only checks the shell of an inbound frame (exactly one of
//! `data`/`error` present) before forwarding the raw text on the bus;
//! collaborators use [`parse`] to interpret it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reasons an inbound frame is rejected
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame carries neither a `data` nor an `error` member
    #[error("Frame carries neither data nor error")]
    Empty,

    /// The frame carries both a `data` and an `error` member
    #[error("Frame carries both data and error")]
    Ambiguous,
}

/// Envelope shell with the payloads left opaque
#[derive(Debug, Deserialize)]
struct Shell {
    data: Option<Value>,
    error: Option<Value>,
}

/// Gate applied by the link layer before a frame reaches the bus. Accepts any
/// JSON object with exactly one of `data`/`error`; payload contents are not
/// inspected here.
pub fn screen(raw: &str) -> Result<(), FrameError> {
    let shell: Shell = serde_json::from_str(raw)?;
    match (&shell.data, &shell.error) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (None, None) => Err(FrameError::Empty),
        (Some(_), Some(_)) => Err(FrameError::Ambiguous),
    }
}

/// A command sent by the control server. Names outside the known set parse
/// as [`Command::Unknown`] so new server-side commands never disturb the link.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum Command {
    Status,
    LedStatus,
    Lighton,
    Lightoff,
    Restart,
    #[serde(other)]
    Unknown,
}

/// Error reported by the control server inside an envelope
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerError {
    pub message: String,
    pub code: i64,
}

/// A fully-typed inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    Error(ServerError),
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    data: Option<Command>,
    error: Option<ServerError>,
}

/// Parses a screened frame into its typed form
pub fn parse(raw: &str) -> Result<Inbound, FrameError> {
    let frame: RawInbound = serde_json::from_str(raw)?;
    match (frame.data, frame.error) {
        (Some(command), None) => Ok(Inbound::Command(command)),
        (None, Some(error)) => Ok(Inbound::Error(error)),
        (None, None) => Err(FrameError::Empty),
        (Some(_), Some(_)) => Err(FrameError::Ambiguous),
    }
}

/// Payload of an outbound envelope, tagged by name on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name", content = "data", rename_all = "camelCase")]
pub enum Payload {
    Status(Value),
    LedStatus(bool),
}

/// An outbound envelope, ready for the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    pub data: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

impl Outbound {
    /// A status report. The server caches these for dashboard reads.
    pub fn status(payload: Value) -> Self {
        Self {
            data: Payload::Status(payload),
            cache: Some(true),
        }
    }

    /// The current LED state
    pub fn led_status(on: bool) -> Self {
        Self {
            data: Payload::LedStatus(on),
            cache: None,
        }
    }
}
