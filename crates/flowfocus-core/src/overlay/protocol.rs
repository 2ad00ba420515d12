//! Messages exchanged with the companion surface.
//!
//! The engine sends [`OverlayMessage`]s as JSON values; the surface decodes
//! them with [`decode_message`], which checks every field's type and range
//! before anything is rendered. The surface answers with [`SurfaceEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::timer::{SessionType, TimerState};

/// Snapshot projected onto the companion surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub seq: u64,
    pub remaining: u64,
    pub is_running: bool,
    pub session_type: SessionType,
}

impl PushPayload {
    /// `is_running` reflects a live countdown; a paused timer pushes false.
    pub fn from_state(seq: u64, state: &TimerState) -> Self {
        Self {
            seq,
            remaining: state.time_remaining,
            is_running: state.is_counting(),
            session_type: state.current_session_type,
        }
    }
}

/// Engine-to-surface messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayMessage {
    Push(PushPayload),
    /// Primary-initiated teardown.
    Close,
}

impl OverlayMessage {
    pub fn to_value(&self) -> Value {
        match self {
            OverlayMessage::Push(p) => serde_json::json!({
                "type": "push",
                "seq": p.seq,
                "remaining": p.remaining,
                "isRunning": p.is_running,
                "sessionType": p.session_type.as_str(),
            }),
            OverlayMessage::Close => serde_json::json!({ "type": "close" }),
        }
    }
}

/// Surface-to-engine messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// The push with this sequence number was applied.
    Ack { seq: u64 },
    /// The user closed the surface.
    Closed,
}

/// Decode and validate one message received by the surface.
///
/// # Errors
/// Rejects anything that is not an object with a known `type`, and pushes
/// whose `remaining` is not a non-negative integer, whose `isRunning` is not
/// a boolean, or whose `sessionType` is not a known session type.
pub fn decode_message(value: &Value) -> Result<OverlayMessage, ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("expected a JSON object".into()))?;
    let kind = obj
        .get("type")
        .ok_or(ValidationError::MissingField("type"))?
        .as_str()
        .ok_or(ValidationError::WrongType {
            field: "type",
            expected: "a string",
        })?;

    match kind {
        "close" => Ok(OverlayMessage::Close),
        "push" => {
            let seq = obj.get("seq").and_then(Value::as_u64).unwrap_or(0);
            let remaining = decode_remaining(obj.get("remaining"))?;

            let is_running = obj
                .get("isRunning")
                .ok_or(ValidationError::MissingField("isRunning"))?
                .as_bool()
                .ok_or(ValidationError::WrongType {
                    field: "isRunning",
                    expected: "a boolean",
                })?;

            let session_type = obj
                .get("sessionType")
                .ok_or(ValidationError::MissingField("sessionType"))?
                .as_str()
                .ok_or(ValidationError::WrongType {
                    field: "sessionType",
                    expected: "a string",
                })
                .and_then(SessionType::parse)?;

            Ok(OverlayMessage::Push(PushPayload {
                seq,
                remaining,
                is_running,
                session_type,
            }))
        }
        other => Err(ValidationError::Malformed(format!("unknown message type '{other}'"))),
    }
}

fn decode_remaining(value: Option<&Value>) -> Result<u64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField("remaining"))?;
    let number = match value {
        Value::Number(n) => n,
        _ => {
            return Err(ValidationError::WrongType {
                field: "remaining",
                expected: "a number",
            })
        }
    };
    if let Some(secs) = number.as_u64() {
        return Ok(secs);
    }
    Err(ValidationError::OutOfRange {
        field: "remaining",
        value: number.to_string(),
    })
}
