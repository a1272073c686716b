//! Typed assistant stream events and the classifier that produces them from
//! decoded SSE records.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{MessageDeltaEvent, RunStep, RunStepDeltaEvent, ThreadMessage};
use crate::errors::ClientError;
use crate::model::{Run, Thread};
use crate::sse::SseRecord;

/// Payload of an `error` stream event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamErrorData {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Closed set of events emitted by an assistant run stream.
///
/// Every variant keeps the original event name (for example
/// `thread.run.completed`).
#[derive(Clone, Debug, PartialEq)]
pub enum AssistantEvent {
    Thread {
        event: String,
        thread: Thread,
        /// `enabled` flag some thread events carry next to the thread fields.
        enabled: Option<bool>,
    },
    Run {
        event: String,
        run: Run,
    },
    RunStep {
        event: String,
        step: RunStep,
    },
    RunStepDelta {
        event: String,
        delta: RunStepDeltaEvent,
    },
    Message {
        event: String,
        message: ThreadMessage,
    },
    MessageDelta {
        event: String,
        delta: MessageDeltaEvent,
    },
    Error {
        event: String,
        error: StreamErrorData,
    },
}

impl AssistantEvent {
    /// Returns the SSE event name this event was decoded from.
    pub fn name(&self) -> &str {
        match self {
            Self::Thread { event, .. }
            | Self::Run { event, .. }
            | Self::RunStep { event, .. }
            | Self::RunStepDelta { event, .. }
            | Self::Message { event, .. }
            | Self::MessageDelta { event, .. }
            | Self::Error { event, .. } => event,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EventKind {
    Error,
    RunStepDelta,
    RunStep,
    Run,
    MessageDelta,
    Message,
    Thread,
}

// Order matters: more specific prefixes of the same family come first.
fn kind_for(name: &str) -> Option<EventKind> {
    if name == "error" {
        Some(EventKind::Error)
    } else if name.starts_with("thread.run.step.delta") {
        Some(EventKind::RunStepDelta)
    } else if name.starts_with("thread.run.step") {
        Some(EventKind::RunStep)
    } else if name.starts_with("thread.run.") {
        Some(EventKind::Run)
    } else if name.starts_with("thread.message.delta") {
        Some(EventKind::MessageDelta)
    } else if name.starts_with("thread.message.") {
        Some(EventKind::Message)
    } else if name.starts_with("thread.") {
        Some(EventKind::Thread)
    } else {
        None
    }
}

/// Maps one decoded record to a typed event.
///
/// Returns `Ok(None)` for records without an event name or data, and for
/// event names this client does not recognize. A recognized name whose data
/// is not valid JSON of the expected shape is a `ClientError::Decode`.
pub fn classify(record: &SseRecord) -> Result<Option<AssistantEvent>, ClientError> {
    let Some(name) = record.event.as_deref() else {
        return Ok(None);
    };
    if record.data.is_empty() {
        return Ok(None);
    }
    let Some(kind) = kind_for(name) else {
        debug!(event_name = name, "ignoring unrecognized assistant stream event");
        return Ok(None);
    };

    let payload: serde_json::Value =
        serde_json::from_str(&record.data).map_err(|e| ClientError::decode(name, e))?;
    let event = name.to_string();
    let classified = match kind {
        EventKind::Error => AssistantEvent::Error {
            error: from_payload(name, payload)?,
            event,
        },
        EventKind::RunStepDelta => AssistantEvent::RunStepDelta {
            delta: from_payload(name, payload)?,
            event,
        },
        EventKind::RunStep => AssistantEvent::RunStep {
            step: from_payload(name, payload)?,
            event,
        },
        EventKind::Run => AssistantEvent::Run {
            run: from_payload(name, payload)?,
            event,
        },
        EventKind::MessageDelta => AssistantEvent::MessageDelta {
            delta: from_payload(name, payload)?,
            event,
        },
        EventKind::Message => AssistantEvent::Message {
            message: from_payload(name, payload)?,
            event,
        },
        EventKind::Thread => {
            let enabled = payload.get("enabled").and_then(serde_json::Value::as_bool);
            AssistantEvent::Thread {
                thread: from_payload(name, payload)?,
                enabled,
                event,
            }
        }
    };
    Ok(Some(classified))
}

fn from_payload<T: DeserializeOwned>(
    name: &str,
    payload: serde_json::Value,
) -> Result<T, ClientError> {
    serde_json::from_value(payload).map_err(|e| ClientError::decode(name, e))
}
