//! Message and run-step payloads carried by stream events, plus the delta
//! shapes used while they are still being generated.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{RunLastError, Usage, null_as_default};

/// Message on a thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub incomplete_at: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ThreadMessage {
    /// Concatenates all text parts in order and ignores non-text parts.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let MessageContent::Text { text } = part {
                out.push_str(&text.value);
            }
        }
        out
    }
}

/// One content part of a message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: TextContent,
    },
    ImageFile {
        image_file: ImageFile,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    Refusal {
        #[serde(default)]
        refusal: String,
    },
    /// Content kind this client does not model, or a slot not filled yet.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub value: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Payload of `thread.message.delta`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaEvent {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default)]
    pub delta: MessageDelta,
}

impl MessageDeltaEvent {
    /// Text fragments carried by this delta, in content order.
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> {
        self.delta
            .content
            .iter()
            .filter_map(|part| part.text.as_ref())
            .filter_map(|text| text.value.as_deref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<MessageContentDelta>,
}

/// Partial content part, addressed by `index` within the message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContentDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextDelta>,
    #[serde(default)]
    pub image_file: Option<ImageFile>,
    #[serde(default)]
    pub image_url: Option<ImageUrl>,
    #[serde(default)]
    pub refusal: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextDelta {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: Vec<serde_json::Value>,
}

/// Step taken while executing a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub run_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assistant_id: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub step_details: StepDetails,
    #[serde(default)]
    pub last_error: Option<RunLastError>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDetails {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message_creation: Option<MessageCreation>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<StepToolCall>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreation {
    #[serde(default)]
    pub message_id: String,
}

/// Tool call recorded on a run step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub function: Option<FunctionToolCall>,
    #[serde(default)]
    pub code_interpreter: Option<serde_json::Value>,
    #[serde(default)]
    pub file_search: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub output: Option<String>,
}

/// Payload of `thread.run.step.delta`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStepDeltaEvent {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default)]
    pub delta: RunStepDelta,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStepDelta {
    #[serde(default)]
    pub step_details: Option<StepDetailsDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDetailsDelta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message_creation: Option<MessageCreationDelta>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreationDelta {
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Partial tool call, addressed by `index` within the step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionToolCallDelta>,
    #[serde(default)]
    pub code_interpreter: Option<serde_json::Value>,
    #[serde(default)]
    pub file_search: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionToolCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_concatenates_text_parts_only() {
        let message: ThreadMessage = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "role": "assistant",
            "content": [
                {"type": "text", "text": {"value": "hello", "annotations": []}},
                {"type": "image_file", "image_file": {"file_id": "file_1"}},
                {"type": "text", "text": {"value": " world"}},
                {"type": "hologram", "payload": 1}
            ]
        }))
        .expect("message");
        assert_eq!(message.text(), "hello world");
        assert_eq!(message.content[3], MessageContent::Unknown);
    }

    #[test]
    fn message_delta_exposes_text_fragments() {
        let delta: MessageDeltaEvent = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "object": "thread.message.delta",
            "delta": {"content": [
                {"index": 0, "type": "text", "text": {"value": "Hi"}},
                {"index": 1, "type": "image_file", "image_file": {"file_id": "f"}},
                {"index": 0, "type": "text", "text": {"value": " there"}}
            ]}
        }))
        .expect("delta");
        assert_eq!(delta.text_fragments().collect::<String>(), "Hi there");
    }

    #[test]
    fn run_step_delta_reads_tool_call_fragments() {
        let delta: RunStepDeltaEvent = serde_json::from_value(serde_json::json!({
            "id": "step_1",
            "object": "thread.run.step.delta",
            "delta": {"step_details": {"type": "tool_calls", "tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                 "function": {"name": "lookup", "arguments": "{", "output": null}}
            ]}}
        }))
        .expect("delta");
        let details = delta.delta.step_details.expect("details");
        assert_eq!(details.kind, "tool_calls");
        let call = &details.tool_calls[0];
        assert_eq!(call.id.as_deref(), Some("call_1"));
        assert_eq!(
            call.function.as_ref().and_then(|f| f.arguments.as_deref()),
            Some("{")
        );
    }
}
