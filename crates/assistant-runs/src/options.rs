use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::ToolOutput;
use crate::transport::{HttpHeaders, HttpRequest, Method};

/// Body of a create-run request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCreateRequest {
    pub assistant_id: String,
    /// Extra fields to include in run step payloads, sent as a query parameter.
    #[serde(skip)]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_messages: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation_strategy: Option<serde_json::Value>,
    /// Set by the streaming helpers; leave unset otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl RunCreateRequest {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            ..Self::default()
        }
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.include.push(field.into());
        self
    }

    /// Overrides the assistant's model for this run.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Replaces the assistant's instructions for this run.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Appends to the assistant's instructions for this run.
    pub fn additional_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = Some(instructions.into());
        self
    }

    pub fn additional_message(mut self, message: serde_json::Value) -> Self {
        self.additional_messages.push(message);
        self
    }

    pub fn tool(mut self, tool: serde_json::Value) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_prompt_tokens(mut self, tokens: u32) -> Self {
        self.max_prompt_tokens = Some(tokens);
        self
    }

    pub fn max_completion_tokens(mut self, tokens: u32) -> Self {
        self.max_completion_tokens = Some(tokens);
        self
    }

    pub fn tool_choice(mut self, choice: serde_json::Value) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = Some(enabled);
        self
    }

    pub fn response_format(mut self, format: serde_json::Value) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn truncation_strategy(mut self, strategy: serde_json::Value) -> Self {
        self.truncation_strategy = Some(strategy);
        self
    }
}

/// Tool outputs for a run waiting in `requires_action`.
///
/// `thread_id` addresses the run and is not part of the request body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitToolOutputsRequest {
    #[serde(skip)]
    pub thread_id: Option<String>,
    pub tool_outputs: Vec<ToolOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl SubmitToolOutputsRequest {
    pub fn new(tool_outputs: Vec<ToolOutput>) -> Self {
        Self {
            tool_outputs,
            ..Self::default()
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

/// Per-call request overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Extra headers; they replace client defaults with the same name.
    pub headers: HttpHeaders,
    /// Sent as `Idempotency-Key` on POST requests.
    pub idempotency_key: Option<String>,
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying a freshly generated idempotency key.
    pub fn idempotent() -> Self {
        Self::new().idempotency_key(uuid::Uuid::new_v4().to_string())
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn apply(&self, request: &mut HttpRequest) {
        for (name, value) in self.headers.iter() {
            request.headers.insert(name, value);
        }
        if let Some(key) = &self.idempotency_key
            && request.method == Method::Post
        {
            request.headers.insert("idempotency-key", key.clone());
        }
        if self.timeout.is_some() {
            request.timeout = self.timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_omits_unset_fields() {
        let body = serde_json::to_value(
            RunCreateRequest::new("asst_1")
                .instructions("be brief")
                .metadata("source", "test"),
        )
        .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "assistant_id": "asst_1",
                "instructions": "be brief",
                "metadata": {"source": "test"}
            })
        );
    }

    #[test]
    fn submit_request_keeps_thread_id_out_of_body() {
        let body = serde_json::to_value(
            SubmitToolOutputsRequest::new(vec![ToolOutput::new("call_1", "42")]).thread_id("t1"),
        )
        .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({"tool_outputs": [{"tool_call_id": "call_1", "output": "42"}]})
        );
    }

    #[test]
    fn idempotent_options_generate_distinct_keys() {
        let a = RequestOptions::idempotent();
        let b = RequestOptions::idempotent();
        assert!(a.idempotency_key.is_some());
        assert_ne!(a.idempotency_key, b.idempotency_key);
    }

    #[test]
    fn apply_sets_headers_and_timeout() {
        let mut request = HttpRequest::post("/threads/t1/runs", serde_json::json!({}));
        RequestOptions::new()
            .header("X-Trace", "abc")
            .idempotency_key("key-1")
            .timeout(Duration::from_secs(3))
            .apply(&mut request);
        assert_eq!(request.headers.get("x-trace"), Some("abc"));
        assert_eq!(request.headers.get("Idempotency-Key"), Some("key-1"));
        assert_eq!(request.timeout, Some(Duration::from_secs(3)));

        let mut request = HttpRequest::get("/threads/t1/runs/r1");
        RequestOptions::new()
            .idempotency_key("key-1")
            .apply(&mut request);
        assert!(!request.headers.contains("idempotency-key"));
    }
}
