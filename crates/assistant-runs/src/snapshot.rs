//! Folds a stream of assistant events into the state of the run it describes.
use std::collections::HashMap;

use tracing::debug;

use crate::content::{
    FunctionToolCall, MessageContent, MessageContentDelta, MessageDeltaEvent, RunStep,
    RunStepDeltaEvent, StepToolCall, TextContent, ThreadMessage, ToolCallDelta,
};
use crate::events::{AssistantEvent, StreamErrorData};
use crate::model::{Run, Thread};

/// How far past the current end a delta index may point before the part is
/// dropped.
const MAX_INDEX_GAP: usize = 64;

/// Accumulated view of one assistant stream.
///
/// Every event is recorded in arrival order. Run events replace the current
/// run; message delta text is appended per message id.
#[derive(Clone, Debug, Default)]
pub struct RunSnapshot {
    events: Vec<AssistantEvent>,
    thread: Option<Thread>,
    run: Option<Run>,
    texts: HashMap<String, String>,
    text_order: Vec<String>,
    messages: Vec<ThreadMessage>,
    message_slots: HashMap<String, usize>,
    steps: Vec<RunStep>,
    step_slots: HashMap<String, usize>,
}

impl RunSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event.
    pub fn ingest(&mut self, event: AssistantEvent) {
        match &event {
            AssistantEvent::Thread { thread, .. } => {
                self.thread = Some(thread.clone());
            }
            AssistantEvent::Run { run, .. } => {
                self.run = Some(run.clone());
            }
            AssistantEvent::RunStep { step, .. } => {
                let slot = self.step_slot(&step.id);
                self.steps[slot] = step.clone();
            }
            AssistantEvent::RunStepDelta { delta, .. } => self.apply_step_delta(delta),
            AssistantEvent::Message { message, .. } => {
                let slot = self.message_slot(&message.id);
                self.messages[slot] = message.clone();
            }
            AssistantEvent::MessageDelta { delta, .. } => self.apply_message_delta(delta),
            AssistantEvent::Error { error, .. } => {
                debug!(
                    event = "stream.error_event",
                    message = %error.message,
                    code = ?error.code,
                    "assistant stream reported an error"
                );
            }
        }
        self.events.push(event);
    }

    /// Latest run seen, if any.
    pub fn final_run(&self) -> Option<&Run> {
        self.run.as_ref()
    }

    pub fn into_run(self) -> Option<Run> {
        self.run
    }

    /// Latest thread seen, if any.
    pub fn latest_thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    /// Text accumulated from message deltas for `message_id`.
    pub fn message_text(&self, message_id: &str) -> Option<&str> {
        self.texts.get(message_id).map(String::as_str)
    }

    /// `(message_id, text)` pairs in the order messages were first seen.
    pub fn message_texts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.text_order.iter().filter_map(|id| {
            self.texts
                .get(id)
                .map(|text| (id.as_str(), text.as_str()))
        })
    }

    /// Message snapshots with delta content merged in, in first-seen order.
    pub fn final_messages(&self) -> &[ThreadMessage] {
        &self.messages
    }

    /// Run step snapshots with tool-call deltas merged in, in first-seen order.
    pub fn final_run_steps(&self) -> &[RunStep] {
        &self.steps
    }

    /// Every ingested event in arrival order.
    pub fn events(&self) -> &[AssistantEvent] {
        &self.events
    }

    /// Payloads of `error` events in arrival order.
    pub fn errors(&self) -> impl Iterator<Item = &StreamErrorData> {
        self.events.iter().filter_map(|event| match event {
            AssistantEvent::Error { error, .. } => Some(error),
            _ => None,
        })
    }

    fn message_slot(&mut self, id: &str) -> usize {
        if let Some(slot) = self.message_slots.get(id) {
            return *slot;
        }
        let slot = self.messages.len();
        self.messages.push(ThreadMessage {
            id: id.to_string(),
            ..ThreadMessage::default()
        });
        self.message_slots.insert(id.to_string(), slot);
        slot
    }

    fn step_slot(&mut self, id: &str) -> usize {
        if let Some(slot) = self.step_slots.get(id) {
            return *slot;
        }
        let slot = self.steps.len();
        self.steps.push(RunStep {
            id: id.to_string(),
            ..RunStep::default()
        });
        self.step_slots.insert(id.to_string(), slot);
        slot
    }

    fn apply_message_delta(&mut self, delta: &MessageDeltaEvent) {
        if !self.texts.contains_key(&delta.id) {
            self.text_order.push(delta.id.clone());
        }
        let text = self.texts.entry(delta.id.clone()).or_default();
        for fragment in delta.text_fragments() {
            text.push_str(fragment);
        }

        let slot = self.message_slot(&delta.id);
        let message = &mut self.messages[slot];
        if let Some(role) = &delta.delta.role {
            message.role = role.clone();
        }
        for part in &delta.delta.content {
            merge_content_part(&mut message.content, part);
        }
    }

    fn apply_step_delta(&mut self, delta: &RunStepDeltaEvent) {
        let slot = self.step_slot(&delta.id);
        let Some(details) = &delta.delta.step_details else {
            return;
        };
        let step = &mut self.steps[slot];
        if !details.kind.is_empty() {
            step.step_details.kind = details.kind.clone();
        }
        if let Some(creation) = &details.message_creation
            && let Some(message_id) = &creation.message_id
        {
            step.step_details
                .message_creation
                .get_or_insert_with(Default::default)
                .message_id = message_id.clone();
        }
        for call in &details.tool_calls {
            merge_tool_call(&mut step.step_details.tool_calls, call);
        }
    }
}

/// Grows `items` so `index` is addressable. Returns false for indexes too far
/// past the current end.
fn ensure_slot<T>(items: &mut Vec<T>, index: usize, fill: impl FnMut() -> T) -> bool {
    let Some(needed) = index.checked_add(1) else {
        return false;
    };
    if needed > items.len().saturating_add(MAX_INDEX_GAP) {
        return false;
    }
    if items.len() < needed {
        items.resize_with(needed, fill);
    }
    true
}

fn merge_content_part(content: &mut Vec<MessageContent>, part: &MessageContentDelta) {
    if !ensure_slot(content, part.index, || MessageContent::Unknown) {
        debug!(event = "stream.delta_index_skipped", index = part.index, len = content.len());
        return;
    }
    let slot = &mut content[part.index];

    if let Some(text) = &part.text {
        match slot {
            MessageContent::Text { text: existing } => {
                if let Some(value) = &text.value {
                    existing.value.push_str(value);
                }
                existing.annotations.extend(text.annotations.iter().cloned());
            }
            _ => {
                *slot = MessageContent::Text {
                    text: TextContent {
                        value: text.value.clone().unwrap_or_default(),
                        annotations: text.annotations.clone(),
                    },
                };
            }
        }
    } else if let Some(image_file) = &part.image_file {
        *slot = MessageContent::ImageFile {
            image_file: image_file.clone(),
        };
    } else if let Some(image_url) = &part.image_url {
        *slot = MessageContent::ImageUrl {
            image_url: image_url.clone(),
        };
    } else if let Some(refusal) = &part.refusal {
        match slot {
            MessageContent::Refusal { refusal: existing } => existing.push_str(refusal),
            _ => {
                *slot = MessageContent::Refusal {
                    refusal: refusal.clone(),
                }
            }
        }
    }
}

fn merge_tool_call(calls: &mut Vec<StepToolCall>, delta: &ToolCallDelta) {
    if !ensure_slot(calls, delta.index, StepToolCall::default) {
        debug!(event = "stream.delta_index_skipped", index = delta.index, len = calls.len());
        return;
    }
    let call = &mut calls[delta.index];
    if let Some(id) = &delta.id {
        call.id = id.clone();
    }
    if let Some(kind) = &delta.kind {
        call.kind = kind.clone();
    }
    if let Some(function) = &delta.function {
        let target = call.function.get_or_insert_with(FunctionToolCall::default);
        if let Some(name) = &function.name {
            target.name.push_str(name);
        }
        if let Some(arguments) = &function.arguments {
            target.arguments.push_str(arguments);
        }
        if function.output.is_some() {
            target.output = function.output.clone();
        }
    }
    if delta.code_interpreter.is_some() {
        call.code_interpreter = delta.code_interpreter.clone();
    }
    if delta.file_search.is_some() {
        call.file_search = delta.file_search.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::classify;
    use crate::model::RunStatus;
    use crate::sse::parse_sse;

    fn ingest_payload(payload: &str) -> RunSnapshot {
        let mut snapshot = RunSnapshot::new();
        for record in parse_sse(payload.as_bytes()) {
            if let Some(event) = classify(&record).expect("classify") {
                snapshot.ingest(event);
            }
        }
        snapshot
    }

    const CONVERSATION: &str = concat!(
        "event: thread.run.created\n",
        "data: {\"id\":\"r1\",\"status\":\"queued\",\"thread_id\":\"t1\"}\n\n",
        "event: thread.message.delta\n",
        "data: {\"id\":\"m1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Hi\"}}]}}\n\n",
        "event: thread.message.delta\n",
        "data: {\"id\":\"m1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\" there\"}}]}}\n\n",
        "event: thread.run.completed\n",
        "data: {\"id\":\"r1\",\"status\":\"completed\",\"thread_id\":\"t1\"}\n\n",
    );

    #[test]
    fn accumulates_run_and_message_text() {
        let snapshot = ingest_payload(CONVERSATION);
        let run = snapshot.final_run().expect("run");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(snapshot.message_text("m1"), Some("Hi there"));
        assert_eq!(snapshot.message_text("m2"), None);
        assert_eq!(snapshot.events().len(), 4);
        assert_eq!(snapshot.final_messages()[0].text(), "Hi there");
    }

    #[test]
    fn later_run_event_wins_even_if_status_regresses() {
        let snapshot = ingest_payload(concat!(
            "event: thread.run.completed\n",
            "data: {\"id\":\"r1\",\"status\":\"completed\"}\n\n",
            "event: thread.run.in_progress\n",
            "data: {\"id\":\"r1\",\"status\":\"in_progress\"}\n\n",
        ));
        assert_eq!(
            snapshot.into_run().map(|run| run.status),
            Some(RunStatus::InProgress)
        );
    }

    #[test]
    fn message_texts_follow_first_seen_order() {
        let snapshot = ingest_payload(concat!(
            "event: thread.message.delta\n",
            "data: {\"id\":\"b\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"1\"}}]}}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"a\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"2\"}}]}}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"b\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"3\"}}]}}\n\n",
        ));
        let texts: Vec<_> = snapshot.message_texts().collect();
        assert_eq!(texts, vec![("b", "13"), ("a", "2")]);
        assert!(snapshot.final_run().is_none());
    }

    #[test]
    fn completed_message_replaces_delta_snapshot_but_keeps_text_buffer() {
        let snapshot = ingest_payload(concat!(
            "event: thread.message.delta\n",
            "data: {\"id\":\"m1\",\"delta\":{\"role\":\"assistant\",\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"draft\"}}]}}\n\n",
            "event: thread.message.completed\n",
            "data: {\"id\":\"m1\",\"role\":\"assistant\",\"status\":\"completed\",\"content\":[{\"type\":\"text\",\"text\":{\"value\":\"final\"}}]}\n\n",
        ));
        assert_eq!(snapshot.final_messages().len(), 1);
        assert_eq!(snapshot.final_messages()[0].text(), "final");
        assert_eq!(snapshot.final_messages()[0].status, "completed");
        assert_eq!(snapshot.message_text("m1"), Some("draft"));
    }

    #[test]
    fn tool_call_arguments_are_merged_by_index() {
        let snapshot = ingest_payload(concat!(
            "event: thread.run.step.created\n",
            "data: {\"id\":\"s1\",\"type\":\"tool_calls\",\"status\":\"in_progress\",\"step_details\":{\"type\":\"tool_calls\",\"tool_calls\":[]}}\n\n",
            "event: thread.run.step.delta\n",
            "data: {\"id\":\"s1\",\"delta\":{\"step_details\":{\"type\":\"tool_calls\",\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"lookup\",\"arguments\":\"{\\\"q\\\":\"}}]}}}\n\n",
            "event: thread.run.step.delta\n",
            "data: {\"id\":\"s1\",\"delta\":{\"step_details\":{\"type\":\"tool_calls\",\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"1}\"}}]}}}\n\n",
        ));
        let steps = snapshot.final_run_steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, "in_progress");
        let call = &steps[0].step_details.tool_calls[0];
        assert_eq!(call.id, "call_1");
        let function = call.function.as_ref().expect("function");
        assert_eq!(function.name, "lookup");
        assert_eq!(function.arguments, "{\"q\":1}");
    }

    #[test]
    fn records_thread_and_error_events() {
        let snapshot = ingest_payload(concat!(
            "event: thread.created\n",
            "data: {\"id\":\"t1\",\"created_at\":1}\n\n",
            "event: error\n",
            "data: {\"message\":\"boom\"}\n\n",
        ));
        assert_eq!(snapshot.latest_thread().map(|t| t.id.as_str()), Some("t1"));
        let errors: Vec<_> = snapshot.errors().map(|e| e.message.as_str()).collect();
        assert_eq!(errors, vec!["boom"]);
        assert!(snapshot.final_run().is_none());
        assert_eq!(snapshot.message_texts().count(), 0);
    }

    #[test]
    fn out_of_range_delta_indexes_are_skipped() {
        let snapshot = ingest_payload(concat!(
            "event: thread.message.delta\n",
            "data: {\"id\":\"m1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"ok\"}}]}}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"m1\",\"delta\":{\"content\":[{\"index\":18446744073709551615,\"type\":\"text\",\"text\":{\"value\":\"!\"}}]}}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"m1\",\"delta\":{\"content\":[{\"index\":4000000000,\"type\":\"text\",\"text\":{\"value\":\"?\"}}]}}\n\n",
            "event: thread.run.step.delta\n",
            "data: {\"id\":\"s1\",\"delta\":{\"step_details\":{\"type\":\"tool_calls\",\"tool_calls\":[{\"index\":18446744073709551615,\"id\":\"call_x\",\"type\":\"function\"}]}}}\n\n",
            "event: thread.run.step.delta\n",
            "data: {\"id\":\"s1\",\"delta\":{\"step_details\":{\"type\":\"tool_calls\",\"tool_calls\":[{\"index\":1,\"id\":\"call_2\",\"type\":\"function\"}]}}}\n\n",
        ));
        let message = &snapshot.final_messages()[0];
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.text(), "ok");

        let calls = &snapshot.final_run_steps()[0].step_details.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].id, "call_2");
    }
}
