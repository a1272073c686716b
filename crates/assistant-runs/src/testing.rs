//! In-memory transport that replays scripted responses and records requests.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::errors::TransportError;
use crate::transport::{
    ByteStream, HttpHeaders, HttpRequest, HttpResponse, HttpTransport, StreamingResponse,
};

enum Scripted {
    Response(HttpResponse),
    Stream {
        status: u16,
        chunks: Vec<Result<Bytes, TransportError>>,
        hold_open: bool,
    },
    Error(TransportError),
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, item: Scripted) {
        self.script.lock().expect("script lock").push_back(item);
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_json_with_headers(status, &[], body);
    }

    pub fn push_json_with_headers(
        &self,
        status: u16,
        headers: &[(&str, &str)],
        body: serde_json::Value,
    ) {
        self.push(Scripted::Response(HttpResponse {
            status,
            headers: headers.iter().copied().collect(),
            body: Bytes::from(body.to_string()),
        }));
    }

    pub fn push_error(&self, error: TransportError) {
        self.push(Scripted::Error(error));
    }

    /// Successful stream that ends after `chunks`.
    pub fn push_stream(&self, chunks: Vec<Vec<u8>>) {
        self.push_stream_status(200, chunks);
    }

    pub fn push_stream_status(&self, status: u16, chunks: Vec<Vec<u8>>) {
        self.push(Scripted::Stream {
            status,
            chunks: chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect(),
            hold_open: false,
        });
    }

    /// Successful stream that stays open forever after `chunks`.
    pub fn push_open_stream(&self, chunks: Vec<Vec<u8>>) {
        self.push(Scripted::Stream {
            status: 200,
            chunks: chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect(),
            hold_open: true,
        });
    }

    /// Stream yielding `chunks` and then a read error.
    pub fn push_broken_stream(&self, chunks: Vec<Vec<u8>>, error: TransportError) {
        let mut items: Vec<_> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        items.push(Err(error));
        self.push(Scripted::Stream {
            status: 200,
            chunks: items,
            hold_open: false,
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    fn next(&self, request: HttpRequest) -> Result<Scripted, TransportError> {
        let method = request.method;
        let path = request.path.clone();
        self.requests.lock().expect("requests lock").push(request);
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .ok_or_else(|| TransportError::request(method, path, "no scripted response left"))
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let path = request.path.clone();
        match self.next(request)? {
            Scripted::Response(response) => Ok(response),
            Scripted::Error(error) => Err(error),
            Scripted::Stream { .. } => Err(TransportError::request(
                method,
                path,
                "scripted stream used for buffered request",
            )),
        }
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        match self.next(request)? {
            Scripted::Stream {
                status,
                chunks,
                hold_open,
            } => {
                let items = futures::stream::iter(chunks);
                let body: ByteStream = if hold_open {
                    Box::pin(futures::StreamExt::chain(items, futures::stream::pending()))
                } else {
                    Box::pin(items)
                };
                Ok(StreamingResponse {
                    status,
                    headers: HttpHeaders::new(),
                    body,
                })
            }
            Scripted::Response(response) => Ok(StreamingResponse {
                status: response.status,
                headers: response.headers,
                body: Box::pin(futures::stream::iter([Ok::<_, TransportError>(response.body)])),
            }),
            Scripted::Error(error) => Err(error),
        }
    }
}

/// Renders `(event, data)` pairs as an SSE payload.
pub(crate) fn sse_payload(events: &[(&str, serde_json::Value)]) -> Vec<u8> {
    let mut out = String::new();
    for (event, data) in events {
        out.push_str(&format!("event: {event}\ndata: {data}\n\n"));
    }
    out.into_bytes()
}

pub(crate) fn run_json(id: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "object": "thread.run",
        "thread_id": "thread_1",
        "assistant_id": "asst_1",
        "status": status,
    })
}

pub(crate) fn requires_action_json(id: &str, calls: &[(&str, &str)]) -> serde_json::Value {
    let tool_calls: Vec<_> = calls
        .iter()
        .map(|(call_id, name)| {
            serde_json::json!({
                "id": call_id,
                "type": "function",
                "function": {"name": name, "arguments": "{}"}
            })
        })
        .collect();
    let mut run = run_json(id, "requires_action");
    run["required_action"] = serde_json::json!({
        "type": "submit_tool_outputs",
        "submit_tool_outputs": {"tool_calls": tool_calls}
    });
    run
}
