//! Client core for assistant runs: an incremental SSE decoder, a typed event
//! classifier, a snapshot accumulator and run lifecycle helpers that poll and
//! resolve tool calls.
//!
//! # Polling with tool outputs
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use assistant_runs::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = Client::from_env()?;
//! let run = client
//!     .runs()
//!     .create_and_run_auto(
//!         "thread_abc",
//!         &RunCreateRequest::new("asst_abc"),
//!         |_run: &Run, action: &RequiredAction| {
//!             action
//!                 .tool_calls()
//!                 .iter()
//!                 .map(|call| ToolOutput::new(&call.id, "{\"ok\":true}"))
//!                 .collect::<Vec<_>>()
//!         },
//!         &PollOptions::new(Duration::from_secs(300)),
//!     )
//!     .await?;
//! println!("run finished with status {}", run.status);
//! # Ok(())
//! # }
//! ```
//!
//! # Streaming
//!
//! ```no_run
//! use assistant_runs::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = Client::from_env()?;
//! let snapshot = client
//!     .runs()
//!     .create_stream_snapshot("thread_abc", &RunCreateRequest::new("asst_abc"))
//!     .await?;
//! for (message_id, text) in snapshot.message_texts() {
//!     println!("{message_id}: {text}");
//! }
//! # Ok(())
//! # }
//! ```

/// Client entry point and builder.
pub mod client;
/// Connection settings.
pub mod config;
/// Message and run step payloads.
pub mod content;
/// Public error types.
pub mod errors;
/// Typed stream events and the classifier.
pub mod events;
/// Run, thread and tool output models.
pub mod model;
/// Tracing subscriber setup.
pub mod observability;
/// Request bodies and per-call options.
pub mod options;
/// Deadlines, abort handles and poll-after hints.
pub mod poll;
/// Common imports for typical usage.
pub mod prelude;
/// Run lifecycle operations.
pub mod runs;
/// Stream event accumulation.
pub mod snapshot;
/// Incremental SSE decoding.
pub mod sse;
/// Event pipeline over a streamed body.
pub mod stream;
/// HTTP transport contract and the reqwest implementation.
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use content::{MessageDeltaEvent, RunStep, RunStepDeltaEvent, ThreadMessage};
pub use errors::{ClientError, TransportError};
pub use events::{AssistantEvent, StreamErrorData, classify};
pub use model::{RequiredAction, RequiredToolCall, Run, RunStatus, Thread, ToolOutput};
pub use observability::init_observability;
pub use options::{RequestOptions, RunCreateRequest, SubmitToolOutputsRequest};
pub use poll::{AbortHandle, AbortSignal, PollOptions};
pub use runs::{Runs, ToolOutputGenerator};
pub use snapshot::RunSnapshot;
pub use sse::{SseDecoder, SseRecord, parse_sse};
pub use stream::{StreamControl, collect_snapshot, event_stream};
pub use transport::{HttpTransport, ReqwestTransport};
