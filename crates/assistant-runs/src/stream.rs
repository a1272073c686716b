//! Wires a streamed response body through the SSE decoder, the event
//! classifier and the snapshot accumulator.
use std::collections::VecDeque;

use futures::stream;
use futures::{StreamExt as _, TryStreamExt as _};
use tracing::debug;

use crate::errors::ClientError;
use crate::events::{AssistantEvent, classify};
use crate::snapshot::RunSnapshot;
use crate::sse::{SseDecoder, SseRecord};
use crate::transport::ByteStream;

/// Returned by stream consumers to keep reading or stop early.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamControl {
    #[default]
    Continue,
    /// Stops processing and drops the connection.
    Stop,
}

/// Decodes a response body into typed events.
///
/// Records that classify to nothing are skipped. A trailing record without a
/// terminating blank line is flushed when the body ends.
pub fn event_stream(
    body: ByteStream,
) -> impl futures::Stream<Item = Result<AssistantEvent, ClientError>> + Send {
    struct State {
        body: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<Result<AssistantEvent, ClientError>>,
        done: bool,
    }

    // Events decoded ahead of a malformed record are still delivered first.
    fn enqueue(
        pending: &mut VecDeque<Result<AssistantEvent, ClientError>>,
        records: Vec<SseRecord>,
    ) {
        for record in records {
            match classify(&record) {
                Ok(Some(event)) => pending.push_back(Ok(event)),
                Ok(None) => {}
                Err(e) => {
                    pending.push_back(Err(e));
                    return;
                }
            }
        }
    }

    stream::try_unfold(
        State {
            body,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(next) = state.pending.pop_front() {
                    return next.map(|event| Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        let records = state.decoder.feed(&chunk);
                        enqueue(&mut state.pending, records);
                    }
                    Some(Err(e)) => return Err(ClientError::Transport(e)),
                    None => {
                        state.done = true;
                        let records = state.decoder.finalize();
                        enqueue(&mut state.pending, records);
                    }
                }
            }
        },
    )
}

/// Drains `body` into a snapshot, offering every event to `on_event` before
/// it is ingested.
///
/// When `on_event` returns `StreamControl::Stop` the event is still ingested
/// and the body is dropped without reading further.
pub async fn collect_snapshot<F>(
    body: ByteStream,
    mut on_event: F,
) -> Result<RunSnapshot, ClientError>
where
    F: FnMut(&AssistantEvent) -> StreamControl,
{
    let mut snapshot = RunSnapshot::new();
    let events = event_stream(body);
    futures::pin_mut!(events);
    while let Some(event) = events.try_next().await? {
        let control = on_event(&event);
        debug!(event = "stream.event", name = event.name());
        snapshot.ingest(event);
        if control == StreamControl::Stop {
            debug!(event = "stream.stopped", events = snapshot.events().len());
            break;
        }
    }
    Ok(snapshot)
}
