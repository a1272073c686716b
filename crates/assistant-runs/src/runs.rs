//! Run lifecycle operations: plain resource calls, polling helpers, tool
//! output resolution and streaming variants.
use tracing::{debug, info};

use crate::client::Client;
use crate::errors::{ClientError, require_id};
use crate::events::AssistantEvent;
use crate::model::{RequiredAction, Run, RunStatus, ToolOutput};
use crate::options::{RequestOptions, RunCreateRequest, SubmitToolOutputsRequest};
use crate::poll::{PollGuard, PollOptions, poll_delay};
use crate::snapshot::RunSnapshot;
use crate::stream::{StreamControl, collect_snapshot};
use crate::transport::{HttpHeaders, HttpRequest};

/// Produces tool outputs for a run waiting in `requires_action`.
///
/// Implemented for any `FnMut(&Run, &RequiredAction) -> Vec<ToolOutput>`.
pub trait ToolOutputGenerator: Send {
    fn generate(&mut self, run: &Run, action: &RequiredAction) -> Vec<ToolOutput>;
}

impl<F> ToolOutputGenerator for F
where
    F: FnMut(&Run, &RequiredAction) -> Vec<ToolOutput> + Send,
{
    fn generate(&mut self, run: &Run, action: &RequiredAction) -> Vec<ToolOutput> {
        self(run, action)
    }
}

/// Run operations bound to a client and a set of per-call request options.
#[derive(Clone)]
pub struct Runs {
    client: Client,
    options: RequestOptions,
}

impl Runs {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            options: RequestOptions::default(),
        }
    }

    /// Applies `options` to every request made through the returned value.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates a run on `thread_id`.
    pub async fn create(
        &self,
        thread_id: &str,
        request: &RunCreateRequest,
    ) -> Result<Run, ClientError> {
        Ok(self.create_inner(thread_id, request).await?.0)
    }

    pub async fn retrieve(&self, thread_id: &str, run_id: &str) -> Result<Run, ClientError> {
        Ok(self.retrieve_inner(thread_id, run_id).await?.0)
    }

    pub async fn cancel(&self, thread_id: &str, run_id: &str) -> Result<Run, ClientError> {
        require_id("thread_id", thread_id)?;
        require_id("run_id", run_id)?;
        let request = HttpRequest::post(
            format!("{}/cancel", run_path(thread_id, run_id)),
            serde_json::json!({}),
        );
        Ok(self.send_run(request).await?.0)
    }

    /// Submits outputs for the pending tool calls of a run.
    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run, ClientError> {
        let request = SubmitToolOutputsRequest::new(outputs);
        Ok(self.submit_inner(thread_id, run_id, &request).await?.0)
    }

    /// Like `submit_tool_outputs`, addressing the thread through
    /// `request.thread_id`.
    pub async fn submit_tool_outputs_request(
        &self,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
    ) -> Result<Run, ClientError> {
        let thread_id = request_thread_id(request)?;
        Ok(self.submit_inner(thread_id, run_id, request).await?.0)
    }

    /// Retrieves the run until it is terminal or requires action.
    ///
    /// Between retrievals waits for the server's poll-after hint, or
    /// `options.interval` without one.
    pub async fn poll(
        &self,
        thread_id: &str,
        run_id: &str,
        options: &PollOptions,
    ) -> Result<Run, ClientError> {
        let guard = options.guard();
        self.poll_with(&guard, thread_id, run_id).await
    }

    /// Creates a run and polls it until it is terminal or requires action.
    pub async fn create_and_run_poll(
        &self,
        thread_id: &str,
        request: &RunCreateRequest,
        options: &PollOptions,
    ) -> Result<Run, ClientError> {
        let guard = options.guard();
        self.create_and_poll_with(&guard, thread_id, request).await
    }

    /// Submits tool outputs and polls until the run is terminal or requires
    /// action again.
    pub async fn submit_tool_outputs_and_poll(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
        options: &PollOptions,
    ) -> Result<Run, ClientError> {
        let guard = options.guard();
        let request = SubmitToolOutputsRequest::new(outputs);
        self.submit_and_poll_with(&guard, thread_id, run_id, &request)
            .await
    }

    pub async fn submit_tool_outputs_request_and_poll(
        &self,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
        options: &PollOptions,
    ) -> Result<Run, ClientError> {
        let thread_id = request_thread_id(request)?;
        let guard = options.guard();
        self.submit_and_poll_with(&guard, thread_id, run_id, request)
            .await
    }

    /// Answers `requires_action` with outputs from `generator` until the run
    /// reaches any other status.
    ///
    /// The deadline in `options` covers every round trip.
    pub async fn resolve_required_action<G>(
        &self,
        run: Run,
        mut generator: G,
        options: &PollOptions,
    ) -> Result<Run, ClientError>
    where
        G: ToolOutputGenerator,
    {
        let guard = options.guard();
        self.resolve_with(&guard, run, &mut generator).await
    }

    /// Creates a run, polls it and resolves every required action with
    /// `generator`.
    pub async fn create_and_run_auto<G>(
        &self,
        thread_id: &str,
        request: &RunCreateRequest,
        mut generator: G,
        options: &PollOptions,
    ) -> Result<Run, ClientError>
    where
        G: ToolOutputGenerator,
    {
        let guard = options.guard();
        let run = self.create_and_poll_with(&guard, thread_id, request).await?;
        self.resolve_with(&guard, run, &mut generator).await
    }

    /// Creates a run in streaming mode, offering each event to `on_event`.
    pub async fn create_stream<F>(
        &self,
        thread_id: &str,
        request: &RunCreateRequest,
        on_event: F,
    ) -> Result<RunSnapshot, ClientError>
    where
        F: FnMut(&AssistantEvent) -> StreamControl,
    {
        require_id("thread_id", thread_id)?;
        let mut request = request.clone();
        request.stream = Some(true);
        let http = HttpRequest::post(create_path(thread_id, &request), encode(&request)?);
        self.stream_into_snapshot(http, on_event).await
    }

    /// Creates a run in streaming mode and returns the accumulated snapshot.
    pub async fn create_stream_snapshot(
        &self,
        thread_id: &str,
        request: &RunCreateRequest,
    ) -> Result<RunSnapshot, ClientError> {
        self.create_stream(thread_id, request, |_| StreamControl::Continue)
            .await
    }

    /// Submits tool outputs in streaming mode, offering each event to
    /// `on_event`.
    pub async fn submit_tool_outputs_stream<F>(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
        on_event: F,
    ) -> Result<RunSnapshot, ClientError>
    where
        F: FnMut(&AssistantEvent) -> StreamControl,
    {
        let request = SubmitToolOutputsRequest::new(outputs);
        self.submit_stream_inner(thread_id, run_id, &request, on_event)
            .await
    }

    pub async fn submit_tool_outputs_stream_snapshot(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunSnapshot, ClientError> {
        self.submit_tool_outputs_stream(thread_id, run_id, outputs, |_| StreamControl::Continue)
            .await
    }

    pub async fn submit_tool_outputs_request_stream_snapshot(
        &self,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
    ) -> Result<RunSnapshot, ClientError> {
        let thread_id = request_thread_id(request)?;
        self.submit_stream_inner(thread_id, run_id, request, |_| StreamControl::Continue)
            .await
    }

    async fn poll_with(
        &self,
        guard: &PollGuard<'_>,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Run, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(event = "run.poll_attempt", thread_id, run_id, attempt);
            let (run, headers) = guard.run(self.retrieve_inner(thread_id, run_id)).await?;
            if run.status.ends_polling() {
                info!(
                    event = "run.poll_finished",
                    run_id = %run.id,
                    status = %run.status,
                    attempts = attempt
                );
                return Ok(run);
            }
            let delay = poll_delay(&headers, guard.interval());
            debug!(event = "run.poll_wait", run_id, status = %run.status, delay = ?delay);
            guard.sleep(delay).await?;
        }
    }

    async fn create_and_poll_with(
        &self,
        guard: &PollGuard<'_>,
        thread_id: &str,
        request: &RunCreateRequest,
    ) -> Result<Run, ClientError> {
        let (run, _) = guard.run(self.create_inner(thread_id, request)).await?;
        info!(event = "run.created", run_id = %run.id, status = %run.status);
        if run.status.ends_polling() {
            return Ok(run);
        }
        self.poll_with(guard, thread_id, &run.id).await
    }

    async fn submit_and_poll_with(
        &self,
        guard: &PollGuard<'_>,
        thread_id: &str,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
    ) -> Result<Run, ClientError> {
        let (run, _) = guard
            .run(self.submit_inner(thread_id, run_id, request))
            .await?;
        info!(
            event = "run.tool_outputs_submitted",
            run_id,
            outputs = request.tool_outputs.len(),
            status = %run.status
        );
        if run.status.ends_polling() {
            return Ok(run);
        }
        self.poll_with(guard, thread_id, run_id).await
    }

    async fn resolve_with<G>(
        &self,
        guard: &PollGuard<'_>,
        mut run: Run,
        generator: &mut G,
    ) -> Result<Run, ClientError>
    where
        G: ToolOutputGenerator,
    {
        while run.status == RunStatus::RequiresAction {
            let Some(action) = run.required_action.clone() else {
                return Err(ClientError::decode(
                    "run",
                    format!("run {} requires action but has no required_action", run.id),
                ));
            };
            require_id("thread_id", &run.thread_id)?;
            let outputs = generator.generate(&run, &action);
            if outputs.is_empty() {
                return Err(ClientError::validation(format!(
                    "tool output generator returned no outputs for run {}",
                    run.id
                )));
            }
            debug!(
                event = "run.tool_outputs_generated",
                run_id = %run.id,
                requested = action.tool_calls().len(),
                produced = outputs.len()
            );
            let request = SubmitToolOutputsRequest::new(outputs);
            let (thread_id, run_id) = (run.thread_id.clone(), run.id.clone());
            run = self
                .submit_and_poll_with(guard, &thread_id, &run_id, &request)
                .await?;
        }
        Ok(run)
    }

    async fn create_inner(
        &self,
        thread_id: &str,
        request: &RunCreateRequest,
    ) -> Result<(Run, HttpHeaders), ClientError> {
        require_id("thread_id", thread_id)?;
        let mut request = request.clone();
        request.stream = None;
        let http = HttpRequest::post(create_path(thread_id, &request), encode(&request)?);
        self.send_run(http).await
    }

    async fn retrieve_inner(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<(Run, HttpHeaders), ClientError> {
        require_id("thread_id", thread_id)?;
        require_id("run_id", run_id)?;
        self.send_run(HttpRequest::get(run_path(thread_id, run_id)))
            .await
    }

    async fn submit_inner(
        &self,
        thread_id: &str,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
    ) -> Result<(Run, HttpHeaders), ClientError> {
        require_id("thread_id", thread_id)?;
        require_id("run_id", run_id)?;
        let mut request = request.clone();
        request.stream = None;
        let http = HttpRequest::post(submit_path(thread_id, run_id), encode(&request)?);
        self.send_run(http).await
    }

    async fn submit_stream_inner<F>(
        &self,
        thread_id: &str,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
        on_event: F,
    ) -> Result<RunSnapshot, ClientError>
    where
        F: FnMut(&AssistantEvent) -> StreamControl,
    {
        require_id("thread_id", thread_id)?;
        require_id("run_id", run_id)?;
        let mut request = request.clone();
        request.stream = Some(true);
        let http = HttpRequest::post(submit_path(thread_id, run_id), encode(&request)?);
        self.stream_into_snapshot(http, on_event).await
    }

    async fn send_run(&self, mut request: HttpRequest) -> Result<(Run, HttpHeaders), ClientError> {
        self.options.apply(&mut request);
        let response = self.client.execute(request).await?;
        let run: Run = response.json("run")?;
        Ok((run, response.headers))
    }

    async fn stream_into_snapshot<F>(
        &self,
        mut request: HttpRequest,
        on_event: F,
    ) -> Result<RunSnapshot, ClientError>
    where
        F: FnMut(&AssistantEvent) -> StreamControl,
    {
        request.headers.insert("accept", "text/event-stream");
        self.options.apply(&mut request);
        let path = request.path.clone();
        let response = self.client.execute_streaming(request).await?;
        let snapshot = collect_snapshot(response.body, on_event).await?;
        info!(
            event = "run.stream_finished",
            path = %path,
            events = snapshot.events().len(),
            status = snapshot.final_run().map(|run| run.status.as_str()).unwrap_or("none")
        );
        Ok(snapshot)
    }
}

fn runs_path(thread_id: &str) -> String {
    format!("/threads/{thread_id}/runs")
}

fn run_path(thread_id: &str, run_id: &str) -> String {
    format!("{}/{run_id}", runs_path(thread_id))
}

fn submit_path(thread_id: &str, run_id: &str) -> String {
    format!("{}/submit_tool_outputs", run_path(thread_id, run_id))
}

fn create_path(thread_id: &str, request: &RunCreateRequest) -> String {
    let path = runs_path(thread_id);
    if request.include.is_empty() {
        path
    } else {
        format!("{path}?include={}", request.include.join(","))
    }
}

fn request_thread_id(request: &SubmitToolOutputsRequest) -> Result<&str, ClientError> {
    match request.thread_id.as_deref() {
        Some(thread_id) if !thread_id.trim().is_empty() => Ok(thread_id),
        _ => Err(ClientError::validation(
            "SubmitToolOutputsRequest.thread_id must be set",
        )),
    }
}

fn encode<T: serde::Serialize>(body: &T) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(body)
        .map_err(|e| ClientError::validation(format!("request body is not encodable: {e}")))
}
