//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AssistantEvent, Client, ClientConfig, ClientError, PollOptions, RequestOptions,
    RequiredAction, Run, RunCreateRequest, RunSnapshot, RunStatus, StreamControl,
    SubmitToolOutputsRequest, ToolOutput,
};
