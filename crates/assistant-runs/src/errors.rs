use std::fmt;
use std::time::Duration;

use crate::transport::Method;

/// Errors raised by an `HttpTransport` before a response is available, or
/// while reading a streamed body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read.
    #[error("request failed ({method} {path}): {message}")]
    Request {
        method: Method,
        path: String,
        message: String,
    },
    /// The request exceeded the transport timeout.
    #[error("request timed out ({method} {path}): {message}")]
    Timeout {
        method: Method,
        path: String,
        message: String,
    },
    /// Reading a chunk from a streamed body failed.
    #[error("stream read failed: {message}")]
    Stream { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(method: Method, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            method,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(method: Method, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            method,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a stream read error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Request { message, .. }
            | Self::Timeout { message, .. }
            | Self::Stream { message } => message,
        }
    }
}

/// Top-level error type for client, streaming and run lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Caller misuse: missing thread id, empty tool outputs, empty ids.
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport failure, propagated unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The API answered with a non-success status.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// A payload could not be decoded into the expected shape.
    #[error("decode error ({context}): {message}")]
    Decode { context: String, message: String },
    /// The operation observed an abort request.
    #[error("cancelled")]
    Cancelled,
    /// The operation exceeded its caller-supplied deadline.
    #[error("timed out after {timeout:?}")]
    TimedOut { timeout: Duration },
}

impl ClientError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn decode(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::Decode {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Returns the HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub(crate) fn require_id(name: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::validation(format!("{name} must not be empty")));
    }
    Ok(())
}
