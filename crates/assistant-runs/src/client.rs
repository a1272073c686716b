use std::sync::Arc;

use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::runs::Runs;
use crate::transport::{
    HttpHeaders, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, StreamingResponse,
};

const BETA_HEADER: &str = "openai-beta";
const BETA_VALUE: &str = "assistants=v2";

struct ClientInner {
    transport: Arc<dyn HttpTransport>,
    default_headers: HttpHeaders,
}

/// Entry point for the runs API.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Starts a builder for configuring the transport and default headers.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Creates a reqwest-backed client from environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }

    /// Run lifecycle operations.
    pub fn runs(&self) -> Runs {
        Runs::new(self.clone())
    }

    pub(crate) async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let request = self.prepare(request);
        let method = request.method;
        let path = request.path.clone();
        let response = self.inner.transport.send(request).await?;
        if !response.is_success() {
            let message = api_error_message(&response.body);
            debug!(event = "http.api_error", method = %method, path = %path, status = response.status, message = %message);
            return Err(ClientError::Api {
                status: response.status,
                message,
            });
        }
        Ok(response)
    }

    pub(crate) async fn execute_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, ClientError> {
        let request = self.prepare(request);
        let method = request.method;
        let path = request.path.clone();
        let mut response = self.inner.transport.send_streaming(request).await?;
        if !response.is_success() {
            let mut body = Vec::new();
            while let Some(chunk) = response.body.next().await {
                match chunk {
                    Ok(chunk) => body.extend_from_slice(&chunk),
                    Err(_) => break,
                }
            }
            let message = api_error_message(&body);
            debug!(event = "http.api_error", method = %method, path = %path, status = response.status, message = %message);
            return Err(ClientError::Api {
                status: response.status,
                message,
            });
        }
        Ok(response)
    }

    fn prepare(&self, mut request: HttpRequest) -> HttpRequest {
        for (name, value) in self.inner.default_headers.iter() {
            if !request.headers.contains(name) {
                request.headers.insert(name, value);
            }
        }
        request
    }
}

/// Builder used to configure a `Client`.
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    headers: HttpHeaders,
}

impl ClientBuilder {
    /// Sets the connection config used to build the default transport.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses a custom transport instead of the reqwest default.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds a header sent on every request unless overridden per call.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Builds the client. Needs either a config or a transport.
    pub fn build(self) -> Result<Client, ClientError> {
        let transport: Arc<dyn HttpTransport> = match (self.transport, &self.config) {
            (Some(transport), _) => transport,
            (None, Some(config)) => Arc::new(ReqwestTransport::new(config)?),
            (None, None) => {
                return Err(ClientError::Config(
                    "client needs a config or a transport".into(),
                ));
            }
        };
        let mut default_headers = self.headers;
        if !default_headers.contains(BETA_HEADER) {
            default_headers.insert(BETA_HEADER, BETA_VALUE);
        }
        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                default_headers,
            }),
        })
    }
}

/// Uses `error.message` from a JSON error body, else the raw body.
fn api_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body)
        && let Some(message) = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(serde_json::Value::as_str)
    {
        return message.to_string();
    }
    String::from_utf8_lossy(body).trim().to_string()
}
