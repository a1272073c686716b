use futures::TryStreamExt as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::{
    ByteStream, HttpHeaders, HttpRequest, HttpResponse, HttpTransport, Method, StreamingResponse,
};
use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};

/// Default transport backed by `reqwest`.
///
/// Injects bearer auth plus the optional organization and project headers on
/// every request.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {e}")))?;

        let mut default_headers = HeaderMap::new();
        insert_config_header(
            &mut default_headers,
            "authorization",
            &format!("Bearer {}", config.api_key),
        )?;
        if let Some(organization) = &config.organization {
            insert_config_header(&mut default_headers, "openai-organization", organization)?;
        }
        if let Some(project) = &config.project {
            insert_config_header(&mut default_headers, "openai-project", project)?;
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_headers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<reqwest::Response, TransportError> {
        let HttpRequest {
            method,
            path,
            headers,
            body,
            timeout,
        } = request;
        let url = self.url(&path);
        debug!(event = "http.request_attempt", method = %method, path = %path);

        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .headers(self.default_headers.clone());
        for (name, value) in headers.iter() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::request(method, &path, format!("bad header: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::request(method, &path, format!("bad header: {e}")))?;
            builder = builder.header(name, value);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder.send().await.map_err(|e| map_reqwest_error(method, &path, e))
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = convert_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(method, &path, e))?;
        debug!(event = "http.response", method = %method, path = %path, status);
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = convert_headers(response.headers());
        debug!(event = "http.stream_opened", method = %method, path = %path, status);
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| TransportError::stream(e.to_string())),
        );
        Ok(StreamingResponse {
            status,
            headers,
            body,
        })
    }
}

fn insert_config_header(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<(), ClientError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| ClientError::Config(format!("invalid value for {name} header: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

fn convert_headers(headers: &HeaderMap) -> HttpHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str(), value.to_string()))
        })
        .collect()
}

fn map_reqwest_error(method: Method, path: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(method, path, err.to_string())
    } else {
        TransportError::request(method, path, err.to_string())
    }
}
