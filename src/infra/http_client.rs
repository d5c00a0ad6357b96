//! reqwest-backed [`ResourceClient`].

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use crate::application::resource::ResourceClient;
use crate::config::BackendSettings;
use crate::domain::error::TransportError;

use super::error::InfraError;

/// Issues `GET {base_url}{request_id}` and decodes the JSON body.
#[derive(Clone, Debug)]
pub struct HttpResourceClient {
    client: Client,
    base: Url,
}

impl HttpResourceClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, InfraError> {
        let base = Url::parse(base_url)
            .and_then(|url| url.join("/"))
            .map_err(|err| InfraError::configuration(format!("invalid base URL `{base_url}`: {err}")))?;
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn from_settings(settings: &BackendSettings) -> Result<Self, InfraError> {
        Self::new(settings.base_url.as_str(), &settings.user_agent)
    }

    pub fn user_agent() -> &'static str {
        concat!("querydeck/", env!("CARGO_PKG_VERSION"))
    }

    /// Resolve a request id (a path with optional query string, or an absolute
    /// URL) against the base URL.
    pub fn url(&self, request_id: &str) -> Result<Url, TransportError> {
        self.base.join(request_id).map_err(|err| {
            TransportError::new(format!("invalid request id `{request_id}`: {err}"))
        })
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn fetch_resource(&self, request_id: &str) -> Result<Value, TransportError> {
        let url = self.url(request_id)?;
        debug!(op = "http::fetch_resource", %url, "Fetching resource");

        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| TransportError::new(format!("request to {request_id} failed: {err}")))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|err| {
            TransportError::new(format!("failed to read body from {request_id}: {err}"))
                .with_status(status.as_u16())
        })?;

        if !status.is_success() {
            let mut error = TransportError::new(format!("{request_id} responded with {status}"))
                .with_status(status.as_u16());
            if let Some(body) = error_body(&bytes) {
                error = error.with_response_body(body);
            }
            return Err(error);
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            TransportError::new(format!("failed to decode body from {request_id}: {err}"))
        })
    }
}

/// Raw payload of a failed response: JSON when it parses, text otherwise.
fn error_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}
