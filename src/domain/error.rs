use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure to obtain a resource: transport, HTTP status, or an undecodable or
/// rejected body.
///
/// This is also the error shape published in a failed query's state.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            response_body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_response_body(mut self, body: Value) -> Self {
        self.response_body = Some(body);
        self
    }

    /// A value the caller's validator refused.
    pub fn rejected(request_id: &str, reason: impl AsRef<str>) -> Self {
        Self::new(format!(
            "response for {request_id} rejected: {}",
            reason.as_ref()
        ))
    }
}
