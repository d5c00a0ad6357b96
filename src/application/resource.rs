//! Resource client trait describing the network adapter.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::TransportError;

/// Fetches a resource body by request id.
///
/// Implementations return the raw body, envelope included, and do no caching
/// or retrying of their own.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn fetch_resource(&self, request_id: &str) -> Result<Value, TransportError>;
}
