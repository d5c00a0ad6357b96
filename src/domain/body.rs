//! Response bodies: the optional `data` envelope and its typed view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope field holding the payload.
pub const DATA_FIELD: &str = "data";

/// Strip the result-set envelope from a body.
///
/// A mapping with a `data` field yields that field; anything else is returned
/// unchanged. Applied to every successful fetch, whether it came from the cache
/// or the network.
pub fn unwrap_body(body: Value) -> Value {
    match body {
        Value::Object(mut fields) => match fields.remove(DATA_FIELD) {
            Some(data) => data,
            None => Value::Object(fields),
        },
        other => other,
    }
}

/// The backend's standard list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult<T> {
    pub data: Vec<T>,
    /// Number of items returned.
    pub count: usize,
    /// Where the backend read the rows from.
    #[serde(default)]
    pub storage_source: String,
    /// Backend query time in seconds.
    #[serde(default)]
    pub time: f64,
}

impl<T> LookupResult<T> {
    pub fn new(data: Vec<T>, storage_source: impl Into<String>, time: f64) -> Self {
        Self {
            count: data.len(),
            data,
            storage_source: storage_source.into(),
            time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: for<'de> Deserialize<'de>> LookupResult<T> {
    /// Decode a raw (still wrapped) body into the typed envelope.
    pub fn from_body(body: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(body)
    }
}
