//! Query descriptors: what a page asks for, and how each request id is derived.

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Query-string parameter carrying the retrieval phase of a two-phase query.
pub const QUERY_MODE_PARAM: &str = "query_mode";

/// Retrieval protocol for a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueryMode {
    /// One request, issued as-is.
    #[default]
    #[serde(rename = "single")]
    Single,
    /// Cheap `fast` preview first, authoritative `slow` variant when the preview
    /// comes back too small.
    #[serde(rename = "two_step")]
    TwoPhase,
}

/// One leg of a two-phase query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Fast,
    Slow,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Fast => "fast",
            Phase::Slow => "slow",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append the `query_mode` marker for `phase`, joining with `&` when the request
/// id already carries a query string.
pub fn phase_request_id(request_id: &str, phase: Phase) -> String {
    let separator = if request_id.contains('?') { '&' } else { '?' };
    format!("{request_id}{separator}{QUERY_MODE_PARAM}={phase}")
}

/// Largest fast-phase collection length that still counts as insufficient.
///
/// The comparison is inclusive: with the default of `Count(0)` an empty array
/// triggers the slow phase while a one-element array does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SufficiencyThreshold {
    Count(usize),
    /// Every collection is insufficient; the slow phase always runs.
    Unbounded,
}

impl SufficiencyThreshold {
    /// Whether a fast-phase value is too small to stand on its own.
    ///
    /// Only arrays are measured. Objects and scalars are always sufficient.
    pub fn is_insufficient(self, value: &Value) -> bool {
        let Value::Array(items) = value else {
            return false;
        };
        match self {
            SufficiencyThreshold::Count(limit) => items.len() <= limit,
            SufficiencyThreshold::Unbounded => true,
        }
    }
}

impl Default for SufficiencyThreshold {
    fn default() -> Self {
        SufficiencyThreshold::Count(0)
    }
}

impl From<usize> for SufficiencyThreshold {
    fn from(count: usize) -> Self {
        SufficiencyThreshold::Count(count)
    }
}

const UNBOUNDED_NAMES: [&str; 3] = ["inf", "infinity", "unbounded"];

#[derive(Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Count(usize),
    Named(String),
}

impl<'de> Deserialize<'de> for SufficiencyThreshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawThreshold::deserialize(deserializer)? {
            RawThreshold::Count(count) => Ok(SufficiencyThreshold::Count(count)),
            RawThreshold::Named(name)
                if UNBOUNDED_NAMES.contains(&name.to_ascii_lowercase().as_str()) =>
            {
                Ok(SufficiencyThreshold::Unbounded)
            }
            RawThreshold::Named(other) => Err(D::Error::custom(format!(
                "invalid min_sufficient_count `{other}`: expected an integer or \"inf\""
            ))),
        }
    }
}

impl Serialize for SufficiencyThreshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SufficiencyThreshold::Count(count) => serializer.serialize_u64(*count as u64),
            SufficiencyThreshold::Unbounded => serializer.serialize_str(UNBOUNDED_NAMES[0]),
        }
    }
}

type ValidateFn = dyn Fn(&Value) -> Result<(), String> + Send + Sync;

/// Acceptance check run against an unwrapped value before it is published or
/// written to the cache.
#[derive(Clone)]
pub struct Validator(Arc<ValidateFn>);

impl Validator {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(check))
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

/// A named fetch within one run.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    /// Key under which the query's state is published. Unique per run.
    pub name: String,
    /// Request path (optionally with a query string) handed to the resource client.
    pub request_id: String,
    pub mode: QueryMode,
    /// Only consulted for [`QueryMode::TwoPhase`].
    pub min_sufficient_count: SufficiencyThreshold,
    pub validator: Option<Validator>,
}

impl QueryDescriptor {
    pub fn single(name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_id: request_id.into(),
            mode: QueryMode::Single,
            min_sufficient_count: SufficiencyThreshold::default(),
            validator: None,
        }
    }

    pub fn two_phase(name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            mode: QueryMode::TwoPhase,
            ..Self::single(name, request_id)
        }
    }

    pub fn with_min_sufficient_count(mut self, threshold: impl Into<SufficiencyThreshold>) -> Self {
        self.min_sufficient_count = threshold.into();
        self
    }

    /// Force the slow phase regardless of the fast result's size.
    pub fn always_slow(self) -> Self {
        self.with_min_sufficient_count(SufficiencyThreshold::Unbounded)
    }

    pub fn with_validator<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Validator::new(check));
        self
    }

    pub fn is_two_phase(&self) -> bool {
        self.mode == QueryMode::TwoPhase
    }
}
