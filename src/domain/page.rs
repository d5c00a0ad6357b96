//! Page definitions: the set of queries one page load issues, read from TOML.
//!
//! ```toml
//! fingerprint = ["ENSG00000012048", "meta"]
//!
//! [[queries]]
//! name = "gene"
//! request_id = "/api/genes/ENSG00000012048"
//!
//! [[queries]]
//! name = "associations"
//! request_id = "/api/variants/associations/gene/ENSG00000012048?ancestry=meta"
//! mode = "two_step"
//! min_sufficient_count = 0
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::descriptor::{QueryDescriptor, QueryMode, SufficiencyThreshold};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("failed to read page definition {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse page definition: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid page definition: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySpec {
    pub name: String,
    pub request_id: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub min_sufficient_count: SufficiencyThreshold,
}

impl From<QuerySpec> for QueryDescriptor {
    fn from(query: QuerySpec) -> Self {
        QueryDescriptor {
            name: query.name,
            request_id: query.request_id,
            mode: query.mode,
            min_sufficient_count: query.min_sufficient_count,
            validator: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageDefinition {
    /// Default run fingerprint when none is given on the command line.
    #[serde(default)]
    pub fingerprint: Vec<Value>,
    pub queries: Vec<QuerySpec>,
}

impl PageDefinition {
    pub fn from_toml(source: &str) -> Result<Self, PageError> {
        let page: PageDefinition = toml::from_str(source)?;
        page.validate()?;
        Ok(page)
    }

    pub fn from_path(path: &Path) -> Result<Self, PageError> {
        let source = fs::read_to_string(path).map_err(|source| PageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source)
    }

    pub fn descriptors(&self) -> Vec<QueryDescriptor> {
        self.queries.iter().cloned().map(QueryDescriptor::from).collect()
    }

    fn validate(&self) -> Result<(), PageError> {
        if self.queries.is_empty() {
            return Err(PageError::Invalid("no queries defined".to_string()));
        }
        let mut seen = HashSet::new();
        for query in &self.queries {
            if query.name.trim().is_empty() {
                return Err(PageError::Invalid("query name must not be empty".to_string()));
            }
            if query.request_id.trim().is_empty() {
                return Err(PageError::Invalid(format!(
                    "query `{}` has an empty request_id",
                    query.name
                )));
            }
            if !seen.insert(query.name.as_str()) {
                return Err(PageError::Invalid(format!(
                    "duplicate query name `{}`",
                    query.name
                )));
            }
        }
        Ok(())
    }
}
