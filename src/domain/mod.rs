//! Domain layer types and invariants.

pub mod body;
pub mod descriptor;
pub mod error;
pub mod page;
pub mod state;

pub use body::{LookupResult, unwrap_body};
pub use descriptor::{
    Phase, QueryDescriptor, QueryMode, SufficiencyThreshold, Validator, phase_request_id,
};
pub use error::TransportError;
pub use page::{PageDefinition, PageError, QuerySpec};
pub use state::{QueryState, QueryStatus, StateMap};
