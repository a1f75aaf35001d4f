//! Matching and bulk mutation of variable groups.
//!
//! A request names an organization, a project (or every project), and filters
//! over group names, variable keys and variable values. Reads collect the
//! matching entries; writes revise every matching group and push each revised
//! group back whole.

pub mod audit;
pub mod fanout;
pub mod filter;
pub mod metrics_defs;
pub mod mutation;
pub mod outcome;
pub mod predicate;
pub mod request;
pub mod secrets;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

pub use fanout::VariableManager;
pub use outcome::OperationResult;
pub use request::{FilterRequest, Operation, Request, RequestError};
pub use store::{ProjectDirectory, StoreError, VariableGroupStore};
pub use types::{Credential, MatchedVariable, ProjectContext, Status};
