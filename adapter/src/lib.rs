//! HTTP implementations of the engine's remote collaborators.

pub mod client;
pub mod config;
pub mod metrics_defs;
pub mod protocol;

#[cfg(test)]
mod testutils;

pub use client::{ClientError, DevOpsClient};
pub use config::ClientConfig;
