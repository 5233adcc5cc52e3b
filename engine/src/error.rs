//! # Errors module
//!

use crate::ids::TenantId;

use thiserror::Error;

use std::time::Duration;

/// Error type for the routing and queueing core.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// An error surfaced by the entity runtime.
    #[error("Actor runtime error: {0}")]
    Actor(#[from] actor::Error),
    /// The fetch collaborator failed. Propagated synchronously to the
    /// caller of `init`/`update`; no retry at this layer.
    #[error("Fetch from persistence collaborator failed: {0}")]
    Fetch(String),
    /// Business-level processing failure inside a rule actor.
    #[error("Rule processing failed: {0}")]
    Processing(String),
    /// No root chain is known for the tenant.
    #[error("No root rule chain for tenant {0}.")]
    NoRootChain(TenantId),
    /// The reprocessing collaborator did not complete within the bound.
    #[error("Reprocessing timed out after {0:?}.")]
    ReprocessingTimeout(Duration),
    /// The reprocessing collaborator reported a failure.
    #[error("Reprocessing failed: {0}")]
    Reprocessing(String),
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
