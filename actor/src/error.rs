//! # Errors module
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the entity runtime.
///
/// The supervision layer only distinguishes two buckets: [`Error::Functional`]
/// marks recoverable, business-level failures and is restart-worthy; every
/// other variant is treated as systemic and stops the failing entity. Rule
/// processors routinely surface business errors as `Functional`, so the
/// classification is deliberately coarse.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message to an entity.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// An error occurred while receiving a response from an entity.
    #[error("An error occurred while receiving a response from {0} actor.")]
    Receive(ActorPath),
    /// An entity with the same path already exists.
    #[error("Actor {0} exists.")]
    Exists(ActorPath),
    /// No entity is registered at the given path.
    #[error("Actor {0} not found.")]
    NotFound(ActorPath),
    /// An error occurred while starting an entity.
    #[error("An error occurred while starting an actor: {0}")]
    Start(String),
    /// An error occurred while stopping an entity.
    #[error("An error occurred while stopping an actor.")]
    Stop,
    /// An error occurred while restarting an entity.
    #[error("An error occurred while restarting an actor: {0}")]
    Restart(String),
    /// An error occurred while publishing an event to subscribers.
    #[error("An error occurred while sending an event: {0}")]
    SendEvent(String),
    /// Recoverable business-level error. Restart-worthy under supervision.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True if the error belongs to the recoverable bucket.
    pub fn is_functional(&self) -> bool {
        matches!(self, Error::Functional(_))
    }
}
