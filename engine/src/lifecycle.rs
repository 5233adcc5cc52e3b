//! Component lifecycle sum types.
//!
//! Closed enums with exhaustive matching, so every transition the managers
//! react to is enumerable.

use serde::{Deserialize, Serialize};

/// Notification that a rule or rule chain changed. Delivered at most once
/// per logical change and possibly out of order relative to fetch results;
/// the managers tolerate `update after already-deleted` by treating the
/// entry as absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentLifecycleEvent {
    Created,
    Updated,
    Deleted,
    Activated,
    Suspended,
}

/// Persisted state of a rule or rule chain. Only `Active` components take
/// part in routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentState {
    Active,
    Suspended,
}

impl ComponentState {
    pub fn is_active(&self) -> bool {
        matches!(self, ComponentState::Active)
    }
}
