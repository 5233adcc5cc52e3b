//! Partitioned message queue with per-tenant pack flow control.

mod pack;
mod service;
mod state;

pub use pack::{MsgQueuePack, PackMemberCallback};
pub use service::{InMemoryMsgQueueService, MsgDispatcher, MsgQueueService};
pub use state::MsgQueueState;

use crate::ids::TenantId;

use std::fmt;

/// Bucket a tenant's messages flow through. Tenants flagged special get
/// their own bucket and polling loop; everyone else shares the collective
/// bucket. This bounds the number of concurrently running loops while still
/// isolating explicitly flagged tenants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKey {
    Tenant(TenantId),
    Collective,
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKey::Tenant(id) => write!(f, "tenant-{}", id),
            QueueKey::Collective => write!(f, "collective"),
        }
    }
}

/// Phase of a bucket's pack cycle. The completing step is the instant the
/// final terminal outcome lands: the gate reopens and the loop is notified,
/// so the observable phases are these three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackPhase {
    /// No pack in flight; the backlog may be non-empty.
    Idle,
    /// Draining the backlog into a new pack.
    Packing,
    /// A pack is dispatched and waiting for terminal outcomes.
    InFlight,
}
