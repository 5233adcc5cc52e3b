//! Per-message queue state.

use crate::{ids::TenantId, msg::EngineMsg};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A message admitted to a tenant backlog: the envelope plus its owning
/// tenant, a retry counter and a processed flag. Lives from admission until
/// the owning pack completes.
pub struct MsgQueueState {
    msg: EngineMsg,
    tenant_id: TenantId,
    retries: AtomicU32,
    processed: AtomicBool,
}

impl MsgQueueState {
    pub fn new(msg: EngineMsg, tenant_id: TenantId) -> Self {
        MsgQueueState {
            msg,
            tenant_id,
            retries: AtomicU32::new(0),
            processed: AtomicBool::new(false),
        }
    }

    pub fn msg(&self) -> &EngineMsg {
        &self.msg
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Increments and returns the retry count.
    pub fn retry(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Marks the message processed. Returns `false` if it already was;
    /// a member reports exactly one terminal outcome to its pack.
    pub fn mark_processed(&self) -> bool {
        !self.processed.swap(true, Ordering::SeqCst)
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::SeqCst)
    }
}
