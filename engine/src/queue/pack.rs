//! Queue packs: the flow-controlled unit of work.

use crate::{
    error::Error,
    ids::PackId,
    msg::MsgCallback,
    queue::{MsgQueueState, QueueKey},
};

use tokio::sync::Notify;
use tracing::debug;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// A bounded batch of in-flight messages for one bucket.
///
/// Forming a pack closes the shared ack gate; the pack completes, reopens
/// the gate and wakes the bucket's polling loop exactly when
/// `acked + failed == total`. Members report terminal outcomes in any
/// order; only the count gates completion.
pub struct MsgQueuePack {
    pack_id: PackId,
    key: QueueKey,
    total: usize,
    acked: AtomicUsize,
    failed: AtomicUsize,
    completed: AtomicBool,
    /// Shared with the owning bucket; `true` while this pack is in flight.
    gate: Arc<AtomicBool>,
    notify: Arc<Notify>,
    members: Vec<Arc<MsgQueueState>>,
}

impl MsgQueuePack {
    /// Forms a pack over the drained members and closes the gate. The pack
    /// id is a fresh random identifier used purely for correlation.
    pub fn new(
        key: QueueKey,
        members: Vec<Arc<MsgQueueState>>,
        gate: Arc<AtomicBool>,
        notify: Arc<Notify>,
    ) -> Self {
        gate.store(true, Ordering::SeqCst);
        MsgQueuePack {
            pack_id: PackId::random(),
            key,
            total: members.len(),
            acked: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
            gate,
            notify,
            members,
        }
    }

    pub fn pack_id(&self) -> PackId {
        self.pack_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn members(&self) -> &[Arc<MsgQueueState>] {
        &self.members
    }

    /// Records one success. Returns `true` exactly when this outcome
    /// completes the pack.
    pub fn ack(&self) -> bool {
        self.acked.fetch_add(1, Ordering::SeqCst);
        self.try_complete()
    }

    /// Records one failure. Failures count toward completion the same as
    /// successes; retry or dead-lettering is the failing rule's concern.
    pub fn fail(&self) -> bool {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.try_complete()
    }

    fn try_complete(&self) -> bool {
        let done = self.acked.load(Ordering::SeqCst)
            + self.failed.load(Ordering::SeqCst);
        if done < self.total {
            return false;
        }
        // Exactly one terminal outcome wins the completion.
        if self
            .completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        debug!(
            "Pack {} for {} complete: {} acked, {} failed.",
            self.pack_id,
            self.key,
            self.acked(),
            self.failed()
        );
        self.gate.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        true
    }
}

/// Per-member callback wiring a dispatched copy to its pack counters and
/// the message's original callback. Idempotent per member: a double report
/// is ignored.
pub struct PackMemberCallback {
    pack: Arc<MsgQueuePack>,
    state: Arc<MsgQueueState>,
    inner: Arc<dyn MsgCallback>,
}

impl PackMemberCallback {
    pub fn new(pack: Arc<MsgQueuePack>, state: Arc<MsgQueueState>) -> Self {
        let inner = state.msg().callback();
        PackMemberCallback { pack, state, inner }
    }
}

impl MsgCallback for PackMemberCallback {
    fn on_success(&self) {
        if self.state.mark_processed() {
            self.pack.ack();
            self.inner.on_success();
        }
    }

    fn on_failure(&self, error: &Error) {
        if self.state.mark_processed() {
            self.pack.fail();
            self.inner.on_failure(error);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{ids::TenantId, msg::EngineMsg};

    use serde_json::Value;
    use uuid::Uuid;

    fn make_members(n: usize) -> Vec<Arc<MsgQueueState>> {
        let tenant = TenantId::random();
        (0..n)
            .map(|_| {
                Arc::new(MsgQueueState::new(
                    EngineMsg::new("TEST", Uuid::new_v4(), Value::Null),
                    tenant,
                ))
            })
            .collect()
    }

    #[test]
    fn test_completes_on_exact_count_any_order() {
        let gate = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let pack = MsgQueuePack::new(
            QueueKey::Collective,
            make_members(3),
            gate.clone(),
            notify,
        );
        assert!(gate.load(Ordering::SeqCst));

        assert!(!pack.fail());
        assert!(!pack.ack());
        assert!(pack.ack());
        assert!(pack.is_complete());
        assert_eq!(pack.acked(), 2);
        assert_eq!(pack.failed(), 1);
        assert!(!gate.load(Ordering::SeqCst));
    }

    #[test]
    fn test_member_callback_is_idempotent() {
        let gate = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let members = make_members(2);
        let pack = Arc::new(MsgQueuePack::new(
            QueueKey::Collective,
            members.clone(),
            gate,
            notify,
        ));

        let callback =
            PackMemberCallback::new(pack.clone(), members[0].clone());
        callback.on_success();
        callback.on_success();
        callback.on_failure(&Error::Processing("late".to_owned()));

        // One member, one outcome.
        assert_eq!(pack.acked(), 1);
        assert_eq!(pack.failed(), 0);
        assert!(!pack.is_complete());
    }
}
