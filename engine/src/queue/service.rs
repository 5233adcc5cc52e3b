//! In-memory queue service.
//!
//! One polling loop per bucket, never shared, so an overloaded or stuck
//! bucket cannot block delivery for another. Per bucket, at most one pack
//! is in flight; the next pack forms only after the previous one fully
//! acknowledged.

use crate::{
    config::EngineConfig,
    error::Error,
    ids::TenantId,
    msg::{EngineMsg, MsgCallback},
    queue::{
        MsgQueuePack, MsgQueueState, PackMemberCallback, PackPhase, QueueKey,
    },
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use tokio::{sync::Notify, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Downstream target for dispatched pack members: the rule chain entry
/// point.
#[async_trait]
pub trait MsgDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        tenant_id: TenantId,
        msg: EngineMsg,
    ) -> Result<(), Error>;
}

/// Fire-and-forget message admission.
pub trait MsgQueueService: Send + Sync {
    fn add(&self, msg: EngineMsg, tenant_id: TenantId);
}

/// One tenant bucket: backlog, ack gate and wakeup handle. Writes to the
/// backlog come from admitting threads; draining is exclusive to the
/// bucket's polling loop.
struct TenantBucket {
    key: QueueKey,
    backlog: Mutex<VecDeque<Arc<MsgQueueState>>>,
    /// `true` while a pack is in flight.
    gate: Arc<AtomicBool>,
    notify: Arc<Notify>,
    phase: Mutex<PackPhase>,
}

impl TenantBucket {
    fn new(key: QueueKey) -> Self {
        TenantBucket {
            key,
            backlog: Mutex::new(VecDeque::new()),
            gate: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            phase: Mutex::new(PackPhase::Idle),
        }
    }

    fn push(&self, state: Arc<MsgQueueState>) {
        self.backlog.lock().push_back(state);
        self.notify.notify_one();
    }

    /// FIFO-drains up to `max` entries. Smaller backlogs yield smaller
    /// packs; never padded, never delayed to fill.
    fn drain(&self, max: usize) -> Vec<Arc<MsgQueueState>> {
        let mut backlog = self.backlog.lock();
        let count = max.min(backlog.len());
        backlog.drain(..count).collect()
    }

    fn pending(&self) -> usize {
        self.backlog.lock().len()
    }

    fn gate_closed(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: PackPhase) {
        *self.phase.lock() = phase;
    }

    fn phase(&self) -> PackPhase {
        *self.phase.lock()
    }
}

/// Queue service backed by in-memory per-bucket backlogs.
pub struct InMemoryMsgQueueService {
    buckets: DashMap<QueueKey, Arc<TenantBucket>>,
    special: HashSet<TenantId>,
    pack_size: usize,
    poll_interval: Duration,
    dispatcher: Arc<dyn MsgDispatcher>,
    token: CancellationToken,
}

impl InMemoryMsgQueueService {
    pub fn new(
        config: &EngineConfig,
        dispatcher: Arc<dyn MsgDispatcher>,
        token: CancellationToken,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(InMemoryMsgQueueService {
            buckets: DashMap::new(),
            special: config.special_tenants.iter().copied().collect(),
            pack_size: config.pack_size,
            poll_interval: config.poll_interval(),
            dispatcher,
            token,
        })
    }

    fn key_for(&self, tenant_id: TenantId) -> QueueKey {
        if self.special.contains(&tenant_id) {
            QueueKey::Tenant(tenant_id)
        } else {
            QueueKey::Collective
        }
    }

    /// The bucket for a key, creating it and starting its polling loop on
    /// first sight.
    fn bucket(&self, key: QueueKey) -> Arc<TenantBucket> {
        match self.buckets.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let bucket = Arc::new(TenantBucket::new(key));
                entry.insert(bucket.clone());
                tokio::spawn(Self::poll_loop(
                    bucket.clone(),
                    self.pack_size,
                    self.poll_interval,
                    self.dispatcher.clone(),
                    self.token.clone(),
                ));
                bucket
            }
        }
    }

    /// Messages waiting in a bucket's backlog, not counting the in-flight
    /// pack.
    pub fn pending(&self, key: QueueKey) -> usize {
        self.buckets
            .get(&key)
            .map(|bucket| bucket.pending())
            .unwrap_or(0)
    }

    /// True while a pack for the bucket is in flight.
    pub fn in_flight(&self, key: QueueKey) -> bool {
        self.buckets
            .get(&key)
            .map(|bucket| bucket.gate_closed())
            .unwrap_or(false)
    }

    pub fn phase(&self, key: QueueKey) -> PackPhase {
        self.buckets
            .get(&key)
            .map(|bucket| bucket.phase())
            .unwrap_or(PackPhase::Idle)
    }

    /// The bucket's pack cycle. Cancellation stops forming new packs; the
    /// in-flight pack's members still report their outcomes.
    async fn poll_loop(
        bucket: Arc<TenantBucket>,
        pack_size: usize,
        poll_interval: Duration,
        dispatcher: Arc<dyn MsgDispatcher>,
        token: CancellationToken,
    ) {
        debug!("Starting polling loop for bucket {}.", bucket.key);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Polling loop for {} cancelled.", bucket.key);
                    return;
                }
                _ = bucket.notify.notified() => {}
                _ = time::sleep(poll_interval) => {}
            }

            while !token.is_cancelled() && !bucket.gate_closed() {
                let members = bucket.drain(pack_size);
                if members.is_empty() {
                    bucket.set_phase(PackPhase::Idle);
                    break;
                }
                bucket.set_phase(PackPhase::Packing);
                let pack = Arc::new(MsgQueuePack::new(
                    bucket.key,
                    members,
                    bucket.gate.clone(),
                    bucket.notify.clone(),
                ));
                debug!(
                    "Formed pack {} of {} messages for {}.",
                    pack.pack_id(),
                    pack.total(),
                    bucket.key
                );
                bucket.set_phase(PackPhase::InFlight);
                for state in pack.members().to_vec() {
                    let callback = Arc::new(PackMemberCallback::new(
                        pack.clone(),
                        state.clone(),
                    ));
                    let msg = state
                        .msg()
                        .copied(Some(pack.pack_id()), callback.clone());
                    if let Err(err) =
                        dispatcher.dispatch(state.tenant_id(), msg).await
                    {
                        warn!(
                            "Dispatch of message {} in pack {} failed: {}",
                            state.msg().id,
                            pack.pack_id(),
                            err
                        );
                        callback.on_failure(&err);
                    }
                }
            }
            if !bucket.gate_closed() {
                bucket.set_phase(PackPhase::Idle);
            }
        }
    }
}

impl MsgQueueService for InMemoryMsgQueueService {
    /// Admits a message. The first message for an unseen bucket creates its
    /// backlog, an open gate and a dedicated polling loop.
    fn add(&self, msg: EngineMsg, tenant_id: TenantId) {
        let key = self.key_for(tenant_id);
        let bucket = self.bucket(key);
        bucket.push(Arc::new(MsgQueueState::new(msg, tenant_id)));
    }
}
