//! Message envelope and acknowledgement callbacks.

use crate::{
    error::Error,
    ids::{MsgId, PackId, RuleChainId, RuleNodeId},
};

use actor::Message;
use serde_json::Value;
use uuid::Uuid;

use std::{collections::HashMap, fmt, sync::Arc};

/// Terminal-outcome hook carried by every message. Invoked exactly once per
/// queue boundary crossing: either `on_success` or `on_failure`.
pub trait MsgCallback: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self, error: &Error);
}

/// Callback that ignores both outcomes. Used for messages admitted outside
/// any pack.
#[derive(Default)]
pub struct NoopCallback;

impl MsgCallback for NoopCallback {
    fn on_success(&self) {}
    fn on_failure(&self, _error: &Error) {}
}

/// A message envelope flowing through the rule pipeline.
///
/// Immutable after creation except for the callback wiring: crossing a queue
/// boundary produces a fresh copy via [`EngineMsg::copied`] so a retry can
/// never corrupt the form a rule node sees mid-processing.
#[derive(Clone)]
pub struct EngineMsg {
    pub id: MsgId,
    pub msg_type: String,
    /// Entity that originated the message (device, asset, ...).
    pub originator: Uuid,
    /// Pack the message currently belongs to, if any.
    pub pack_id: Option<PackId>,
    /// Rule chain currently owning the message.
    pub chain_id: Option<RuleChainId>,
    /// Rule node currently processing the message.
    pub node_id: Option<RuleNodeId>,
    /// Cluster partition the originator hashes to.
    pub partition: u32,
    pub metadata: HashMap<String, String>,
    pub payload: Value,
    callback: Arc<dyn MsgCallback>,
}

impl EngineMsg {
    pub fn new(msg_type: &str, originator: Uuid, payload: Value) -> Self {
        EngineMsg {
            id: MsgId::random(),
            msg_type: msg_type.to_owned(),
            originator,
            pack_id: None,
            chain_id: None,
            node_id: None,
            partition: 0,
            metadata: HashMap::new(),
            payload,
            callback: Arc::new(NoopCallback),
        }
    }

    /// A fresh envelope with the same content, rewired to a new pack and
    /// callback. The id is preserved; correlation across copies uses it.
    pub fn copied(
        &self,
        pack_id: Option<PackId>,
        callback: Arc<dyn MsgCallback>,
    ) -> Self {
        EngineMsg {
            id: self.id,
            msg_type: self.msg_type.clone(),
            originator: self.originator,
            pack_id,
            chain_id: self.chain_id,
            node_id: self.node_id,
            partition: self.partition,
            metadata: self.metadata.clone(),
            payload: self.payload.clone(),
            callback,
        }
    }

    pub fn callback(&self) -> Arc<dyn MsgCallback> {
        self.callback.clone()
    }

    /// Reports the terminal success outcome for this envelope.
    pub fn ack(&self) {
        self.callback.on_success();
    }

    /// Reports the terminal failure outcome for this envelope.
    pub fn fail(&self, error: &Error) {
        self.callback.on_failure(error);
    }
}

impl Message for EngineMsg {}

impl fmt::Debug for EngineMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineMsg")
            .field("id", &self.id)
            .field("msg_type", &self.msg_type)
            .field("originator", &self.originator)
            .field("pack_id", &self.pack_id)
            .field("chain_id", &self.chain_id)
            .field("node_id", &self.node_id)
            .field("partition", &self.partition)
            .finish()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallback {
        acks: AtomicUsize,
    }

    impl MsgCallback for CountingCallback {
        fn on_success(&self) {
            self.acks.fetch_add(1, Ordering::SeqCst);
        }
        fn on_failure(&self, _error: &Error) {}
    }

    #[test]
    fn test_copied_rewires_callback_only() {
        let msg =
            EngineMsg::new("POST_TELEMETRY", Uuid::new_v4(), Value::Null);
        let callback = Arc::new(CountingCallback {
            acks: AtomicUsize::new(0),
        });
        let pack_id = PackId::random();
        let copy = msg.copied(Some(pack_id), callback.clone());

        assert_eq!(copy.id, msg.id);
        assert_eq!(copy.pack_id, Some(pack_id));
        assert_eq!(msg.pack_id, None);

        copy.ack();
        msg.ack();
        // Only the copy is wired to the counting callback.
        assert_eq!(callback.acks.load(Ordering::SeqCst), 1);
    }
}
