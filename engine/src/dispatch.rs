//! Root-chain dispatch.

use crate::{
    chain_manager::RuleChainManager,
    error::Error,
    ids::TenantId,
    msg::EngineMsg,
    queue::MsgDispatcher,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use std::sync::Arc;

/// Routes dispatched messages into each tenant's root rule chain.
///
/// Tenants register their chain manager at provisioning time and deregister
/// on teardown; deregistration does not abort in-flight packs, whose
/// members still report terminal outcomes.
pub struct RootChainDispatcher {
    managers: DashMap<TenantId, Arc<RuleChainManager>>,
}

impl RootChainDispatcher {
    pub fn new() -> Self {
        RootChainDispatcher {
            managers: DashMap::new(),
        }
    }

    pub fn register(&self, tenant_id: TenantId, manager: Arc<RuleChainManager>) {
        self.managers.insert(tenant_id, manager);
    }

    pub fn deregister(&self, tenant_id: TenantId) {
        self.managers.remove(&tenant_id);
    }
}

impl Default for RootChainDispatcher {
    fn default() -> Self {
        RootChainDispatcher::new()
    }
}

#[async_trait]
impl MsgDispatcher for RootChainDispatcher {
    async fn dispatch(
        &self,
        tenant_id: TenantId,
        msg: EngineMsg,
    ) -> Result<(), Error> {
        let manager = match self.managers.get(&tenant_id) {
            Some(entry) => entry.clone(),
            None => {
                // Expected race with tenant teardown; the member still gets
                // a terminal outcome.
                warn!("No chain manager for tenant {}.", tenant_id);
                msg.fail(&Error::NoRootChain(tenant_id));
                return Ok(());
            }
        };
        match manager.get_root_chain_actor().await {
            Some(root) => {
                root.tell(msg).await.map_err(Error::Actor)
            }
            None => {
                warn!("Tenant {} has no root chain flagged.", tenant_id);
                msg.fail(&Error::NoRootChain(tenant_id));
                Ok(())
            }
        }
    }
}
