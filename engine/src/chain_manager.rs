//! Rule chain manager.
//!
//! Same contract as the rule manager, keyed by rule chain id and managing
//! chain-entry entities. Additionally tracks which chain is the scope's
//! root: whenever a definition with `root == true` is loaded or refreshed,
//! the root pointer is updated, and inbound tenant traffic enters through
//! it.

use crate::{
    chain::{ActorChain, ActorMeta, ChainCell},
    config::EngineConfig,
    defs::{PageLink, RuleChainDef, RuleChainSource},
    error::Error,
    ids::{RuleChainId, RuleId, TenantId},
    lifecycle::ComponentLifecycleEvent,
    rule_actor::{RuleActor, RuleChainActor},
    supervisor::{ScopeSupervisor, SupervisorMsg, SupervisorResponse},
};

use actor::{ActorRef, Error as ActorError, SystemRef};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use std::{collections::HashMap, sync::Arc};

struct ChainManagerState {
    initialized: bool,
    supervisor: Option<ActorRef<ScopeSupervisor<RuleChainActor>>>,
    chains: HashMap<RuleChainId, RuleChainDef>,
    actors: HashMap<RuleChainId, ActorMeta<RuleChainId, RuleChainActor>>,
    /// The scope's root chain and its entity, if one is flagged.
    root: Option<(RuleChainDef, ActorRef<RuleChainActor>)>,
}

impl ChainManagerState {
    fn new() -> Self {
        ChainManagerState {
            initialized: false,
            supervisor: None,
            chains: HashMap::new(),
            actors: HashMap::new(),
            root: None,
        }
    }
}

/// Manages the rule chain entities of one scope and the root chain pointer.
pub struct RuleChainManager {
    lane: String,
    scope_name: String,
    source: Arc<dyn RuleChainSource>,
    system: SystemRef,
    page_size: usize,
    /// Rule chain snapshot each chain entity dispatches into.
    rules: Arc<ChainCell<RuleId, RuleActor>>,
    chain: Arc<ChainCell<RuleChainId, RuleChainActor>>,
    state: Mutex<ChainManagerState>,
}

impl RuleChainManager {
    /// Manager for system-scope chains. Chains are tenant-owned, so the
    /// system source yields nothing by design; the manager still exists so
    /// the scope's lifecycle handling is uniform.
    pub fn system(
        source: Arc<dyn RuleChainSource>,
        rules: Arc<ChainCell<RuleId, RuleActor>>,
        system: SystemRef,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            config.system_chain_lane.clone(),
            "system".to_owned(),
            source,
            rules,
            system,
            config,
        )
    }

    /// Manager for one tenant's chains, on the tenant chain lane.
    pub fn tenant(
        tenant_id: TenantId,
        source: Arc<dyn RuleChainSource>,
        rules: Arc<ChainCell<RuleId, RuleActor>>,
        system: SystemRef,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            config.tenant_chain_lane.clone(),
            tenant_id.to_string(),
            source,
            rules,
            system,
            config,
        )
    }

    fn new(
        lane: String,
        scope_name: String,
        source: Arc<dyn RuleChainSource>,
        rules: Arc<ChainCell<RuleId, RuleActor>>,
        system: SystemRef,
        config: &EngineConfig,
    ) -> Self {
        RuleChainManager {
            lane,
            scope_name,
            source,
            system,
            page_size: config.fetch_page_size,
            rules,
            chain: Arc::new(ChainCell::new()),
            state: Mutex::new(ChainManagerState::new()),
        }
    }

    /// Loads every chain visible to this scope, records the root and builds
    /// the snapshot. Idempotent.
    pub async fn init(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        self.init_locked(&mut state).await
    }

    async fn init_locked(
        &self,
        state: &mut ChainManagerState,
    ) -> Result<(), Error> {
        if state.initialized {
            return Ok(());
        }
        debug!(
            "Initializing rule chain manager for scope {}.",
            self.scope_name
        );
        let mut link = PageLink::first(self.page_size);
        loop {
            let page = self.source.fetch_page(&link).await?;
            for def in page.items {
                self.get_or_create_locked(state, def).await?;
            }
            if !page.has_next {
                break;
            }
            link = link.next();
        }
        self.rebuild_chain(state);
        state.initialized = true;
        Ok(())
    }

    /// Applies a lifecycle event for one chain and rebuilds the snapshot.
    pub async fn update(
        &self,
        chain_id: RuleChainId,
        event: ComponentLifecycleEvent,
    ) -> Result<Option<ActorRef<RuleChainActor>>, Error> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            self.init_locked(&mut state).await?;
        }
        let handle = match event {
            ComponentLifecycleEvent::Deleted => {
                if state.chains.remove(&chain_id).is_none() {
                    warn!(
                        "Chain {} already absent on deletion in scope {}.",
                        chain_id, self.scope_name
                    );
                }
                if let Some(meta) = state.actors.remove(&chain_id) {
                    meta.handle.tell_stop().await;
                }
                let root_deleted = state
                    .root
                    .as_ref()
                    .map(|(def, _)| def.id == chain_id)
                    .unwrap_or(false);
                if root_deleted {
                    state.root = None;
                }
                None
            }
            _ => match self.source.find_by_id(chain_id).await? {
                Some(def) => {
                    Some(self.get_or_create_locked(&mut state, def).await?)
                }
                None => {
                    warn!(
                        "Chain {} not found in source on {:?} event.",
                        chain_id, event
                    );
                    None
                }
            },
        };
        self.rebuild_chain(&state);
        Ok(handle)
    }

    /// The cached chain entity, creating it lazily. Single-creation holds
    /// under concurrent callers. A chain whose entity was stopped by
    /// supervision stays absent; only a lifecycle update re-creates it.
    pub async fn get_or_create_chain_actor(
        &self,
        chain_id: RuleChainId,
    ) -> Result<Option<ActorRef<RuleChainActor>>, Error> {
        let mut state = self.state.lock().await;
        if let Some(meta) = state.actors.get(&chain_id) {
            if !meta.handle.is_closed() {
                return Ok(Some(meta.handle.clone()));
            }
            return Ok(None);
        }
        match self.source.find_by_id(chain_id).await? {
            Some(def) => {
                let handle =
                    self.get_or_create_locked(&mut state, def).await?;
                self.rebuild_chain(&state);
                Ok(Some(handle))
            }
            None => {
                warn!(
                    "Chain {} unknown in scope {}; no entity created.",
                    chain_id, self.scope_name
                );
                Ok(None)
            }
        }
    }

    /// The current chain snapshot, lazily triggering `init` if never built.
    pub async fn get_chain(
        &self,
    ) -> Result<Arc<ActorChain<RuleChainId, RuleChainActor>>, Error> {
        {
            let mut state = self.state.lock().await;
            if !state.initialized {
                self.init_locked(&mut state).await?;
            }
        }
        Ok(self.chain.load())
    }

    /// Definition of the scope's root chain, if one is flagged.
    pub async fn get_root_chain(&self) -> Option<RuleChainDef> {
        let state = self.state.lock().await;
        state.root.as_ref().map(|(def, _)| def.clone())
    }

    /// Entity of the scope's root chain, if one is flagged.
    pub async fn get_root_chain_actor(
        &self,
    ) -> Option<ActorRef<RuleChainActor>> {
        let state = self.state.lock().await;
        state.root.as_ref().map(|(_, handle)| handle.clone())
    }

    async fn ensure_supervisor(
        &self,
        state: &mut ChainManagerState,
    ) -> Result<ActorRef<ScopeSupervisor<RuleChainActor>>, Error> {
        if let Some(supervisor) = &state.supervisor {
            return Ok(supervisor.clone());
        }
        let supervisor = match self
            .system
            .create_lane_actor(
                &self.lane,
                &self.scope_name,
                ScopeSupervisor::default(),
            )
            .await
        {
            Ok(supervisor) => supervisor,
            Err(ActorError::Exists(path)) => self
                .system
                .get_actor(&path)
                .await
                .ok_or(ActorError::NotFound(path))?,
            Err(err) => return Err(err.into()),
        };
        state.supervisor = Some(supervisor.clone());
        Ok(supervisor)
    }

    async fn get_or_create_locked(
        &self,
        state: &mut ChainManagerState,
        def: RuleChainDef,
    ) -> Result<ActorRef<RuleChainActor>, Error> {
        let cached = match state.actors.get(&def.id) {
            Some(meta) if !meta.handle.is_closed() => {
                Some(meta.handle.clone())
            }
            Some(_) => {
                // Stopped by supervision; re-create with the same identity.
                state.actors.remove(&def.id);
                None
            }
            None => None,
        };
        let handle = if let Some(handle) = cached {
            let stale_weight = state
                .actors
                .get(&def.id)
                .map(|meta| meta.weight != def.weight)
                .unwrap_or(false);
            if stale_weight {
                state.actors.insert(
                    def.id,
                    ActorMeta {
                        id: def.id,
                        weight: def.weight,
                        handle: handle.clone(),
                    },
                );
            }
            handle
        } else {
            let supervisor = self.ensure_supervisor(state).await?;
            let chain_actor = RuleChainActor::new(
                def.id,
                def.tenant_id,
                self.rules.clone(),
            );
            let SupervisorResponse::Spawned(handle) = supervisor
                .ask(SupervisorMsg::Spawn {
                    name: def.id.to_string(),
                    child: chain_actor,
                })
                .await
                .map_err(Error::Actor)?;
            state.actors.insert(
                def.id,
                ActorMeta {
                    id: def.id,
                    weight: def.weight,
                    handle: handle.clone(),
                },
            );
            handle
        };

        self.visit(state, &def, &handle);
        state.chains.insert(def.id, def);
        Ok(handle)
    }

    /// Records the root pointer whenever a root-flagged definition passes
    /// through. A definition that lost the flag clears a stale pointer.
    fn visit(
        &self,
        state: &mut ChainManagerState,
        def: &RuleChainDef,
        handle: &ActorRef<RuleChainActor>,
    ) {
        if def.root {
            state.root = Some((def.clone(), handle.clone()));
        } else if state
            .root
            .as_ref()
            .map(|(root_def, _)| root_def.id == def.id)
            .unwrap_or(false)
        {
            state.root = None;
        }
    }

    /// Publishes a fresh snapshot containing exactly the ACTIVE chains.
    fn rebuild_chain(&self, state: &ChainManagerState) {
        let entries = state
            .chains
            .values()
            .filter(|def| def.state.is_active())
            .filter_map(|def| state.actors.get(&def.id).cloned());
        self.chain.store(ActorChain::build(entries));
    }
}
