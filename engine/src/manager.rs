//! Rule manager.
//!
//! Owns the rule set of one scope (system, or one tenant) and keeps the
//! routing chain consistent with the persisted definitions. Entities are
//! materialized lazily, exactly once per rule id, and the chain snapshot is
//! rebuilt whole on every change.

use crate::{
    chain::{ActorChain, ActorMeta, ChainCell},
    config::EngineConfig,
    defs::{PageLink, RuleDef, RuleSource},
    error::Error,
    ids::{RuleId, TenantId},
    lifecycle::ComponentLifecycleEvent,
    rule_actor::{RuleActor, RuleProcessor},
    supervisor::{ScopeSupervisor, SupervisorMsg, SupervisorResponse},
};

use actor::{ActorRef, Error as ActorError, SystemRef};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use std::{collections::HashMap, sync::Arc, time::Duration};

struct ManagerState {
    initialized: bool,
    supervisor: Option<ActorRef<ScopeSupervisor<RuleActor>>>,
    /// Last-known definition per rule, ACTIVE and SUSPENDED alike.
    rules: HashMap<RuleId, RuleDef>,
    /// One cached entity handle per rule, created lazily.
    actors: HashMap<RuleId, ActorMeta<RuleId, RuleActor>>,
}

impl ManagerState {
    fn new() -> Self {
        ManagerState {
            initialized: false,
            supervisor: None,
            rules: HashMap::new(),
            actors: HashMap::new(),
        }
    }
}

/// Manages the rule entities of one scope.
///
/// All mutating operations serialize on one async mutex; holding it across
/// entity creation is what guarantees the single-creation invariant under
/// concurrent callers. Chain reads ([`RuleManager::get_rule_chain`]) are
/// lock-free snapshot loads.
pub struct RuleManager {
    lane: String,
    scope_name: String,
    source: Arc<dyn RuleSource>,
    processor: Arc<dyn RuleProcessor>,
    system: SystemRef,
    page_size: usize,
    max_restarts: usize,
    restart_window: Duration,
    chain: Arc<ChainCell<RuleId, RuleActor>>,
    state: Mutex<ManagerState>,
}

impl RuleManager {
    /// Manager for system-scope rules, on the system rule lane.
    pub fn system(
        source: Arc<dyn RuleSource>,
        processor: Arc<dyn RuleProcessor>,
        system: SystemRef,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            config.system_rule_lane.clone(),
            "system".to_owned(),
            source,
            processor,
            system,
            config,
        )
    }

    /// Manager for one tenant's rules, on the tenant rule lane.
    pub fn tenant(
        tenant_id: TenantId,
        source: Arc<dyn RuleSource>,
        processor: Arc<dyn RuleProcessor>,
        system: SystemRef,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            config.tenant_rule_lane.clone(),
            tenant_id.to_string(),
            source,
            processor,
            system,
            config,
        )
    }

    fn new(
        lane: String,
        scope_name: String,
        source: Arc<dyn RuleSource>,
        processor: Arc<dyn RuleProcessor>,
        system: SystemRef,
        config: &EngineConfig,
    ) -> Self {
        RuleManager {
            lane,
            scope_name,
            source,
            processor,
            system,
            page_size: config.fetch_page_size,
            max_restarts: config.max_restarts,
            restart_window: config.restart_window(),
            chain: Arc::new(ChainCell::new()),
            state: Mutex::new(ManagerState::new()),
        }
    }

    /// Loads every rule visible to this scope and builds the chain.
    /// Idempotent; later calls are no-ops once initialized.
    pub async fn init(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        self.init_locked(&mut state).await
    }

    async fn init_locked(&self, state: &mut ManagerState) -> Result<(), Error> {
        if state.initialized {
            return Ok(());
        }
        debug!("Initializing rule manager for scope {}.", self.scope_name);
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

    /// Applies a lifecycle event for one rule and rebuilds the chain.
    ///
    /// `Deleted` drops the rule from both maps and stops its entity; an
    /// unknown id on deletion is an expected race, not an error. Every other
    /// event refreshes the definition from the source and get-or-creates the
    /// entity, returning its handle.
    pub async fn update(
        &self,
        rule_id: RuleId,
        event: ComponentLifecycleEvent,
    ) -> Result<Option<ActorRef<RuleActor>>, Error> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            self.init_locked(&mut state).await?;
        }
        let handle = match event {
            ComponentLifecycleEvent::Deleted => {
                if state.rules.remove(&rule_id).is_none() {
                    warn!(
                        "Rule {} already absent on deletion in scope {}.",
                        rule_id, self.scope_name
                    );
                }
                if let Some(meta) = state.actors.remove(&rule_id) {
                    meta.handle.tell_stop().await;
                }
                None
            }
            _ => match self.source.find_by_id(rule_id).await? {
                Some(def) => {
                    Some(self.get_or_create_locked(&mut state, def).await?)
                }
                None => {
                    warn!(
                        "Rule {} not found in source on {:?} event.",
                        rule_id, event
                    );
                    None
                }
            },
        };
        self.rebuild_chain(&state);
        Ok(handle)
    }

    /// The cached entity handle for a rule, creating it lazily from the
    /// source definition. Exactly one entity is ever created per rule id,
    /// however many callers race here. A rule whose entity was stopped by
    /// supervision stays absent; only a lifecycle update re-creates it.
    pub async fn get_or_create_rule_actor(
        &self,
        rule_id: RuleId,
    ) -> Result<Option<ActorRef<RuleActor>>, Error> {
        let mut state = self.state.lock().await;
        if let Some(meta) = state.actors.get(&rule_id) {
            if !meta.handle.is_closed() {
                return Ok(Some(meta.handle.clone()));
            }
            return Ok(None);
        }
        match self.source.find_by_id(rule_id).await? {
            Some(def) => {
                let handle =
                    self.get_or_create_locked(&mut state, def).await?;
                self.rebuild_chain(&state);
                Ok(Some(handle))
            }
            None => {
                warn!(
                    "Rule {} unknown in scope {}; no entity created.",
                    rule_id, self.scope_name
                );
                Ok(None)
            }
        }
    }

    /// The current chain snapshot, lazily triggering `init` if never built.
    pub async fn get_rule_chain(
        &self,
    ) -> Result<Arc<ActorChain<RuleId, RuleActor>>, Error> {
        {
            let mut state = self.state.lock().await;
            if !state.initialized {
                self.init_locked(&mut state).await?;
            }
        }
        Ok(self.chain.load())
    }

    /// The shared chain cell, for wiring into chain entities.
    pub fn chain_cell(&self) -> Arc<ChainCell<RuleId, RuleActor>> {
        self.chain.clone()
    }

    async fn ensure_supervisor(
        &self,
        state: &mut ManagerState,
    ) -> Result<ActorRef<ScopeSupervisor<RuleActor>>, Error> {
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
        state: &mut ManagerState,
        def: RuleDef,
    ) -> Result<ActorRef<RuleActor>, Error> {
        if let Some(meta) = state.actors.get(&def.id) {
            if meta.handle.is_closed() {
                // The entity exhausted its restart budget and was stopped;
                // this refresh re-creates it with the same identity.
                state.actors.remove(&def.id);
            } else {
                let handle = meta.handle.clone();
                let stale_weight = meta.weight != def.weight;
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
                state.rules.insert(def.id, def);
                return Ok(handle);
            }
        }

        let supervisor = self.ensure_supervisor(state).await?;
        let rule_actor = RuleActor::new(
            def.id,
            def.tenant_id,
            self.processor.clone(),
            self.chain.clone(),
            self.max_restarts,
            self.restart_window,
        );
        let SupervisorResponse::Spawned(handle) = supervisor
            .ask(SupervisorMsg::Spawn {
                name: def.id.to_string(),
                child: rule_actor,
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
        state.rules.insert(def.id, def);
        Ok(handle)
    }

    /// Publishes a fresh snapshot containing exactly the ACTIVE rules.
    fn rebuild_chain(&self, state: &ManagerState) {
        let entries = state
            .rules
            .values()
            .filter(|def| def.state.is_active())
            .filter_map(|def| state.actors.get(&def.id).cloned());
        self.chain.store(ActorChain::build(entries));
    }
}
