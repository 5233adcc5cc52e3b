//! Shared fixtures: in-memory sources and a scriptable processor.

#![allow(dead_code)]

use engine::{
    EngineMsg, Error, MsgCallback, MsgId, Page, PageLink, ProcessOutcome,
    RuleChainDef, RuleChainId, RuleChainSource, RuleDef, RuleId,
    RuleProcessor, RuleSource, TenantId,
};

use actor::{ActorSystem, SystemRef};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

pub fn start_system() -> SystemRef {
    let (system, mut runner) =
        ActorSystem::create(Some(CancellationToken::new()));
    tokio::spawn(async move { runner.run().await });
    system
}

pub fn active_rule(tenant_id: TenantId, weight: i32) -> RuleDef {
    RuleDef {
        id: RuleId::random(),
        tenant_id,
        name: format!("rule-w{}", weight),
        weight,
        state: engine::ComponentState::Active,
    }
}

pub fn chain_def(tenant_id: TenantId, root: bool) -> RuleChainDef {
    RuleChainDef {
        id: RuleChainId::random(),
        tenant_id,
        name: "chain".to_owned(),
        weight: 0,
        state: engine::ComponentState::Active,
        root,
    }
}

pub fn telemetry_msg() -> EngineMsg {
    EngineMsg::new(
        "POST_TELEMETRY",
        Uuid::new_v4(),
        json!({"temperature": 21.5}),
    )
}

/// Rule source over a plain vector, paged in insertion order.
pub struct InMemoryRuleSource {
    rules: Mutex<Vec<RuleDef>>,
}

impl InMemoryRuleSource {
    pub fn new() -> Self {
        InMemoryRuleSource {
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Inserts or replaces a definition by id.
    pub fn put(&self, def: RuleDef) {
        let mut rules = self.rules.lock();
        if let Some(existing) =
            rules.iter_mut().find(|r| r.id == def.id)
        {
            *existing = def;
        } else {
            rules.push(def);
        }
    }

    pub fn remove(&self, id: RuleId) {
        self.rules.lock().retain(|r| r.id != id);
    }
}

#[async_trait]
impl RuleSource for InMemoryRuleSource {
    async fn fetch_page(
        &self,
        link: &PageLink,
    ) -> Result<Page<RuleDef>, Error> {
        let rules = self.rules.lock();
        let start = link.page * link.size;
        let end = (start + link.size).min(rules.len());
        let items = if start < rules.len() {
            rules[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(Page {
            items,
            has_next: end < rules.len(),
        })
    }

    async fn find_by_id(&self, id: RuleId) -> Result<Option<RuleDef>, Error> {
        Ok(self.rules.lock().iter().find(|r| r.id == id).cloned())
    }
}

/// Chain source over a plain vector.
pub struct InMemoryChainSource {
    chains: Mutex<Vec<RuleChainDef>>,
}

impl InMemoryChainSource {
    pub fn new() -> Self {
        InMemoryChainSource {
            chains: Mutex::new(Vec::new()),
        }
    }

    pub fn put(&self, def: RuleChainDef) {
        let mut chains = self.chains.lock();
        if let Some(existing) =
            chains.iter_mut().find(|c| c.id == def.id)
        {
            *existing = def;
        } else {
            chains.push(def);
        }
    }
}

#[async_trait]
impl RuleChainSource for InMemoryChainSource {
    async fn fetch_page(
        &self,
        link: &PageLink,
    ) -> Result<Page<RuleChainDef>, Error> {
        let chains = self.chains.lock();
        let start = link.page * link.size;
        let end = (start + link.size).min(chains.len());
        let items = if start < chains.len() {
            chains[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(Page {
            items,
            has_next: end < chains.len(),
        })
    }

    async fn find_by_id(
        &self,
        id: RuleChainId,
    ) -> Result<Option<RuleChainDef>, Error> {
        Ok(self.chains.lock().iter().find(|c| c.id == id).cloned())
    }
}

/// What a scripted rule does with each message.
#[derive(Clone, Copy, Debug)]
pub enum RuleBehavior {
    Complete,
    Forward,
    Fail,
}

/// Processor whose behavior is scripted per rule. Records every processed
/// (rule, message) pair in order.
pub struct ScriptedProcessor {
    behaviors: Mutex<HashMap<RuleId, RuleBehavior>>,
    processed: Mutex<Vec<(RuleId, MsgId)>>,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        ScriptedProcessor {
            behaviors: Mutex::new(HashMap::new()),
            processed: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, rule_id: RuleId, behavior: RuleBehavior) {
        self.behaviors.lock().insert(rule_id, behavior);
    }

    pub fn processed(&self) -> Vec<(RuleId, MsgId)> {
        self.processed.lock().clone()
    }
}

#[async_trait]
impl RuleProcessor for ScriptedProcessor {
    async fn process(
        &self,
        rule_id: RuleId,
        msg: &EngineMsg,
    ) -> Result<ProcessOutcome, Error> {
        self.processed.lock().push((rule_id, msg.id));
        let behavior = self
            .behaviors
            .lock()
            .get(&rule_id)
            .copied()
            .unwrap_or(RuleBehavior::Complete);
        match behavior {
            RuleBehavior::Complete => Ok(ProcessOutcome::Complete),
            RuleBehavior::Forward => Ok(ProcessOutcome::Forward),
            RuleBehavior::Fail => {
                Err(Error::Processing("scripted failure".to_owned()))
            }
        }
    }
}

/// Callback counting terminal outcomes.
#[derive(Default)]
pub struct CountingCallback {
    pub acks: AtomicUsize,
    pub fails: AtomicUsize,
}

impl MsgCallback for CountingCallback {
    fn on_success(&self) {
        self.acks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failure(&self, _error: &Error) {
        self.fails.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn counted_msg() -> (EngineMsg, Arc<CountingCallback>) {
    let callback = Arc::new(CountingCallback::default());
    let msg = telemetry_msg().copied(None, callback.clone());
    (msg, callback)
}
