//! Rule-engine routing, supervision and queueing core.
//!
//! Per-scope managers materialize one supervised entity per rule or rule
//! chain, keep a weighted routing chain consistent with the persisted
//! definitions, and feed it from a partitioned queue with strict per-bucket
//! flow control: one pack in flight, the next only after the previous one
//! fully acknowledged.

mod chain;
mod chain_manager;
mod config;
mod defs;
mod dispatch;
mod error;
mod ids;
mod lifecycle;
mod manager;
mod msg;
mod queue;
mod reprocess;
mod rule_actor;
mod supervisor;

pub use chain::{ActorChain, ActorMeta, ChainCell};
pub use chain_manager::RuleChainManager;
pub use config::EngineConfig;
pub use defs::{
    Page, PageLink, RuleChainDef, RuleChainSource, RuleDef, RuleSource,
};
pub use dispatch::RootChainDispatcher;
pub use error::Error;
pub use ids::{MsgId, PackId, RuleChainId, RuleId, RuleNodeId, TenantId};
pub use lifecycle::{ComponentLifecycleEvent, ComponentState};
pub use manager::RuleManager;
pub use msg::{EngineMsg, MsgCallback, NoopCallback};
pub use queue::{
    InMemoryMsgQueueService, MsgDispatcher, MsgQueuePack, MsgQueueService,
    MsgQueueState, PackMemberCallback, PackPhase, QueueKey,
};
pub use reprocess::{
    FieldReprocessor, ReprocessingCallback, ReprocessingTask,
    ReprocessingTaskProcessor,
};
pub use rule_actor::{
    ProcessOutcome, RuleActor, RuleChainActor, RuleEvent, RuleProcessor,
};
pub use supervisor::{ScopeSupervisor, SupervisorMsg, SupervisorResponse};
