//! Rule-engine message routing and supervision core.
//! Provides a supervised concurrent-entity runtime and, on top of it, the
//! multi-tenant rule-routing engine: per-scope managers, weighted actor
//! chains, ack-gated queue packs and the bounded reprocessing boundary.

pub use actor::{
    Actor, ActorContext, ActorLifecycle, ActorPath, ActorRef, ActorSystem,
    ChildAction, ChildError, Error as ActorError, Event, Handler, Message,
    Response, Sink, Subscriber, SupervisionStrategy, SystemRef, SystemRunner,
    supervision::{
        ExponentialBackoffStrategy, FixedIntervalStrategy,
        NoIntervalStrategy, RetryStrategy, WindowedStrategy,
    },
};

pub use engine::{
    ActorChain, ActorMeta, ChainCell, ComponentLifecycleEvent,
    ComponentState, EngineConfig, EngineMsg, Error as EngineError,
    FieldReprocessor, InMemoryMsgQueueService, MsgCallback, MsgDispatcher,
    MsgId, MsgQueuePack, MsgQueueService, MsgQueueState, NoopCallback,
    PackId, PackMemberCallback, PackPhase, Page, PageLink, ProcessOutcome,
    QueueKey, ReprocessingCallback, ReprocessingTask,
    ReprocessingTaskProcessor, RootChainDispatcher, RuleActor, RuleChainActor,
    RuleChainDef, RuleChainId, RuleChainManager, RuleChainSource, RuleDef,
    RuleEvent, RuleId, RuleManager, RuleNodeId, RuleProcessor, RuleSource,
    ScopeSupervisor, SupervisorMsg, SupervisorResponse, TenantId,
};
