//! Rule and rule chain entities.

use crate::{
    chain::ChainCell,
    error::Error,
    ids::{MsgId, RuleChainId, RuleId, TenantId},
    msg::EngineMsg,
};

use actor::{
    Actor, ActorContext, ActorPath, Error as ActorError, Event, Handler,
    SupervisionStrategy, supervision::WindowedStrategy,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use std::{sync::Arc, time::Duration};

/// Outcome of processing one message in one rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The message is done; ack it.
    Complete,
    /// Hand the message to the next eligible rule in the chain.
    Forward,
}

/// The rule evaluation collaborator. Expression evaluation is out of scope;
/// the routing core only cares about the outcome and the error bucket. One
/// processor instance serves every rule of a scope, so it receives the rule
/// identity with each call.
#[async_trait]
pub trait RuleProcessor: Send + Sync {
    async fn process(
        &self,
        rule_id: RuleId,
        msg: &EngineMsg,
    ) -> Result<ProcessOutcome, Error>;
}

/// Events published by a rule entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RuleEvent {
    Processed { msg_id: MsgId },
    Forwarded { msg_id: MsgId, to: RuleId },
    Failed { msg_id: MsgId },
}

impl Event for RuleEvent {}

/// Concurrent entity for one rule. Processes one message at a time through
/// the injected processor; business failures ack the message as failed and
/// surface as restart-worthy faults to the supervising scope.
#[derive(Clone)]
pub struct RuleActor {
    rule_id: RuleId,
    tenant_id: TenantId,
    processor: Arc<dyn RuleProcessor>,
    /// Shared snapshot of the scope's chain, for forwarding.
    chain: Arc<ChainCell<RuleId, RuleActor>>,
    max_restarts: usize,
    restart_window: Duration,
}

impl RuleActor {
    pub fn new(
        rule_id: RuleId,
        tenant_id: TenantId,
        processor: Arc<dyn RuleProcessor>,
        chain: Arc<ChainCell<RuleId, RuleActor>>,
        max_restarts: usize,
        restart_window: Duration,
    ) -> Self {
        RuleActor {
            rule_id,
            tenant_id,
            processor,
            chain,
            max_restarts,
            restart_window,
        }
    }

    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[async_trait]
impl Actor for RuleActor {
    type Message = EngineMsg;
    type Event = RuleEvent;
    type Response = ();

    fn supervision_strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::Retry(Box::new(WindowedStrategy::new(
            self.max_restarts,
            self.restart_window,
        )))
    }
}

#[async_trait]
impl Handler<RuleActor> for RuleActor {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: EngineMsg,
        ctx: &mut ActorContext<RuleActor>,
    ) -> Result<(), ActorError> {
        let msg_id = msg.id;
        match self.processor.process(self.rule_id, &msg).await {
            Ok(ProcessOutcome::Complete) => {
                debug!("Rule {} completed message {}.", self.rule_id, msg_id);
                msg.ack();
                ctx.publish_event(RuleEvent::Processed { msg_id }).await?;
                Ok(())
            }
            Ok(ProcessOutcome::Forward) => {
                let chain = self.chain.load();
                match chain.next_after(self.rule_id) {
                    Some(next) => {
                        let to = next.id;
                        if let Err(err) = next.handle.tell(msg.clone()).await {
                            warn!(
                                "Rule {} cannot forward message {} to {}: {}",
                                self.rule_id, msg_id, to, err
                            );
                            msg.fail(&Error::Actor(err));
                            ctx.publish_event(RuleEvent::Failed { msg_id })
                                .await?;
                        } else {
                            ctx.publish_event(RuleEvent::Forwarded {
                                msg_id,
                                to,
                            })
                            .await?;
                        }
                    }
                    None => {
                        // End of chain; the last rule owns the ack.
                        msg.ack();
                        ctx.publish_event(RuleEvent::Processed { msg_id })
                            .await?;
                    }
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Rule {} of tenant {} failed message {}: {}",
                    self.rule_id, self.tenant_id, msg_id, err
                );
                msg.fail(&err);
                ctx.publish_event(RuleEvent::Failed { msg_id }).await?;
                ctx.emit_fail(ActorError::Functional(err.to_string()))
                    .await?;
                Ok(())
            }
        }
    }
}

/// Concurrent entity for one rule chain: the routing entry point. Dispatches
/// each inbound message to the first eligible rule of the current snapshot.
#[derive(Clone)]
pub struct RuleChainActor {
    chain_id: RuleChainId,
    tenant_id: TenantId,
    rules: Arc<ChainCell<RuleId, RuleActor>>,
}

impl RuleChainActor {
    pub fn new(
        chain_id: RuleChainId,
        tenant_id: TenantId,
        rules: Arc<ChainCell<RuleId, RuleActor>>,
    ) -> Self {
        RuleChainActor {
            chain_id,
            tenant_id,
            rules,
        }
    }

    pub fn chain_id(&self) -> RuleChainId {
        self.chain_id
    }
}

#[async_trait]
impl Actor for RuleChainActor {
    type Message = EngineMsg;
    type Event = ();
    type Response = ();
}

#[async_trait]
impl Handler<RuleChainActor> for RuleChainActor {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        mut msg: EngineMsg,
        _ctx: &mut ActorContext<RuleChainActor>,
    ) -> Result<(), ActorError> {
        msg.chain_id = Some(self.chain_id);
        let chain = self.rules.load();
        match chain.first() {
            Some(entry) => {
                if let Err(err) = entry.handle.tell(msg.clone()).await {
                    warn!(
                        "Chain {} cannot dispatch message {} to rule {}: {}",
                        self.chain_id, msg.id, entry.id, err
                    );
                    msg.fail(&Error::Actor(err));
                }
            }
            None => {
                // An empty chain is an expected state for a tenant without
                // active rules; the message still gets a terminal outcome.
                warn!(
                    "Chain {} of tenant {} has no active rules, acking \
                     message {}.",
                    self.chain_id, self.tenant_id, msg.id
                );
                msg.ack();
            }
        }
        Ok(())
    }
}
