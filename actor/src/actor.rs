//! Core entity model.
//!
//! A concurrent entity is a unit with private state, a mailbox and a
//! supervised lifecycle. It processes one message at a time and never shares
//! mutable state: every interaction goes through an [`ActorRef`], either
//! fire-and-forget (`tell`) or request-response (`ask`).
//!
//! Entities form a supervision tree. A parent observes its children's
//! failures through the [`ChildError`] channel and answers each fault with a
//! [`ChildAction`]; the decision applies to the failing child only
//! (one-for-one), siblings keep running.

use crate::{
    ActorPath, Error,
    handler::MailboxHandle,
    runner::{InnerAction, InnerSender, StopSender},
    supervision::SupervisionStrategy,
    system::SystemRef,
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{
    broadcast::Receiver as EventReceiver,
    mpsc, oneshot,
};
use tracing::{debug, error};

use std::fmt::Debug;

/// Marker trait for messages that can be sent to an entity.
pub trait Message: Clone + Send + Sync + 'static {}

impl Message for () {}

/// Marker trait for responses returned from ask-pattern interactions.
pub trait Response: Send + Sync + 'static {}

impl Response for () {}

/// Marker trait for events an entity can publish to its subscribers.
pub trait Event:
    Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static
{
}

impl Event for () {}

/// Lifecycle states driven by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorLifecycle {
    /// Constructed and registered, `pre_start` not yet called.
    Created,
    /// Actively processing messages.
    Started,
    /// A failure triggered a restart; the supervision strategy is applied.
    Restarted,
    /// A failure occurred and no supervision decision has been made yet.
    Failed,
    /// Shutdown in progress; children are stopped and hooks run.
    Stopped,
    /// Final state; the entity has been removed from the registry.
    Terminated,
}

/// Supervision decision a parent takes when a child reports a fault.
#[derive(Debug, Clone)]
pub enum ChildAction {
    /// Tear the child down. Its mailbox is drained and pending senders get
    /// "entity gone" errors.
    Stop,
    /// Discard the child's state and reconstruct it with the same identity,
    /// bounded by the child's retry budget.
    Restart,
    /// Defer to the child's own supervision strategy.
    Delegate,
}

/// Default fault decision: the coarse two-bucket policy. Business-level
/// (`Functional`) failures are restart-worthy, everything else is fatal. Rule
/// processors surface business errors this way, so the policy is kept binary
/// on purpose.
pub fn default_child_action(error: &Error) -> ChildAction {
    if error.is_functional() {
        ChildAction::Restart
    } else {
        ChildAction::Stop
    }
}

/// Child error receiver.
pub(crate) type ChildErrorReceiver = mpsc::UnboundedReceiver<ChildError>;

/// Child error sender.
pub(crate) type ChildErrorSender = mpsc::UnboundedSender<ChildError>;

/// Failure reports flowing from a child to its supervising parent.
pub enum ChildError {
    /// Non-fatal error: the child keeps running, the parent is informed.
    Error { error: Error },
    /// Fatal fault: the child is suspended until the parent answers with a
    /// [`ChildAction`] through `sender`.
    Fault {
        error: Error,
        sender: oneshot::Sender<ChildAction>,
    },
}

/// The fundamental trait every concurrent entity implements.
///
/// Lifecycle hooks default to no-ops; override them to allocate or release
/// resources. `supervision_strategy` defaults to `Stop`: an entity that
/// fails without an explicit retry budget is torn down.
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static + Handler<Self> {
    /// The message type this entity processes.
    type Message: Message;
    /// The event type this entity publishes.
    type Event: Event;
    /// The response type for ask-pattern interactions.
    type Response: Response;

    /// Strategy applied when this entity fails and either has no parent or
    /// its parent answered `Delegate`/`Restart`.
    fn supervision_strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::Stop
    }

    /// Called once before the entity starts processing messages.
    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called on restart, before the entity re-enters the started state.
    /// The default discards nothing; override to reset state.
    async fn pre_restart(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        _error: Option<&Error>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called when a stop has been requested, before children are stopped.
    async fn pre_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called after the entity stopped, right before termination.
    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Message processing and child-failure hooks.
#[async_trait]
pub trait Handler<A: Actor + Handler<A>>: Send + Sync {
    /// Processes one message. Called strictly sequentially per entity.
    async fn handle_message(
        &mut self,
        sender: ActorPath,
        msg: A::Message,
        ctx: &mut ActorContext<A>,
    ) -> Result<A::Response, Error>;

    /// Called when a child reports a non-fatal error. Default: log it.
    async fn on_child_error(
        &mut self,
        error: Error,
        ctx: &mut ActorContext<A>,
    ) {
        debug!("Child of {} reported error: {}", ctx.path(), error);
    }

    /// Called when a child reports a fatal fault. The returned action applies
    /// to that child only. Default: the coarse two-bucket policy.
    async fn on_child_fault(
        &mut self,
        error: Error,
        ctx: &mut ActorContext<A>,
    ) -> ChildAction {
        debug!("Child of {} faulted: {}", ctx.path(), error);
        default_child_action(&error)
    }
}

/// Execution context handed to every handler invocation.
///
/// Provides access to the system, the entity's path, child creation and the
/// error/failure reporting channels to the parent.
pub struct ActorContext<A: Actor + Handler<A>> {
    /// Sender for stopping this entity.
    stop: StopSender,
    /// Path of this entity in the system tree.
    path: ActorPath,
    /// Reference to the system for registry operations.
    system: SystemRef,
    /// Error recorded by the last failure, if any.
    error: Option<Error>,
    /// Channel children use to report errors to this entity.
    error_sender: ChildErrorSender,
    /// Internal channel to the runner (events, errors, faults).
    inner_sender: InnerSender<A>,
    /// Stop senders of supervised children, in creation order.
    child_senders: Vec<StopSender>,
}

impl<A> ActorContext<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(
        stop: StopSender,
        path: ActorPath,
        system: SystemRef,
        error_sender: ChildErrorSender,
        inner_sender: InnerSender<A>,
    ) -> Self {
        Self {
            stop,
            path,
            system,
            error: None,
            error_sender,
            inner_sender,
            child_senders: Vec::new(),
        }
    }

    /// Invokes the entity's restart hook. Used by the runner when applying a
    /// restart decision.
    pub(crate) async fn restart(
        &mut self,
        actor: &mut A,
        error: Option<&Error>,
    ) -> Result<(), Error> {
        actor.pre_restart(self, error).await
    }

    /// Path of this entity.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Reference to the system.
    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// A reference to this entity, if it is still registered.
    pub async fn reference(&self) -> Option<ActorRef<A>> {
        self.system.get_actor(&self.path).await
    }

    /// A reference to the parent entity, if any and of the right type.
    pub async fn parent<P: Actor + Handler<P>>(&self) -> Option<ActorRef<P>> {
        self.system.get_actor(&self.path.parent()).await
    }

    /// Creates a child entity under this one. The child reports errors and
    /// faults to this entity, which supervises it one-for-one.
    pub async fn create_child<C>(
        &mut self,
        name: &str,
        actor: C,
    ) -> Result<ActorRef<C>, Error>
    where
        C: Actor + Handler<C>,
    {
        let path = self.path.clone() / name;
        let (actor_ref, stop_sender) = self
            .system
            .create_actor_path(path, actor, Some(self.error_sender.clone()))
            .await?;

        self.child_senders.push(stop_sender);
        Ok(actor_ref)
    }

    /// Looks up a child of this entity by name.
    pub async fn get_child<C>(&self, name: &str) -> Option<ActorRef<C>>
    where
        C: Actor + Handler<C>,
    {
        let path = self.path.clone() / name;
        self.system.get_actor(&path).await
    }

    /// Stops all children, last created first, waiting for each to confirm.
    pub(crate) async fn stop_childs(&mut self) {
        while let Some(sender) = self.child_senders.pop() {
            let (stop_sender, stop_receiver) = oneshot::channel();
            if sender.send(Some(stop_sender)).await.is_err() {
                continue;
            } else {
                let _ = stop_receiver.await;
            }
        }
    }

    /// Removes this entity from the system registry.
    pub(crate) async fn remove_actor(&self) {
        self.system.remove_actor(&self.path).await;
    }

    /// Requests a graceful stop of this entity.
    pub async fn stop(&self, sender: Option<oneshot::Sender<()>>) {
        debug!("Stopping actor from handle reference.");
        let _ = self.stop.send(sender).await;
    }

    /// Publishes an event to all subscribers of this entity.
    pub async fn publish_event(&self, event: A::Event) -> Result<(), Error> {
        self.inner_sender
            .send(InnerAction::Event(event))
            .map_err(|e| Error::SendEvent(e.to_string()))
    }

    /// Reports a non-fatal error to the parent. The entity keeps running.
    pub async fn emit_error(&mut self, error: Error) -> Result<(), Error> {
        self.inner_sender
            .send(InnerAction::Error(error))
            .map_err(|e| Error::Send(e.to_string()))
    }

    /// Reports a fatal fault. The entity suspends message processing until
    /// the supervision decision is applied.
    pub async fn emit_fail(&mut self, error: Error) -> Result<(), Error> {
        self.set_error(error.clone());
        self.inner_sender
            .send(InnerAction::Fail(error))
            .map_err(|e| Error::Send(e.to_string()))
    }

    /// Last recorded error, if any.
    pub fn error(&self) -> Option<Error> {
        self.error.clone()
    }

    pub(crate) fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    pub(crate) fn clean_error(&mut self) {
        self.error = None;
    }
}

/// A reference to a concurrent entity.
///
/// The only way to interact with an entity: send it messages, subscribe to
/// its events or request a stop. References are cheap to clone and safe to
/// share across tasks.
pub struct ActorRef<A>
where
    A: Actor + Handler<A>,
{
    path: ActorPath,
    sender: MailboxHandle<A>,
    event_receiver: EventReceiver<<A as Actor>::Event>,
    stop_sender: StopSender,
}

impl<A> ActorRef<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(
        path: ActorPath,
        sender: MailboxHandle<A>,
        stop_sender: StopSender,
        event_receiver: EventReceiver<<A as Actor>::Event>,
    ) -> Self {
        Self {
            path,
            sender,
            stop_sender,
            event_receiver,
        }
    }

    /// Fire-and-forget send.
    pub async fn tell(&self, message: A::Message) -> Result<(), Error> {
        self.sender.tell(self.path(), message).await
    }

    /// Request-response send.
    pub async fn ask(&self, message: A::Message) -> Result<A::Response, Error> {
        self.sender.ask(self.path(), message).await
    }

    /// Requests a stop and waits for the entity to confirm it.
    pub async fn ask_stop(&self) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();
        self.stop_sender
            .send(Some(sender))
            .await
            .map_err(|e| Error::Send(e.to_string()))?;
        receiver.await.map_err(|_| Error::Stop)
    }

    /// Requests a stop without waiting.
    pub async fn tell_stop(&self) {
        if self.stop_sender.send(None).await.is_err() {
            error!("Failed to send stop signal to actor {}!", self.path);
        }
    }

    /// Subscribes to this entity's event stream.
    pub fn subscribe(&self) -> EventReceiver<<A as Actor>::Event> {
        self.event_receiver.resubscribe()
    }

    /// Path of the referenced entity.
    pub fn path(&self) -> ActorPath {
        self.path.clone()
    }

    /// True if the entity's mailbox no longer accepts messages.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<A> Clone for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            sender: self.sender.clone(),
            event_receiver: self.event_receiver.resubscribe(),
            stop_sender: self.stop_sender.clone(),
        }
    }
}

impl<A> Debug for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef").field("path", &self.path).finish()
    }
}
