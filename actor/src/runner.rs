//! Entity runner.
//!
//! One runner task per entity drives its whole life: start hooks, the
//! sequential message loop, failure reporting to the parent, supervised
//! restarts and the final teardown. The runner is the only consumer of the
//! entity's mailbox.

use crate::{
    ActorPath, Error,
    actor::{
        Actor, ActorContext, ActorLifecycle, ActorRef, ChildAction,
        ChildError, ChildErrorReceiver, ChildErrorSender, Handler,
        default_child_action,
    },
    handler::{MailboxHandle, MailboxReceiver, mailbox},
    supervision::{RestartWindow, SupervisionStrategy},
    system::SystemRef,
};

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time,
};
use tracing::{debug, error, warn};

/// Internal actions an entity raises from inside its own handler.
pub(crate) enum InnerAction<A>
where
    A: Actor + Handler<A>,
{
    /// Publish an event to subscribers.
    Event(A::Event),
    /// Report a non-fatal error to the parent; keep processing.
    Error(Error),
    /// Fatal fault; suspend processing until supervision decides.
    Fail(Error),
}

pub(crate) type InnerSender<A> = mpsc::UnboundedSender<InnerAction<A>>;
pub(crate) type InnerReceiver<A> = mpsc::UnboundedReceiver<InnerAction<A>>;

/// Stop signal. Carries an optional oneshot that is resolved once teardown
/// is complete.
pub(crate) type StopSignal = Option<oneshot::Sender<()>>;
pub(crate) type StopSender = mpsc::Sender<StopSignal>;
pub(crate) type StopReceiver = mpsc::Receiver<StopSignal>;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Owns an entity and runs its lifecycle state machine.
pub(crate) struct ActorRunner<A>
where
    A: Actor + Handler<A>,
{
    actor: A,
    path: ActorPath,
    receiver: MailboxReceiver<A>,
    event_sender: broadcast::Sender<A::Event>,
    inner_sender: InnerSender<A>,
    inner_receiver: InnerReceiver<A>,
    stop_sender: StopSender,
    stop_receiver: StopReceiver,
    /// Reports from this entity's children.
    child_error_sender: ChildErrorSender,
    child_error_receiver: ChildErrorReceiver,
    lifecycle: ActorLifecycle,
    window: RestartWindow,
}

impl<A> ActorRunner<A>
where
    A: Actor + Handler<A>,
{
    /// Creates a runner and the handles an `ActorRef` needs.
    pub(crate) fn create(
        path: ActorPath,
        actor: A,
    ) -> (Self, ActorRef<A>) {
        debug!("Creating new actor runner.");
        let (mailbox_sender, receiver) = mailbox();
        let (event_sender, event_receiver) =
            broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (inner_sender, inner_receiver) = mpsc::unbounded_channel();
        let (stop_sender, stop_receiver) = mpsc::channel(1);
        let (child_error_sender, child_error_receiver) =
            mpsc::unbounded_channel();

        let actor_ref = ActorRef::new(
            path.clone(),
            MailboxHandle::new(mailbox_sender),
            stop_sender.clone(),
            event_receiver,
        );

        let runner = ActorRunner {
            actor,
            path,
            receiver,
            event_sender,
            inner_sender,
            inner_receiver,
            stop_sender,
            stop_receiver,
            child_error_sender,
            child_error_receiver,
            lifecycle: ActorLifecycle::Created,
            window: RestartWindow::default(),
        };

        (runner, actor_ref)
    }

    pub(crate) fn stop_sender(&self) -> StopSender {
        self.stop_sender.clone()
    }

    /// Drives the entity until termination.
    ///
    /// `parent_sender` is the error channel of the supervising parent; `None`
    /// for top-level entities, which then fall back to their own strategy on
    /// failure.
    pub(crate) async fn run(
        &mut self,
        system: SystemRef,
        parent_sender: Option<ChildErrorSender>,
    ) {
        let mut ctx: ActorContext<A> = ActorContext::new(
            self.stop_sender.clone(),
            self.path.clone(),
            system,
            self.child_error_sender.clone(),
            self.inner_sender.clone(),
        );

        let mut stop_confirmation: StopSignal = None;

        loop {
            match self.lifecycle {
                ActorLifecycle::Created => {
                    debug!("Actor {} is created.", self.path);
                    match self.actor.pre_start(&mut ctx).await {
                        Ok(_) => {
                            self.lifecycle = ActorLifecycle::Started;
                        }
                        Err(err) => {
                            error!(
                                "Failed to start actor {}: {}",
                                self.path, err
                            );
                            ctx.set_error(Error::Start(err.to_string()));
                            self.lifecycle = ActorLifecycle::Failed;
                        }
                    }
                }
                ActorLifecycle::Started => {
                    debug!("Actor {} is started.", self.path);
                    stop_confirmation = self
                        .message_loop(&mut ctx, &parent_sender)
                        .await
                        .or(stop_confirmation);
                }
                ActorLifecycle::Failed => {
                    debug!("Actor {} has failed.", self.path);
                    let error =
                        ctx.error().unwrap_or(Error::Restart(
                            "unknown failure".to_owned(),
                        ));
                    let action =
                        self.consult_parent(&parent_sender, &error).await;
                    match action {
                        ChildAction::Stop => {
                            self.lifecycle = ActorLifecycle::Stopped;
                        }
                        ChildAction::Restart | ChildAction::Delegate => {
                            self.lifecycle = ActorLifecycle::Restarted;
                        }
                    }
                }
                ActorLifecycle::Restarted => {
                    debug!("Actor {} is restarting.", self.path);
                    self.apply_supervision_strategy(&mut ctx).await;
                }
                ActorLifecycle::Stopped => {
                    debug!("Actor {} is stopped.", self.path);
                    if let Err(err) = self.actor.pre_stop(&mut ctx).await {
                        error!(
                            "Error in pre_stop of actor {}: {}",
                            self.path, err
                        );
                    }
                    ctx.stop_childs().await;
                    if let Err(err) = self.actor.post_stop(&mut ctx).await {
                        error!(
                            "Error in post_stop of actor {}: {}",
                            self.path, err
                        );
                    }
                    ctx.remove_actor().await;
                    self.receiver.close();
                    // Drain: pending ask envelopes resolve with an error on
                    // the caller side once their reply senders drop.
                    while self.receiver.try_recv().is_ok() {}
                    self.lifecycle = ActorLifecycle::Terminated;
                }
                ActorLifecycle::Terminated => {
                    debug!("Actor {} is terminated.", self.path);
                    if let Some(confirmation) = stop_confirmation.take() {
                        let _ = confirmation.send(());
                    }
                    break;
                }
            }
        }
    }

    /// The main select loop. Returns the stop confirmation sender when the
    /// loop was left because of a stop request.
    async fn message_loop(
        &mut self,
        ctx: &mut ActorContext<A>,
        parent_sender: &Option<ChildErrorSender>,
    ) -> StopSignal {
        loop {
            tokio::select! {
                signal = self.stop_receiver.recv() => {
                    self.lifecycle = ActorLifecycle::Stopped;
                    return signal.flatten();
                }
                inner = self.inner_receiver.recv() => {
                    if let Some(action) = inner {
                        if self.inner_handle(action, ctx, parent_sender).await
                        {
                            return None;
                        }
                    }
                }
                report = self.child_error_receiver.recv() => {
                    if let Some(report) = report {
                        self.child_handle(report, ctx).await;
                    }
                }
                envelope = self.receiver.recv() => {
                    match envelope {
                        Some(mut envelope) => {
                            envelope.handle(&mut self.actor, ctx).await;
                        }
                        None => {
                            self.lifecycle = ActorLifecycle::Stopped;
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Handles an internal action. Returns true when the message loop must
    /// be left because the entity failed.
    async fn inner_handle(
        &mut self,
        action: InnerAction<A>,
        ctx: &mut ActorContext<A>,
        parent_sender: &Option<ChildErrorSender>,
    ) -> bool {
        match action {
            InnerAction::Event(event) => {
                // A send error only means there are no subscribers.
                let _ = self.event_sender.send(event);
                false
            }
            InnerAction::Error(error) => {
                warn!("Actor {} reported error: {}", self.path, error);
                if let Some(parent) = parent_sender {
                    let _ = parent.send(ChildError::Error {
                        error: error.clone(),
                    });
                }
                ctx.set_error(error);
                false
            }
            InnerAction::Fail(error) => {
                error!("Actor {} failed: {}", self.path, error);
                ctx.set_error(error);
                self.lifecycle = ActorLifecycle::Failed;
                true
            }
        }
    }

    /// Dispatches a child report to the entity's supervision hooks.
    async fn child_handle(
        &mut self,
        report: ChildError,
        ctx: &mut ActorContext<A>,
    ) {
        match report {
            ChildError::Error { error } => {
                self.actor.on_child_error(error, ctx).await;
            }
            ChildError::Fault { error, sender } => {
                let action = self.actor.on_child_fault(error, ctx).await;
                if sender.send(action).is_err() {
                    warn!(
                        "Child of {} is gone before receiving its \
                         supervision decision.",
                        self.path
                    );
                }
            }
        }
    }

    /// Reports a fault upward and waits for the parent's decision. Without a
    /// parent the entity answers for itself with the default policy.
    async fn consult_parent(
        &self,
        parent_sender: &Option<ChildErrorSender>,
        error: &Error,
    ) -> ChildAction {
        let Some(parent) = parent_sender else {
            return default_child_action(error);
        };
        let (sender, receiver) = oneshot::channel();
        let report = ChildError::Fault {
            error: error.clone(),
            sender,
        };
        if parent.send(report).is_err() {
            warn!("Parent of {} is gone; stopping.", self.path);
            return ChildAction::Stop;
        }
        receiver.await.unwrap_or(ChildAction::Stop)
    }

    /// Applies the entity's supervision strategy after a fault.
    ///
    /// `Stop` tears the entity down. `Retry` grants one restart per recorded
    /// failure as long as the budget holds; a failure past the budget, or a
    /// `pre_restart` error once the budget is spent, ends in `Stopped`.
    async fn apply_supervision_strategy(
        &mut self,
        ctx: &mut ActorContext<A>,
    ) {
        match self.actor.supervision_strategy() {
            SupervisionStrategy::Stop => {
                debug!("Stop strategy for actor {}.", self.path);
                self.lifecycle = ActorLifecycle::Stopped;
            }
            SupervisionStrategy::Retry(mut strategy) => {
                loop {
                    let allowed = self.window.record(
                        strategy.max_retries(),
                        strategy.within_window(),
                    );
                    if !allowed {
                        warn!(
                            "Restart budget exhausted for actor {}.",
                            self.path
                        );
                        self.lifecycle = ActorLifecycle::Stopped;
                        return;
                    }
                    if let Some(duration) = strategy.next_backoff() {
                        debug!("Backoff for {:?} before restart.", duration);
                        time::sleep(duration).await;
                    }
                    let error = ctx.error();
                    match ctx.restart(&mut self.actor, error.as_ref()).await {
                        Ok(_) => {
                            ctx.clean_error();
                            self.lifecycle = ActorLifecycle::Started;
                            return;
                        }
                        Err(err) => {
                            error!(
                                "Restart of actor {} failed: {}",
                                self.path, err
                            );
                            ctx.set_error(err);
                        }
                    }
                }
            }
        }
    }
}
