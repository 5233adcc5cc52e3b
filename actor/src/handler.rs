//! Mailbox plumbing.
//!
//! Each concurrent entity owns exactly one unbounded mailbox, and exactly one
//! runner ever consumes it. That single-consumer property is what enforces
//! strictly sequential message processing per entity; nothing else in the
//! runtime serializes handlers.

use crate::{
    ActorPath, Error,
    actor::{Actor, ActorContext, Handler},
};

use async_trait::async_trait;

use tokio::sync::{mpsc, oneshot};

use tracing::{debug, error};

/// Type-erased message handling, so that tell- and ask-style envelopes can
/// share one mailbox.
#[async_trait]
pub trait MessageHandler<A: Actor>: Send + Sync {
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>);
}

/// Mailbox envelope: the message plus the sender path and, for the ask
/// pattern, a oneshot to carry the response back.
struct ActorMessage<A>
where
    A: Actor + Handler<A>,
{
    message: A::Message,
    sender: ActorPath,
    /// `Some` for ask (the handler result is sent back), `None` for tell.
    reply_to: Option<oneshot::Sender<Result<A::Response, Error>>>,
}

impl<A> ActorMessage<A>
where
    A: Actor + Handler<A>,
{
    fn new(
        message: A::Message,
        sender: ActorPath,
        reply_to: Option<oneshot::Sender<Result<A::Response, Error>>>,
    ) -> Self {
        Self {
            message,
            sender,
            reply_to,
        }
    }
}

#[async_trait]
impl<A> MessageHandler<A> for ActorMessage<A>
where
    A: Actor + Handler<A>,
{
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>) {
        let result = actor
            .handle_message(self.sender.clone(), self.message.clone(), ctx)
            .await;

        if let Some(reply_to) = self.reply_to.take() {
            reply_to.send(result).unwrap_or_else(|_failed| {
                error!("Failed to send back response!");
            })
        }
    }
}

/// Boxed message handler for type-erased message handling.
pub type BoxedMessageHandler<A> = Box<dyn MessageHandler<A>>;

/// Consumer side of an entity's mailbox. Owned by the runner.
pub type MailboxReceiver<A> = mpsc::UnboundedReceiver<BoxedMessageHandler<A>>;

/// Producer side of an entity's mailbox. Cloned into every `ActorRef`.
pub type MailboxSender<A> = mpsc::UnboundedSender<BoxedMessageHandler<A>>;

pub type Mailbox<A> = (MailboxSender<A>, MailboxReceiver<A>);

/// Creates a new unbounded mailbox. Sends never block; backpressure is the
/// responsibility of the layer admitting work (the queue pack mechanism).
pub fn mailbox<A>() -> Mailbox<A>
where
    A: Actor + Handler<A>,
{
    mpsc::unbounded_channel()
}

/// Typed sending facade over a mailbox sender, providing the tell and ask
/// patterns.
pub struct MailboxHandle<A>
where
    A: Actor + Handler<A>,
{
    sender: MailboxSender<A>,
}

impl<A> MailboxHandle<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(sender: MailboxSender<A>) -> Self {
        debug!("Creating new handle reference.");
        Self { sender }
    }

    /// Fire-and-forget send.
    pub(crate) async fn tell(
        &self,
        sender: ActorPath,
        message: A::Message,
    ) -> Result<(), Error> {
        let msg = ActorMessage::new(message, sender, None);
        self.sender
            .send(Box::new(msg))
            .map_err(|error| Error::Send(error.to_string()))
    }

    /// Request-response send. Resolves when the entity has processed the
    /// message; fails if the entity is gone before replying.
    pub(crate) async fn ask(
        &self,
        sender: ActorPath,
        message: A::Message,
    ) -> Result<A::Response, Error> {
        let (response_sender, response_receiver) = oneshot::channel();
        let msg = ActorMessage::new(message, sender, Some(response_sender));
        if let Err(error) = self.sender.send(Box::new(msg)) {
            error!("Failed to ask message! {}", error.to_string());
            Err(Error::Send(error.to_string()))
        } else {
            response_receiver
                .await
                .map_err(|error| Error::Send(error.to_string()))?
        }
    }

    /// Waits until every sender is dropped.
    pub async fn close(&self) {
        self.sender.closed().await;
    }

    /// True if the mailbox cannot receive more messages.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<A> Clone for MailboxHandle<A>
where
    A: Actor + Handler<A>,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
