//! Event sinks.
//!
//! A sink bridges an entity's broadcast event stream to a subscriber, for
//! side effects that must not run inside the entity itself.

use crate::actor::Event;

use async_trait::async_trait;
use tokio::sync::broadcast::{Receiver as EventReceiver, error::RecvError};
use tracing::{debug, warn};

/// Consumer of an entity's events.
#[async_trait]
pub trait Subscriber<E: Event>: Send + Sync {
    async fn notify(&self, event: E);
}

/// Forwards events from one entity to one subscriber.
pub struct Sink<E: Event> {
    receiver: EventReceiver<E>,
    subscriber: Box<dyn Subscriber<E>>,
}

impl<E: Event> Sink<E> {
    pub fn new(
        receiver: EventReceiver<E>,
        subscriber: Box<dyn Subscriber<E>>,
    ) -> Self {
        Sink {
            receiver,
            subscriber,
        }
    }

    /// Runs until the event channel closes. A lagged receiver skips the
    /// missed events and keeps going.
    pub async fn run(&mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => self.subscriber.notify(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Sink lagged, skipped {} events.", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Event channel closed, stopping sink.");
                    break;
                }
            }
        }
    }
}
