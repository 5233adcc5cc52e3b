//! Minimal supervised concurrency runtime.
//!
//! Entities own private state, process one message at a time from an
//! unbounded mailbox and form supervision trees: a parent answers each
//! child fault with a [`ChildAction`], one-for-one. Restart decisions are
//! bounded by a [`supervision::RetryStrategy`], optionally within a sliding
//! time window.
//!
//! ```ignore
//! let (system, mut runner) = ActorSystem::create(None);
//! tokio::spawn(async move { runner.run().await });
//! let actor_ref = system.create_root_actor("counter", Counter::default()).await?;
//! actor_ref.tell(CounterMessage::Increment).await?;
//! ```

mod actor;
mod error;
mod handler;
mod path;
mod runner;
mod sink;
pub mod supervision;
mod system;

pub use actor::{
    Actor, ActorContext, ActorLifecycle, ActorRef, ChildAction, ChildError,
    Event, Handler, Message, Response,
};
pub use error::Error;
pub use path::ActorPath;
pub use sink::{Sink, Subscriber};
pub use supervision::SupervisionStrategy;
pub use system::{ActorSystem, SystemRef, SystemRunner};
