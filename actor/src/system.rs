//! System.
//!
//! The system owns the registry of running entities and the spawning
//! channel. Entities live under named execution lanes; the first path
//! segment is the lane name, so `/engine/tenant-3/chain-7` is the entity
//! `chain-7` under `tenant-3` in the `engine` lane. Lanes are purely a
//! naming scheme for grouping related trees.

use crate::{
    ActorPath, Error,
    actor::{Actor, ActorRef, ChildErrorSender, Event, Handler},
    runner::{ActorRunner, StopSender},
    sink::Sink,
};

use futures::future::BoxFuture;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::{any::Any, collections::HashMap, sync::Arc};

/// Default lane for entities created without an explicit lane.
const DEFAULT_LANE: &str = "user";

/// Creates a system and its runner.
///
/// The [`SystemRef`] is the cheap, cloneable handle used everywhere; the
/// [`SystemRunner`] must be driven (typically in a dedicated task) for
/// entities to actually run.
pub struct ActorSystem;

impl ActorSystem {
    pub fn create(token: Option<CancellationToken>) -> (SystemRef, SystemRunner) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = token.unwrap_or_default();
        let system = SystemRef::new(sender, token);
        let runner = SystemRunner::new(receiver, system.clone());
        (system, runner)
    }
}

type BoxedRef = Box<dyn Any + Send + Sync>;

/// Shared handle to the system: registry lookups, entity creation and
/// shutdown.
#[derive(Clone)]
pub struct SystemRef {
    /// Registry of running entities, keyed by path. Values are type-erased
    /// `ActorRef`s downcast on retrieval.
    actors: Arc<RwLock<HashMap<ActorPath, BoxedRef>>>,
    /// Stop senders of every running entity, for shutdown.
    stoppers: Arc<RwLock<HashMap<ActorPath, StopSender>>>,
    /// Channel delivering runner futures to the system runner.
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
    token: CancellationToken,
}

impl SystemRef {
    fn new(
        sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
        token: CancellationToken,
    ) -> Self {
        SystemRef {
            actors: Arc::new(RwLock::new(HashMap::new())),
            stoppers: Arc::new(RwLock::new(HashMap::new())),
            sender,
            token,
        }
    }

    /// The system's cancellation token. Cancelling it shuts the whole
    /// system down.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Retrieves an entity by path, if it is running and of type `A`.
    pub async fn get_actor<A>(&self, path: &ActorPath) -> Option<ActorRef<A>>
    where
        A: Actor + Handler<A>,
    {
        let actors = self.actors.read().await;
        actors
            .get(path)
            .and_then(|any| any.downcast_ref::<ActorRef<A>>().cloned())
    }

    /// Creates a top-level entity in the default lane, at `/user/{name}`.
    pub async fn create_root_actor<A>(
        &self,
        name: &str,
        actor: A,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor + Handler<A>,
    {
        self.create_lane_actor(DEFAULT_LANE, name, actor).await
    }

    /// Creates a top-level entity at `/{lane}/{name}`.
    ///
    /// The lane is a plain name; entities in different lanes share nothing
    /// but the system. Top-level entities have no supervising parent, so on
    /// failure they fall back to their own supervision strategy.
    pub async fn create_lane_actor<A>(
        &self,
        lane: &str,
        name: &str,
        actor: A,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor + Handler<A>,
    {
        let path = ActorPath::from(format!("/{}", lane)) / name;
        let (actor_ref, _) = self.create_actor_path(path, actor, None).await?;
        Ok(actor_ref)
    }

    /// Creates an entity at an exact path and spawns its runner. Fails if
    /// the path is already taken.
    pub(crate) async fn create_actor_path<A>(
        &self,
        path: ActorPath,
        actor: A,
        parent_sender: Option<ChildErrorSender>,
    ) -> Result<(ActorRef<A>, StopSender), Error>
    where
        A: Actor + Handler<A>,
    {
        debug!("Creating actor '{}' on system.", path);
        {
            let mut actors = self.actors.write().await;
            if actors.contains_key(&path) {
                return Err(Error::Exists(path));
            }
            let (mut runner, actor_ref) =
                ActorRunner::create(path.clone(), actor);
            let stop_sender = runner.stop_sender();

            actors.insert(path.clone(), Box::new(actor_ref.clone()));
            self.stoppers.write().await.insert(path, stop_sender.clone());

            let system = self.clone();
            let future =
                Box::pin(
                    async move { runner.run(system, parent_sender).await },
                );
            self.sender
                .send(future)
                .map_err(|e| Error::Start(e.to_string()))?;

            Ok((actor_ref, stop_sender))
        }
    }

    /// Removes an entity from the registry. Called by the runner during
    /// teardown.
    pub(crate) async fn remove_actor(&self, path: &ActorPath) {
        debug!("Removing actor '{}' from system.", path);
        self.actors.write().await.remove(path);
        self.stoppers.write().await.remove(path);
    }

    /// Spawns a sink, forwarding an entity's events to a subscriber until
    /// the event channel closes.
    pub fn run_sink<E: Event>(&self, mut sink: Sink<E>) {
        let future = Box::pin(async move { sink.run().await });
        if self.sender.send(future).is_err() {
            error!("Failed to run sink: system runner is gone.");
        }
    }

    /// Stops every top-level entity and waits for each to terminate.
    /// Children are stopped recursively by their parents.
    pub(crate) async fn stop_all(&self) {
        let top_level: Vec<(ActorPath, StopSender)> = {
            let stoppers = self.stoppers.read().await;
            stoppers
                .iter()
                .filter(|(path, _)| path.is_top_level())
                .map(|(path, sender)| (path.clone(), sender.clone()))
                .collect()
        };
        for (path, sender) in top_level {
            debug!("Stopping top-level actor '{}'.", path);
            let (confirm_sender, confirm_receiver) =
                tokio::sync::oneshot::channel();
            if sender.send(Some(confirm_sender)).await.is_ok() {
                let _ = confirm_receiver.await;
            }
        }
    }
}

/// Drives the system: spawns runner futures and performs the shutdown
/// sequence when the cancellation token fires.
pub struct SystemRunner {
    receiver: mpsc::UnboundedReceiver<BoxFuture<'static, ()>>,
    system: SystemRef,
}

impl SystemRunner {
    fn new(
        receiver: mpsc::UnboundedReceiver<BoxFuture<'static, ()>>,
        system: SystemRef,
    ) -> Self {
        SystemRunner { receiver, system }
    }

    /// Runs until the system token is cancelled or every `SystemRef` is
    /// dropped.
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                future = self.receiver.recv() => {
                    match future {
                        Some(future) => {
                            tokio::spawn(future);
                        }
                        None => {
                            debug!("System channel closed.");
                            break;
                        }
                    }
                }
                _ = self.system.token.cancelled() => {
                    debug!("System shutdown requested.");
                    self.system.stop_all().await;
                    break;
                }
            }
        }
    }
}
