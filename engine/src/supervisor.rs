//! Scope supervisor.
//!
//! One supervising entity per scope (system, or one tenant) owns every rule
//! or rule chain entity of that scope. Children are spawned on demand; a
//! child fault is answered one-for-one with the two-bucket policy, so a
//! failing rule never stops or restarts its siblings.

use actor::{
    Actor, ActorContext, ActorPath, ActorRef, Error as ActorError, Handler,
    Message, Response,
};

use async_trait::async_trait;
use tracing::debug;

use std::marker::PhantomData;

/// Commands for a scope supervisor over children of type `C`.
pub enum SupervisorMsg<C> {
    /// Spawn a child under the supervisor, or return the existing handle if
    /// the name is already taken.
    Spawn { name: String, child: C },
}

impl<C: Clone> Clone for SupervisorMsg<C> {
    fn clone(&self) -> Self {
        match self {
            SupervisorMsg::Spawn { name, child } => SupervisorMsg::Spawn {
                name: name.clone(),
                child: child.clone(),
            },
        }
    }
}

impl<C> Message for SupervisorMsg<C> where
    C: Actor + Handler<C> + Clone
{
}

pub enum SupervisorResponse<C>
where
    C: Actor + Handler<C>,
{
    Spawned(ActorRef<C>),
}

impl<C> Response for SupervisorResponse<C> where C: Actor + Handler<C> {}

/// Supervising entity for one scope. Carries no state of its own; the
/// children and their stop senders live in the entity context.
pub struct ScopeSupervisor<C> {
    marker: PhantomData<fn() -> C>,
}

impl<C> Default for ScopeSupervisor<C> {
    fn default() -> Self {
        ScopeSupervisor {
            marker: PhantomData,
        }
    }
}

#[async_trait]
impl<C> Actor for ScopeSupervisor<C>
where
    C: Actor + Handler<C> + Clone,
{
    type Message = SupervisorMsg<C>;
    type Event = ();
    type Response = SupervisorResponse<C>;
}

#[async_trait]
impl<C> Handler<ScopeSupervisor<C>> for ScopeSupervisor<C>
where
    C: Actor + Handler<C> + Clone,
{
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: SupervisorMsg<C>,
        ctx: &mut ActorContext<ScopeSupervisor<C>>,
    ) -> Result<SupervisorResponse<C>, ActorError> {
        match msg {
            SupervisorMsg::Spawn { name, child } => {
                if let Some(existing) = ctx.get_child::<C>(&name).await {
                    debug!(
                        "Child '{}' already exists under {}.",
                        name,
                        ctx.path()
                    );
                    return Ok(SupervisorResponse::Spawned(existing));
                }
                let spawned = ctx.create_child(&name, child).await?;
                debug!("Spawned child '{}' under {}.", name, ctx.path());
                Ok(SupervisorResponse::Spawned(spawned))
            }
        }
    }

    // Child faults fall through to the default one-for-one two-bucket
    // policy: Functional restarts within the child's budget, anything else
    // stops the child.
}
