//! Weighted actor chains.
//!
//! A chain is an immutable, totally ordered snapshot of the active entities
//! of one scope. It is rebuilt whole on every lifecycle change and published
//! through [`ChainCell`] by atomic pointer replacement, so concurrent
//! readers always see either the old or the new chain, never a partial
//! rebuild.

use actor::{Actor, ActorRef, Handler};
use parking_lot::RwLock;

use std::{fmt::Display, hash::Hash, sync::Arc};

/// Immutable association of an identity, a scheduling weight and the handle
/// of its entity. Created once per component; the handle is cached for the
/// component's lifetime.
pub struct ActorMeta<I, A>
where
    A: Actor + Handler<A>,
{
    pub id: I,
    pub weight: i32,
    pub handle: ActorRef<A>,
}

impl<I: Copy, A> Clone for ActorMeta<I, A>
where
    A: Actor + Handler<A>,
{
    fn clone(&self) -> Self {
        ActorMeta {
            id: self.id,
            weight: self.weight,
            handle: self.handle.clone(),
        }
    }
}

/// Ordered snapshot of active entities, deduplicated by id and sorted by
/// `(weight ascending, id)` for deterministic dispatch order.
pub struct ActorChain<I, A>
where
    A: Actor + Handler<A>,
{
    entries: Vec<ActorMeta<I, A>>,
}

impl<I, A> ActorChain<I, A>
where
    I: Copy + Eq + Ord + Hash + Display,
    A: Actor + Handler<A>,
{
    pub fn empty() -> Self {
        ActorChain {
            entries: Vec::new(),
        }
    }

    /// Builds a chain from arbitrary-order entries. Later duplicates of an
    /// id are discarded.
    pub fn build(entries: impl IntoIterator<Item = ActorMeta<I, A>>) -> Self {
        let mut out: Vec<ActorMeta<I, A>> = Vec::new();
        for entry in entries {
            if !out.iter().any(|e| e.id == entry.id) {
                out.push(entry);
            }
        }
        out.sort_by(|a, b| {
            a.weight.cmp(&b.weight).then_with(|| a.id.cmp(&b.id))
        });
        ActorChain { entries: out }
    }

    pub fn first(&self) -> Option<&ActorMeta<I, A>> {
        self.entries.first()
    }

    /// The next entry after `id` in dispatch order. `None` once the chain
    /// is exhausted or when `id` is no longer a member (a removed rule is
    /// simply not routable).
    pub fn next_after(&self, id: I) -> Option<&ActorMeta<I, A>> {
        let position = self.entries.iter().position(|e| e.id == id)?;
        self.entries.get(position + 1)
    }

    pub fn get(&self, id: I) -> Option<&ActorMeta<I, A>> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: I) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActorMeta<I, A>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Copy-on-write cell holding the current chain snapshot.
///
/// Readers clone the inner `Arc` under a short read lock; writers swap the
/// whole pointer. The chain itself is never mutated in place.
pub struct ChainCell<I, A>
where
    A: Actor + Handler<A>,
{
    inner: RwLock<Arc<ActorChain<I, A>>>,
}

impl<I, A> ChainCell<I, A>
where
    I: Copy + Eq + Ord + Hash + Display,
    A: Actor + Handler<A>,
{
    pub fn new() -> Self {
        ChainCell {
            inner: RwLock::new(Arc::new(ActorChain::empty())),
        }
    }

    /// Current snapshot. The caller keeps it valid however long it needs;
    /// later swaps do not affect it.
    pub fn load(&self) -> Arc<ActorChain<I, A>> {
        self.inner.read().clone()
    }

    /// Publishes a new snapshot.
    pub fn store(&self, chain: ActorChain<I, A>) {
        *self.inner.write() = Arc::new(chain);
    }
}

impl<I, A> Default for ChainCell<I, A>
where
    I: Copy + Eq + Ord + Hash + Display,
    A: Actor + Handler<A>,
{
    fn default() -> Self {
        ChainCell::new()
    }
}
