//! Rule and rule chain definitions, plus the consumed persistence
//! interfaces.
//!
//! Persistence itself is out of scope; the managers only read definitions
//! through [`RuleSource`] / [`RuleChainSource`] at init and update time.

use crate::{
    error::Error,
    ids::{RuleChainId, RuleId, TenantId},
    lifecycle::ComponentState,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single routable rule owned by a tenant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Routing priority; chains are ordered by weight ascending.
    pub weight: i32,
    pub state: ComponentState,
}

/// A rule chain. At most one chain per tenant is flagged root; the root
/// chain is the entry point for inbound messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleChainDef {
    pub id: RuleChainId,
    pub tenant_id: TenantId,
    pub name: String,
    pub weight: i32,
    pub state: ComponentState,
    pub root: bool,
}

/// Continuation link for paged fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLink {
    pub page: usize,
    pub size: usize,
}

impl PageLink {
    pub fn first(size: usize) -> Self {
        PageLink { page: 0, size }
    }

    pub fn next(&self) -> Self {
        PageLink {
            page: self.page + 1,
            size: self.size,
        }
    }
}

/// One page of fetch results.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Page {
            items: Vec::new(),
            has_next: false,
        }
    }
}

/// Paginated read access to rule definitions.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn fetch_page(&self, link: &PageLink)
        -> Result<Page<RuleDef>, Error>;

    async fn find_by_id(&self, id: RuleId) -> Result<Option<RuleDef>, Error>;
}

/// Paginated read access to rule chain definitions.
#[async_trait]
pub trait RuleChainSource: Send + Sync {
    async fn fetch_page(
        &self,
        link: &PageLink,
    ) -> Result<Page<RuleChainDef>, Error>;

    async fn find_by_id(
        &self,
        id: RuleChainId,
    ) -> Result<Option<RuleChainDef>, Error>;
}
