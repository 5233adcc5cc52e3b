//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Owner of rules, rule chains and queue backlogs.
    TenantId
);
define_id!(
    /// A single routable rule.
    RuleId
);
define_id!(
    /// A rule chain, the tenant-level entry point for routing.
    RuleChainId
);
define_id!(
    /// A node inside a rule chain.
    RuleNodeId
);
define_id!(
    /// A message envelope.
    MsgId
);
define_id!(
    /// A queue pack. Diagnostics and correlation only, never ordering.
    PackId
);
