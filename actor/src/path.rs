//! Hierarchical entity addressing.
//!
//! Every concurrent entity lives at a unique `ActorPath` of the form
//! `/lane/name/child`. The first segment names the execution lane the entity
//! was assigned to; the rest mirrors the supervision tree. Paths are cheap to
//! clone and compare, and are used for registry lookups, logging and
//! parent/child relationships.

use serde::{Deserialize, Serialize};

/// Hierarchical path identifying an entity within the system tree.
#[derive(
    Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ActorPath(Vec<String>);

impl ActorPath {
    /// The top-level ancestor of this path (the lane segment).
    pub fn root(&self) -> Self {
        if self.0.is_empty() {
            ActorPath::default()
        } else {
            ActorPath(vec![self.0[0].clone()])
        }
    }

    /// The parent path. The parent of a top-level or empty path is the empty
    /// path.
    pub fn parent(&self) -> Self {
        if self.0.len() > 1 {
            ActorPath(self.0[..self.0.len() - 1].to_vec())
        } else {
            ActorPath::default()
        }
    }

    /// Last segment of the path, i.e. the entity's own name.
    pub fn key(&self) -> String {
        self.0.last().cloned().unwrap_or_default()
    }

    /// Name of the lane this path belongs to.
    pub fn lane(&self) -> String {
        self.0.first().cloned().unwrap_or_default()
    }

    /// Depth of the path. Top-level entities are at level 1.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_top_level(&self) -> bool {
        self.0.len() == 1
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &ActorPath) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True if `self` is the direct parent of `other`.
    pub fn is_parent_of(&self, other: &ActorPath) -> bool {
        other.0.len() == self.0.len() + 1 && self.is_ancestor_of(other)
    }

    /// True if `self` is a direct child of `other`.
    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        other.is_parent_of(self)
    }
}

impl From<&str> for ActorPath {
    fn from(value: &str) -> Self {
        ActorPath(
            value
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_owned())
                .collect(),
        )
    }
}

impl From<String> for ActorPath {
    fn from(value: String) -> Self {
        ActorPath::from(value.as_str())
    }
}

/// Child paths are built with the `/` operator, e.g.
/// `ActorPath::from("/tenant-rule-dispatcher") / "rule-42"`.
impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut segments = self.0;
        segments.extend(
            rhs.split('/').filter(|s| !s.is_empty()).map(|s| s.to_owned()),
        );
        ActorPath(segments)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
