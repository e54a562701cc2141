//! Identifier for nodes within a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Nodes are numbered sequentially as they are inserted. Only the planner and
//! runner look inside; everywhere else the id is an opaque handle.

/// Unique numeric identifier for a node in a pipeline graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) const fn new(v: u64) -> Self {
        Self(v)
    }

    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}
