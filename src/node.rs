use crate::type_token::{Partition, VecOps};
use anyhow::Result;
use std::any::Any;
use std::sync::Arc;

/// A type-erased, element-wise operation over one partition.
pub trait DynOp: Send + Sync {
    fn apply(&self, input: Partition) -> Result<Partition>;

    fn name(&self) -> &'static str {
        "op"
    }
}

#[derive(Clone)]
pub enum Node {
    /// In-memory `Vec<T>` handed to the engine by `from_vec`.
    Source {
        payload: Arc<dyn Any + Send + Sync>,
        vec_ops: Arc<dyn VecOps>,
    },

    /// Element-wise ops; adjacent blocks are fused into one stage by the planner.
    Stateless(Vec<Arc<dyn DynOp>>),

    /// Barrier: regroup all elements into exactly `partitions` partitions.
    Repartition {
        partitions: usize,
        vec_ops: Arc<dyn VecOps>,
    },
}

impl Node {
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Stateless(_) => "stateless",
            Self::Repartition { .. } => "repartition",
        }
    }
}
