use crate::NodeId;
use crate::collection::RFBound;
use crate::node::{DynOp, Node};
use crate::pipeline::Pipeline;
use crate::planner::build_plan;
use crate::type_token::Partition;
use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    Parallel {
        threads: Option<usize>,
        partitions: Option<usize>,
    },
}

/// Executes a pipeline chain.
///
/// In parallel mode the source is split into `partitions` contiguous chunks
/// (default `default_partitions`), each fused stateless stage runs per chunk on
/// the rayon pool, and barriers (`Repartition`) regroup everything.
#[derive(Clone, Debug)]
pub struct Runner {
    pub mode: ExecMode,
    pub default_partitions: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Parallel {
                threads: None,
                partitions: None,
            },
            default_partitions: 2 * num_cpus::get().max(2),
        }
    }
}

impl Runner {
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            mode: ExecMode::Sequential,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn parallel(threads: Option<usize>, partitions: Option<usize>) -> Self {
        Self {
            mode: ExecMode::Parallel {
                threads,
                partitions,
            },
            ..Default::default()
        }
    }

    /// Run the chain ending at `terminal` and return its final partitions.
    ///
    /// # Errors
    /// Returns planning errors and the first stage error.
    pub fn run_partitions<T: RFBound>(
        &self,
        p: &Pipeline,
        terminal: NodeId,
    ) -> Result<Vec<Vec<T>>> {
        let plan = build_plan(p, terminal)?;
        debug!(plan = %plan.describe(), fused = plan.fused_blocks, "executing plan");

        let parts = match self.mode {
            ExecMode::Sequential => exec_chain(plan.chain, 1, false)?,
            ExecMode::Parallel {
                threads,
                partitions,
            } => {
                let n = partitions.unwrap_or(self.default_partitions).max(1);
                self.install(threads, move || exec_chain(plan.chain, n, true))?
            }
        };

        parts
            .into_iter()
            .map(|part| {
                part.downcast::<Vec<T>>()
                    .map(|b| *b)
                    .map_err(|_| anyhow!("terminal type mismatch"))
            })
            .collect()
    }

    /// Run and flatten all final partitions in partition order.
    ///
    /// # Errors
    /// See [`Runner::run_partitions`].
    pub fn run_collect<T: RFBound>(&self, p: &Pipeline, terminal: NodeId) -> Result<Vec<T>> {
        Ok(self.run_partitions::<T>(p, terminal)?.concat())
    }

    /// Run, then call `f(index, partition)` for every final partition.
    ///
    /// Parallel mode is fail-fast: once a call returns `Err`, no further
    /// partitions are started; calls already running finish, and the first
    /// error is returned.
    ///
    /// # Errors
    /// Returns the first stage error or the first error from `f`.
    pub fn run_for_each_partition<T, F>(&self, p: &Pipeline, terminal: NodeId, f: F) -> Result<()>
    where
        T: RFBound,
        F: Fn(usize, Vec<T>) -> Result<()> + Send + Sync,
    {
        let parts = self.run_partitions::<T>(p, terminal)?;
        match self.mode {
            ExecMode::Sequential => {
                for (i, part) in parts.into_iter().enumerate() {
                    f(i, part)?;
                }
                Ok(())
            }
            ExecMode::Parallel { threads, .. } => self.install(threads, || {
                parts
                    .into_par_iter()
                    .enumerate()
                    .try_for_each(|(i, part)| f(i, part))
            }),
        }
    }

    fn install<R, OP>(&self, threads: Option<usize>, op: OP) -> Result<R>
    where
        R: Send,
        OP: FnOnce() -> Result<R> + Send,
    {
        match threads {
            Some(t) => rayon::ThreadPoolBuilder::new()
                .num_threads(t.max(1))
                .build()
                .context("build worker pool")?
                .install(op),
            None => op(),
        }
    }
}

/// Run a fused stateless stage on one partition.
fn fuse_stateless(ops: &[Arc<dyn DynOp>], input: Partition) -> Result<Partition> {
    ops.iter().try_fold(input, |acc, op| op.apply(acc))
}

fn exec_chain(chain: Vec<Node>, partitions: usize, parallel: bool) -> Result<Vec<Partition>> {
    let mut nodes = chain.into_iter();
    let Some(Node::Source { payload, vec_ops }) = nodes.next() else {
        bail!("plan must start with a Source node");
    };
    let mut current = vec_ops
        .split(payload.as_ref(), partitions)
        .ok_or_else(|| anyhow!("source payload is not a Vec<{}>", vec_ops.elem_name()))?;

    for node in nodes {
        current = match node {
            Node::Stateless(ops) if parallel => current
                .into_par_iter()
                .map(|chunk| fuse_stateless(&ops, chunk))
                .collect::<Result<Vec<_>>>()?,
            Node::Stateless(ops) => current
                .into_iter()
                .map(|chunk| fuse_stateless(&ops, chunk))
                .collect::<Result<Vec<_>>>()?,
            Node::Repartition {
                partitions,
                vec_ops,
            } => vec_ops.repartition(current, partitions)?,
            Node::Source { .. } => bail!("unexpected additional source in plan"),
        };
    }
    Ok(current)
}
