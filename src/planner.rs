//! Turns the pipeline graph into a linear execution chain.
//!
//! Two passes run before execution:
//!
//! 1. **Backwalk** -- follow single-predecessor edges from the terminal node back
//!    to the source and reverse the result.
//! 2. **Fuse stateless ops** -- adjacent `Node::Stateless` blocks are concatenated
//!    so that every per-record transform between two barriers runs as one stage
//!    on each worker.
//!
//! [`Plan::describe`] renders the chain for logs and tests.

use crate::node::Node;
use crate::{NodeId, Pipeline};
use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::fmt::Write as _;

/// A finalized execution plan.
pub struct Plan {
    /// Source first, terminal last.
    pub chain: Vec<Node>,
    /// Number of stateless blocks merged away by fusion.
    pub fused_blocks: usize,
}

impl Plan {
    /// One line per stage, e.g. `0: source(23)`, `1: stateless[map]`, `2: repartition(5)`.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.chain.iter().enumerate() {
            let detail = match node {
                Node::Source { payload, vec_ops } => vec_ops
                    .len(payload.as_ref())
                    .map_or_else(|| "?".to_string(), |n| n.to_string()),
                Node::Stateless(ops) => {
                    ops.iter().map(|op| op.name()).collect::<Vec<_>>().join(",")
                }
                Node::Repartition { partitions, .. } => partitions.to_string(),
            };
            let _ = writeln!(out, "{i}: {}({detail})", node.kind());
        }
        out
    }

    /// Length of the source payload, if the chain starts with one.
    #[must_use]
    pub fn source_len(&self) -> Option<usize> {
        match self.chain.first() {
            Some(Node::Source { payload, vec_ops }) => vec_ops.len(payload.as_ref()),
            _ => None,
        }
    }
}

/// Build a linear, fused plan ending at `terminal`.
///
/// # Errors
/// Fails when a node is missing from the graph or the chain does not start
/// with a source.
pub fn build_plan(p: &Pipeline, terminal: NodeId) -> Result<Plan> {
    let (nodes, edges) = {
        let g = p.lock();
        (g.nodes.clone(), g.edges.clone())
    };
    let chain = backwalk_linear(nodes, &edges, terminal)?;
    if !matches!(chain.first(), Some(Node::Source { .. })) {
        bail!("planner: chain ending at {terminal:?} does not start with a source");
    }
    let (chain, fused_blocks) = fuse_stateless(chain);
    Ok(Plan {
        chain,
        fused_blocks,
    })
}

fn backwalk_linear(
    mut nodes: HashMap<NodeId, Node>,
    edges: &[(NodeId, NodeId)],
    terminal: NodeId,
) -> Result<Vec<Node>> {
    let mut chain = Vec::<Node>::new();
    let mut cur = terminal;
    loop {
        let n = nodes
            .remove(&cur)
            .ok_or_else(|| anyhow!("planner: missing node {cur:?}"))?;
        chain.push(n);
        if let Some((from, _)) = edges.iter().find(|(_, to)| *to == cur).copied() {
            cur = from;
        } else {
            break;
        }
    }
    chain.reverse();
    Ok(chain)
}

fn fuse_stateless(chain: Vec<Node>) -> (Vec<Node>, usize) {
    let before = chain.len();
    let mut out: Vec<Node> = Vec::with_capacity(chain.len());
    for node in chain {
        if let Node::Stateless(more) = &node
            && let Some(Node::Stateless(acc)) = out.last_mut()
        {
            acc.extend(more.iter().cloned());
            continue;
        }
        out.push(node);
    }
    let fused = before - out.len();
    (out, fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from_vec;

    #[test]
    fn adjacent_maps_fuse_into_one_stage() {
        let p = Pipeline::default();
        let c = from_vec(&p, vec![1u32, 2, 3])
            .map(|x: &u32| x + 1)
            .map(|x: &u32| x * 2)
            .repartition(2);
        let plan = build_plan(&p, c.node_id()).unwrap();
        assert_eq!(plan.chain.len(), 3);
        assert_eq!(plan.fused_blocks, 1);
        assert_eq!(plan.source_len(), Some(3));
        assert!(plan.describe().contains("2: repartition(2)"));
    }
}
