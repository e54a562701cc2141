//! Type-erased partition buffers and the `Vec<T>` operations the runner needs.
//!
//! The engine moves data between stages as opaque [`Partition`] boxes so the
//! graph does not carry generic parameters. Whoever created a node knows the
//! element type and hands the runner a [`VecOps`] for it; the runner uses it to
//! split the source into worker chunks and to regroup records into a fixed
//! number of output partitions.

use anyhow::{Result, anyhow};
use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

/// A partition buffer carried between stages at runtime (always a `Vec<T>`).
pub type Partition = Box<dyn Any + Send + Sync>;

/// Type-erased helpers for `Vec<T>`.
pub trait VecOps: Send + Sync {
    /// Element type name, for error messages.
    fn elem_name(&self) -> &'static str;

    /// Number of elements if `data` is a `Vec<T>`.
    fn len(&self, data: &dyn Any) -> Option<usize>;

    /// Clone `data` into up to `n` contiguous, order-preserving chunks.
    fn split(&self, data: &dyn Any, n: usize) -> Option<Vec<Partition>>;

    /// Regroup every element of `parts` into exactly `n` partitions.
    ///
    /// Elements are dealt round-robin in global order (partition order, then
    /// position), so element `i` lands in partition `i % n`. Every element ends
    /// up in exactly one output partition; outputs may be empty.
    fn repartition(&self, parts: Vec<Partition>, n: usize) -> Result<Vec<Partition>>;
}

struct VecOpsImpl<T>(PhantomData<fn() -> T>);

impl<T: Clone + Send + Sync + 'static> VecOps for VecOpsImpl<T> {
    fn elem_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn len(&self, data: &dyn Any) -> Option<usize> {
        data.downcast_ref::<Vec<T>>().map(Vec::len)
    }

    fn split(&self, data: &dyn Any, n: usize) -> Option<Vec<Partition>> {
        let v = data.downcast_ref::<Vec<T>>()?;
        if n <= 1 || v.len() <= 1 {
            return Some(vec![Box::new(v.clone())]);
        }
        let chunk = v.len().div_ceil(n);
        Some(
            v.chunks(chunk)
                .map(|c| Box::new(c.to_vec()) as Partition)
                .collect(),
        )
    }

    fn repartition(&self, parts: Vec<Partition>, n: usize) -> Result<Vec<Partition>> {
        let n = n.max(1);
        let mut out: Vec<Vec<T>> = (0..n).map(|_| Vec::new()).collect();
        let mut i = 0usize;
        for part in parts {
            let v = part.downcast::<Vec<T>>().map_err(|_| {
                anyhow!("repartition: expected Vec<{}>", type_name::<T>())
            })?;
            for elem in *v {
                out[i % n].push(elem);
                i += 1;
            }
        }
        Ok(out.into_iter().map(|v| Box::new(v) as Partition).collect())
    }
}

/// Create a type-erased `VecOps` for `Vec<T>`.
pub fn vec_ops_for<T: Clone + Send + Sync + 'static>() -> Arc<dyn VecOps> {
    Arc::new(VecOpsImpl::<T>(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbox(parts: Vec<Partition>) -> Vec<Vec<u32>> {
        parts
            .into_iter()
            .map(|p| *p.downcast::<Vec<u32>>().unwrap())
            .collect()
    }

    #[test]
    fn split_preserves_order() {
        let ops = vec_ops_for::<u32>();
        let data: Vec<u32> = (0..10).collect();
        let parts = unbox(ops.split(&data, 3).unwrap());
        assert_eq!(parts.concat(), data);
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn repartition_deals_round_robin() {
        let ops = vec_ops_for::<u32>();
        let parts: Vec<Partition> = vec![Box::new(vec![0u32, 1, 2]), Box::new(vec![3u32, 4])];
        let out = unbox(ops.repartition(parts, 2).unwrap());
        assert_eq!(out, vec![vec![0, 2, 4], vec![1, 3]]);
    }

    #[test]
    fn repartition_leaves_extra_slots_empty() {
        let ops = vec_ops_for::<u32>();
        let out = unbox(ops.repartition(vec![Box::new(vec![7u32, 8])], 4).unwrap());
        assert_eq!(out, vec![vec![7], vec![8], vec![], vec![]]);
    }

    #[test]
    fn repartition_rejects_wrong_type() {
        let ops = vec_ops_for::<u32>();
        assert!(ops.repartition(vec![Box::new(vec!["x".to_string()])], 2).is_err());
    }
}
