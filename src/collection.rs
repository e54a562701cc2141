use crate::node::{DynOp, Node};
use crate::node_id::NodeId;
use crate::pipeline::Pipeline;
use crate::runner::{ExecMode, Runner};
use crate::type_token::{Partition, vec_ops_for};
use anyhow::{Result, anyhow};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;

pub trait RFBound: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}
impl<T> RFBound for T where T: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}

/// A lazily evaluated, partitioned collection of `T`.
#[derive(Clone)]
pub struct PCollection<T> {
    pub(crate) pipeline: Pipeline,
    pub(crate) id: NodeId,
    _t: PhantomData<T>,
}

/// Parallelize an in-memory vector into the pipeline.
pub fn from_vec<T>(p: &Pipeline, data: Vec<T>) -> PCollection<T>
where
    T: RFBound,
{
    let id = p.add_source(data);
    PCollection {
        pipeline: p.clone(),
        id,
        _t: PhantomData,
    }
}

fn downcast_input<T: 'static>(input: Partition, op: &str) -> Result<Vec<T>> {
    input
        .downcast::<Vec<T>>()
        .map(|b| *b)
        .map_err(|_| anyhow!("{op}: unexpected input element type"))
}

// ---- stateless ops ----
pub(crate) struct MapOp<I, O, F>(pub(crate) F, pub(crate) PhantomData<(I, O)>);
impl<I, O, F> DynOp for MapOp<I, O, F>
where
    I: RFBound,
    O: RFBound,
    F: Send + Sync + Fn(&I) -> O + 'static,
{
    fn apply(&self, input: Partition) -> Result<Partition> {
        let v = downcast_input::<I>(input, "map")?;
        let out: Vec<O> = v.iter().map(|i| self.0(i)).collect();
        Ok(Box::new(out))
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

pub(crate) struct FilterOp<T, P>(pub(crate) P, pub(crate) PhantomData<T>);
impl<T, P> DynOp for FilterOp<T, P>
where
    T: RFBound,
    P: Send + Sync + Fn(&T) -> bool + 'static,
{
    fn apply(&self, input: Partition) -> Result<Partition> {
        let v = downcast_input::<T>(input, "filter")?;
        Ok(Box::new(v.into_iter().filter(|t| self.0(t)).collect::<Vec<T>>()))
    }

    fn name(&self) -> &'static str {
        "filter"
    }
}

/// Owned, fallible element-wise op: keep, drop or fail each element.
pub(crate) struct TryFilterMapOp<I, O, F>(pub(crate) F, pub(crate) PhantomData<(I, O)>);
impl<I, O, F> DynOp for TryFilterMapOp<I, O, F>
where
    I: RFBound,
    O: RFBound,
    F: Send + Sync + Fn(I) -> Result<Option<O>> + 'static,
{
    fn apply(&self, input: Partition) -> Result<Partition> {
        let v = downcast_input::<I>(input, "try_filter_map")?;
        let mut out: Vec<O> = Vec::with_capacity(v.len());
        for i in v {
            if let Some(o) = self.0(i)? {
                out.push(o);
            }
        }
        Ok(Box::new(out))
    }

    fn name(&self) -> &'static str {
        "try_filter_map"
    }
}

impl<T: RFBound> PCollection<T> {
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.id
    }

    fn push_stateless<O>(self, op: Arc<dyn DynOp>) -> PCollection<O> {
        let id = self.pipeline.insert_node(Node::Stateless(vec![op]));
        self.pipeline.connect(self.id, id);
        PCollection {
            pipeline: self.pipeline,
            id,
            _t: PhantomData,
        }
    }

    #[must_use]
    pub fn map<O, F>(self, f: F) -> PCollection<O>
    where
        O: RFBound,
        F: 'static + Send + Sync + Fn(&T) -> O,
    {
        self.push_stateless(Arc::new(MapOp::<T, O, F>(f, PhantomData)))
    }

    #[must_use]
    pub fn filter<F>(self, pred: F) -> Self
    where
        F: 'static + Send + Sync + Fn(&T) -> bool,
    {
        self.push_stateless(Arc::new(FilterOp::<T, F>(pred, PhantomData)))
    }

    /// Fallible map that may also drop elements. The first error aborts the
    /// stage on that worker and is returned by the terminal action.
    #[must_use]
    pub fn try_filter_map<O, F>(self, f: F) -> PCollection<O>
    where
        O: RFBound,
        F: 'static + Send + Sync + Fn(T) -> Result<Option<O>>,
    {
        self.push_stateless(Arc::new(TryFilterMapOp::<T, O, F>(f, PhantomData)))
    }

    /// Regroup the collection into exactly `partitions` partitions (minimum 1).
    ///
    /// Elements are dealt round-robin in their current global order, so every
    /// element lands in exactly one partition and partitions may be empty when
    /// there are fewer elements than partitions.
    #[must_use]
    pub fn repartition(self, partitions: usize) -> Self {
        let id = self.pipeline.insert_node(Node::Repartition {
            partitions: partitions.max(1),
            vec_ops: vec_ops_for::<T>(),
        });
        self.pipeline.connect(self.id, id);
        Self {
            pipeline: self.pipeline,
            id,
            _t: PhantomData,
        }
    }
}

impl<T: RFBound> PCollection<T> {
    /// # Errors
    /// Returns the first stage error.
    pub fn collect_seq(self) -> Result<Vec<T>> {
        Runner {
            mode: ExecMode::Sequential,
            ..Default::default()
        }
        .run_collect::<T>(&self.pipeline, self.id)
    }

    /// # Errors
    /// Returns the first stage error.
    pub fn collect_par(self, threads: Option<usize>, partitions: Option<usize>) -> Result<Vec<T>> {
        Runner {
            mode: ExecMode::Parallel {
                threads,
                partitions,
            },
            ..Default::default()
        }
        .run_collect::<T>(&self.pipeline, self.id)
    }

    /// Materialize the final partitions without flattening them.
    ///
    /// # Errors
    /// Returns the first stage error.
    pub fn collect_partitions(self, runner: &Runner) -> Result<Vec<Vec<T>>> {
        runner.run_partitions::<T>(&self.pipeline, self.id)
    }

    /// Terminal action: call `f(index, partition)` once per final partition,
    /// including empty ones, and block until all calls returned.
    ///
    /// # Errors
    /// Returns the first stage error or the first error returned by `f`.
    pub fn for_each_partition<F>(self, runner: &Runner, f: F) -> Result<()>
    where
        F: Fn(usize, Vec<T>) -> Result<()> + Send + Sync,
    {
        runner.run_for_each_partition::<T, F>(&self.pipeline, self.id, f)
    }
}
