//! A module for creating and operating on (possibly remote) partitioned data
//! sets.
//!
//! A [`DataSet`] is a handle to a collection of partitions that may live in
//! this process or on another peer. Callers analyze the data through three
//! primitive operations, without needing to know where the data lives:
//!
//! - `map`: applies a [`Map`] to every partition, producing a new `DataSet`
//! - `sketch`: summarizes every partition with a [`Sketch`] and combines the
//!    summaries into one value
//! - `zip`: pairs the partitions of two co-located `DataSet`s
//!
//! Every operation answers with a [`Dispatch`], a future that, once awaited,
//! yields a [`PartialResultStream`] of incrementally arriving results.
//!
//! The `dataset` module provides 3 implementations for a `DataSet`:
//!
//! # [`LocalDataSet`]
//!
//! A single partition held in memory by this process.
//!
//! # [`ParallelDataSet`]
//!
//! A collection of child `DataSet`s of any kind. Operations fan out to every
//! child concurrently, and sketch results stream back as each child finishes.
//!
//! # [`RemoteDataSet`]
//!
//! A proxy for a `DataSet` hosted by a remote peer. Operations are encoded as
//! messages and sent through a [`CoordinatorRef`], waiting a bounded amount of
//! time for the acknowledgment that carries the result stream.
//!
//! [`PartialResultStream`]: ../partial_result/struct.PartialResultStream.html
//! [`CoordinatorRef`]: ../network/struct.CoordinatorRef.html
use crate::error::SketchError;
use crate::partial_result::PartialResultStream;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

mod local_dataset;
pub use local_dataset::LocalDataSet;

mod parallel_dataset;
pub use parallel_dataset::ParallelDataSet;

mod remote_dataset;
pub use remote_dataset::{check_zip_compatible, RemoteDataSet};

/// A pending operation. Awaiting it dispatches the operation and yields the
/// stream of its results.
pub type Dispatch<V> = BoxFuture<'static, PartialResultStream<V>>;

/// A transformation from the data of one partition to the data of a new
/// partition. Implemented for every `Fn(&T) -> S` closure.
pub trait Map<T, S>: Send + Sync {
    /// Transforms the `data` of one partition
    fn apply(&self, data: &T) -> S;
}

impl<T, S, F> Map<T, S> for F
where
    F: Fn(&T) -> S + Send + Sync,
{
    fn apply(&self, data: &T) -> S {
        self(data)
    }
}

/// A commutative monoid over `R`.
///
/// Implementations must satisfy, for all reachable `a`, `b` and `c`:
/// - `add(zero(), a) == a`
/// - `add(add(a, b), c) == add(a, add(b, c))`
/// - `add(a, b) == add(b, a)`
///
/// Results are combined in whatever order partitions finish, so an
/// implementation that breaks these laws produces non-deterministic results.
/// This is not checked.
pub trait Monoid<R>: Send + Sync {
    /// The identity element
    fn zero(&self) -> R;

    /// Combines two values
    fn add(&self, left: R, right: R) -> R;
}

/// An aggregation that summarizes each partition with `create`, and combines
/// the summaries of many partitions with its `Monoid`.
pub trait Sketch<T, R>: Monoid<R> {
    /// Summarizes the `data` of one partition
    fn create(&self, data: &T) -> R;
}

/// A handle to a (possibly remote) partitioned data set with partitions of
/// type `T`.
pub enum DataSet<T> {
    Local(LocalDataSet<T>),
    Parallel(ParallelDataSet<T>),
    Remote(RemoteDataSet<T>),
}

impl<T: Send + Sync + 'static> DataSet<T> {
    /// Creates a new `DataSet::Local` holding the given `data`
    pub fn local(data: T) -> Self {
        DataSet::Local(LocalDataSet::new(data))
    }

    /// Creates a new `DataSet::Parallel` over the given `children`
    pub fn parallel(children: Vec<DataSet<T>>) -> Self {
        DataSet::Parallel(ParallelDataSet::new(children))
    }

    /// Applies `mapper` to every partition. The stream eventually yields the
    /// mapped `DataSet`, which is of the same kind as this one.
    pub fn map<S: Send + Sync + 'static>(
        &self,
        mapper: Arc<dyn Map<T, S>>,
    ) -> Dispatch<DataSet<S>> {
        match self {
            DataSet::Local(local) => {
                let local = local.clone();
                async move { local.map(mapper) }.boxed()
            }
            DataSet::Parallel(parallel) => parallel.map(mapper),
            DataSet::Remote(remote) => remote.map(mapper),
        }
    }

    /// Summarizes every partition with `sketch`. Each element of the stream
    /// is the combined summary of one or more partitions, combining them all
    /// with the `sketch` gives the summary of the whole `DataSet`.
    pub fn sketch<R>(&self, sketch: Arc<dyn Sketch<T, R>>) -> Dispatch<R>
    where
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        match self {
            DataSet::Local(local) => {
                let local = local.clone();
                async move { local.sketch(sketch) }.boxed()
            }
            DataSet::Parallel(parallel) => parallel.sketch(sketch),
            DataSet::Remote(remote) => remote.sketch(sketch),
        }
    }

    /// Pairs every partition of this `DataSet` with the matching partition of
    /// `other`.
    ///
    /// ## Errors
    /// Returns an error, before anything is dispatched, if `other` is not
    /// the same kind of `DataSet` as this one, if two `RemoteDataSet`s live
    /// on different peers, or if two `ParallelDataSet`s have a different
    /// number of children.
    pub fn zip<S>(
        &self,
        other: &DataSet<S>,
    ) -> Result<Dispatch<DataSet<(T, S)>>, SketchError>
    where
        T: Clone,
        S: Clone + Send + Sync + 'static,
    {
        match (self, other) {
            (DataSet::Local(left), DataSet::Local(right)) => {
                let stream = left.zip(right);
                Ok(async move { stream }.boxed())
            }
            (DataSet::Parallel(left), DataSet::Parallel(right)) => {
                left.zip(right)
            }
            (DataSet::Remote(left), right) => left.zip(right),
            (left, right) => Err(SketchError::UnsupportedZipOperand {
                expected: left.kind(),
                found: right.kind(),
            }),
        }
    }
}

impl<T> DataSet<T> {
    /// The kind of this `DataSet`: `"local"`, `"parallel"` or `"remote"`
    pub fn kind(&self) -> &'static str {
        match self {
            DataSet::Local(_) => "local",
            DataSet::Parallel(_) => "parallel",
            DataSet::Remote(_) => "remote",
        }
    }
}

impl<T> Clone for DataSet<T> {
    fn clone(&self) -> Self {
        match self {
            DataSet::Local(local) => DataSet::Local(local.clone()),
            DataSet::Parallel(parallel) => DataSet::Parallel(parallel.clone()),
            DataSet::Remote(remote) => DataSet::Remote(remote.clone()),
        }
    }
}

impl<T> fmt::Debug for DataSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataSet::Local(_) => f.write_str("DataSet::Local"),
            DataSet::Parallel(parallel) => {
                write!(f, "DataSet::Parallel({} children)", parallel.len())
            }
            DataSet::Remote(remote) => {
                write!(f, "DataSet::Remote({})", remote.target())
            }
        }
    }
}
