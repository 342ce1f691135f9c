//! Defines functionality for a `ParallelDataSet`
use crate::dataset::{DataSet, Dispatch, Map, Sketch};
use crate::error::SketchError;
use crate::partial_result::{PartialResult, PartialResultStream};
use futures::future::{self, FutureExt};
use futures::stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// A `DataSet` made up of child `DataSet`s of any kind.
///
/// Operations are dispatched to every child concurrently. Sketch results are
/// streamed back as each child produces them, so a consumer sees a running
/// summary long before the slowest child finishes.
pub struct ParallelDataSet<T> {
    children: Arc<Vec<DataSet<T>>>,
}

impl<T: Send + Sync + 'static> ParallelDataSet<T> {
    /// Creates a new `ParallelDataSet` over the given `children`
    pub fn new(children: Vec<DataSet<T>>) -> Self {
        ParallelDataSet {
            children: Arc::new(children),
        }
    }

    /// The children of this `ParallelDataSet`
    pub fn children(&self) -> &[DataSet<T>] {
        &self.children
    }

    /// Maps every child. The stream yields a single, complete result holding
    /// a `ParallelDataSet` of the mapped children, in the same order.
    pub fn map<S: Send + Sync + 'static>(
        &self,
        mapper: Arc<dyn Map<T, S>>,
    ) -> Dispatch<DataSet<S>> {
        let streams = self
            .children
            .iter()
            .map(|child| {
                PartialResultStream::deferred(child.map(mapper.clone()))
            })
            .collect();
        future::ready(collect_children(streams)).boxed()
    }

    /// Sketches every child. Each child's results are scaled to its share of
    /// the work and merged in the order they arrive, so a child that is slow
    /// to acknowledge never holds back its siblings. With no children the
    /// stream holds only `zero()`.
    pub fn sketch<R>(&self, sketch: Arc<dyn Sketch<T, R>>) -> Dispatch<R>
    where
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        if self.children.is_empty() {
            let zero = sketch.zero();
            return async move { PartialResultStream::once(zero) }.boxed();
        }
        let share = 1.0 / self.children.len() as f64;
        let streams: Vec<_> = self
            .children
            .iter()
            .map(|child| {
                PartialResultStream::deferred(child.sketch(sketch.clone()))
                    .scale(share)
            })
            .collect();
        future::ready(PartialResultStream::merge(streams)).boxed()
    }

    /// Zips the children of this `ParallelDataSet` with the children of
    /// `other`, pairwise.
    ///
    /// ## Errors
    /// `SketchError::PartitionCountMismatch` if the number of children
    /// differs, or the first error of zipping any pair of children
    pub fn zip<S>(
        &self,
        other: &ParallelDataSet<S>,
    ) -> Result<Dispatch<DataSet<(T, S)>>, SketchError>
    where
        T: Clone,
        S: Clone + Send + Sync + 'static,
    {
        if self.len() != other.len() {
            return Err(SketchError::PartitionCountMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        let streams = self
            .children
            .iter()
            .zip(other.children.iter())
            .map(|(left, right)| {
                Ok(PartialResultStream::deferred(left.zip(right)?))
            })
            .collect::<Result<Vec<_>, SketchError>>()?;
        Ok(future::ready(collect_children(streams)).boxed())
    }
}

impl<T> ParallelDataSet<T> {
    /// The number of children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<T> Clone for ParallelDataSet<T> {
    fn clone(&self) -> Self {
        ParallelDataSet {
            children: self.children.clone(),
        }
    }
}

/// Waits for the final `DataSet` of each child's stream and gathers them
/// into a new `ParallelDataSet`
fn collect_children<S: Send + Sync + 'static>(
    streams: Vec<PartialResultStream<DataSet<S>>>,
) -> PartialResultStream<DataSet<S>> {
    PartialResultStream::new(stream::once(async move {
        let children = future::try_join_all(
            streams.into_iter().map(PartialResultStream::last_value),
        )
        .await?;
        Ok::<_, SketchError>(PartialResult::complete(DataSet::parallel(
            children,
        )))
    }))
}
