//! Defines functionality for a `LocalDataSet`
use crate::dataset::{DataSet, Map, Sketch};
use crate::error::SketchError;
use crate::partial_result::{PartialResult, PartialResultStream};
use futures::stream;
use log::debug;
use std::sync::Arc;
use tokio::task;

/// A single partition of data held in memory by this process.
///
/// Operations on a `LocalDataSet` run on `tokio`'s blocking thread pool, so
/// they must be started from within a `tokio` runtime.
pub struct LocalDataSet<T> {
    data: Arc<T>,
}

impl<T: Send + Sync + 'static> LocalDataSet<T> {
    /// Creates a new `LocalDataSet` holding the given `data`
    pub fn new(data: T) -> Self {
        LocalDataSet {
            data: Arc::new(data),
        }
    }

    /// Obtains a reference to the data of this `LocalDataSet`
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Starts applying `mapper` to the data of this `LocalDataSet`. The
    /// returned stream yields a single, complete result holding a new
    /// `LocalDataSet` of the mapped data.
    pub fn map<S: Send + Sync + 'static>(
        &self,
        mapper: Arc<dyn Map<T, S>>,
    ) -> PartialResultStream<DataSet<S>> {
        let data = self.data.clone();
        run_blocking(move || DataSet::local(mapper.apply(&data)))
    }

    /// Starts summarizing the data of this `LocalDataSet` with `sketch`. The
    /// returned stream yields a single, complete result.
    pub fn sketch<R: Send + 'static>(
        &self,
        sketch: Arc<dyn Sketch<T, R>>,
    ) -> PartialResultStream<R> {
        let data = self.data.clone();
        run_blocking(move || sketch.create(&data))
    }

    /// Pairs the data of this `LocalDataSet` with the data of `other`
    pub fn zip<S>(
        &self,
        other: &LocalDataSet<S>,
    ) -> PartialResultStream<DataSet<(T, S)>>
    where
        T: Clone,
        S: Clone + Send + Sync + 'static,
    {
        let pair = ((*self.data).clone(), (*other.data).clone());
        PartialResultStream::once(DataSet::local(pair))
    }
}

impl<T> Clone for LocalDataSet<T> {
    fn clone(&self) -> Self {
        LocalDataSet {
            data: self.data.clone(),
        }
    }
}

/// Runs `work` on the blocking pool, a panic in `work` becomes an
/// `Execution` error in the stream
fn run_blocking<V, F>(work: F) -> PartialResultStream<V>
where
    V: Send + 'static,
    F: FnOnce() -> V + Send + 'static,
{
    let handle = task::spawn_blocking(work);
    PartialResultStream::new(stream::once(async move {
        match handle.await {
            Ok(value) => Ok(PartialResult::complete(value)),
            Err(e) => {
                debug!("Local execution failed: {}", e);
                Err(SketchError::Execution(e.to_string()))
            }
        }
    }))
}
