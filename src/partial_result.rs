//! Incrementally arriving results of `DataSet` operations.
//!
//! Every operation on a [`DataSet`] answers with a [`PartialResultStream`].
//! Each element of the stream is a [`PartialResult`] *delta*: `done` is the
//! fraction of the total work that element accounts for and `value` is its
//! contribution to the result. Folding the deltas with a
//! [`PartialResultMonoid`] yields the aggregate seen so far, and once `done`
//! sums to `1.0` the aggregate is final.
//!
//! Because sketches are commutative monoids, deltas may be merged in any
//! order and in any tree shape (e.g. across several remote hops) without
//! changing the final value.
//!
//! A stream ends immediately after its first error, so an error is always
//! the last element a consumer will see.
//!
//! [`DataSet`]: ../dataset/enum.DataSet.html
use crate::dataset::Monoid;
use crate::error::SketchError;
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

const COMPLETION_TOLERANCE: f64 = 1e-9;

/// A (possibly partial) result of an operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PartialResult<V> {
    /// The fraction of the total work accounted for by this result
    pub done: f64,
    /// The value, or the contribution to the value, of this result
    pub value: V,
}

impl<V> PartialResult<V> {
    /// Creates a new `PartialResult`
    pub fn new(done: f64, value: V) -> Self {
        PartialResult { done, value }
    }

    /// Creates a `PartialResult` that accounts for all of the work
    pub fn complete(value: V) -> Self {
        PartialResult::new(1.0, value)
    }

    /// Whether this result accounts for all of the work
    pub fn is_complete(&self) -> bool {
        self.done >= 1.0 - COMPLETION_TOLERANCE
    }

    /// Transforms the value, keeping `done` as is
    pub fn map_value<W>(self, f: impl FnOnce(V) -> W) -> PartialResult<W> {
        PartialResult::new(self.done, f(self.value))
    }
}

/// Lifts a `Monoid` over values into a `Monoid` over `PartialResult`s by
/// summing `done` and combining values.
pub struct PartialResultMonoid<M: ?Sized> {
    monoid: Arc<M>,
}

impl<M: ?Sized> PartialResultMonoid<M> {
    pub fn new(monoid: Arc<M>) -> Self {
        PartialResultMonoid { monoid }
    }
}

impl<V, M> Monoid<PartialResult<V>> for PartialResultMonoid<M>
where
    M: Monoid<V> + ?Sized,
{
    fn zero(&self) -> PartialResult<V> {
        PartialResult::new(0.0, self.monoid.zero())
    }

    fn add(
        &self,
        left: PartialResult<V>,
        right: PartialResult<V>,
    ) -> PartialResult<V> {
        PartialResult::new(
            left.done + right.done,
            self.monoid.add(left.value, right.value),
        )
    }
}

/// A finite, non-restartable stream of `PartialResult`s or errors.
pub struct PartialResultStream<V> {
    inner: BoxStream<'static, Result<PartialResult<V>, SketchError>>,
}

impl<V: Send + 'static> PartialResultStream<V> {
    /// Wraps the given `stream`. Anything the `stream` yields after its first
    /// error is dropped.
    pub fn new<St>(stream: St) -> Self
    where
        St: Stream<Item = Result<PartialResult<V>, SketchError>>
            + Send
            + 'static,
    {
        let inner = stream
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .boxed();
        PartialResultStream { inner }
    }

    /// A stream with the single complete result `value`
    pub fn once(value: V) -> Self {
        PartialResultStream::new(stream::once(future::ready(Ok(
            PartialResult::complete(value),
        ))))
    }

    /// A stream whose one and only element is the given `error`
    pub fn failed(error: SketchError) -> Self {
        PartialResultStream::new(stream::once(future::ready(Err(error))))
    }

    /// A stream that awaits `dispatch` when it is first polled and then
    /// yields the elements of the stream `dispatch` produced. Lets a result
    /// stream be handed out before the work behind it has been acknowledged.
    pub fn deferred<F>(dispatch: F) -> Self
    where
        F: Future<Output = Self> + Send + 'static,
    {
        PartialResultStream::new(stream::once(dispatch).flatten())
    }

    /// Interleaves the given streams as their elements become available
    pub fn merge(streams: impl IntoIterator<Item = Self>) -> Self {
        PartialResultStream::new(stream::select_all(streams))
    }

    /// Multiplies `done` of every element by `factor`, used when this stream
    /// is one of several that make up a larger result
    pub fn scale(self, factor: f64) -> Self {
        self.map_values_with(move |pr| {
            Ok(PartialResult::new(pr.done * factor, pr.value))
        })
    }

    /// Transforms every value in this stream
    pub fn map_values<W, F>(self, mut f: F) -> PartialResultStream<W>
    where
        W: Send + 'static,
        F: FnMut(V) -> W + Send + 'static,
    {
        self.map_values_with(move |pr| Ok(pr.map_value(&mut f)))
    }

    /// Transforms every value in this stream with a fallible function, the
    /// first failure ends the stream
    pub fn try_map_values<W, F>(self, mut f: F) -> PartialResultStream<W>
    where
        W: Send + 'static,
        F: FnMut(V) -> Result<W, SketchError> + Send + 'static,
    {
        self.map_values_with(move |pr| {
            let done = pr.done;
            Ok(PartialResult::new(done, f(pr.value)?))
        })
    }

    fn map_values_with<W, F>(self, mut f: F) -> PartialResultStream<W>
    where
        W: Send + 'static,
        F: FnMut(PartialResult<V>) -> Result<PartialResult<W>, SketchError>
            + Send
            + 'static,
    {
        PartialResultStream::new(
            self.inner.map(move |item| item.and_then(&mut f)),
        )
    }

    /// Turns this stream of deltas into a stream of running aggregates: each
    /// element is everything combined so far, and the last one is the total.
    pub fn running<M>(self, monoid: Arc<M>) -> PartialResultStream<V>
    where
        M: Monoid<V> + ?Sized + 'static,
        V: Clone,
    {
        let mut done = 0.0;
        let mut total = Some(monoid.zero());
        PartialResultStream::new(self.inner.map(move |item| {
            let delta = item?;
            done += delta.done;
            let combined = match total.take() {
                Some(so_far) => monoid.add(so_far, delta.value),
                None => delta.value,
            };
            total = Some(combined.clone());
            Ok(PartialResult::new(done, combined))
        }))
    }

    /// Combines every element of this stream with the given `monoid`.
    ///
    /// ## Errors
    /// Returns the first error the stream yields
    pub async fn reduce<M>(
        mut self,
        monoid: &M,
    ) -> Result<PartialResult<V>, SketchError>
    where
        M: Monoid<V> + ?Sized,
    {
        let mut done = 0.0;
        let mut total = monoid.zero();
        while let Some(item) = self.next().await {
            let delta = item?;
            done += delta.done;
            total = monoid.add(total, delta.value);
        }
        Ok(PartialResult::new(done, total))
    }

    /// Waits for the stream to close and returns the value of its last
    /// element.
    ///
    /// ## Errors
    /// Returns the first error the stream yields, or `SketchError::NoResult`
    /// if the stream was empty
    pub async fn last_value(mut self) -> Result<V, SketchError> {
        let mut last = None;
        while let Some(item) = self.next().await {
            last = Some(item?.value);
        }
        last.ok_or(SketchError::NoResult)
    }
}

impl<V> Stream for PartialResultStream<V> {
    type Item = Result<PartialResult<V>, SketchError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<V> fmt::Debug for PartialResultStream<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("PartialResultStream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Sum;

    impl Monoid<i64> for Sum {
        fn zero(&self) -> i64 {
            0
        }

        fn add(&self, left: i64, right: i64) -> i64 {
            left + right
        }
    }

    fn deltas(values: Vec<i64>) -> PartialResultStream<i64> {
        let share = 1.0 / values.len() as f64;
        PartialResultStream::new(stream::iter(
            values
                .into_iter()
                .map(move |v| Ok(PartialResult::new(share, v))),
        ))
    }

    #[tokio::test]
    async fn test_deferred_waits_to_be_polled() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let results = PartialResultStream::deferred(async move {
            flag.store(true, Ordering::SeqCst);
            deltas(vec![1, 2])
        });
        assert!(!started.load(Ordering::SeqCst));
        let total = results.reduce(&Sum).await.unwrap();
        assert!(started.load(Ordering::SeqCst));
        assert_eq!(total.value, 3);
        assert!(total.is_complete());
    }

    #[tokio::test]
    async fn test_failed_has_one_element() {
        let s: PartialResultStream<i64> =
            PartialResultStream::failed(SketchError::NoResult);
        let items: Vec<_> = s.collect().await;
        assert_eq!(items, vec![Err(SketchError::NoResult)]);
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        let s = PartialResultStream::new(stream::iter(vec![
            Ok(PartialResult::new(0.5, 1)),
            Err(SketchError::Execution("boom".to_string())),
            Ok(PartialResult::new(0.5, 2)),
        ]));
        let items: Vec<_> = s.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_running_ends_with_total() {
        let running: Vec<_> = deltas(vec![2, 5, 3])
            .running(Arc::new(Sum))
            .collect()
            .await;
        let values: Vec<i64> =
            running.iter().map(|r| r.as_ref().unwrap().value).collect();
        assert_eq!(values, vec![2, 7, 10]);
        assert!(running.last().unwrap().as_ref().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_reduce() {
        let total = deltas(vec![2, 5, 3]).reduce(&Sum).await.unwrap();
        assert_eq!(total.value, 10);
        assert!(total.is_complete());
    }

    #[tokio::test]
    async fn test_reduce_returns_error() {
        let s: PartialResultStream<i64> =
            PartialResultStream::failed(SketchError::NoResult);
        assert_eq!(s.reduce(&Sum).await, Err(SketchError::NoResult));
    }

    #[tokio::test]
    async fn test_last_value_of_empty_stream() {
        let s: PartialResultStream<i64> =
            PartialResultStream::new(stream::empty());
        assert_eq!(s.last_value().await, Err(SketchError::NoResult));
    }

    #[tokio::test]
    async fn test_scale_and_try_map() {
        let s = PartialResultStream::once(4)
            .scale(0.25)
            .try_map_values(|v| Ok(v * 2));
        let items: Vec<_> = s.collect().await;
        assert_eq!(items, vec![Ok(PartialResult::new(0.25, 8))]);
    }

    #[test]
    fn test_partial_result_monoid() {
        let m = PartialResultMonoid::new(Arc::new(Sum));
        let total = m.add(
            m.add(m.zero(), PartialResult::new(0.5, 3)),
            PartialResult::new(0.5, 4),
        );
        assert_eq!(total, PartialResult::complete(7));
    }
}
