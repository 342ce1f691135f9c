//! Defines functionality for a `RemoteDataSet`
use crate::dataset::{DataSet, Dispatch, Map, Sketch};
use crate::error::SketchError;
use crate::network::message::{
    decode, MapOperation, Operation, SketchOperation, ZipOperation,
};
use crate::network::{Ack, CoordinatorRef, TargetRef, Value};
use crate::partial_result::PartialResultStream;
use futures::future::FutureExt;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A proxy for a `DataSet` hosted by another peer.
///
/// Every operation is sent as a message through a [`CoordinatorRef`], and
/// the proxy waits at most `ack_timeout` for the acknowledgment carrying the
/// result stream. That wait is the only one: the results themselves arrive
/// asynchronously as the remote peer produces them.
///
/// Failures of the exchange are never returned directly. A `RemoteDataSet`
/// always answers with a stream, and a failed dispatch is a stream whose
/// single element is the error, whether the coordinator timed out or the
/// peer reported a failure.
///
/// [`CoordinatorRef`]: ../network/struct.CoordinatorRef.html
pub struct RemoteDataSet<T> {
    coordinator: CoordinatorRef,
    target: TargetRef,
    ack_timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RemoteDataSet<T> {
    /// Creates a new proxy for the `DataSet` referred to by `target`,
    /// sending requests through `coordinator`.
    ///
    /// ## Errors
    /// `SketchError::InvalidReference` if the coordinator has stopped or the
    /// target has no peer address
    pub fn new(
        coordinator: CoordinatorRef,
        target: TargetRef,
        ack_timeout: Duration,
    ) -> Result<Self, SketchError> {
        if coordinator.is_closed() {
            return Err(SketchError::InvalidReference(
                "the coordinator has stopped".to_string(),
            ));
        }
        if target.address.as_str().is_empty() {
            return Err(SketchError::InvalidReference(format!(
                "{} has no peer address",
                target
            )));
        }
        Ok(RemoteDataSet {
            coordinator,
            target,
            ack_timeout,
            _marker: PhantomData,
        })
    }

    /// Replaces how long this proxy waits for acknowledgments
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// The reference to the remote `DataSet`
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn coordinator(&self) -> &CoordinatorRef {
        &self.coordinator
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// A proxy for a `DataSet` derived from this one on the same peer
    fn derived<S>(&self, target: TargetRef) -> RemoteDataSet<S> {
        RemoteDataSet {
            coordinator: self.coordinator.clone(),
            target,
            ack_timeout: self.ack_timeout,
            _marker: PhantomData,
        }
    }

    async fn dispatch<F>(&self, build: F) -> PartialResultStream<Value>
    where
        F: FnOnce(Ack<Value>) -> Box<dyn Operation>,
    {
        match self
            .coordinator
            .ask(&self.target, build, self.ack_timeout)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Dispatch to {} failed: {}", self.target, e);
                PartialResultStream::failed(e)
            }
        }
    }
}

impl<T: Send + Sync + 'static> RemoteDataSet<T> {
    /// Sends `mapper` to the remote peer. The stream yields a proxy for the
    /// mapped `DataSet`, which stays on the same peer.
    pub fn map<S: Send + Sync + 'static>(
        &self,
        mapper: Arc<dyn Map<T, S>>,
    ) -> Dispatch<DataSet<S>> {
        let this = self.clone();
        async move {
            let replies = this
                .dispatch(|ack| Box::new(MapOperation::new(mapper, ack)))
                .await;
            replies.try_map_values(move |blob| {
                let target: TargetRef = decode(&blob)?;
                debug!("Mapped {} into {}", this.target, target);
                Ok(DataSet::Remote(this.derived(target)))
            })
        }
        .boxed()
    }

    /// Sends `sketch` to the remote peer, which streams back the summaries
    pub fn sketch<R>(&self, sketch: Arc<dyn Sketch<T, R>>) -> Dispatch<R>
    where
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        let this = self.clone();
        async move {
            let replies = this
                .dispatch(|ack| Box::new(SketchOperation::new(sketch, ack)))
                .await;
            replies.try_map_values(|blob| decode(&blob))
        }
        .boxed()
    }

    /// Pairs this `DataSet` with `other` on the peer that hosts both. The
    /// stream yields a proxy for the zipped `DataSet`.
    ///
    /// ## Errors
    /// Returns an error, without sending anything, if `other` is not a
    /// `RemoteDataSet` on the same peer. See [`check_zip_compatible`].
    ///
    /// [`check_zip_compatible`]: fn.check_zip_compatible.html
    pub fn zip<S>(
        &self,
        other: &DataSet<S>,
    ) -> Result<Dispatch<DataSet<(T, S)>>, SketchError>
    where
        T: Clone,
        S: Clone + Send + Sync + 'static,
    {
        let other = check_zip_compatible(self, other)?.target.clone();
        let this = self.clone();
        Ok(async move {
            let replies = this
                .dispatch(|ack| Box::new(ZipOperation::<T, S>::new(other, ack)))
                .await;
            replies.try_map_values(move |blob| {
                let target: TargetRef = decode(&blob)?;
                Ok(DataSet::Remote(this.derived(target)))
            })
        }
        .boxed())
    }
}

/// Checks that `right` can be zipped with `left`: it must be a
/// `RemoteDataSet` hosted by the same peer. Returns the proxy for `right`.
///
/// ## Errors
/// - `SketchError::UnsupportedZipOperand` if `right` is not remote
/// - `SketchError::IncompatibleZipTarget` if `right` is on a different peer
pub fn check_zip_compatible<'a, T, S>(
    left: &RemoteDataSet<T>,
    right: &'a DataSet<S>,
) -> Result<&'a RemoteDataSet<S>, SketchError> {
    match right {
        DataSet::Remote(right)
            if right.target.address == left.target.address =>
        {
            Ok(right)
        }
        DataSet::Remote(right) => Err(SketchError::IncompatibleZipTarget {
            left: left.target.address.clone(),
            right: right.target.address.clone(),
        }),
        other => Err(SketchError::UnsupportedZipOperand {
            expected: "remote",
            found: other.kind(),
        }),
    }
}

impl<T> Clone for RemoteDataSet<T> {
    fn clone(&self) -> Self {
        self.derived(self.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{Count, Sum};
    use crate::network::{Peer, PeerAddress, Request};
    use crate::partial_result::PartialResult;
    use futures::future;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time;

    const ACK_TIMEOUT: Duration = Duration::from_millis(500);

    fn target(address: &str, id: u64) -> TargetRef {
        TargetRef::new(PeerAddress::from(address), id)
    }

    /// A peer hosting `[0, 1000)` and a proxy for it whose requests go
    /// straight to the peer's mailbox
    fn hosted() -> (Peer, RemoteDataSet<Vec<i64>>) {
        let peer = Peer::spawn(PeerAddress::from("a"), 8);
        let rows: Vec<i64> = (0..1000).collect();
        let target = peer.host(DataSet::local(rows)).unwrap();
        let coordinator = CoordinatorRef::new(peer.mailbox());
        let remote =
            RemoteDataSet::new(coordinator, target, ACK_TIMEOUT).unwrap();
        (peer, remote)
    }

    /// A coordinator that answers every request with `reply`
    fn answering(
        reply: impl Fn(Request) + Send + 'static,
    ) -> CoordinatorRef {
        let (sender, mut receiver) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                reply(request);
            }
        });
        CoordinatorRef::new(sender)
    }

    /// A coordinator that counts the requests it relays to `peer`
    fn relaying(peer: &Peer, relayed: Arc<AtomicUsize>) -> CoordinatorRef {
        let (sender, mut receiver) = mpsc::channel::<Request>(8);
        let mailbox = peer.mailbox();
        tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                relayed.fetch_add(1, Ordering::SeqCst);
                if mailbox.send(request).await.is_err() {
                    break;
                }
            }
        });
        CoordinatorRef::new(sender)
    }

    #[tokio::test]
    async fn test_sketch_is_forwarded() {
        let (_peer, remote) = hosted();
        let sum: Arc<dyn Sketch<Vec<i64>, i64>> = Arc::new(Sum);
        let results: Vec<_> = remote.sketch(sum).await.collect().await;
        assert_eq!(results, vec![Ok(PartialResult::complete(499_500))]);
    }

    #[tokio::test]
    async fn test_map_stays_on_the_peer() {
        let (peer, remote) = hosted();
        let small: Arc<dyn Map<Vec<i64>, Vec<i64>>> =
            Arc::new(|v: &Vec<i64>| -> Vec<i64> {
                v.iter().copied().filter(|x| *x < 10).collect()
            });
        let mapped = remote.map(small).await.last_value().await.unwrap();
        match &mapped {
            DataSet::Remote(m) => {
                assert_eq!(m.target().address, remote.target().address);
                assert_ne!(m.target(), remote.target());
                assert_eq!(m.ack_timeout(), ACK_TIMEOUT);
            }
            other => panic!("expected a remote data set, got {:?}", other),
        }
        assert_eq!(peer.num_hosted(), 2);
        let count: Arc<dyn Sketch<Vec<i64>, u64>> = Arc::new(Count);
        let total = mapped.sketch(count).await.last_value().await;
        assert_eq!(total, Ok(10));
    }

    #[tokio::test]
    async fn test_zip_on_the_same_peer() {
        let (peer, remote) = hosted();
        let labels = peer.host(DataSet::local(String::from("abc"))).unwrap();
        let coordinator = remote.coordinator().clone();
        let labels: DataSet<String> = DataSet::Remote(
            RemoteDataSet::new(coordinator, labels, ACK_TIMEOUT).unwrap(),
        );
        let zipped = remote
            .zip(&labels)
            .unwrap()
            .await
            .last_value()
            .await
            .unwrap();
        let len: Arc<dyn Sketch<(Vec<i64>, String), u64>> =
            Arc::new(PairLen);
        assert_eq!(zipped.sketch(len).await.last_value().await, Ok(1003));
    }

    #[tokio::test]
    async fn test_zip_rejected_before_dispatch() {
        let (sender, mut receiver) = mpsc::channel(8);
        let coordinator = CoordinatorRef::new(sender);
        let left: RemoteDataSet<Vec<i64>> =
            RemoteDataSet::new(coordinator.clone(), target("a", 0), ACK_TIMEOUT)
                .unwrap();
        let elsewhere: DataSet<Vec<i64>> = DataSet::Remote(
            RemoteDataSet::new(coordinator, target("b", 0), ACK_TIMEOUT)
                .unwrap(),
        );
        match left.zip(&elsewhere) {
            Err(e) => assert_eq!(
                e,
                SketchError::IncompatibleZipTarget {
                    left: PeerAddress::from("a"),
                    right: PeerAddress::from("b"),
                }
            ),
            Ok(_) => panic!("zip across peers was dispatched"),
        }
        match left.zip(&DataSet::local(vec![1_i64])) {
            Err(e) => assert_eq!(
                e,
                SketchError::UnsupportedZipOperand {
                    expected: "remote",
                    found: "local",
                }
            ),
            Ok(_) => panic!("zip with a local data set was dispatched"),
        }
        // nothing reached the coordinator
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_is_a_single_error() {
        // the receiver is kept alive but never read
        let (sender, _receiver) = mpsc::channel(8);
        let timeout = Duration::from_millis(50);
        let remote: RemoteDataSet<Vec<i64>> = RemoteDataSet::new(
            CoordinatorRef::new(sender),
            target("a", 0),
            timeout,
        )
        .unwrap();
        let sum: Arc<dyn Sketch<Vec<i64>, i64>> = Arc::new(Sum);
        let results: Vec<_> = time::timeout(Duration::from_secs(5), async {
            remote.sketch(sum).await.collect::<Vec<_>>().await
        })
        .await
        .unwrap();
        assert_eq!(results, vec![Err(SketchError::DispatchTimeout(timeout))]);
    }

    #[tokio::test]
    async fn test_timeout_is_per_proxy() {
        let (sender, _receiver) = mpsc::channel(8);
        let remote: RemoteDataSet<Vec<i64>> = RemoteDataSet::new(
            CoordinatorRef::new(sender),
            target("a", 0),
            Duration::from_secs(60),
        )
        .unwrap()
        .with_ack_timeout(Duration::from_millis(20));
        let count: Arc<dyn Sketch<Vec<i64>, u64>> = Arc::new(Count);
        let results: Vec<_> = remote.sketch(count).await.collect().await;
        assert_eq!(
            results,
            vec![Err(SketchError::DispatchTimeout(Duration::from_millis(20)))]
        );
    }

    #[tokio::test]
    async fn test_remote_failure_has_the_timeout_shape() {
        let coordinator = answering(|request| {
            let peer = request.target().address.clone();
            request.reject(SketchError::RemoteExecution {
                peer,
                message: "out of memory".to_string(),
            })
        });
        let remote: RemoteDataSet<Vec<i64>> =
            RemoteDataSet::new(coordinator, target("a", 0), ACK_TIMEOUT)
                .unwrap();
        let sum: Arc<dyn Sketch<Vec<i64>, i64>> = Arc::new(Sum);
        let results: Vec<_> = remote.sketch(sum).await.collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(SketchError::RemoteExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_request_is_a_remote_failure() {
        let coordinator = answering(drop);
        let remote: RemoteDataSet<Vec<i64>> =
            RemoteDataSet::new(coordinator, target("a", 0), ACK_TIMEOUT)
                .unwrap();
        let doubled: Arc<dyn Map<Vec<i64>, Vec<i64>>> =
            Arc::new(|v: &Vec<i64>| v.clone());
        let results: Vec<_> = remote.map(doubled).await.collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(SketchError::RemoteExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_target_is_a_remote_failure() {
        let (peer, _) = hosted();
        let remote: RemoteDataSet<Vec<i64>> = RemoteDataSet::new(
            CoordinatorRef::new(peer.mailbox()),
            target("a", 99),
            ACK_TIMEOUT,
        )
        .unwrap();
        let sum: Arc<dyn Sketch<Vec<i64>, i64>> = Arc::new(Sum);
        let results: Vec<_> = remote.sketch(sum).await.collect().await;
        match &results[..] {
            [Err(SketchError::RemoteExecution { peer, .. })] => {
                assert_eq!(peer, &PeerAddress::from("a"))
            }
            other => panic!("unexpected results {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_inner_hop_does_not_hold_back_the_ack() {
        // the receiver is kept alive but never read
        let (sender, _receiver) = mpsc::channel(8);
        let unanswered: RemoteDataSet<Vec<i64>> = RemoteDataSet::new(
            CoordinatorRef::new(sender),
            target("b", 0),
            Duration::from_millis(300),
        )
        .unwrap();
        let peer = Peer::spawn(PeerAddress::from("a"), 8);
        let both = peer
            .host(DataSet::parallel(vec![
                DataSet::local(vec![1_i64, 2, 3]),
                DataSet::Remote(unanswered),
            ]))
            .unwrap();
        let outer: RemoteDataSet<Vec<i64>> = RemoteDataSet::new(
            CoordinatorRef::new(peer.mailbox()),
            both,
            ACK_TIMEOUT,
        )
        .unwrap()
        .with_ack_timeout(Duration::from_millis(100));

        let count: Arc<dyn Sketch<Vec<i64>, u64>> = Arc::new(Count);
        let mut results = outer.sketch(count).await;
        let first = time::timeout(Duration::from_millis(200), results.next())
            .await
            .unwrap();
        assert_eq!(first, Some(Ok(PartialResult::new(0.5, 3))));
        let rest: Vec<_> = results.collect().await;
        match &rest[..] {
            [Err(SketchError::RemoteExecution { peer, message })] => {
                assert_eq!(peer, &PeerAddress::from("a"));
                let inner = SketchError::DispatchTimeout(
                    Duration::from_millis(300),
                );
                assert_eq!(message, &inner.to_string());
            }
            other => panic!("unexpected results {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_operations_on_one_proxy() {
        const N: usize = 8;
        let peer = Peer::spawn(PeerAddress::from("a"), 2);
        let rows: Vec<i64> = (0..100).collect();
        let hosted = peer.host(DataSet::local(rows)).unwrap();
        let relayed = Arc::new(AtomicUsize::new(0));
        let remote: RemoteDataSet<Vec<i64>> = RemoteDataSet::new(
            relaying(&peer, relayed.clone()),
            hosted,
            ACK_TIMEOUT,
        )
        .unwrap();

        let sketches = (0..N).map(|_| {
            let remote = remote.clone();
            tokio::spawn(async move {
                let sum: Arc<dyn Sketch<Vec<i64>, i64>> = Arc::new(Sum);
                remote.sketch(sum).await.last_value().await
            })
        });
        let maps = (0..N).map(|_| {
            let remote = remote.clone();
            tokio::spawn(async move {
                let same: Arc<dyn Map<Vec<i64>, Vec<i64>>> =
                    Arc::new(|v: &Vec<i64>| v.clone());
                let mapped =
                    remote.map(same).await.last_value().await.unwrap();
                let count: Arc<dyn Sketch<Vec<i64>, u64>> = Arc::new(Count);
                mapped.sketch(count).await.last_value().await
            })
        });
        let (sums, counts) =
            future::join(future::join_all(sketches), future::join_all(maps))
                .await;
        for sum in sums {
            assert_eq!(sum.unwrap(), Ok(4950));
        }
        for count in counts {
            assert_eq!(count.unwrap(), Ok(100));
        }
        // N sketches, N maps and a sketch of each mapped data set
        assert_eq!(relayed.load(Ordering::SeqCst), 3 * N);
        assert_eq!(peer.num_hosted(), 1 + N);
    }

    #[tokio::test]
    async fn test_invalid_references() {
        let (sender, receiver) = mpsc::channel::<Request>(1);
        let coordinator = CoordinatorRef::new(sender);
        let res = RemoteDataSet::<Vec<i64>>::new(
            coordinator.clone(),
            target("", 0),
            ACK_TIMEOUT,
        );
        assert!(matches!(res, Err(SketchError::InvalidReference(_))));

        drop(receiver);
        let res = RemoteDataSet::<Vec<i64>>::new(
            coordinator,
            target("a", 0),
            ACK_TIMEOUT,
        );
        assert!(matches!(res, Err(SketchError::InvalidReference(_))));
    }

    /// The length of the integers plus the length of the label
    struct PairLen;

    impl crate::dataset::Monoid<u64> for PairLen {
        fn zero(&self) -> u64 {
            0
        }

        fn add(&self, left: u64, right: u64) -> u64 {
            left + right
        }
    }

    impl Sketch<(Vec<i64>, String), u64> for PairLen {
        fn create(&self, data: &(Vec<i64>, String)) -> u64 {
            (data.0.len() + data.1.len()) as u64
        }
    }
}
