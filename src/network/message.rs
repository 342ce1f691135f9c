//! Defines the operation messages sent to peers, and how their results are
//! encoded for the trip back to the requester.
use crate::dataset::{Map, Sketch};
use crate::error::SketchError;
use crate::network::{Ack, OperationKind, PeerState, TargetRef};
use crate::partial_result::PartialResultStream;
use async_trait::async_trait;
use bincode::{deserialize, serialize};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// An encoded value in a reply stream. Sketch replies hold an encoded
/// summary, map and zip replies hold the encoded [`TargetRef`] of the
/// `DataSet` they produced.
///
/// [`TargetRef`]: struct.TargetRef.html
pub type Value = Vec<u8>;

pub(crate) fn encode<V: Serialize>(value: &V) -> Result<Value, SketchError> {
    Ok(serialize(value)?)
}

pub(crate) fn decode<V: DeserializeOwned>(
    blob: &[u8],
) -> Result<V, SketchError> {
    Ok(deserialize(blob)?)
}

/// An operation that a peer executes against one of its `DataSet`s.
/// Exactly one of `execute` or `reject` is called, and either one answers
/// the acknowledgment the operation carries. `execute` acknowledges as soon
/// as the target is resolved: the work itself, including any further remote
/// hops, runs as the requester consumes the stream.
#[async_trait]
pub(crate) trait Operation: Send {
    fn kind(&self) -> OperationKind;

    async fn execute(self: Box<Self>, peer: Arc<PeerState>, target: TargetRef);

    fn reject(self: Box<Self>, error: SketchError);
}

fn acknowledge(
    ack: Ack<Value>,
    reply: Result<PartialResultStream<Value>, SketchError>,
) {
    if ack.send(reply).is_err() {
        warn!("The requester stopped waiting before it was acknowledged");
    }
}

/// Applies `mapper` to the target and hosts the result on the same peer
pub(crate) struct MapOperation<T, S> {
    mapper: Arc<dyn Map<T, S>>,
    ack: Ack<Value>,
}

impl<T, S> MapOperation<T, S> {
    pub(crate) fn new(mapper: Arc<dyn Map<T, S>>, ack: Ack<Value>) -> Self {
        MapOperation { mapper, ack }
    }
}

#[async_trait]
impl<T, S> Operation for MapOperation<T, S>
where
    T: Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    fn kind(&self) -> OperationKind {
        OperationKind::Map
    }

    async fn execute(self: Box<Self>, peer: Arc<PeerState>, target: TargetRef) {
        let MapOperation { mapper, ack } = *self;
        let reply = match peer.resolve::<T>(&target) {
            Ok(source) => {
                let results = PartialResultStream::deferred(source.map(mapper));
                Ok(peer.host_results(results))
            }
            Err(e) => Err(peer.failure(e)),
        };
        acknowledge(ack, reply);
    }

    fn reject(self: Box<Self>, error: SketchError) {
        acknowledge(self.ack, Err(error))
    }
}

/// Summarizes the target with `sketch`
pub(crate) struct SketchOperation<T, R> {
    sketch: Arc<dyn Sketch<T, R>>,
    ack: Ack<Value>,
}

impl<T, R> SketchOperation<T, R> {
    pub(crate) fn new(sketch: Arc<dyn Sketch<T, R>>, ack: Ack<Value>) -> Self {
        SketchOperation { sketch, ack }
    }
}

#[async_trait]
impl<T, R> Operation for SketchOperation<T, R>
where
    T: Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    fn kind(&self) -> OperationKind {
        OperationKind::Sketch
    }

    async fn execute(self: Box<Self>, peer: Arc<PeerState>, target: TargetRef) {
        let SketchOperation { sketch, ack } = *self;
        let reply = match peer.resolve::<T>(&target) {
            Ok(source) => {
                let results =
                    PartialResultStream::deferred(source.sketch(sketch));
                let encoded = results.try_map_values(|r| encode(&r));
                Ok(peer.reply(encoded))
            }
            Err(e) => Err(peer.failure(e)),
        };
        acknowledge(ack, reply);
    }

    fn reject(self: Box<Self>, error: SketchError) {
        acknowledge(self.ack, Err(error))
    }
}

/// Pairs the target with `other`, which must be hosted by the same peer, and
/// hosts the pairs on that peer
pub(crate) struct ZipOperation<T, S> {
    other: TargetRef,
    ack: Ack<Value>,
    _types: PhantomData<fn() -> (T, S)>,
}

impl<T, S> ZipOperation<T, S> {
    pub(crate) fn new(other: TargetRef, ack: Ack<Value>) -> Self {
        ZipOperation {
            other,
            ack,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<T, S> Operation for ZipOperation<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> OperationKind {
        OperationKind::Zip
    }

    async fn execute(self: Box<Self>, peer: Arc<PeerState>, target: TargetRef) {
        let ZipOperation { other, ack, .. } = *self;
        let dispatch = peer
            .resolve::<T>(&target)
            .and_then(|left| Ok((left, peer.resolve::<S>(&other)?)))
            .and_then(|(left, right)| left.zip(&right));
        let reply = match dispatch {
            Ok(dispatch) => {
                Ok(peer.host_results(PartialResultStream::deferred(dispatch)))
            }
            Err(e) => Err(peer.failure(e)),
        };
        acknowledge(ack, reply);
    }

    fn reject(self: Box<Self>, error: SketchError) {
        acknowledge(self.ack, Err(error))
    }
}
