//! A module with the messaging used to dispatch operations to `DataSet`s
//! hosted by other peers.
//!
//! The pieces are:
//! - [`CoordinatorRef`]: the handle a `RemoteDataSet` sends its requests
//!    through. [`CoordinatorRef::ask`] is the only place in the crate that
//!    waits on another peer, and it waits for a bounded amount of time.
//! - [`Coordinator`]: the local endpoint behind a `CoordinatorRef`, which
//!    routes each [`Request`] to the [`Peer`] at the request's address.
//! - [`Peer`]: hosts `DataSet`s and executes the operations sent to them.
//!
//! Many `RemoteDataSet`s, on many tasks, may share one `CoordinatorRef`.
//!
//! [`CoordinatorRef`]: struct.CoordinatorRef.html
//! [`CoordinatorRef::ask`]: struct.CoordinatorRef.html#method.ask
//! [`Coordinator`]: struct.Coordinator.html
//! [`Request`]: struct.Request.html
//! [`Peer`]: struct.Peer.html
use crate::error::SketchError;
use crate::partial_result::PartialResultStream;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

mod coordinator;
pub use coordinator::Coordinator;

pub(crate) mod message;
pub use message::Value;
use message::Operation;

mod peer;
pub use peer::Peer;
pub(crate) use peer::PeerState;

/// The address of a peer, e.g. `"node1:9000"`. Only equality is meaningful.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        PeerAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        PeerAddress::new(address)
    }
}

impl From<String> for PeerAddress {
    fn from(address: String) -> Self {
        PeerAddress(address)
    }
}

/// Identifies one `DataSet` hosted by a peer, as well as which peer hosts it
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
pub struct TargetRef {
    /// The peer hosting the `DataSet`
    pub address: PeerAddress,
    /// Which of the peer's `DataSet`s this is
    pub id: u64,
}

impl TargetRef {
    pub fn new(address: PeerAddress, id: u64) -> Self {
        TargetRef { address, id }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}

/// The three kinds of operation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Map,
    Sketch,
    Zip,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperationKind::Map => f.write_str("map"),
            OperationKind::Sketch => f.write_str("sketch"),
            OperationKind::Zip => f.write_str("zip"),
        }
    }
}

/// An operation addressed to the `DataSet` identified by `target`
pub struct Request {
    target: TargetRef,
    op: Box<dyn Operation>,
}

impl Request {
    pub(crate) fn new(target: TargetRef, op: Box<dyn Operation>) -> Self {
        Request { target, op }
    }

    /// The `DataSet` this request is addressed to
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// What kind of operation this request carries
    pub fn kind(&self) -> OperationKind {
        self.op.kind()
    }

    /// Answers this request with the given `error` instead of executing it
    pub fn reject(self, error: SketchError) {
        self.op.reject(error)
    }

    pub(crate) async fn execute(self, peer: Arc<PeerState>) {
        self.op.execute(peer, self.target).await
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Request")
            .field("target", &self.target)
            .field("kind", &self.kind())
            .finish()
    }
}

/// The sending half of an acknowledgment: the result stream of an operation,
/// or the reason it could not be started
pub(crate) type Ack<V> =
    oneshot::Sender<Result<PartialResultStream<V>, SketchError>>;

/// A cloneable handle to the mailbox of a [`Coordinator`].
///
/// [`Coordinator`]: struct.Coordinator.html
#[derive(Debug, Clone)]
pub struct CoordinatorRef {
    sender: mpsc::Sender<Request>,
}

impl CoordinatorRef {
    /// Creates a new `CoordinatorRef` that delivers requests to the given
    /// mailbox
    pub fn new(sender: mpsc::Sender<Request>) -> Self {
        CoordinatorRef { sender }
    }

    /// Whether the coordinator behind this handle has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends the request built by `build` to the coordinator and waits for
    /// it to be acknowledged. Sending and waiting together take at most
    /// `timeout`; once this returns the stream is delivered asynchronously
    /// and nothing else waits.
    ///
    /// ## Errors
    /// - `SketchError::DispatchTimeout` if there was no acknowledgment in
    ///   time
    /// - `SketchError::RemoteExecution` if the coordinator is gone, dropped
    ///   the request, or acknowledged it with an error
    pub(crate) async fn ask<V, F>(
        &self,
        target: &TargetRef,
        build: F,
        timeout: Duration,
    ) -> Result<PartialResultStream<V>, SketchError>
    where
        F: FnOnce(Ack<V>) -> Box<dyn Operation>,
    {
        let (ack, acknowledgment) = oneshot::channel();
        let request = Request::new(target.clone(), build(ack));
        debug!("Dispatching {} to {}", request.kind(), target);
        let exchange = async {
            if self.sender.send(request).await.is_err() {
                return Err(SketchError::RemoteExecution {
                    peer: target.address.clone(),
                    message: "the coordinator has stopped".to_string(),
                });
            }
            match acknowledgment.await {
                Ok(reply) => reply,
                Err(_) => Err(SketchError::RemoteExecution {
                    peer: target.address.clone(),
                    message: "the request was dropped without a reply"
                        .to_string(),
                }),
            }
        };
        match time::timeout(timeout, exchange).await {
            Ok(reply) => reply,
            Err(_) => Err(SketchError::DispatchTimeout(timeout)),
        }
    }
}

impl From<mpsc::Sender<Request>> for CoordinatorRef {
    fn from(sender: mpsc::Sender<Request>) -> Self {
        CoordinatorRef::new(sender)
    }
}
