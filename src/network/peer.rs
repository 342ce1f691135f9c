//! A `Peer` hosts `DataSet`s and executes the operations sent to them.
use crate::dataset::DataSet;
use crate::error::SketchError;
use crate::network::message::encode;
use crate::network::{PeerAddress, Request, TargetRef, Value};
use crate::partial_result::PartialResultStream;
use futures::StreamExt;
use log::{debug, info};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Notify};

/// The `DataSet`s hosted by a peer. Entries are type erased since one peer
/// hosts data sets of many element types.
type Registry = HashMap<u64, Box<dyn Any + Send + Sync>>;

/// A handle to a running peer. Dropping the handle does not stop the peer,
/// use [`Peer::stop`] for that.
///
/// Every `DataSet` produced by a map or zip on this peer is registered for
/// later requests and is never evicted, so the registry grows with each
/// such operation for as long as the peer lives.
///
/// [`Peer::stop`]: struct.Peer.html#method.stop
#[derive(Clone)]
pub struct Peer {
    state: Arc<PeerState>,
    mailbox: mpsc::Sender<Request>,
    kill_notifier: Arc<Notify>,
}

pub(crate) struct PeerState {
    address: PeerAddress,
    next_id: AtomicU64,
    registry: RwLock<Registry>,
}

impl Peer {
    /// Starts a new `Peer` at `address` that processes the requests sent to
    /// its mailbox. Must be called from within a `tokio` runtime.
    pub fn spawn(address: PeerAddress, mailbox_capacity: usize) -> Self {
        let (mailbox, receiver) = mpsc::channel(mailbox_capacity.max(1));
        let state = Arc::new(PeerState {
            address,
            next_id: AtomicU64::new(0),
            registry: RwLock::new(HashMap::new()),
        });
        let kill_notifier = Arc::new(Notify::new());
        info!("Starting peer {}", state.address);
        tokio::spawn(Peer::process_requests(
            state.clone(),
            receiver,
            kill_notifier.clone(),
        ));
        Peer {
            state,
            mailbox,
            kill_notifier,
        }
    }

    /// The address of this `Peer`
    pub fn address(&self) -> &PeerAddress {
        &self.state.address
    }

    /// The mailbox that requests for this `Peer` are delivered to
    pub fn mailbox(&self) -> mpsc::Sender<Request> {
        self.mailbox.clone()
    }

    /// Hosts `data` on this `Peer`, returning the reference that operations
    /// must be addressed to
    pub fn host<T: Send + Sync + 'static>(
        &self,
        data: DataSet<T>,
    ) -> Result<TargetRef, SketchError> {
        self.state.host(data)
    }

    /// The number of `DataSet`s hosted by this `Peer`, including the ones
    /// produced by operations
    pub fn num_hosted(&self) -> usize {
        self.state.registry.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Stops processing requests. Requests already being executed run to
    /// completion, requests sent afterwards fail.
    pub fn stop(&self) {
        self.kill_notifier.notify_one();
    }

    async fn process_requests(
        state: Arc<PeerState>,
        mut receiver: mpsc::Receiver<Request>,
        kill_notifier: Arc<Notify>,
    ) {
        loop {
            let request = tokio::select! {
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                _ = kill_notifier.notified() => break,
            };
            let peer = state.clone();
            tokio::spawn(async move {
                debug!("Peer {} processing {:?}", peer.address, request);
                request.execute(peer).await
            });
        }
        info!("Peer {} stopped", state.address);
    }
}

impl PeerState {
    pub(crate) fn host<T: Send + Sync + 'static>(
        &self,
        data: DataSet<T>,
    ) -> Result<TargetRef, SketchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .write()
            .map_err(|_| poisoned())?
            .insert(id, Box::new(data));
        Ok(TargetRef::new(self.address.clone(), id))
    }

    /// Looks up the `DataSet` with element type `T` that `target` refers to
    pub(crate) fn resolve<T: 'static>(
        &self,
        target: &TargetRef,
    ) -> Result<DataSet<T>, SketchError> {
        if target.address != self.address {
            return Err(SketchError::InvalidReference(format!(
                "{} is not hosted by {}",
                target, self.address
            )));
        }
        let registry = self.registry.read().map_err(|_| poisoned())?;
        let entry = registry.get(&target.id).ok_or_else(|| {
            SketchError::InvalidReference(format!("{} is not hosted", target))
        })?;
        (**entry).downcast_ref::<DataSet<T>>().cloned().ok_or_else(|| {
            SketchError::Execution(format!(
                "{} does not hold the requested element type",
                target
            ))
        })
    }

    /// Hosts every `DataSet` in `results` on this peer, replying with their
    /// references
    pub(crate) fn host_results<S: Send + Sync + 'static>(
        self: &Arc<Self>,
        results: PartialResultStream<DataSet<S>>,
    ) -> PartialResultStream<Value> {
        let peer = self.clone();
        self.reply(
            results.try_map_values(move |data| encode(&peer.host(data)?)),
        )
    }

    /// Reports every error in `results` as a failure of this peer
    pub(crate) fn reply<V: Send + 'static>(
        self: &Arc<Self>,
        results: PartialResultStream<V>,
    ) -> PartialResultStream<V> {
        let peer = self.clone();
        PartialResultStream::new(
            results.map(move |item| item.map_err(|e| peer.failure(e))),
        )
    }

    /// Wraps `error` into a `RemoteExecution` error raised by this peer.
    /// Failures already reported by another peer are kept as they are.
    pub(crate) fn failure(&self, error: SketchError) -> SketchError {
        match error {
            e @ SketchError::RemoteExecution { .. } => e,
            e => SketchError::RemoteExecution {
                peer: self.address.clone(),
                message: e.to_string(),
            },
        }
    }
}

fn poisoned() -> SketchError {
    SketchError::Execution("the registry lock is poisoned".to_string())
}
