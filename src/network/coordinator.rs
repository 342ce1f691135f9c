//! The local coordinating endpoint that routes requests to peers.
use crate::error::SketchError;
use crate::network::{CoordinatorRef, PeerAddress, Request};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};

/// Routes every [`Request`] it receives to the mailbox of the peer at the
/// request's target address.
///
/// Requests for unknown or stopped peers are rejected with a
/// `RemoteExecution` error, so a requester never waits on an address that
/// cannot answer. Once the `Coordinator` itself is stopped, every request
/// sent through its handles fails the same way.
///
/// [`Request`]: struct.Request.html
#[derive(Debug)]
pub struct Coordinator {
    /// A map of peer address to that peer's mailbox
    directory: Arc<RwLock<HashMap<PeerAddress, mpsc::Sender<Request>>>>,
    sender: mpsc::Sender<Request>,
    kill_notifier: Arc<Notify>,
}

impl Coordinator {
    /// Starts a new `Coordinator` with no known peers. Must be called from
    /// within a `tokio` runtime.
    pub fn spawn(mailbox_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(mailbox_capacity.max(1));
        let directory = Arc::new(RwLock::new(HashMap::new()));
        let kill_notifier = Arc::new(Notify::new());
        info!("Starting coordinator");
        tokio::spawn(Coordinator::route_requests(
            directory.clone(),
            receiver,
            kill_notifier.clone(),
        ));
        Coordinator {
            directory,
            sender,
            kill_notifier,
        }
    }

    /// Adds the peer at `address`, whose requests are delivered to `mailbox`.
    ///
    /// ## Errors
    /// `SketchError::InvalidReference` if a peer is already registered at
    /// `address`
    pub async fn register(
        &self,
        address: PeerAddress,
        mailbox: mpsc::Sender<Request>,
    ) -> Result<(), SketchError> {
        let mut directory = self.directory.write().await;
        if directory.contains_key(&address) {
            return Err(SketchError::InvalidReference(format!(
                "a peer is already registered at {}",
                address
            )));
        }
        debug!("Registered peer {}", address);
        directory.insert(address, mailbox);
        Ok(())
    }

    /// The addresses of all registered peers
    pub async fn peers(&self) -> Vec<PeerAddress> {
        self.directory.read().await.keys().cloned().collect()
    }

    /// Creates a new handle for sending requests to this `Coordinator`
    pub fn handle(&self) -> CoordinatorRef {
        CoordinatorRef::new(self.sender.clone())
    }

    /// Stops routing requests. Requests still queued are dropped, which
    /// their requesters see as a `RemoteExecution` error.
    pub fn stop(&self) {
        self.kill_notifier.notify_one();
    }

    async fn route_requests(
        directory: Arc<RwLock<HashMap<PeerAddress, mpsc::Sender<Request>>>>,
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
            let address = request.target().address.clone();
            let mailbox = { directory.read().await.get(&address).cloned() };
            match mailbox {
                // a full peer mailbox must not hold up other peers
                Some(mailbox) => {
                    tokio::spawn(async move {
                        if let Err(mpsc::error::SendError(request)) =
                            mailbox.send(request).await
                        {
                            warn!("Peer {} has stopped", address);
                            request.reject(SketchError::RemoteExecution {
                                peer: address,
                                message: "the peer has stopped".to_string(),
                            });
                        }
                    });
                }
                None => {
                    warn!("No peer is registered at {}", address);
                    request.reject(SketchError::RemoteExecution {
                        peer: address,
                        message: "no peer is registered at this address"
                            .to_string(),
                    });
                }
            }
        }
        info!("Coordinator stopped");
    }
}
