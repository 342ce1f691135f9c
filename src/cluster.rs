//! This module defines the highest level component of a `liquid_sketch`
//! system: a set of peers together with the coordinator that routes
//! requests to them.
use crate::config::SketchConfig;
use crate::dataset::{DataSet, RemoteDataSet};
use crate::error::SketchError;
use crate::network::{Coordinator, CoordinatorRef, Peer, PeerAddress};
use log::info;
use std::collections::HashMap;
use std::time::Duration;

/// Represents a running `liquid_sketch` cluster, an easy way to place data
/// on peers and obtain [`DataSet`] handles for it.
///
/// [`DataSet`]: dataset/enum.DataSet.html
pub struct Cluster {
    /// The configuration this `Cluster` was started with
    pub config: SketchConfig,
    coordinator: Coordinator,
    /// A map of a peer's address to that `Peer`
    peers: HashMap<PeerAddress, Peer>,
}

impl Cluster {
    /// Starts one [`Peer`] for each of the given `addresses` and a
    /// [`Coordinator`] that knows all of them. Must be called from within a
    /// `tokio` runtime.
    ///
    /// ## Errors
    /// - `SketchError::Config` if `config` is invalid
    /// - `SketchError::InvalidReference` if an address is given twice
    ///
    /// [`Peer`]: network/struct.Peer.html
    /// [`Coordinator`]: network/struct.Coordinator.html
    pub async fn start(
        config: SketchConfig,
        addresses: impl IntoIterator<Item = PeerAddress>,
    ) -> Result<Self, SketchError> {
        config.validate()?;
        let capacity = config.remote.mailbox_capacity;
        let coordinator = Coordinator::spawn(capacity);
        let mut peers = HashMap::new();
        for address in addresses {
            let peer = Peer::spawn(address.clone(), capacity);
            let registered =
                coordinator.register(address.clone(), peer.mailbox()).await;
            if let Err(e) = registered {
                peer.stop();
                return Err(e);
            }
            peers.insert(address, peer);
        }
        info!("Started a cluster of {} peers", peers.len());
        Ok(Cluster {
            config,
            coordinator,
            peers,
        })
    }

    /// A handle for sending requests to the coordinator of this `Cluster`
    pub fn coordinator(&self) -> CoordinatorRef {
        self.coordinator.handle()
    }

    pub fn peer(&self, address: &PeerAddress) -> Option<&Peer> {
        self.peers.get(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &PeerAddress> {
        self.peers.keys()
    }

    /// How long proxies created by this `Cluster` wait for acknowledgments
    pub fn ack_timeout(&self) -> Duration {
        self.config.remote.ack_timeout()
    }

    /// Hosts `data` on the peer at `address` and returns a proxy for it.
    ///
    /// ## Errors
    /// `SketchError::InvalidReference` if there is no peer at `address`
    pub fn host<T: Send + Sync + 'static>(
        &self,
        address: &PeerAddress,
        data: DataSet<T>,
    ) -> Result<RemoteDataSet<T>, SketchError> {
        let peer = self.peers.get(address).ok_or_else(|| {
            SketchError::InvalidReference(format!(
                "no peer in this cluster is at {}",
                address
            ))
        })?;
        let target = peer.host(data)?;
        RemoteDataSet::new(self.coordinator(), target, self.ack_timeout())
    }

    /// Hosts each partition on the peer it is paired with, returning a
    /// `DataSet::Parallel` of proxies for the partitions in the given order.
    pub fn distribute<T: Send + Sync + 'static>(
        &self,
        partitions: Vec<(PeerAddress, T)>,
    ) -> Result<DataSet<T>, SketchError> {
        let children = partitions
            .into_iter()
            .map(|(address, data)| {
                Ok(DataSet::Remote(self.host(&address, DataSet::local(data))?))
            })
            .collect::<Result<Vec<_>, SketchError>>()?;
        Ok(DataSet::parallel(children))
    }

    /// Stops every peer and the coordinator. Requests sent afterwards fail
    /// with a `SketchError::RemoteExecution` error.
    pub fn shutdown(&self) {
        info!("Shutting down a cluster of {} peers", self.peers.len());
        for peer in self.peers.values() {
            peer.stop();
        }
        self.coordinator.stop();
    }
}
