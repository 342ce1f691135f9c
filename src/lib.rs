//! # liquid_sketch
//!
//! `liquid_sketch` is a library for analyzing partitioned data sets that are
//! spread across many peers, without caring where each partition lives.
//!
//! Data is reached through a [`DataSet`] handle that supports three
//! operations:
//! - `map`: transform every partition into a new `DataSet`
//! - `sketch`: summarize every partition and combine the summaries with a
//!    commutative monoid
//! - `zip`: pair up the partitions of two co-located `DataSet`s
//!
//! Results are delivered as a [`PartialResultStream`], so that a long running
//! sketch reports useful approximate answers as partitions finish instead of
//! only once all of them are done. Operations on a remote `DataSet` wait a
//! bounded, configurable amount of time for the remote peer to acknowledge
//! them, and a failure of any kind arrives the same way: as the single
//! element of the returned stream.
//!
//! A [`Cluster`] starts a set of in-process peers and the coordinator that
//! routes requests to them, and is the easiest way to get started:
//!
//! ```rust,no_run
//! use liquid_sketch::config::SketchConfig;
//! use liquid_sketch::dataset::{Monoid, Sketch};
//! use liquid_sketch::network::PeerAddress;
//! use liquid_sketch::Cluster;
//! use std::sync::Arc;
//!
//! struct Count;
//!
//! impl Monoid<u64> for Count {
//!     fn zero(&self) -> u64 {
//!         0
//!     }
//!
//!     fn add(&self, left: u64, right: u64) -> u64 {
//!         left + right
//!     }
//! }
//!
//! impl Sketch<Vec<i64>, u64> for Count {
//!     fn create(&self, data: &Vec<i64>) -> u64 {
//!         data.len() as u64
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let peers = vec![PeerAddress::from("a"), PeerAddress::from("b")];
//!     let cluster = Cluster::start(SketchConfig::default(), peers.clone())
//!         .await
//!         .unwrap();
//!     let ds = cluster
//!         .distribute(vec![
//!             (peers[0].clone(), vec![1, 2]),
//!             (peers[1].clone(), vec![3, 4, 5]),
//!         ])
//!         .unwrap();
//!     let count: Arc<dyn Sketch<Vec<i64>, u64>> = Arc::new(Count);
//!     let total = ds.sketch(count).await.reduce(&Count).await.unwrap();
//!     assert_eq!(total.value, 5);
//! }
//! ```
//!
//! [`DataSet`]: dataset/enum.DataSet.html
//! [`PartialResultStream`]: partial_result/struct.PartialResultStream.html
//! [`Cluster`]: struct.Cluster.html
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod membership;
pub mod network;
pub mod partial_result;

pub use cluster::Cluster;
