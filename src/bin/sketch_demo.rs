use clap::Parser;
use futures::StreamExt;
use liquid_sketch::config::SketchConfig;
use liquid_sketch::dataset::{DataSet, Map, Monoid, Sketch};
use liquid_sketch::error::SketchError;
use liquid_sketch::membership::IntSet;
use liquid_sketch::network::PeerAddress;
use liquid_sketch::Cluster;
use log::{info, Level};
use std::sync::Arc;
use std::time::Duration;

/// Starts a cluster of in-process peers, spreads row ids across them and
/// runs a few sketches over the rows
#[derive(Parser)]
#[clap(version = "1.0", author = "Samedh G. & Thomas H.")]
struct Opts {
    /// The number of peers to start
    #[clap(short = 'p', long = "peers", default_value = "3")]
    peers: usize,
    /// The number of rows to spread across the peers
    #[clap(short = 'r', long = "rows", default_value = "100000")]
    rows: i32,
    /// An optional TOML configuration file
    #[clap(short = 'c', long = "config")]
    config: Option<String>,
    /// Overrides how long to wait for each request to be acknowledged
    #[clap(short = 't', long = "ack_timeout_ms")]
    ack_timeout_ms: Option<u64>,
}

/// Counts the rows of a partition
struct RowCount;

impl Monoid<u64> for RowCount {
    fn zero(&self) -> u64 {
        0
    }

    fn add(&self, left: u64, right: u64) -> u64 {
        left + right
    }
}

impl Sketch<IntSet, u64> for RowCount {
    fn create(&self, rows: &IntSet) -> u64 {
        rows.len() as u64
    }
}

impl Sketch<(IntSet, IntSet), u64> for RowCount {
    fn create(&self, rows: &(IntSet, IntSet)) -> u64 {
        rows.0.iter().filter(|&r| rows.1.contains(r)).count() as u64
    }
}

#[tokio::main]
async fn main() -> Result<(), SketchError> {
    let opts: Opts = Opts::parse();
    simple_logger::init_with_level(Level::Info).unwrap();

    let mut config = match &opts.config {
        Some(path) => SketchConfig::from_file(path)?,
        None => SketchConfig::default(),
    }
    .with_env_overrides();
    if let Some(ms) = opts.ack_timeout_ms {
        config.remote.ack_timeout_ms = ms;
    }

    let peers: Vec<PeerAddress> = (0..opts.peers.max(1))
        .map(|i| PeerAddress::from(format!("127.0.0.{}:9000", i + 2)))
        .collect();
    let cluster = Cluster::start(config, peers.clone()).await?;

    // round robin the row ids over the peers
    let mut partitions: Vec<IntSet> = vec![IntSet::default(); peers.len()];
    for row in 0..opts.rows {
        partitions[row as usize % peers.len()].insert(row);
    }
    let rows =
        cluster.distribute(peers.iter().cloned().zip(partitions).collect())?;

    let count: Arc<dyn Sketch<IntSet, u64>> = Arc::new(RowCount);
    let mut running =
        rows.sketch(count.clone()).await.running(Arc::new(RowCount));
    while let Some(partial) = running.next().await {
        let partial = partial?;
        info!(
            "Counted {} rows so far ({:.0}% done)",
            partial.value,
            partial.done * 100.0
        );
    }

    let sampler: Arc<dyn Map<IntSet, IntSet>> =
        Arc::new(|rows: &IntSet| rows.sample(rows.len() / 10, 42));
    let sampled = rows.map(sampler).await.last_value().await?;
    let total = sampled.sketch(count).await.reduce(&RowCount).await?;
    info!("A 10% sample holds {} rows", total.value);

    let on_first = peers[0].clone();
    let evens: IntSet = (0..opts.rows).filter(|r| r % 2 == 0).collect();
    let threes: IntSet = (0..opts.rows).filter(|r| r % 3 == 0).collect();
    let odds: IntSet = (0..opts.rows).filter(|r| r % 2 == 1).collect();
    let left = DataSet::local(evens);
    let left = DataSet::Remote(cluster.host(&on_first, left)?);
    let right = cluster.host(&on_first, DataSet::local(threes))?;
    let right = DataSet::Remote(right);
    let both: Arc<dyn Sketch<(IntSet, IntSet), u64>> = Arc::new(RowCount);
    let zipped = left.zip(&right)?.await.last_value().await?;
    let common = zipped.sketch(both).await.last_value().await?;
    info!("Zipped on {}: {} rows in common", on_first, common);

    if let Some(elsewhere) = peers.get(1) {
        let far = cluster.host(elsewhere, DataSet::local(odds))?;
        let far = DataSet::Remote(far);
        match left.zip(&far) {
            Err(e) => info!("Zip across peers was refused: {}", e),
            Ok(_) => info!("Zip across peers was unexpectedly dispatched"),
        }
    }

    let slow = match rows {
        DataSet::Parallel(p) => p.children().first().cloned(),
        _ => None,
    };
    if let Some(DataSet::Remote(slow)) = slow {
        cluster.shutdown();
        let slow =
            DataSet::Remote(slow.with_ack_timeout(Duration::from_millis(50)));
        let count: Arc<dyn Sketch<IntSet, u64>> = Arc::new(RowCount);
        match slow.sketch(count).await.last_value().await {
            Ok(n) => info!("A stopped peer still counted {} rows", n),
            Err(e) => info!("A stopped peer answered with: {}", e),
        }
    }
    Ok(())
}
