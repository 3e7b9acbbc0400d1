//! FerryDB node binary.
//!
//! Runs one replica: storage, database, and sync engine against a broker
//! over HTTP. For test-driven runs the node can generate a seeded random
//! write stream for a fixed number of ticks and then keep syncing,
//! writing its database hash to the output directory so an external
//! harness can compare replicas.

use clap::Parser;
use ferrydb_core::Database;
use ferrydb_engine::{
    incoming_applier, wire_outgoing, CheckInStatus, HttpClient, HttpTransport, SyncConfig,
    SyncEngine,
};
use ferrydb_storage::{FileStorage, MemoryStorage, Storage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// FerryDB replica node.
#[derive(Parser)]
#[command(name = "ferrydb-node", version, about)]
struct Cli {
    /// This node's id, unique per user.
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// User whose replicas this node converges with.
    #[arg(long, env = "USER_ID", default_value = "default")]
    user_id: String,

    /// Full broker URL; overrides --broker-port.
    #[arg(long, env = "BROKER_URL")]
    broker_url: Option<String>,

    /// Broker port on localhost.
    #[arg(long, env = "BROKER_PORT", default_value_t = 8080)]
    broker_port: u16,

    /// Check-in interval in milliseconds.
    #[arg(long, env = "TICK_INTERVAL", default_value_t = 5000)]
    tick_interval: u64,

    /// Number of ticks to spend generating random writes (0 = none).
    #[arg(long, env = "MAX_GENERATION_TICKS", default_value_t = 0)]
    max_generation_ticks: u64,

    /// Directory the node writes its `<node_id>.hash` file into.
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Seed for the generated write stream.
    #[arg(long, env = "RANDOM_SEED", default_value_t = 0)]
    random_seed: u64,

    /// Persist documents and blocks under this directory instead of
    /// keeping them in memory.
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,
}

/// Blocking reqwest client carrying the user header.
///
/// The timeout must exceed the broker's two-minute long-poll window.
struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(150))
                .build()?,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, user_id: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .post(url)
            .header("X-User-Id", user_id)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            return Err(format!("broker responded {}", response.status()));
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| err.to_string())
    }
}

/// Seeded random write stream for convergence runs.
struct WriteGenerator {
    rng: StdRng,
}

impl WriteGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn apply_one(&mut self, database: &Database) {
        let collection = match database.collection("items") {
            Ok(collection) => collection,
            Err(err) => {
                warn!(%err, "generator could not open collection");
                return;
            }
        };
        let doc_id = format!("d{}", self.rng.gen_range(0..16));

        let result = if self.rng.gen_bool(0.1) {
            collection.delete_one(&doc_id)
        } else {
            let mut partial = Map::new();
            for _ in 0..self.rng.gen_range(1..=3) {
                let field = format!("f{}", self.rng.gen_range(0..6));
                let value: Value = match self.rng.gen_range(0..3) {
                    0 => json!(self.rng.gen_range(0..1000)),
                    1 => json!(self.rng.gen_bool(0.5)),
                    _ => json!(format!("v{}", self.rng.gen_range(0..100))),
                };
                partial.insert(field, value);
            }
            collection.upsert_one(&doc_id, partial)
        };
        if let Err(err) = result {
            warn!(%err, "generated write failed");
        }
    }
}

fn write_hash_file(output_dir: &PathBuf, node_id: &str, database: &Database) {
    let hash = match database.hash() {
        Ok(hash) => hash,
        Err(err) => {
            warn!(%err, "hashing failed");
            return;
        }
    };
    let path = output_dir.join(format!("{node_id}.hash"));
    if let Err(err) = std::fs::write(&path, hash) {
        warn!(%err, path = %path.display(), "could not write hash file");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let broker_url = cli
        .broker_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", cli.broker_port));

    let storage: Arc<dyn Storage> = match &cli.data_dir {
        Some(dir) => Arc::new(FileStorage::open(dir)?),
        None => Arc::new(MemoryStorage::new()),
    };
    let database = Arc::new(Database::new(cli.node_id.clone(), Arc::clone(&storage)));

    let config = SyncConfig::new(cli.node_id.clone(), cli.user_id.clone())
        .with_tick_interval(Duration::from_millis(cli.tick_interval));
    let transport = HttpTransport::new(broker_url.clone(), cli.user_id.clone(), ReqwestClient::new()?);
    let engine = Arc::new(SyncEngine::new(
        config,
        storage,
        transport,
        incoming_applier(Arc::clone(&database)),
    ));
    wire_outgoing(&database, Arc::clone(&engine));

    let generating = Arc::new(AtomicBool::new(cli.max_generation_ticks > 0));
    {
        let database = Arc::clone(&database);
        let generating = Arc::clone(&generating);
        engine.set_status_provider(move || CheckInStatus {
            database_hash: database.hash().ok(),
            generating_data: Some(generating.load(Ordering::SeqCst)),
        });
    }

    engine.start_sync()?;
    info!(node = %cli.node_id, broker = %broker_url, "node running");

    let tick = Duration::from_millis(cli.tick_interval);
    let mut generator = WriteGenerator::new(cli.random_seed);
    for tick_number in 0..cli.max_generation_ticks {
        generator.apply_one(&database);
        if let Some(dir) = &cli.output_dir {
            write_hash_file(dir, &cli.node_id, &database);
        }
        info!(tick = tick_number + 1, of = cli.max_generation_ticks, "generated write");
        std::thread::sleep(tick);
    }
    generating.store(false, Ordering::SeqCst);
    if cli.max_generation_ticks > 0 {
        info!("generation finished, syncing only");
    }

    loop {
        if let Some(dir) = &cli.output_dir {
            write_hash_file(dir, &cli.node_id, &database);
        }
        std::thread::sleep(tick);
    }
}
