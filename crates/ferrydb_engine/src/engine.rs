//! The sync engine: two cooperative loops around the DAG and pending map.

use crate::config::{CheckInStatus, SyncConfig};
use crate::error::EngineResult;
use crate::graph::BlockGraph;
use crate::pending::PendingBlockMap;
use crate::sync::{integrate_incoming_blocks, run_check_in, CheckInOutcome};
use crate::transport::BrokerTransport;
use ferrydb_protocol::{Block, PullBlocksRequest, Update};
use ferrydb_storage::Storage;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

type IncomingHandler = Box<dyn Fn(Vec<Update>) + Send + Sync>;
type StatusProvider = Box<dyn Fn() -> CheckInStatus + Send + Sync>;

/// The DAG and pending map, guarded together.
///
/// The two loops (and application commits) never operate on them
/// concurrently: this mutex is the per-engine lock that makes the
/// thread-based implementation equivalent to a cooperative single-threaded
/// one. Network waits happen outside the lock.
struct EngineState {
    graph: BlockGraph,
    pending: PendingBlockMap,
}

struct Shared<T> {
    config: SyncConfig,
    transport: T,
    state: Mutex<EngineState>,
    on_incoming: IncomingHandler,
    status_provider: RwLock<Option<StatusProvider>>,
    running: AtomicBool,
}

/// A node's synchronization engine.
///
/// Owns the block graph and the pending-block map, and runs two
/// independent loops once started:
///
/// - the **check-in loop** advertises heads, serves peer block requests
///   and refreshes this node's own request set every tick;
/// - the **pull loop** long-polls the broker for pushed blocks and
///   integrates them, immediately re-polling after each completion.
///
/// `stop_sync` is cooperative: it never cancels an in-flight network
/// call, it only guarantees no new work is scheduled; a result arriving
/// after the stop is discarded.
pub struct SyncEngine<T: BrokerTransport> {
    shared: Arc<Shared<T>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: BrokerTransport + 'static> SyncEngine<T> {
    /// Creates an engine over the given storage and transport.
    ///
    /// `on_incoming` receives each time-ordered update batch produced by
    /// block integration; in a running node it applies the batch to the
    /// database (see [`crate::incoming_applier`]).
    pub fn new(
        config: SyncConfig,
        storage: Arc<dyn Storage>,
        transport: T,
        on_incoming: impl Fn(Vec<Update>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                state: Mutex::new(EngineState {
                    graph: BlockGraph::new(storage),
                    pending: PendingBlockMap::new(),
                }),
                on_incoming: Box::new(on_incoming),
                status_provider: RwLock::new(None),
                running: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Registers a provider for the optional status advertised with each
    /// check-in (database hash, generating flag).
    pub fn set_status_provider(&self, provider: impl Fn() -> CheckInStatus + Send + Sync + 'static) {
        *self.shared.status_provider.write() = Some(Box::new(provider));
    }

    /// Returns this engine's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Loads persisted graph state and spawns the two loops.
    ///
    /// Calling `start_sync` on a running engine is a no-op.
    pub fn start_sync(&self) -> EngineResult<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!(node = %self.shared.config.node_id, "start_sync called while already running");
            return Ok(());
        }

        {
            let mut state = self.shared.state.lock();
            state.graph.load_head_blocks()?;
            state.pending = PendingBlockMap::new();
        }
        info!(node = %self.shared.config.node_id, "sync started");

        let check_in_shared = Arc::clone(&self.shared);
        let pull_shared = Arc::clone(&self.shared);
        let mut handles = self.handles.lock();
        handles.push(std::thread::spawn(move || {
            Self::check_in_loop(check_in_shared)
        }));
        handles.push(std::thread::spawn(move || Self::pull_loop(pull_shared)));
        Ok(())
    }

    /// Stops both loops cooperatively at their next check.
    pub fn stop_sync(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        info!(node = %self.shared.config.node_id, "sync stopping");
    }

    /// Returns true while the loops are scheduled.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Commits a batch of updates as one new block.
    pub fn commit_updates(&self, updates: Vec<Update>) -> EngineResult<Block> {
        let mut state = self.shared.state.lock();
        state.graph.commit(updates)
    }

    /// Current head ids; for inspection and tests.
    pub fn head_block_ids(&self) -> BTreeSet<Uuid> {
        self.shared.state.lock().graph.head_block_ids()
    }

    /// Every hydrated block; for inspection and tests.
    pub fn loaded_blocks(&self) -> Vec<Block> {
        self.shared.state.lock().graph.loaded_blocks()
    }

    /// Number of blocks parked in the pending map.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Runs one check-in tick synchronously.
    ///
    /// The loop calls this every `tick_interval`; tests call it directly
    /// to drive the engine deterministically.
    pub fn check_in_once(&self) -> EngineResult<CheckInOutcome> {
        Self::check_in_once_inner(&self.shared)
    }

    /// Runs one pull + integration round synchronously.
    ///
    /// Returns the number of blocks integrated. The network wait happens
    /// before the state lock is taken, and dispatch to the incoming
    /// handler happens after it is released.
    pub fn pull_once(&self) -> EngineResult<usize> {
        Self::pull_once_inner(&self.shared)
    }

    fn check_in_once_inner(shared: &Shared<T>) -> EngineResult<CheckInOutcome> {
        let status = shared
            .status_provider
            .read()
            .as_ref()
            .map(|provider| provider())
            .unwrap_or_default();

        let mut state = shared.state.lock();
        let EngineState { graph, pending } = &mut *state;
        run_check_in(&shared.config.node_id, graph, pending, &shared.transport, &status)
    }

    fn pull_once_inner(shared: &Shared<T>) -> EngineResult<usize> {
        let request = PullBlocksRequest {
            node_id: shared.config.node_id.clone(),
        };
        let was_running = shared.running.load(Ordering::SeqCst);
        let response = shared.transport.pull_blocks(&request)?;

        // A result arriving after stop_sync is discarded; a synchronous
        // caller driving a never-started engine is unaffected.
        if was_running && !shared.running.load(Ordering::SeqCst) {
            debug!(node = %shared.config.node_id, "discarding pull result after stop");
            return Ok(0);
        }

        let batches = {
            let mut state = shared.state.lock();
            let EngineState { graph, pending } = &mut *state;
            integrate_incoming_blocks(graph, pending, response.blocks)?
        };

        let integrated = batches.len();
        if integrated > 0 {
            debug!(
                node = %shared.config.node_id,
                from = %response.from_node_id,
                integrated,
                "integrated pushed blocks"
            );
        }
        for batch in batches {
            (shared.on_incoming)(batch);
        }
        Ok(integrated)
    }

    fn check_in_loop(shared: Arc<Shared<T>>) {
        while shared.running.load(Ordering::SeqCst) {
            if let Err(err) = Self::check_in_once_inner(&shared) {
                warn!(node = %shared.config.node_id, %err, "check-in failed");
            }
            sleep_cooperatively(shared.config.tick_interval, &shared.running);
        }
        debug!(node = %shared.config.node_id, "check-in loop exited");
    }

    fn pull_loop(shared: Arc<Shared<T>>) {
        while shared.running.load(Ordering::SeqCst) {
            match Self::pull_once_inner(&shared) {
                // The long poll itself is the pacing; re-poll immediately.
                Ok(_) => {}
                Err(err) => {
                    warn!(node = %shared.config.node_id, %err, "pull failed");
                    sleep_cooperatively(shared.config.pull_retry_delay, &shared.running);
                }
            }
        }
        debug!(node = %shared.config.node_id, "pull loop exited");
    }
}

/// Sleeps in short slices so a stopped engine wakes up promptly.
fn sleep_cooperatively(total: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(20);
    let mut remaining = total;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use ferrydb_protocol::{CheckInResponse, PullBlocksResponse};
    use ferrydb_storage::MemoryStorage;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn engine_with(transport: MockTransport) -> SyncEngine<MockTransport> {
        let config = SyncConfig::new("n1", "u1")
            .with_tick_interval(Duration::from_millis(20))
            .with_pull_retry_delay(Duration::from_millis(5));
        SyncEngine::new(config, Arc::new(MemoryStorage::new()), transport, |_| {})
    }

    fn update(ts: i64) -> Update {
        Update::field("x", "d", "f", json!(ts)).with_timestamp(ts)
    }

    #[test]
    fn commit_updates_creates_blocks() {
        let engine = engine_with(MockTransport::new());
        let block = engine.commit_updates(vec![update(1)]).unwrap();
        assert_eq!(engine.head_block_ids(), BTreeSet::from([block.id]));
    }

    #[test]
    fn pull_once_integrates_and_dispatches() {
        let transport = MockTransport::new();
        let block = Block::new(BTreeSet::new(), vec![update(1)]);
        transport.set_pull_response(PullBlocksResponse {
            blocks: vec![block.clone()],
            from_node_id: "n2".into(),
        });

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let config = SyncConfig::new("n1", "u1");
        let engine = SyncEngine::new(
            config,
            Arc::new(MemoryStorage::new()),
            transport,
            move |batch| received2.lock().push(batch),
        );

        let integrated = engine.pull_once().unwrap();
        assert_eq!(integrated, 1);
        assert_eq!(engine.head_block_ids(), BTreeSet::from([block.id]));
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn check_in_once_with_empty_directory() {
        let transport = MockTransport::new();
        transport.set_check_in_response(CheckInResponse {
            node_details: BTreeMap::new(),
            wants_data: None,
        });
        let engine = engine_with(transport);

        let outcome = engine.check_in_once().unwrap();
        assert_eq!(outcome, CheckInOutcome::default());
    }

    #[test]
    fn start_and_stop_are_cooperative() {
        let engine = engine_with(MockTransport::new());
        assert!(!engine.is_running());

        engine.start_sync().unwrap();
        assert!(engine.is_running());
        // A second start is a no-op.
        engine.start_sync().unwrap();

        std::thread::sleep(Duration::from_millis(30));
        engine.stop_sync();
        assert!(!engine.is_running());

        // Both loops observe the flag and exit.
        let handles: Vec<_> = engine.handles.lock().drain(..).collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
