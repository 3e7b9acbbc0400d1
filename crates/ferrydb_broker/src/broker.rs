//! The broker: node directory, block-request registry, long-poll
//! rendezvous, and offline-node GC.

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::state::{BrokerStatus, DirectoryEntry, PullSlot, UserRecord};
use ferrydb_protocol::{
    now_millis, CheckInRequest, CheckInResponse, NodeDetails, PullBlocksRequest,
    PullBlocksResponse, PushBlocksRequest, RequestBlocksRequest, WantedBlocks,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// The per-user relay.
///
/// Handlers lock one user's record at a time; users are independent. The
/// long-poll rendezvous hands a one-shot channel sender to the push that
/// wins the race for it, and the sender is used under the user lock, so
/// the timing-out puller can always tell "my slot is gone, the response
/// is already buffered" from "my slot is still mine".
pub struct Broker {
    config: BrokerConfig,
    users: Mutex<HashMap<String, Arc<Mutex<UserRecord>>>>,
    next_slot_id: AtomicU64,
}

impl Broker {
    /// Creates a broker with the given configuration.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            users: Mutex::new(HashMap::new()),
            next_slot_id: AtomicU64::new(1),
        }
    }

    /// Returns the broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn user(&self, user_id: &str) -> Arc<Mutex<UserRecord>> {
        let mut users = self.users.lock();
        Arc::clone(
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(UserRecord::default()))),
        )
    }

    fn user_if_exists(&self, user_id: &str) -> Option<Arc<Mutex<UserRecord>>> {
        self.users.lock().get(user_id).map(Arc::clone)
    }

    /// Handles a check-in: upserts the caller's directory entry and
    /// returns the full directory plus every outstanding block request.
    pub fn check_in(
        &self,
        user_id: &str,
        request: CheckInRequest,
    ) -> BrokerResult<CheckInResponse> {
        let record = self.user(user_id);
        let mut record = record.lock();

        if !record.nodes.contains_key(&request.node_id)
            && record.nodes.len() >= self.config.max_nodes_per_user
        {
            return Err(BrokerError::invalid_request(format!(
                "user has reached the ceiling of {} nodes",
                self.config.max_nodes_per_user
            )));
        }

        let details = NodeDetails {
            head_blocks: request.head_blocks,
            time: request.time,
            last_seen: now_millis(),
            database_hash: request.database_hash,
            generating_data: request.generating_data,
        };
        record
            .nodes
            .insert(request.node_id.clone(), DirectoryEntry { details });

        let node_details: BTreeMap<String, NodeDetails> = record
            .nodes
            .iter()
            .map(|(id, entry)| (id.clone(), entry.details.clone()))
            .collect();

        let wants: BTreeMap<String, WantedBlocks> = record
            .block_requests
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(id, set)| {
                (
                    id.clone(),
                    WantedBlocks {
                        required_hashes: set.clone(),
                    },
                )
            })
            .collect();

        Ok(CheckInResponse {
            node_details,
            wants_data: if wants.is_empty() { None } else { Some(wants) },
        })
    }

    /// Handles a long poll for blocks addressed to the caller.
    ///
    /// If a registration already exists for this node the call returns
    /// immediately with empty blocks; otherwise it blocks until a push
    /// arrives or the broker-side timer fires.
    pub fn pull_blocks(
        &self,
        user_id: &str,
        request: PullBlocksRequest,
    ) -> BrokerResult<PullBlocksResponse> {
        let record_arc = self.user(user_id);

        let (slot_id, receiver) = {
            let mut record = record_arc.lock();
            if record.pull_slots.contains_key(&request.node_id) {
                debug!(user = %user_id, node = %request.node_id, "duplicate pull registration");
                return Ok(PullBlocksResponse::timed_out());
            }
            let (sender, receiver) = mpsc::sync_channel(1);
            let slot_id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
            record
                .pull_slots
                .insert(request.node_id.clone(), PullSlot { id: slot_id, sender });
            (slot_id, receiver)
        };

        match receiver.recv_timeout(self.config.pull_timeout) {
            Ok(response) => Ok(response),
            // Timed out, or the user record was garbage collected.
            Err(_) => {
                if let Some(record_arc) = self.user_if_exists(user_id) {
                    let mut record = record_arc.lock();
                    let own = record
                        .pull_slots
                        .get(&request.node_id)
                        .is_some_and(|slot| slot.id == slot_id);
                    if own {
                        record.pull_slots.remove(&request.node_id);
                    }
                }
                // A push that took the slot before the cleanup above has
                // already buffered its response.
                match receiver.try_recv() {
                    Ok(response) => Ok(response),
                    Err(_) => Ok(PullBlocksResponse::timed_out()),
                }
            }
        }
    }

    /// Handles a push: delivers into the addressee's open long poll, or
    /// drops the blocks silently. Always succeeds for the pusher.
    pub fn push_blocks(&self, user_id: &str, request: PushBlocksRequest) -> BrokerResult<()> {
        let Some(record_arc) = self.user_if_exists(user_id) else {
            debug!(user = %user_id, "push for unknown user dropped");
            return Ok(());
        };
        let mut record = record_arc.lock();

        let Some(slot) = record.pull_slots.remove(&request.to_node_id) else {
            debug!(
                user = %user_id,
                to = %request.to_node_id,
                "push without registration dropped"
            );
            return Ok(());
        };

        let delivered: Vec<Uuid> = request.blocks.iter().map(|b| b.id).collect();
        let response = PullBlocksResponse {
            blocks: request.blocks,
            from_node_id: request.from_node_id,
        };

        // Sending under the user lock is what makes the pull-side cleanup
        // race-free. The send fails only if the puller already abandoned
        // its receiver; the push is then dropped like any unregistered one.
        if slot.sender.send(response).is_ok() {
            debug!(user = %user_id, to = %request.to_node_id, blocks = delivered.len(), "push delivered");
            if let Some(wanted) = record.block_requests.get_mut(&request.to_node_id) {
                for id in &delivered {
                    wanted.remove(id);
                }
                if wanted.is_empty() {
                    record.block_requests.remove(&request.to_node_id);
                }
            }
        }
        Ok(())
    }

    /// Handles a request-blocks: replaces the caller's wanted set.
    pub fn request_blocks(
        &self,
        user_id: &str,
        request: RequestBlocksRequest,
    ) -> BrokerResult<()> {
        if request.required_hashes.len() > self.config.max_requested_blocks {
            return Err(BrokerError::invalid_request(format!(
                "requested {} blocks, ceiling is {}",
                request.required_hashes.len(),
                self.config.max_requested_blocks
            )));
        }

        let record = self.user(user_id);
        let mut record = record.lock();
        if request.required_hashes.is_empty() {
            record.block_requests.remove(&request.node_id);
        } else {
            record
                .block_requests
                .insert(request.node_id, request.required_hashes);
        }
        Ok(())
    }

    /// Snapshot of the full per-user state, for the debug status route.
    pub fn status(&self) -> BrokerStatus {
        let users: Vec<(String, Arc<Mutex<UserRecord>>)> = self
            .users
            .lock()
            .iter()
            .map(|(id, record)| (id.clone(), Arc::clone(record)))
            .collect();

        BrokerStatus {
            users: users
                .into_iter()
                .map(|(id, record)| (id, record.lock().snapshot()))
                .collect(),
        }
    }

    /// One GC sweep at the given wall clock: drops every node silent for
    /// longer than the TTL, and every user whose last node is gone.
    pub fn run_gc_once(&self, now_ms: i64) {
        let ttl_ms = self.config.node_ttl.as_millis() as i64;
        let mut users = self.users.lock();
        users.retain(|user_id, record_arc| {
            let mut record = record_arc.lock();
            let stale: Vec<String> = record
                .nodes
                .iter()
                .filter(|(_, entry)| now_ms - entry.details.last_seen > ttl_ms)
                .map(|(id, _)| id.clone())
                .collect();
            for node_id in stale {
                info!(user = %user_id, node = %node_id, "dropping silent node");
                record.nodes.remove(&node_id);
                record.block_requests.remove(&node_id);
            }
            let keep = !record.nodes.is_empty();
            if !keep {
                info!(user = %user_id, "dropping user with no live nodes");
            }
            keep
        });
    }

    /// Spawns the periodic GC thread; the returned handle stops it.
    pub fn start_gc(self: &Arc<Self>) -> GcHandle {
        let broker = Arc::clone(self);
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            let slice = Duration::from_millis(20);
            while loop_running.load(Ordering::SeqCst) {
                let mut remaining = broker.config.gc_interval;
                while !remaining.is_zero() && loop_running.load(Ordering::SeqCst) {
                    let step = remaining.min(slice);
                    std::thread::sleep(step);
                    remaining -= step;
                }
                if loop_running.load(Ordering::SeqCst) {
                    broker.run_gc_once(now_millis());
                }
            }
        });
        GcHandle {
            running,
            handle: Some(handle),
        }
    }
}

/// Handle for the GC thread; stopping (or dropping) joins it.
pub struct GcHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GcHandle {
    /// Stops the GC thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
