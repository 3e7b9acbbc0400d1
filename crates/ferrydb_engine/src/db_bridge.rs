//! Wiring between a database and a sync engine.
//!
//! The two sides only know each other through callbacks: the database
//! hands outgoing update batches to the engine's commit path, and the
//! engine hands time-ordered incoming batches to the database. Both
//! directions are injected explicitly; there are no hidden singletons.

use crate::engine::SyncEngine;
use crate::transport::BrokerTransport;
use ferrydb_core::Database;
use ferrydb_protocol::Update;
use std::sync::Arc;
use tracing::{error, warn};

/// Builds the engine's incoming handler from a database.
///
/// Pass the result to [`SyncEngine::new`]; every integrated batch is
/// applied via [`Database::apply_incoming_updates`]. Application failures
/// are logged, not propagated: the engine may re-deliver overlapping
/// history on a later integration, which repairs partial application.
pub fn incoming_applier(database: Arc<Database>) -> impl Fn(Vec<Update>) + Send + Sync {
    move |updates| {
        if let Err(err) = database.apply_incoming_updates(&updates) {
            error!(%err, "failed to apply incoming updates");
        }
    }
}

/// Routes the database's outgoing updates into the engine's commit path.
///
/// Updates from a single `upsert_one` call arrive as one batch and form
/// one block.
pub fn wire_outgoing<T: BrokerTransport + 'static>(
    database: &Database,
    engine: Arc<SyncEngine<T>>,
) {
    database.set_outgoing_handler(move |updates| {
        if let Err(err) = engine.commit_updates(updates.to_vec()) {
            warn!(%err, "failed to commit outgoing updates");
        }
    });
}
