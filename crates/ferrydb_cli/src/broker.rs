//! FerryDB broker binary.
//!
//! Binds the transport-free broker handlers to the HTTP+JSON wire
//! protocol. Long polls run on the blocking pool so a quiet node parked
//! in `/pull-blocks` never starves the async executor.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use ferrydb_broker::{Broker, BrokerConfig, BrokerError, BrokerStatus};
use ferrydb_protocol::{
    CheckInRequest, CheckInResponse, PullBlocksRequest, PullBlocksResponse, PushBlocksRequest,
    RequestBlocksRequest,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// FerryDB relay broker.
#[derive(Parser)]
#[command(name = "ferrydb-broker", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
}

type HttpError = (StatusCode, String);

fn require_user_id(headers: &HeaderMap) -> Result<String, HttpError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| http_error(BrokerError::MissingUserId))
}

fn http_error(err: BrokerError) -> HttpError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string())
}

fn join_error(err: tokio::task::JoinError) -> HttpError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn check_in(
    State(broker): State<Arc<Broker>>,
    headers: HeaderMap,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<CheckInResponse>, HttpError> {
    let user_id = require_user_id(&headers)?;
    broker
        .check_in(&user_id, request)
        .map(Json)
        .map_err(http_error)
}

async fn pull_blocks(
    State(broker): State<Arc<Broker>>,
    headers: HeaderMap,
    Json(request): Json<PullBlocksRequest>,
) -> Result<Json<PullBlocksResponse>, HttpError> {
    let user_id = require_user_id(&headers)?;
    // The handler blocks for up to the long-poll window.
    tokio::task::spawn_blocking(move || broker.pull_blocks(&user_id, request))
        .await
        .map_err(join_error)?
        .map(Json)
        .map_err(http_error)
}

async fn push_blocks(
    State(broker): State<Arc<Broker>>,
    headers: HeaderMap,
    Json(request): Json<PushBlocksRequest>,
) -> Result<StatusCode, HttpError> {
    let user_id = require_user_id(&headers)?;
    broker
        .push_blocks(&user_id, request)
        .map(|()| StatusCode::OK)
        .map_err(http_error)
}

async fn request_blocks(
    State(broker): State<Arc<Broker>>,
    headers: HeaderMap,
    Json(request): Json<RequestBlocksRequest>,
) -> Result<StatusCode, HttpError> {
    let user_id = require_user_id(&headers)?;
    broker
        .request_blocks(&user_id, request)
        .map(|()| StatusCode::OK)
        .map_err(http_error)
}

async fn status(State(broker): State<Arc<Broker>>) -> Json<BrokerStatus> {
    Json(broker.status())
}

fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/check-in", post(check_in))
        .route("/pull-blocks", post(pull_blocks))
        .route("/push-blocks", post(push_blocks))
        .route("/request-blocks", post(request_blocks))
        .route("/status", get(status))
        .with_state(broker)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let broker = Arc::new(Broker::new(BrokerConfig::default()));
    let _gc = broker.start_gc();

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    info!(port = cli.port, "broker listening");
    axum::serve(listener, router(broker)).await?;
    Ok(())
}
