//! HTTP API of the node
//!
//! Thin axum handlers over `NodeService`. Anything that mines or talks to
//! peers runs on the blocking pool so the async workers stay free to serve
//! reads and the event stream.

use crate::core::MiningOutcome;
use crate::error::{BlockchainError, Result};
use crate::network::messages::{BlockAnnouncement, PeerRequest, PeersResponse, SubmitRequest};
use crate::network::sync::{PeerSyncResult, SyncOutcome};
use crate::node::{BlockReceipt, NodeService};
use crate::storage::SubmitOutcome;
use crate::utils::current_timestamp;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

type NodeState = State<Arc<NodeService>>;

/// An error response: status code plus `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> ApiError {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BlockchainError> for ApiError {
    fn from(err: BlockchainError) -> Self {
        let status = match &err {
            e if e.is_concurrency_conflict() => StatusCode::CONFLICT,
            BlockchainError::Validation(_)
            | BlockchainError::Linkage(_)
            | BlockchainError::ProofOfWork(_) => StatusCode::BAD_REQUEST,
            BlockchainError::InvalidChain(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BlockchainError::PeerUnreachable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed with {}: {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(node: Arc<NodeService>) -> Router {
    Router::new()
        .route("/submit", post(submit_transaction))
        .route("/submit_transaction", post(submit_transaction))
        .route("/mine", post(mine))
        .route("/sync", post(sync))
        .route("/chain", get(get_chain))
        .route("/chain/latest", get(get_latest_block))
        .route("/transactions", get(get_transactions))
        .route("/peers", get(get_peers))
        .route("/register", post(register))
        .route("/receive_block", post(receive_block))
        .route("/stream", get(stream_events))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(node)
}

/// Serve until Ctrl-C.
pub async fn serve(node: Arc<NodeService>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
    info!("Server listening on {addr}");
    serve_listener(listener, node, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await
}

pub async fn serve_listener<F>(
    listener: TcpListener,
    node: Arc<NodeService>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(node))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| BlockchainError::Network(format!("Server failed: {e}")))
}

async fn run_blocking<T, F>(task: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("worker failed: {e}"),
            )
        })?
        .map_err(ApiError::from)
}

// Clients that send no nonce get the arrival time in milliseconds
fn default_nonce() -> Result<u64> {
    Ok(u64::try_from(current_timestamp()?).unwrap_or_default())
}

async fn submit_transaction(
    State(node): NodeState,
    payload: std::result::Result<Json<SubmitRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let tx = request.to_transaction(default_nonce()?)?;
    match node.submit_transaction(tx.clone(), request.peer.as_deref())? {
        SubmitOutcome::Accepted => Ok(Json(json!({
            "message": "Transaction accepted",
            "tx_id": tx.get_id(),
        }))),
        SubmitOutcome::Duplicate => Ok(Json(json!({
            "message": "Duplicate transaction",
            "tx_id": tx.get_id(),
        }))),
        SubmitOutcome::Rejected(reason) => Err(ApiError::new(StatusCode::BAD_REQUEST, reason)),
    }
}

async fn mine(State(node): NodeState) -> std::result::Result<Json<Value>, ApiError> {
    match run_blocking(move || node.mine()).await? {
        MiningOutcome::Mined(block) => Ok(Json(json!({
            "message": format!("Block {} mined", block.get_index()),
            "block": block,
        }))),
        MiningOutcome::NothingToMine => Ok(Json(json!({ "message": "Nothing to mine" }))),
    }
}

async fn sync(State(node): NodeState, body: Bytes) -> std::result::Result<Response, ApiError> {
    let request: PeerRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PeerRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")))?
    };

    let results = run_blocking(move || match request.peer {
        Some(peer) => {
            let outcome = node.sync_with_peer(&peer)?;
            Ok(vec![PeerSyncResult { peer, outcome }])
        }
        None => node.sync_with_peers(),
    })
    .await?;
    Ok(sync_response(results))
}

fn sync_response(results: Vec<PeerSyncResult>) -> Response {
    let (status, message) = if results.is_empty() {
        (StatusCode::OK, "No peers to sync with")
    } else if results
        .iter()
        .any(|r| matches!(r.outcome, SyncOutcome::Updated { .. }))
    {
        (StatusCode::OK, "Chain updated from peers")
    } else if results
        .iter()
        .all(|r| matches!(r.outcome, SyncOutcome::PeerUnreachable { .. }))
    {
        (StatusCode::BAD_GATEWAY, "No peer could be reached")
    } else if results
        .iter()
        .any(|r| matches!(r.outcome, SyncOutcome::RejectedInvalidChain { .. }))
    {
        (StatusCode::UNPROCESSABLE_ENTITY, "Peer chain rejected as invalid")
    } else {
        (StatusCode::OK, "No updates from peers. Current chain is up to date.")
    };

    let mut body = json!({ "results": results });
    let key = if status.is_success() { "message" } else { "error" };
    body[key] = json!(message);
    (status, Json(body)).into_response()
}

async fn get_chain(State(node): NodeState) -> impl IntoResponse {
    Json(node.chain().blocks().to_vec())
}

async fn get_latest_block(State(node): NodeState) -> impl IntoResponse {
    Json(node.chain().tip().clone())
}

async fn get_transactions(State(node): NodeState) -> impl IntoResponse {
    Json(node.pending_transactions())
}

async fn get_peers(State(node): NodeState) -> impl IntoResponse {
    Json(PeersResponse {
        peers: node.get_peers(),
    })
}

async fn register(
    State(node): NodeState,
    payload: std::result::Result<Json<PeerRequest>, JsonRejection>,
) -> std::result::Result<Json<PeersResponse>, ApiError> {
    let Json(request) = payload?;
    let peer = request
        .peer
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "peer is required"))?;
    let peers = node.register_peer(&peer)?;
    Ok(Json(PeersResponse { peers }))
}

async fn receive_block(
    State(node): NodeState,
    payload: std::result::Result<Json<BlockAnnouncement>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(announcement) = payload?;
    let index = announcement.block.get_index();
    let receipt =
        run_blocking(move || node.receive_block(announcement.block, &announcement.peer)).await?;
    let message = match receipt {
        BlockReceipt::Appended => format!("Block {index} appended"),
        BlockReceipt::AlreadyKnown => format!("Block {index} already known"),
        BlockReceipt::Synced(SyncOutcome::Updated { length }) => {
            format!("Chain updated from peer, length {length}")
        }
        BlockReceipt::Synced(SyncOutcome::NoChange) => {
            format!("Block {index} does not extend the chain; local chain kept")
        }
        BlockReceipt::Synced(SyncOutcome::PeerUnreachable { reason }) => {
            return Err(ApiError::new(StatusCode::BAD_GATEWAY, reason));
        }
        BlockReceipt::Synced(SyncOutcome::RejectedInvalidChain { reason }) => {
            return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, reason));
        }
    };
    Ok(Json(json!({ "message": message })))
}

async fn stream_events(
    State(node): NodeState,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = BroadcastStream::new(node.subscribe()).filter_map(|item| match item {
        Ok(event) => Some(Ok(Event::default().data(event.to_string()))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!("Event stream subscriber skipped {skipped} event(s)");
            None
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: SyncOutcome) -> PeerSyncResult {
        PeerSyncResult {
            peer: "http://a".into(),
            outcome,
        }
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (BlockchainError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (BlockchainError::MiningInProgress, StatusCode::CONFLICT),
            (BlockchainError::StaleBlock { index: 2 }, StatusCode::CONFLICT),
            (
                BlockchainError::PeerUnreachable {
                    peer: "http://a".into(),
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (BlockchainError::InvalidChain("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (BlockchainError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_sync_status_mapping() {
        assert_eq!(sync_response(vec![]).status(), StatusCode::OK);
        assert_eq!(
            sync_response(vec![
                result(SyncOutcome::PeerUnreachable { reason: "down".into() }),
                result(SyncOutcome::Updated { length: 3 }),
            ])
            .status(),
            StatusCode::OK
        );
        assert_eq!(
            sync_response(vec![result(SyncOutcome::PeerUnreachable {
                reason: "down".into()
            })])
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            sync_response(vec![
                result(SyncOutcome::PeerUnreachable { reason: "down".into() }),
                result(SyncOutcome::RejectedInvalidChain { reason: "bad".into() }),
            ])
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            sync_response(vec![result(SyncOutcome::NoChange)]).status(),
            StatusCode::OK
        );
    }
}
