//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the custody node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                           |
//! |--------|-----------------------|---------------------------------------|
//! | GET    | `/health`             | Liveness probe                        |
//! | GET    | `/status`             | Ledger summary                        |
//! | POST   | `/rpc`                | JSON-RPC 2.0 gateway                  |
//! | GET    | `/ws`                 | WebSocket stream of committed events  |
//! | GET    | `/accounts/:address`  | Vault and wallet balance for address  |
//! | GET    | `/total-deposits`     | Sum of all balances                   |
//! | GET    | `/events`             | Event log page (`?since=&limit=`)     |
//! | POST   | `/deposit`            | Credit the caller                     |
//! | POST   | `/withdraw`           | Debit the caller and pay out          |
//! | PUT    | `/wallets/:address`   | Toggle payout acceptance (devnet)     |
//!
//! Amounts in request bodies are decimal coin strings (`"1.5"`). Amounts in
//! responses are base-unit strings, with a formatted coin rendering next to
//! the headline figures.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use custody_contracts::VaultError;
use custody_protocol::{Address, Amount, EventRecord};

use crate::service::{AccountView, LedgerService};

/// Page size for `/events` when the client does not ask for one.
const DEFAULT_EVENTS_PAGE: usize = 100;

/// Largest page `/events` will return.
const MAX_EVENTS_PAGE: usize = 1_000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; the ledger sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network label (e.g., "devnet").
    pub network: String,
    /// The vault and its payout ledger.
    pub ledger: Arc<LedgerService>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/total-deposits", get(total_deposits_handler))
        .route("/events", get(events_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/wallets/:address", put(wallet_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Positional method parameters.
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid params: {}", message.into()),
            data: None,
        }
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        Self {
            code: -32603,
            message: format!("Internal error: {}", message),
            data: None,
        }
    }
}

impl From<VaultError> for JsonRpcError {
    fn from(e: VaultError) -> Self {
        Self {
            code: -32000,
            message: e.to_string(),
            data: Some(serde_json::json!({ "kind": e.kind() })),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposit` and `POST /withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Hex address of the account making the call.
    pub caller: String,
    /// Decimal coin amount, e.g. `"1.5"`.
    pub amount: String,
}

/// Body of `PUT /wallets/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletRequest {
    pub accepts: bool,
}

/// Query string of `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// First sequence number to return.
    pub since: Option<u64>,
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network label.
    pub network: String,
    /// Accounts with a non-zero balance.
    pub funded_accounts: usize,
    /// Sum of all balances, base units.
    pub total_deposits: Amount,
    /// Value paid out over the node's lifetime, base units.
    pub paid_out: Amount,
    /// Events committed so far.
    pub event_count: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address` and `PUT /wallets/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    /// Held by the vault, base units.
    pub balance: Amount,
    /// `balance` in coins, e.g. `"1.5"`.
    pub balance_formatted: String,
    /// `balance` with the coin symbol, e.g. `"1.5 ETH"`.
    pub balance_display: String,
    /// Received from the vault so far, base units.
    pub wallet_balance: Amount,
    /// Whether withdrawals to this address currently go through.
    pub accepts_payouts: bool,
}

impl From<AccountView> for AccountResponse {
    fn from(view: AccountView) -> Self {
        Self {
            address: view.address,
            balance: view.balance,
            balance_formatted: view.balance.format_coins(),
            balance_display: view.balance.display_coins(),
            wallet_balance: view.wallet_balance,
            accepts_payouts: view.accepts_payouts,
        }
    }
}

/// Response payload for `GET /total-deposits`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TotalDepositsResponse {
    /// Base units.
    pub total_deposits: Amount,
    /// Coins, e.g. `"2.0"`.
    pub formatted: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error class, e.g. `"insufficient_balance"`.
    pub kind: String,
}

/// REST failure, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub enum ApiError {
    /// Malformed address, amount or body.
    BadRequest(String),
    /// The vault reverted the call.
    Vault(VaultError),
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        ApiError::Vault(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error,
                    kind: "bad_request".into(),
                },
            ),
            ApiError::Vault(e) => {
                let status = if e.is_caller_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (
                    status,
                    ErrorResponse {
                        error: e.to_string(),
                        kind: e.kind().into(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address {:?}: {}", raw, e)))
}

fn parse_operation(req: &OperationRequest) -> Result<(Address, Amount), ApiError> {
    let caller = parse_address(&req.caller)?;
    let amount = Amount::parse_coins(&req.amount)
        .map_err(|e| ApiError::BadRequest(format!("invalid amount {:?}: {}", req.amount, e)))?;
    Ok((caller, amount))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: returns the ledger summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.ledger.status();
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        funded_accounts: status.funded_accounts,
        total_deposits: status.total_deposits,
        paid_out: status.paid_out,
        event_count: status.event_count,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /accounts/:address`: unknown addresses report zero balances.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    Ok(Json(state.ledger.account(&address).into()))
}

/// `GET /total-deposits`
async fn total_deposits_handler(State(state): State<AppState>) -> impl IntoResponse {
    let total = state.ledger.total_deposits();
    Json(TotalDepositsResponse {
        total_deposits: total,
        formatted: total.format_coins(),
    })
}

/// `GET /events?since=N&limit=M`: committed events with `sequence >= N`.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<EventRecord>> {
    let since = query.since.unwrap_or(0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENTS_PAGE)
        .min(MAX_EVENTS_PAGE);
    Json(state.ledger.events_since(since, limit))
}

/// `POST /deposit`
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<OperationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (caller, amount) = parse_operation(&req)?;
    let receipt = state.ledger.deposit(&caller, amount)?;
    Ok(Json(receipt))
}

/// `POST /withdraw`
///
/// Responds 400 when the caller's request is at fault and 502 when the
/// payout to the caller's wallet fails. Either way the books are unchanged.
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<OperationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (caller, amount) = parse_operation(&req)?;
    let receipt = state.ledger.withdraw(&caller, amount)?;
    Ok(Json(receipt))
}

/// `PUT /wallets/:address`: makes the external ledger refuse or accept
/// payouts to `address`.
async fn wallet_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<WalletRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    state.ledger.set_accepts_payouts(&address, req.accepts);
    Ok(Json(state.ledger.account(&address).into()))
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

type RpcOutcome = Result<serde_json::Value, JsonRpcError>;

fn rpc_params(req: &JsonRpcRequest) -> &[serde_json::Value] {
    req.params
        .as_ref()
        .and_then(|p| p.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn rpc_address(params: &[serde_json::Value], index: usize) -> Result<Address, JsonRpcError> {
    let raw = params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params(format!("expected address at {}", index)))?;
    raw.parse()
        .map_err(|e| JsonRpcError::invalid_params(format!("{}", e)))
}

fn rpc_amount(params: &[serde_json::Value], index: usize) -> Result<Amount, JsonRpcError> {
    let raw = params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params(format!("expected amount at {}", index)))?;
    Amount::parse_coins(raw).map_err(|e| JsonRpcError::invalid_params(format!("{}", e)))
}

fn to_rpc_value<T: Serialize>(value: T) -> RpcOutcome {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

fn dispatch_rpc(state: &AppState, req: &JsonRpcRequest) -> RpcOutcome {
    let params = rpc_params(req);
    match req.method.as_str() {
        "vault_deposit" => {
            // params: [caller, amount]
            let caller = rpc_address(params, 0)?;
            let amount = rpc_amount(params, 1)?;
            to_rpc_value(state.ledger.deposit(&caller, amount)?)
        }
        "vault_withdraw" => {
            let caller = rpc_address(params, 0)?;
            let amount = rpc_amount(params, 1)?;
            to_rpc_value(state.ledger.withdraw(&caller, amount)?)
        }
        "vault_getBalance" => {
            let account = rpc_address(params, 0)?;
            to_rpc_value(state.ledger.balance(&account))
        }
        "vault_getTotalDeposits" => to_rpc_value(state.ledger.total_deposits()),
        "vault_version" => Ok(serde_json::json!(state.version)),
        _ => Err(JsonRpcError {
            code: -32601,
            message: format!("Method not found: {}", req.method),
            data: None,
        }),
    }
}

/// `POST /rpc`: JSON-RPC 2.0 gateway.
///
/// Vault reverts come back as error code -32000 with the revert reason as
/// the message and its kind under `data.kind`.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: -32600,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let (result, error) = match dispatch_rpc(&state, &req) {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive one JSON-encoded [`EventRecord`] per committed event.
/// The connection is push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.ledger.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
