//! A mock execution node for testing the verification scenarios.
//!
//! Serves the chain-query RPC surface on one port and the engine API on the
//! adjacent port the real harness expects, with a scripted head sequence, a
//! recording engine API behind JWT authentication, and a configurable peer
//! endpoint.

use crate::engine_api::auth::{JwtKey, DEFAULT_ALGORITHM};
use crate::engine_api::{ForkchoiceUpdatedResponse, PayloadStatusV1, PayloadStatusV1Status};
use crate::node::{ADMIN_NODE_INFO, ENGINE_API_PORT_OFFSET, ETH_GET_BLOCK_BY_NUMBER};
use execution_header::{Address, Bloom, ExecutionBlockHeader, H256, H64, U256};
use jsonwebtoken::{decode, DecodingKey, Validation};
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use slog::Logger;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use url::Url;
use warp::http::StatusCode;
use warp::Filter;

/// Attempts to find an adjacent free port pair before giving up.
const PORT_PAIR_ATTEMPTS: usize = 10;

/// Return a logger suitable for test usage (all output discarded).
pub fn test_logger() -> Logger {
    use sloggers::Build;
    sloggers::null::NullLoggerBuilder
        .build()
        .expect("Should build null_logger")
}

/// A minimal but hash-complete post-merge header for tests.
pub fn block_header(number: u64, seed: u8) -> ExecutionBlockHeader {
    ExecutionBlockHeader {
        parent_hash: H256::repeat_byte(seed),
        ommers_hash: H256::repeat_byte(0x22),
        beneficiary: Address::repeat_byte(0x42),
        state_root: H256::repeat_byte(seed.wrapping_add(1)),
        transactions_root: H256::repeat_byte(0x33),
        receipts_root: H256::repeat_byte(0x44),
        logs_bloom: Bloom::zero(),
        difficulty: U256::zero(),
        number,
        gas_limit: 30_000_000,
        gas_used: 0,
        timestamp: 1_700_000_000 + number,
        extra_data: vec![],
        mix_hash: H256::zero(),
        nonce: H64::zero(),
        base_fee_per_gas: Some(U256::from(7)),
        withdrawals_root: None,
        blob_gas_used: None,
        excess_blob_gas: None,
        parent_beacon_block_root: None,
        requests_hash: None,
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: JsonValue,
}

#[derive(Clone, Copy, PartialEq)]
enum Listener {
    Rpc,
    Engine,
}

struct Context {
    jwt_key: Option<JwtKey>,
    /// Heads served in order by `eth_getBlockByNumber`; the last entry
    /// repeats once the script is exhausted.
    heads: Mutex<VecDeque<ExecutionBlockHeader>>,
    enode: Mutex<Option<String>>,
    engine_calls: Mutex<Vec<RecordedCall>>,
    new_payload_response: Mutex<PayloadStatusV1>,
    forkchoice_response: Mutex<ForkchoiceUpdatedResponse>,
    head_queries: AtomicUsize,
}

impl Context {
    fn new(jwt_key: Option<JwtKey>) -> Self {
        let syncing = PayloadStatusV1 {
            status: PayloadStatusV1Status::Syncing,
            latest_valid_hash: None,
            validation_error: None,
        };
        Self {
            jwt_key,
            heads: Mutex::new(VecDeque::new()),
            enode: Mutex::new(None),
            engine_calls: Mutex::new(vec![]),
            new_payload_response: Mutex::new(syncing.clone()),
            forkchoice_response: Mutex::new(ForkchoiceUpdatedResponse {
                payload_status: syncing,
                payload_id: None,
            }),
            head_queries: AtomicUsize::new(0),
        }
    }
}

pub struct MockExecutionNode {
    rpc_addr: SocketAddr,
    ctx: Arc<Context>,
    _rpc_shutdown: oneshot::Sender<()>,
    _engine_shutdown: oneshot::Sender<()>,
}

impl MockExecutionNode {
    /// Starts the node on an ephemeral RPC port with the engine API at the
    /// port offset the harness derives. When `jwt_key` is given, engine
    /// methods reject requests without a valid bearer token.
    pub async fn start(jwt_key: Option<JwtKey>) -> Self {
        let ctx = Arc::new(Context::new(jwt_key));

        // The harness derives the engine port from the RPC port, so retry
        // until an adjacent pair binds.
        for _ in 0..PORT_PAIR_ATTEMPTS {
            let (rpc_shutdown, rpc_signal) = oneshot::channel::<()>();
            let rpc_route = routes(ctx.clone(), Listener::Rpc);
            let (rpc_addr, rpc_server) = match warp::serve(rpc_route)
                .try_bind_with_graceful_shutdown((Ipv4Addr::LOCALHOST, 0), async move {
                    let _ = rpc_signal.await;
                }) {
                Ok(bound) => bound,
                Err(_) => continue,
            };

            let engine_port = match rpc_addr.port().checked_add(ENGINE_API_PORT_OFFSET) {
                Some(port) => port,
                None => continue,
            };
            let (engine_shutdown, engine_signal) = oneshot::channel::<()>();
            let engine_route = routes(ctx.clone(), Listener::Engine);
            let (_, engine_server) = match warp::serve(engine_route)
                .try_bind_with_graceful_shutdown(
                    (Ipv4Addr::LOCALHOST, engine_port),
                    async move {
                        let _ = engine_signal.await;
                    },
                ) {
                Ok(bound) => bound,
                Err(_) => continue,
            };

            tokio::spawn(rpc_server);
            tokio::spawn(engine_server);
            return Self {
                rpc_addr,
                ctx,
                _rpc_shutdown: rpc_shutdown,
                _engine_shutdown: engine_shutdown,
            };
        }

        panic!("could not bind an adjacent port pair for the mock node")
    }

    pub fn rpc_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.rpc_addr)).expect("mock url is valid")
    }

    /// Appends headers to the scripted head sequence.
    pub fn script_heads<I: IntoIterator<Item = ExecutionBlockHeader>>(&self, heads: I) {
        self.ctx.heads.lock().extend(heads);
    }

    pub fn set_enode(&self, enode: &str) {
        *self.ctx.enode.lock() = Some(enode.to_string());
    }

    pub fn set_new_payload_response(&self, response: PayloadStatusV1) {
        *self.ctx.new_payload_response.lock() = response;
    }

    pub fn set_forkchoice_response(&self, response: ForkchoiceUpdatedResponse) {
        *self.ctx.forkchoice_response.lock() = response;
    }

    /// Number of head queries served so far.
    pub fn head_query_count(&self) -> usize {
        self.ctx.head_queries.load(Ordering::SeqCst)
    }

    /// Engine calls received so far, in arrival order.
    pub fn engine_calls(&self) -> Vec<RecordedCall> {
        self.ctx.engine_calls.lock().clone()
    }
}

fn routes(
    ctx: Arc<Context>,
    listener: Listener,
) -> impl Filter<Extract = (warp::reply::WithStatus<warp::reply::Json>,), Error = warp::Rejection> + Clone
{
    warp::post()
        .and(warp::path::end())
        .and(warp::body::json())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::any().map(move || ctx.clone()))
        .and(warp::any().map(move || listener))
        .and_then(handle_rpc)
}

async fn handle_rpc(
    body: JsonValue,
    authorization: Option<String>,
    ctx: Arc<Context>,
    listener: Listener,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, warp::Rejection> {
    let id = body.get("id").cloned().unwrap_or_else(|| json!(1));
    let method = body
        .get("method")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();
    let params = body.get("params").cloned().unwrap_or(JsonValue::Null);

    if listener == Listener::Engine && !token_is_valid(&ctx, authorization.as_deref()) {
        return Ok(warp::reply::with_status(
            warp::reply::json(&"unauthorized"),
            StatusCode::UNAUTHORIZED,
        ));
    }

    let result: Result<JsonValue, String> = match method.as_str() {
        ETH_GET_BLOCK_BY_NUMBER => {
            ctx.head_queries.fetch_add(1, Ordering::SeqCst);
            let mut heads = ctx.heads.lock();
            let head = if heads.len() > 1 {
                heads.pop_front()
            } else {
                heads.front().cloned()
            };
            Ok(head
                .map(|h| serde_json::to_value(&h).expect("header serializes"))
                .unwrap_or(JsonValue::Null))
        }
        ADMIN_NODE_INFO => match ctx.enode.lock().clone() {
            Some(enode) => Ok(json!({ "enode": enode })),
            None => Err("node info not available yet".to_string()),
        },
        m if m.starts_with("engine_newPayload") => {
            ctx.engine_calls.lock().push(RecordedCall {
                method: method.clone(),
                params: params.clone(),
            });
            Ok(serde_json::to_value(&*ctx.new_payload_response.lock())
                .expect("status serializes"))
        }
        m if m.starts_with("engine_forkchoiceUpdated") => {
            ctx.engine_calls.lock().push(RecordedCall {
                method: method.clone(),
                params: params.clone(),
            });
            Ok(serde_json::to_value(&*ctx.forkchoice_response.lock())
                .expect("response serializes"))
        }
        other => Err(format!("the method {} is not available", other)),
    };

    let response = match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": message },
        }),
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::OK,
    ))
}

fn token_is_valid(ctx: &Context, header: Option<&str>) -> bool {
    let key = match &ctx.jwt_key {
        Some(key) => key,
        None => return true,
    };
    let token = match header.and_then(|header| header.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return false,
    };
    let mut validation = Validation::new(DEFAULT_ALGORITHM);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(key.as_bytes()),
        &validation,
    )
    .is_ok()
}

#[derive(serde::Deserialize)]
struct TokenClaims {
    #[allow(dead_code)]
    iat: u64,
}
