//! A handle to a running execution client's network endpoints.

use crate::engine_api::{self, HttpJsonRpc};
use execution_header::ExecutionBlockHeader;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Engine API port relative to the client's main RPC port (8545 -> 8551).
pub const ENGINE_API_PORT_OFFSET: u16 = 6;

pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const HEAD_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub const ADMIN_NODE_INFO: &str = "admin_nodeInfo";
pub const NODE_INFO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum Error {
    /// Transport or protocol failure on a single query. Never retried here;
    /// retry policy belongs to the caller.
    Rpc(engine_api::Error),
    /// The node has not published a dialable peer-to-peer address.
    EndpointUnavailable(String),
    /// The node reported no head block at all.
    HeadNotFound,
    InvalidUrl(String),
}

impl From<engine_api::Error> for Error {
    fn from(e: engine_api::Error) -> Self {
        Error::Rpc(e)
    }
}

/// A running client instance, addressed by its RPC endpoint.
///
/// Everything here is a pure query; nothing mutates remote node state.
pub struct NodeHandle {
    client_name: String,
    rpc_url: Url,
    rpc: HttpJsonRpc,
}

impl NodeHandle {
    pub fn new(client_name: &str, rpc_url: Url) -> Result<Self, Error> {
        let rpc = HttpJsonRpc::new(rpc_url.clone())?;
        Ok(Self {
            client_name: client_name.to_string(),
            rpc_url,
            rpc,
        })
    }

    /// Label for the client implementation under test, used in logs and
    /// verdicts.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    /// The node's engine API endpoint, at the fixed port offset from its
    /// RPC port.
    pub fn engine_url(&self) -> Result<Url, Error> {
        let mut url = self.rpc_url.clone();
        let port = url
            .port_or_known_default()
            .and_then(|port| port.checked_add(ENGINE_API_PORT_OFFSET))
            .ok_or_else(|| Error::InvalidUrl(format!("no usable port in {}", self.rpc_url)))?;
        url.set_port(Some(port))
            .map_err(|_| Error::InvalidUrl(format!("cannot set port on {}", self.rpc_url)))?;
        Ok(url)
    }

    /// Queries the node's canonical chain head.
    pub async fn head(&self) -> Result<ExecutionBlockHeader, Error> {
        let head: Option<ExecutionBlockHeader> = self
            .rpc
            .rpc_request(
                ETH_GET_BLOCK_BY_NUMBER,
                json!(["latest", false]),
                HEAD_QUERY_TIMEOUT,
            )
            .await?;
        head.ok_or(Error::HeadNotFound)
    }

    /// The node's dialable peer-to-peer address, as reported by
    /// `admin_nodeInfo`. Fails while the node has not published one yet.
    pub async fn peer_endpoint(&self) -> Result<String, Error> {
        let info: NodeInfo = self
            .rpc
            .rpc_request(ADMIN_NODE_INFO, json!([]), NODE_INFO_TIMEOUT)
            .await
            .map_err(|e| Error::EndpointUnavailable(format!("{}: {:?}", ADMIN_NODE_INFO, e)))?;
        if info.enode.is_empty() {
            return Err(Error::EndpointUnavailable(
                "node reported an empty enode URL".to_string(),
            ));
        }
        Ok(info.enode)
    }
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    enode: String,
}
