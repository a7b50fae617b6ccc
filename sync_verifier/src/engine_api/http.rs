//! A handle to a JSON-RPC endpoint over HTTP, optionally authenticated with
//! a JWT bearer token derived from the engine-API shared secret.

use super::auth::Auth;
use super::Error;
use reqwest::header::CONTENT_TYPE;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

pub use reqwest::Client;

const STATIC_ID: u32 = 1;
pub const JSONRPC_VERSION: &str = "2.0";

pub struct HttpJsonRpc {
    pub client: Client,
    pub url: Url,
    pub auth: Option<Auth>,
}

impl HttpJsonRpc {
    pub fn new(url: Url) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().build()?,
            url,
            auth: None,
        })
    }

    pub fn new_with_auth(url: Url, auth: Auth) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().build()?,
            url,
            auth: Some(auth),
        })
    }

    /// Issues a single JSON-RPC call with a bounded timeout.
    ///
    /// `params` is serialized as given, so recorded raw parameter blobs
    /// reach the wire unmodified. No retries at this layer; retry policy
    /// belongs to the caller.
    pub async fn rpc_request<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<T, Error> {
        let body = JsonRequestBody {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: STATIC_ID,
        };

        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);

        if let Some(auth) = &self.auth {
            request = request.bearer_auth(auth.generate_token()?);
        }

        let body: JsonResponseBody = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (body.result, body.error) {
            (result, None) => serde_json::from_value(result).map_err(Into::into),
            (_, Some(error)) => Err(Error::ServerMessage {
                code: error.code,
                message: error.message,
            }),
        }
    }
}

impl fmt::Display for HttpJsonRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[derive(Serialize)]
struct JsonRequestBody<'a, P> {
    jsonrpc: &'a str,
    method: &'a str,
    params: P,
    id: u32,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct JsonError {
    code: i64,
    message: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct JsonResponseBody {
    jsonrpc: String,
    #[serde(default)]
    error: Option<JsonError>,
    #[serde(default)]
    result: serde_json::Value,
    id: u32,
}
