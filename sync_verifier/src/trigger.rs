//! Pushes a node's chain head forward with the standard two-call engine
//! sequence: deliver the head payload, then point fork choice at it.

use crate::engine_api::{
    self, ForkchoiceUpdatedResponse, HttpJsonRpc, PayloadStatusV1, PayloadStatusV1Status,
};
use crate::fixtures::RpcCall;
use slog::{debug, warn, Logger};
use std::time::Duration;

pub const NEW_PAYLOAD_TIMEOUT: Duration = Duration::from_secs(8);
pub const FORKCHOICE_UPDATED_TIMEOUT: Duration = Duration::from_secs(8);

/// An engine call that failed at the transport or protocol level.
#[derive(Debug)]
pub struct EngineCallFailed {
    pub method: String,
    pub error: engine_api::Error,
}

/// Issues the recorded new-payload and fork-choice calls, each exactly once,
/// with their parameters passed verbatim.
///
/// Only transport and protocol failures are fatal. A non-VALID status in a
/// response body is logged and ignored: a candidate that does not have the
/// chain yet legitimately answers SYNCING, and convergence is judged by the
/// wait loop, not here.
pub async fn trigger_sync(
    engine: &HttpJsonRpc,
    new_payload: &RpcCall,
    forkchoice: &RpcCall,
    log: &Logger,
) -> Result<(), EngineCallFailed> {
    debug!(log, "Delivering head payload"; "method" => %new_payload.method);
    let status: PayloadStatusV1 = engine
        .rpc_request(&new_payload.method, &new_payload.params, NEW_PAYLOAD_TIMEOUT)
        .await
        .map_err(|error| EngineCallFailed {
            method: new_payload.method.clone(),
            error,
        })?;
    log_status(log, &new_payload.method, &status);

    debug!(log, "Updating fork choice"; "method" => %forkchoice.method);
    let response: ForkchoiceUpdatedResponse = engine
        .rpc_request(
            &forkchoice.method,
            &forkchoice.params,
            FORKCHOICE_UPDATED_TIMEOUT,
        )
        .await
        .map_err(|error| EngineCallFailed {
            method: forkchoice.method.clone(),
            error,
        })?;
    log_status(log, &forkchoice.method, &response.payload_status);

    Ok(())
}

fn log_status(log: &Logger, method: &str, status: &PayloadStatusV1) {
    if status.status == PayloadStatusV1Status::Valid {
        debug!(log, "Engine call accepted"; "method" => %method);
    } else {
        warn!(
            log,
            "Engine call not immediately valid";
            "method" => %method,
            "status" => ?status.status,
            "validation_error" => ?status.validation_error,
        );
    }
}
