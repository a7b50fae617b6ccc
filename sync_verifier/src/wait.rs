//! Polls a node's reported chain head until it converges on an expected
//! header, or a deadline elapses.

use crate::node::{self, NodeHandle};
use execution_header::{ExecutionBlockHeader, H256};
use slog::{debug, info, Logger};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Time before a sync is considered stalled or failed.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between head polls. The node exposes no head-change
/// notification, so this is a polling design.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal outcome of one wait-loop invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The head reached the expected number with the expected hash.
    Synced { number: u64, hash: H256 },
    /// The head reached the expected number with a different hash. An
    /// equal-height fork is definitive, not transient.
    HashMismatch { number: u64, got: H256, want: H256 },
    /// The head never reached the expected number before the deadline.
    TimedOut {
        timeout: Duration,
        last_observed: u64,
    },
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Synced { number, hash } => {
                write!(f, "synced to expected head {} ({:?})", number, hash)
            }
            SyncOutcome::HashMismatch { number, got, want } => {
                write!(
                    f,
                    "wrong head hash at height {}: got {:?}, want {:?}",
                    number, got, want
                )
            }
            SyncOutcome::TimedOut {
                timeout,
                last_observed,
            } => {
                write!(
                    f,
                    "timeout ({:?} elapsed, current head is {})",
                    timeout, last_observed
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncWaiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SyncWaiter {
    fn default() -> Self {
        Self {
            timeout: SYNC_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl SyncWaiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Blocks until `node`'s head converges on `expected`, the deadline
    /// elapses, or a head query fails.
    ///
    /// The deadline is absolute from loop entry; progress does not reset it.
    /// Height is compared before hash, since hashes are only meaningful at
    /// matching heights. A failed query terminates the loop immediately: a
    /// broken RPC channel mid-test is a node-level problem worth surfacing,
    /// not masking with retries.
    pub async fn wait_for_sync(
        &self,
        node: &NodeHandle,
        expected: &ExecutionBlockHeader,
        log: &Logger,
    ) -> Result<SyncOutcome, node::Error> {
        let want_number = expected.number;
        let want_hash = expected.hash();
        let deadline = Instant::now() + self.timeout;
        let mut last_observed = 0u64;

        loop {
            if Instant::now() >= deadline {
                return Ok(SyncOutcome::TimedOut {
                    timeout: self.timeout,
                    last_observed,
                });
            }

            let head = node.head().await?;
            if head.number != last_observed {
                debug!(
                    log,
                    "Node has new head";
                    "client" => %node.client_name(),
                    "head" => head.number,
                );
                last_observed = head.number;
            }

            if head.number == want_number {
                let got = head.hash();
                if got == want_hash {
                    info!(
                        log,
                        "Node reached expected head";
                        "client" => %node.client_name(),
                        "head" => head.number,
                    );
                    return Ok(SyncOutcome::Synced {
                        number: head.number,
                        hash: got,
                    });
                }
                return Ok(SyncOutcome::HashMismatch {
                    number: head.number,
                    got,
                    want: want_hash,
                });
            }

            sleep(self.poll_interval).await;
        }
    }
}
