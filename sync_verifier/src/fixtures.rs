//! Loads the pre-generated test artifacts a scenario depends on.
//!
//! Artifacts are keyed by file name within a fixture directory. They are
//! produced out-of-band (chain generation is not this crate's concern); this
//! module only reads them and classifies anything missing or malformed as
//! unavailable before a scenario touches the network.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;

use execution_header::ExecutionBlockHeader;

pub const GENESIS_JSON: &str = "genesis.json";
pub const CHAIN_RLP: &str = "chain.rlp";
pub const FORK_ENV_JSON: &str = "forkenv.json";
pub const HEAD_BLOCK_JSON: &str = "headblock.json";
pub const HEAD_NEW_PAYLOAD_JSON: &str = "headnewpayload.json";
pub const HEAD_FCU_JSON: &str = "headfcu.json";

/// Every artifact a complete fixture set carries.
pub const REQUIRED_FIXTURES: &[&str] = &[
    GENESIS_JSON,
    CHAIN_RLP,
    FORK_ENV_JSON,
    HEAD_BLOCK_JSON,
    HEAD_NEW_PAYLOAD_JSON,
    HEAD_FCU_JSON,
];

#[derive(Debug)]
pub enum Error {
    /// The named artifact is missing or does not parse into its expected
    /// shape.
    Unavailable { name: String, reason: String },
}

impl Error {
    fn unavailable<E: Debug>(name: &str, reason: E) -> Self {
        Error::Unavailable {
            name: name.to_string(),
            reason: format!("{:?}", reason),
        }
    }
}

/// A recorded JSON-RPC call: a method name and its ordered parameter blobs.
///
/// Params stay raw JSON so they reach the wire byte-for-byte as recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Box<RawValue>>,
}

#[derive(Debug, Clone)]
pub struct Fixtures {
    dir: PathBuf,
}

impl Fixtures {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of an artifact, for handing to node provisioning (genesis.json,
    /// chain.rlp).
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn load(&self, name: &str) -> Result<Vec<u8>, Error> {
        fs::read(self.path(name)).map_err(|e| Error::unavailable(name, e))
    }

    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        let bytes = self.load(name)?;
        serde_json::from_slice(&bytes).map_err(|e| Error::unavailable(name, e))
    }

    /// The header the synced chain is expected to resolve to.
    pub fn expected_head(&self) -> Result<ExecutionBlockHeader, Error> {
        self.load_json(HEAD_BLOCK_JSON)
    }

    /// The recorded `engine_newPayload*` call for the head block.
    pub fn head_new_payload(&self) -> Result<RpcCall, Error> {
        self.load_json(HEAD_NEW_PAYLOAD_JSON)
    }

    /// The recorded `engine_forkchoiceUpdated*` call pointing at the head.
    pub fn head_forkchoice_updated(&self) -> Result<RpcCall, Error> {
        self.load_json(HEAD_FCU_JSON)
    }

    /// Fork scheduling parameters handed to client provisioning.
    pub fn fork_env(&self) -> Result<HashMap<String, String>, Error> {
        self.load_json(FORK_ENV_JSON)
    }

    /// Probes every required artifact, so a broken fixture set aborts the
    /// scenario before any network activity.
    pub fn ensure_available(&self) -> Result<(), Error> {
        for name in REQUIRED_FIXTURES {
            self.load(name)?;
        }
        self.expected_head()?;
        self.head_new_payload()?;
        self.head_forkchoice_updated()?;
        self.fork_env()?;
        Ok(())
    }
}
