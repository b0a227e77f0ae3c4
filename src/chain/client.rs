//! Ledger client used to read finalized blocks and state proofs.
//!
//! [`LedgerReader`] is the seam the validator depends on. [`RpcLedgerClient`]
//! implements it against a node's JSON-RPC endpoint; tests and local setups use
//! [`crate::chain::memory::MemoryLedger`].

use crate::chain::error::ChainError;
use crate::chain::types::{Block, BlockId, Proof};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Read-only access to the finalized state of the ledger.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// The most recent finalized block.
    async fn get_latest_block(&self) -> Result<Block, ChainError>;

    /// A block by its hash.
    async fn get_block(&self, id: &BlockId) -> Result<Block, ChainError>;

    /// Proof for `key` against the latest state.
    async fn get_proof(&self, key: &[u8]) -> Result<Proof, ChainError>;
}

/// Block as it travels over JSON-RPC, every byte field hex-encoded.
#[derive(Debug, Deserialize)]
struct RpcBlock {
    hash: String,
    index: u64,
    data: String,
    payload: String,
    #[serde(default)]
    back_links: Vec<String>,
}

impl RpcBlock {
    fn into_block(self) -> Result<Block, ChainError> {
        Ok(Block {
            hash: BlockId(decode_hex("hash", &self.hash)?),
            index: self.index,
            data: decode_hex("data", &self.data)?,
            payload: decode_hex("payload", &self.payload)?,
            back_link_ids: self
                .back_links
                .iter()
                .map(|link| decode_hex("back_links", link).map(BlockId))
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcProof {
    #[serde(default)]
    value: String,
    #[serde(default)]
    contract_id: String,
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(value)
        .map_err(|e| ChainError::InvalidResponse(format!("field {} is not hex: {}", field, e)))
}

/// JSON-RPC client for a ledger node.
pub struct RpcLedgerClient {
    /// The RPC URL for the ledger node.
    rpc_url: String,

    http: reqwest::Client,

    next_request_id: AtomicU64,

    /// Highest block index seen, to detect a node serving an older view.
    last_known_block: AtomicU64,
}

impl RpcLedgerClient {
    /// Create a new ledger client. No request is made until the first query.
    pub fn new(rpc_url: String, timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed {
                url: rpc_url.clone(),
                reason: e.to_string(),
            })?;

        info!("Ledger RPC client configured for {}", rpc_url);

        Ok(Self {
            rpc_url,
            http,
            next_request_id: AtomicU64::new(1),
            last_known_block: AtomicU64::new(0),
        })
    }

    /// Issue one JSON-RPC call and return its `result`, `None` when it is null.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} (id {}) to {}", method, id, self.rpc_url);

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("RPC {} to {} failed: {}", method, self.rpc_url, e);
                if e.is_connect() {
                    ChainError::ConnectionFailed {
                        url: self.rpc_url.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    ChainError::RpcError(e.to_string())
                }
            })?
            .error_for_status()?;

        let body: RpcResponse = response.json().await?;

        if let Some(err) = body.error {
            return Err(ChainError::RpcError(format!(
                "{} returned error {}: {}",
                method, err.code, err.message
            )));
        }

        match body.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ChainError::InvalidResponse(format!("{}: {}", method, e))),
        }
    }

    /// Reject a latest block that is older than one already seen.
    fn check_progress(&self, block: &Block) -> Result<(), ChainError> {
        let last_known = self.last_known_block.load(Ordering::Relaxed);
        if block.index < last_known {
            error!(
                "Block regression detected: current {} < last known {}",
                block.index, last_known
            );
            return Err(ChainError::BlockRegression {
                current: block.index,
                expected: last_known,
            });
        }
        self.last_known_block
            .fetch_max(block.index, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for RpcLedgerClient {
    async fn get_latest_block(&self) -> Result<Block, ChainError> {
        let block = self
            .call::<RpcBlock>("ledger_getLatestBlock", json!([]))
            .await?
            .ok_or_else(|| {
                ChainError::InvalidResponse("ledger_getLatestBlock returned no block".to_string())
            })?
            .into_block()?;

        self.check_progress(&block)?;
        debug!("Latest block {} at index {}", block.hash.short(), block.index);
        Ok(block)
    }

    async fn get_block(&self, id: &BlockId) -> Result<Block, ChainError> {
        let block = self
            .call::<RpcBlock>("ledger_getBlock", json!([hex::encode(id.as_bytes())]))
            .await?
            .ok_or_else(|| ChainError::BlockNotFound {
                block: id.to_string(),
            })?
            .into_block()?;

        if block.hash != *id {
            return Err(ChainError::InvalidResponse(format!(
                "asked for block {}, got {}",
                id, block.hash
            )));
        }
        Ok(block)
    }

    async fn get_proof(&self, key: &[u8]) -> Result<Proof, ChainError> {
        let proof = self
            .call::<RpcProof>("ledger_getProof", json!([hex::encode(key)]))
            .await?;

        match proof {
            Some(proof) => Ok(Proof {
                value: decode_hex("value", &proof.value)?,
                contract_id: proof.contract_id,
                exists: proof.exists,
            }),
            None => Ok(Proof::absent()),
        }
    }
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("rpc_url", &self.rpc_url)
            .field(
                "last_known_block",
                &self.last_known_block.load(Ordering::Relaxed),
            )
            .finish()
    }
}
