//! Cache for blocks fetched by hash.
//!
//! Finalized blocks never change, so a block looked up by its hash can be
//! served from memory for as long as it stays in the cache. The head of the
//! chain and state proofs are always read from the wrapped ledger, which keeps
//! freshness decisions on live data.

use crate::chain::client::LedgerReader;
use crate::chain::error::ChainError;
use crate::chain::types::{Block, BlockId, Proof};
use async_trait::async_trait;
use log::debug;
use moka::future::Cache;
use std::sync::Arc;

/// Default number of blocks kept in memory.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: u64 = 1024;

/// [`LedgerReader`] wrapper caching blocks fetched by id.
pub struct CachedLedger {
    inner: Arc<dyn LedgerReader>,

    blocks: Cache<BlockId, Block>,
}

impl CachedLedger {
    pub fn new(inner: Arc<dyn LedgerReader>, capacity: u64) -> Self {
        let blocks = Cache::builder().max_capacity(capacity).build();
        Self { inner, blocks }
    }
}

#[async_trait]
impl LedgerReader for CachedLedger {
    async fn get_latest_block(&self) -> Result<Block, ChainError> {
        let block = self.inner.get_latest_block().await?;
        self.blocks.insert(block.hash.clone(), block.clone()).await;
        Ok(block)
    }

    async fn get_block(&self, id: &BlockId) -> Result<Block, ChainError> {
        if let Some(block) = self.blocks.get(id).await {
            debug!("Cache hit for block {}", id.short());
            return Ok(block);
        }

        debug!("Cache miss for block {}, querying ledger", id.short());
        let block = self.inner.get_block(id).await?;
        self.blocks.insert(id.clone(), block.clone()).await;
        Ok(block)
    }

    async fn get_proof(&self, key: &[u8]) -> Result<Proof, ChainError> {
        self.inner.get_proof(key).await
    }
}
