//! In-process ledger for tests and local development.

use crate::chain::client::LedgerReader;
use crate::chain::error::ChainError;
use crate::chain::types::{
    Argument, Block, BlockId, ClientTransaction, CredentialStruct, InstanceId, Instruction, Proof,
    ARG_COIN, ARG_DESTINATION, COMMAND_TRANSFER, CONTRACT_COIN_ID, CONTRACT_CREDENTIAL_ID,
};
use async_trait::async_trait;
use scale::Encode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A ledger held in memory. Counts reads so tests can assert on walk length.
#[derive(Default)]
pub struct MemoryLedger {
    blocks: RwLock<HashMap<BlockId, Block>>,
    latest: RwLock<Option<BlockId>>,
    proofs: RwLock<HashMap<Vec<u8>, Proof>>,
    block_fetches: AtomicUsize,
    proof_lookups: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block without moving the head.
    pub async fn insert_block(&self, block: Block) {
        self.blocks.write().await.insert(block.hash.clone(), block);
    }

    /// Store a block and make it the latest one.
    pub async fn push_block(&self, block: Block) {
        let id = block.hash.clone();
        self.insert_block(block).await;
        *self.latest.write().await = Some(id);
    }

    pub async fn insert_proof(&self, key: &[u8], proof: Proof) {
        self.proofs.write().await.insert(key.to_vec(), proof);
    }

    /// Register a credential instance whose `1-public/coin` attribute names `coin`.
    pub async fn insert_credential(&self, credential_id: &InstanceId, coin: &InstanceId) {
        self.insert_proof(
            credential_id.as_bytes(),
            Proof {
                value: CredentialStruct::with_coin(coin).encode(),
                contract_id: CONTRACT_CREDENTIAL_ID.to_string(),
                exists: true,
            },
        )
        .await;
    }

    /// Number of `get_latest_block` and `get_block` calls served so far.
    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    /// Number of `get_proof` calls served so far.
    pub fn proof_lookups(&self) -> usize {
        self.proof_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn get_latest_block(&self) -> Result<Block, ChainError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        let latest = self.latest.read().await.clone().ok_or_else(|| {
            ChainError::RpcError("ledger has no blocks".to_string())
        })?;
        self.blocks
            .read()
            .await
            .get(&latest)
            .cloned()
            .ok_or(ChainError::BlockNotFound {
                block: latest.to_string(),
            })
    }

    async fn get_block(&self, id: &BlockId) -> Result<Block, ChainError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        self.blocks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound {
                block: id.to_string(),
            })
    }

    async fn get_proof(&self, key: &[u8]) -> Result<Proof, ChainError> {
        self.proof_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .proofs
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_else(Proof::absent))
    }
}

/// Coin transfer of `amount` from `source` to `destination`, plus extra arguments.
pub fn coin_transfer(
    source: &InstanceId,
    destination: &InstanceId,
    amount: u64,
    extra: Vec<Argument>,
) -> Instruction {
    let mut args = vec![
        Argument::new(ARG_COIN, amount.to_le_bytes().to_vec()),
        Argument::new(ARG_DESTINATION, destination.as_bytes().to_vec()),
    ];
    args.extend(extra);
    Instruction::invoke(*source, CONTRACT_COIN_ID, COMMAND_TRANSFER, args)
}

/// The transaction a client submits to log in: `user -> service`, then the same
/// amount `service -> user` carrying the hashed challenge under `argument_name`.
pub fn login_transaction(
    user_coin: &InstanceId,
    service_coin: &InstanceId,
    amount: u64,
    argument_name: &str,
    hashed_challenge: &[u8],
) -> ClientTransaction {
    ClientTransaction {
        instructions: vec![
            coin_transfer(user_coin, service_coin, amount, vec![]),
            coin_transfer(
                service_coin,
                user_coin,
                amount,
                vec![Argument::new(argument_name, hashed_challenge.to_vec())],
            ),
        ],
    }
}
