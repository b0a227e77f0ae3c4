//! Search of a single block for a login proof.
//!
//! A login proof is an accepted transaction made of exactly two coin
//! transfers: the user pays the service, then the service pays the same
//! amount back and attaches the hash of the ticket's challenge.

use crate::chain::error::ValidationError;
use crate::chain::types::{Block, BlockId, InstanceId, TxResult, ARG_COIN, ARG_DESTINATION};
use log::debug;
use std::fmt;

/// Why a transaction result was not accepted as a login proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAccepted,
    InstructionCount,
    NotCoinTransfer,
    ArgumentCount,
    NotReciprocal,
    AmountMismatch,
    ChallengeMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NotAccepted => "not accepted",
            SkipReason::InstructionCount => "incorrect instruction count",
            SkipReason::NotCoinTransfer => "not a coin transfer",
            SkipReason::ArgumentCount => "incorrect argument count",
            SkipReason::NotReciprocal => "not back and forth between user and service",
            SkipReason::AmountMismatch => "amounts differ",
            SkipReason::ChallengeMismatch => "challenge hash differs",
        };
        f.write_str(reason)
    }
}

/// Receives the progress of a chain walk.
pub trait WalkObserver: Send + Sync {
    /// A block was fully inspected.
    fn block_checked(&self, block: &BlockId, timestamp: i64, matched: bool);

    /// Transaction `index` of `block` is not a login proof.
    fn transaction_skipped(&self, block: &BlockId, index: usize, reason: SkipReason);
}

/// Writes walk progress to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl WalkObserver for LogObserver {
    fn block_checked(&self, block: &BlockId, timestamp: i64, matched: bool) {
        debug!(
            "Checked block {} (timestamp {}): {}",
            block.short(),
            timestamp,
            if matched { "login proof found" } else { "no login proof" }
        );
    }

    fn transaction_skipped(&self, block: &BlockId, index: usize, reason: SkipReason) {
        debug!("Block {} tx {} skipped: {}", block.short(), index, reason);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WalkObserver for NoopObserver {
    fn block_checked(&self, _block: &BlockId, _timestamp: i64, _matched: bool) {}

    fn transaction_skipped(&self, _block: &BlockId, _index: usize, _reason: SkipReason) {}
}

/// Matches transactions against one expected login.
#[derive(Debug, Clone, Copy)]
pub struct ProofMatcher<'a> {
    user_account: &'a InstanceId,
    service_account: &'a InstanceId,
    hashed_challenge: &'a [u8],
    argument_name: &'a str,
}

impl<'a> ProofMatcher<'a> {
    pub fn new(
        user_account: &'a InstanceId,
        service_account: &'a InstanceId,
        hashed_challenge: &'a [u8],
        argument_name: &'a str,
    ) -> Self {
        Self {
            user_account,
            service_account,
            hashed_challenge,
            argument_name,
        }
    }

    /// Whether `block` contains the login proof. A block that fails to decode is an error.
    pub fn matches(
        &self,
        block: &Block,
        observer: &dyn WalkObserver,
    ) -> Result<bool, ValidationError> {
        let corrupt = |e: scale::Error| ValidationError::CorruptBlock {
            block: block.hash.to_string(),
            reason: e.to_string(),
        };
        let header = block.header().map_err(corrupt)?;
        let body = block.body().map_err(corrupt)?;

        for (index, result) in body.tx_results.iter().enumerate() {
            match self.check(result) {
                Ok(()) => {
                    observer.block_checked(&block.hash, header.timestamp, true);
                    return Ok(true);
                }
                Err(reason) => observer.transaction_skipped(&block.hash, index, reason),
            }
        }

        observer.block_checked(&block.hash, header.timestamp, false);
        Ok(false)
    }

    /// Check one transaction result, naming the first rule it breaks.
    pub fn check(&self, result: &TxResult) -> Result<(), SkipReason> {
        if !result.accepted {
            return Err(SkipReason::NotAccepted);
        }

        let instructions = &result.client_transaction.instructions;
        if instructions.len() != 2 {
            return Err(SkipReason::InstructionCount);
        }

        let (send, recv) = match (
            instructions[0].as_coin_transfer(),
            instructions[1].as_coin_transfer(),
        ) {
            (Some(send), Some(recv)) => (send, recv),
            _ => return Err(SkipReason::NotCoinTransfer),
        };

        if send.args.len() != 2 || recv.args.len() != 3 {
            return Err(SkipReason::ArgumentCount);
        }

        let send_src = instructions[0].instance_id.as_bytes();
        let send_dst = send.args.search(ARG_DESTINATION);
        let recv_src = instructions[1].instance_id.as_bytes();
        let recv_dst = recv.args.search(ARG_DESTINATION);
        if send_dst != Some(recv_src)
            || recv_dst != Some(send_src)
            || recv_src != self.service_account.as_bytes()
            || recv_dst != Some(self.user_account.as_bytes())
        {
            return Err(SkipReason::NotReciprocal);
        }

        // a missing amount counts as an empty one
        if send.args.search(ARG_COIN).unwrap_or_default()
            != recv.args.search(ARG_COIN).unwrap_or_default()
        {
            return Err(SkipReason::AmountMismatch);
        }

        if recv.args.search(self.argument_name) != Some(self.hashed_challenge) {
            return Err(SkipReason::ChallengeMismatch);
        }

        Ok(())
    }
}
