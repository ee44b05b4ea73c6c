use log::{debug, info};
use thiserror::Error;

use super::amount::Amount;
use super::block::{meets_difficulty, Block, HashPreimage};
use super::chain::LedgerError;
use super::crypto::Address;
use super::transaction::{Transaction, SYSTEM_SENDER};

/// Number of nonce attempts between two checks of the stop condition
pub const STOP_CHECK_INTERVAL: u64 = 1024;

/// Errors that can occur when mining a block
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Mining already in progress")]
    InProgress,

    #[error("Mining interrupted: the chain changed while searching for a nonce")]
    Interrupted,

    #[error("Invalid miner address: {0:?}")]
    InvalidMinerAddress(String),

    #[error("Mined block rejected: {0}")]
    Rejected(#[from] LedgerError),
}

impl MiningError {
    pub fn kind(&self) -> &'static str {
        match self {
            MiningError::InProgress => "InProgress",
            MiningError::Interrupted => "Interrupted",
            MiningError::InvalidMinerAddress(_) => "InvalidMinerAddress",
            MiningError::Rejected(err) => err.kind(),
        }
    }
}

/// Parses the address a reward should be paid to
pub fn parse_miner_address(raw: &str) -> Result<Address, MiningError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == SYSTEM_SENDER || trimmed.contains('|') {
        return Err(MiningError::InvalidMinerAddress(raw.to_string()));
    }
    Ok(Address(trimmed.to_string()))
}

/// Everything about the next block except its nonce and hash
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
}

impl BlockTemplate {
    /// Builds the next block on `tip`: the reward first, then the pending
    /// transactions in order. The timestamp is fixed here for the whole
    /// search and never goes below the tip's.
    pub fn new(tip: &Block, miner: &Address, reward: Amount, pending: Vec<Transaction>, now: i64) -> Self {
        let mut transactions = Vec::with_capacity(pending.len() + 1);
        transactions.push(Transaction::new_reward(miner.clone(), reward));
        transactions.extend(pending);

        BlockTemplate {
            index: tip.index + 1,
            timestamp: now.max(tip.timestamp),
            transactions,
            previous_hash: tip.hash.clone(),
        }
    }
}

/// Searches nonces from zero upward until the hash meets `difficulty`.
///
/// `should_stop` is polled every `STOP_CHECK_INTERVAL` attempts; when it
/// returns true the search is abandoned and `None` is returned.
pub fn proof_of_work<F>(template: BlockTemplate, difficulty: u8, should_stop: F) -> Option<Block>
where
    F: Fn() -> bool,
{
    let preimage = HashPreimage::new(
        template.index,
        template.timestamp,
        &template.transactions,
        &template.previous_hash,
    );

    debug!(
        "Mining block {} with {} transactions at difficulty {}",
        template.index,
        template.transactions.len(),
        difficulty
    );

    let mut nonce: u64 = 0;
    loop {
        if nonce % STOP_CHECK_INTERVAL == 0 && nonce > 0 && should_stop() {
            info!("Stopped mining block {} after {} attempts", template.index, nonce);
            return None;
        }

        let hash = preimage.hash_with_nonce(nonce);
        if meets_difficulty(&hash, difficulty) {
            info!("Found nonce {} for block {}: {}", nonce, template.index, hash);
            return Some(Block {
                index: template.index,
                timestamp: template.timestamp,
                transactions: template.transactions,
                previous_hash: template.previous_hash,
                nonce,
                hash,
            });
        }

        nonce = nonce.checked_add(1)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain::{ChainConfig, Ledger};

    use std::cell::Cell;

    #[test]
    fn test_mined_block_meets_difficulty() {
        let ledger = Ledger::new(ChainConfig::default());
        let template = BlockTemplate::new(
            ledger.tip(),
            &Address::from("miner"),
            Amount::from_whole(100),
            Vec::new(),
            chrono::Utc::now().timestamp(),
        );

        let block = proof_of_work(template, 2, || false).unwrap();

        assert_eq!(block.index, 1);
        assert!(block.hash.starts_with("00"));
        assert!(block.has_valid_hash());
        assert_eq!(block.previous_hash, ledger.tip().hash);
        assert!(block.transactions[0].is_valid_reward(Amount::from_whole(100)));
    }

    #[test]
    fn test_timestamp_never_precedes_tip() {
        let genesis = Block::genesis();
        let template = BlockTemplate::new(&genesis, &Address::from("miner"), Amount::from_whole(1), Vec::new(), 0);
        assert_eq!(template.timestamp, genesis.timestamp);
    }

    #[test]
    fn test_stop_condition_interrupts_search() {
        let genesis = Block::genesis();
        let template = BlockTemplate::new(&genesis, &Address::from("miner"), Amount::from_whole(1), Vec::new(), 0);
        let polls = Cell::new(0);

        let result = proof_of_work(template, 64, || {
            polls.set(polls.get() + 1);
            true
        });

        assert!(result.is_none());
        assert_eq!(polls.get(), 1);
    }

    #[test]
    fn test_parse_miner_address() {
        assert_eq!(parse_miner_address(" Miner1 ").unwrap(), Address::from("Miner1"));
        assert!(matches!(parse_miner_address(""), Err(MiningError::InvalidMinerAddress(_))));
        assert!(matches!(parse_miner_address("SYSTEM"), Err(MiningError::InvalidMinerAddress(_))));
    }
}
