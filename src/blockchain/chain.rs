use log::{debug, info};
use thiserror::Error;

use super::account::AccountState;
use super::amount::{Amount, Balance};
use super::block::{meets_difficulty, Block};
use super::crypto::Address;
use super::transaction::TransactionId;

/// Default number of leading zero hex digits required in a block hash
pub const DEFAULT_DIFFICULTY: u8 = 4;

/// Default reward paid to the miner of each block, in whole coins
pub const DEFAULT_MINING_REWARD: u32 = 100;

/// Errors that can occur during ledger operations
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidBlock(_) => "InvalidBlock",
            LedgerError::InvalidChain(_) => "InvalidChain",
        }
    }
}

/// Consensus parameters every node of a network must share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// Mining difficulty (number of leading zeros required in hash)
    pub difficulty: u8,

    /// Mining reward
    pub mining_reward: Amount,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: Amount::from_whole(DEFAULT_MINING_REWARD),
        }
    }
}

/// A chain that passed full validation, together with the balances it yields
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    blocks: Vec<Block>,
    accounts: AccountState,
}

impl ValidatedChain {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// The ordered, hash-linked sequence of blocks kept by a node
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The chain of blocks; never empty, index 0 is genesis
    blocks: Vec<Block>,

    /// Balances derived from `blocks`
    accounts: AccountState,

    config: ChainConfig,
}

impl Ledger {
    /// Creates a new ledger holding only the genesis block
    pub fn new(config: ChainConfig) -> Self {
        Ledger {
            blocks: vec![Self::genesis_block()],
            accounts: AccountState::new(),
            config,
        }
    }

    /// The fixed genesis block
    pub fn genesis_block() -> Block {
        Block::genesis()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Gets the last block in the chain
    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Balance of `address` from every transaction in the chain
    pub fn balance_of(&self, address: &Address) -> Balance {
        self.accounts.balance_of(address)
    }

    pub fn contains_transaction(&self, id: &TransactionId) -> bool {
        self.accounts.contains_transaction(id)
    }

    /// Appends a block on top of the current tip
    ///
    /// # Returns
    ///
    /// The new tip, or `InvalidBlock` if any rule is broken; the ledger is
    /// left untouched on failure
    pub fn append(&mut self, block: Block) -> Result<&Block, LedgerError> {
        validate_successor(self.tip(), &block, &self.config).map_err(LedgerError::InvalidBlock)?;
        self.accounts
            .check_block(&block)
            .map_err(|e| LedgerError::InvalidBlock(e.to_string()))?;

        self.accounts.apply_block(&block);
        info!(
            "Appended block {} ({}) with {} transactions",
            block.index,
            block.hash,
            block.transactions.len()
        );
        self.blocks.push(block);

        Ok(self.tip())
    }

    /// Validates a full candidate chain without touching any ledger
    pub fn validate_chain(chain: Vec<Block>, config: &ChainConfig) -> Result<ValidatedChain, LedgerError> {
        let genesis = chain
            .first()
            .ok_or_else(|| LedgerError::InvalidChain("chain is empty".to_string()))?;
        if *genesis != Self::genesis_block() {
            return Err(LedgerError::InvalidChain("genesis block does not match".to_string()));
        }

        let mut accounts = AccountState::new();
        for pair in chain.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);

            validate_successor(previous, block, config)
                .map_err(|reason| LedgerError::InvalidChain(format!("block {}: {}", block.index, reason)))?;
            accounts
                .check_block(block)
                .map_err(|e| LedgerError::InvalidChain(format!("block {}: {}", block.index, e)))?;
            accounts.apply_block(block);
        }

        Ok(ValidatedChain {
            blocks: chain,
            accounts,
        })
    }

    /// Whether `chain` satisfies every ledger invariant under `config`
    pub fn is_valid(chain: &[Block], config: &ChainConfig) -> bool {
        match Self::validate_chain(chain.to_vec(), config) {
            Ok(_) => true,
            Err(err) => {
                debug!("Chain rejected: {}", err);
                false
            }
        }
    }

    /// Replaces the whole chain if the candidate is valid
    pub fn replace(&mut self, chain: Vec<Block>) -> Result<(), LedgerError> {
        let validated = Self::validate_chain(chain, &self.config)?;
        self.install(validated);
        Ok(())
    }

    /// Swaps in a chain that was already validated against this ledger's config
    pub fn install(&mut self, validated: ValidatedChain) {
        info!(
            "Replacing chain of length {} with chain of length {}",
            self.blocks.len(),
            validated.blocks.len()
        );
        self.blocks = validated.blocks;
        self.accounts = validated.accounts;
    }
}

/// Checks the rules linking `block` to `previous` and the block's own
/// integrity; balances are checked separately against account state
fn validate_successor(previous: &Block, block: &Block, config: &ChainConfig) -> Result<(), String> {
    if block.previous_hash != previous.hash {
        return Err(format!(
            "previous hash {} does not match tip {}",
            block.previous_hash, previous.hash
        ));
    }

    if block.index != previous.index + 1 {
        return Err(format!(
            "index {} does not follow {}",
            block.index, previous.index
        ));
    }

    if block.timestamp < previous.timestamp {
        return Err(format!(
            "timestamp {} is earlier than previous block's {}",
            block.timestamp, previous.timestamp
        ));
    }

    if !block.has_valid_hash() {
        return Err("hash does not match block contents".to_string());
    }

    if !meets_difficulty(&block.hash, config.difficulty) {
        return Err(format!(
            "hash {} does not meet difficulty {}",
            block.hash, config.difficulty
        ));
    }

    let (reward, transfers) = block
        .transactions
        .split_first()
        .ok_or_else(|| "block has no reward transaction".to_string())?;
    if !reward.is_valid_reward(config.mining_reward) {
        return Err(format!(
            "first transaction must be a reward of {}",
            config.mining_reward
        ));
    }

    for transaction in transfers {
        transaction
            .validate_signed()
            .map_err(|e| format!("transaction {}: {}", transaction.id(), e))?;
    }

    Ok(())
}
