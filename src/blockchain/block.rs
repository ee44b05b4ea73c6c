use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Fixed timestamp of the genesis block, identical on every node
pub const GENESIS_TIMESTAMP: i64 = 1_700_000_000;

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Seconds since the Unix epoch when mining started
    pub timestamp: i64,

    /// Transactions in mining order; the reward comes first
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work solution
    pub nonce: u64,

    /// Hash of every other field of the block
    pub hash: String,
}

/// Canonical hashing input of a block without its nonce.
///
/// The fields are rendered once as JSON with `nonce` placed last, so the
/// proof-of-work loop only appends the nonce digits and the closing brace.
pub struct HashPreimage {
    prefix: String,
}

impl HashPreimage {
    pub fn new(index: u64, timestamp: i64, transactions: &[Transaction], previous_hash: &str) -> Self {
        let head = serde_json::json!({
            "index": index,
            "timestamp": timestamp,
            "transactions": transactions,
            "previous_hash": previous_hash,
        });

        let mut prefix = head.to_string();
        prefix.pop();
        prefix.push_str(",\"nonce\":");

        HashPreimage { prefix }
    }

    /// SHA-256 hex digest of the preimage completed with `nonce`
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.prefix.as_bytes());
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        hex::encode(hasher.finalize())
    }
}

/// Whether a hex hash starts with `difficulty` zero characters
pub fn meets_difficulty(hash: &str, difficulty: u8) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

impl Block {
    /// Creates a new block and computes its hash
    pub fn new(
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        nonce: u64,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The genesis block shared by every node
    pub fn genesis() -> Self {
        Block::new(
            0,
            GENESIS_TIMESTAMP,
            Vec::new(),
            GENESIS_PREVIOUS_HASH.to_string(),
            0,
        )
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        HashPreimage::new(self.index, self.timestamp, &self.transactions, &self.previous_hash)
            .hash_with_nonce(self.nonce)
    }

    /// Whether the stored hash matches the block's contents
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }
}
