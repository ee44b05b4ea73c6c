// Blockchain module
//
// This module contains the ledger core:
// - Amounts and balances
// - Block structure and hashing
// - Chain validation and account state
// - Transactions and signatures
// - Mempool, mining and chain resolution
// - The node that ties them together

pub mod account;
pub mod amount;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod mempool;
pub mod miner;
pub mod node;
pub mod resolver;
pub mod transaction;
pub mod validator;

// Re-export main components for easier access
pub use amount::{Amount, Balance};
pub use block::Block;
pub use chain::{ChainConfig, Ledger, LedgerError};
pub use crypto::{Address, DigitalSignature, KeyMaterial, PublicKey, Wallet};
pub use mempool::Mempool;
pub use miner::MiningError;
pub use node::{BlockReception, Broadcaster, Node, NoopBroadcaster};
pub use resolver::Resolution;
pub use transaction::{Transaction, TransactionError, TransactionId};
