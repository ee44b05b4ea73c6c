use chrono::Utc;
use log::{debug, info, warn};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::amount::Balance;
use super::block::Block;
use super::chain::{ChainConfig, Ledger, LedgerError};
use super::crypto::{generate_keypair, Address, KeyMaterial};
use super::mempool::Mempool;
use super::miner::{self, BlockTemplate, MiningError};
use super::resolver::{self, Resolution};
use super::transaction::{Transaction, TransactionError};

/// Outbound side of gossip; the service layer wires it to real peers
pub trait Broadcaster: Send + Sync {
    fn broadcast_transaction(&self, transaction: &Transaction);

    fn broadcast_block(&self, block: &Block);
}

/// Broadcaster for a node without peers
#[derive(Debug, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast_transaction(&self, _transaction: &Transaction) {}

    fn broadcast_block(&self, _block: &Block) {}
}

/// What happened to a block received from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReception {
    /// The block extended the tip and was appended
    Appended,

    /// The block is already part of the chain
    Known,

    /// The block does not link to the tip; resolve against peers to catch up
    Detached,
}

struct NodeState {
    ledger: Ledger,
    mempool: Mempool,
}

/// A single node: the ledger and mempool behind one lock, plus mining state.
///
/// Every mutation takes the write lock, so at most one structural change is
/// in flight; reads take the read lock and copy out a consistent snapshot.
/// Proof-of-work runs without any lock held.
pub struct Node {
    state: RwLock<NodeState>,
    config: ChainConfig,

    /// Bumped whenever the chain changes or mining is interrupted
    work_epoch: AtomicU64,

    mining: AtomicBool,
    broadcaster: Arc<dyn Broadcaster>,
}

/// Clears the mining flag when a mining job ends, however it ends
struct MiningGuard<'a>(&'a AtomicBool);

impl<'a> MiningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, MiningError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MiningError::InProgress)?;
        Ok(MiningGuard(flag))
    }
}

impl Drop for MiningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Node {
    /// Creates a node holding only the genesis block, with no peers
    pub fn new(config: ChainConfig) -> Self {
        Self::with_broadcaster(config, Arc::new(NoopBroadcaster))
    }

    pub fn with_broadcaster(config: ChainConfig, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Node {
            state: RwLock::new(NodeState {
                ledger: Ledger::new(config),
                mempool: Mempool::new(),
            }),
            config,
            work_epoch: AtomicU64::new(0),
            mining: AtomicBool::new(false),
            broadcaster,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, NodeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_epoch(&self) {
        self.work_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Creates a new wallet keypair; the node keeps no copy of it
    pub fn create_wallet(&self) -> KeyMaterial {
        generate_keypair().export()
    }

    /// Gets the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.read().ledger.blocks().to_vec()
    }

    pub fn chain_length(&self) -> usize {
        self.read().ledger.len()
    }

    /// Gets all pending transactions in insertion order
    pub fn mempool(&self) -> Vec<Transaction> {
        self.read().mempool.snapshot()
    }

    pub fn balance_of(&self, address: &Address) -> Balance {
        self.read().ledger.balance_of(address)
    }

    /// Re-checks the local chain from genesis
    pub fn is_chain_valid(&self) -> bool {
        let state = self.read();
        Ledger::is_valid(state.ledger.blocks(), &self.config)
    }

    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::Acquire)
    }

    /// Accepts a transaction from a client and broadcasts it the first time
    /// it enters the mempool
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<Transaction, TransactionError> {
        let (accepted, is_new) = self.insert_transaction(transaction)?;
        if is_new {
            info!("Accepted transaction {}", accepted.id());
            self.broadcaster.broadcast_transaction(&accepted);
        }
        Ok(accepted)
    }

    /// Accepts a transaction relayed by a peer, without relaying it again
    pub fn receive_transaction(&self, transaction: Transaction) -> Result<Transaction, TransactionError> {
        self.insert_transaction(transaction).map(|(accepted, _)| accepted)
    }

    fn insert_transaction(&self, transaction: Transaction) -> Result<(Transaction, bool), TransactionError> {
        let mut state = self.write();
        let NodeState { ledger, mempool } = &mut *state;

        let is_new = !mempool.contains(&transaction.id());
        let accepted = mempool.submit(transaction, ledger)?;
        Ok((accepted, is_new))
    }

    /// Accepts a block relayed by a peer
    pub fn receive_block(&self, block: Block) -> Result<BlockReception, LedgerError> {
        let mut state = self.write();
        let NodeState { ledger, mempool } = &mut *state;

        let known = usize::try_from(block.index)
            .ok()
            .and_then(|index| ledger.blocks().get(index))
            .map_or(false, |existing| existing.hash == block.hash);
        if known {
            return Ok(BlockReception::Known);
        }

        if block.previous_hash != ledger.tip().hash {
            info!(
                "Received block {} that does not extend tip {}",
                block.index,
                ledger.tip().index
            );
            return Ok(BlockReception::Detached);
        }

        ledger.append(block.clone())?;
        self.bump_epoch();
        let dropped = mempool.remove_included(&block, ledger);
        debug!("Block {} cleared {} pending transactions", block.index, dropped);
        Ok(BlockReception::Appended)
    }

    /// Mines a block paying the reward to `miner_address`.
    ///
    /// The nonce search runs without the lock. If the chain changes while
    /// searching, the job is abandoned with `Interrupted`; otherwise the block
    /// is appended with full validation and broadcast.
    pub fn mine(&self, miner_address: &str) -> Result<Block, MiningError> {
        let miner = miner::parse_miner_address(miner_address)?;
        let _guard = MiningGuard::acquire(&self.mining)?;

        let (template, epoch) = {
            let state = self.read();
            let template = BlockTemplate::new(
                state.ledger.tip(),
                &miner,
                self.config.mining_reward,
                state.mempool.snapshot(),
                Utc::now().timestamp(),
            );
            (template, self.work_epoch.load(Ordering::Acquire))
        };

        info!(
            "Mining block {} for {} with {} pending transactions",
            template.index,
            miner,
            template.transactions.len() - 1
        );

        let block = miner::proof_of_work(template, self.config.difficulty, || {
            self.work_epoch.load(Ordering::Acquire) != epoch
        })
        .ok_or(MiningError::Interrupted)?;

        {
            let mut state = self.write();
            let NodeState { ledger, mempool } = &mut *state;

            if let Err(err) = ledger.append(block.clone()) {
                warn!("Discarding mined block {}: {}", block.index, err);
                // Leave no entry behind that would sink the next template as well
                mempool.reconcile(ledger);
                return Err(err.into());
            }
            self.bump_epoch();
            mempool.remove_included(&block, ledger);
        }

        self.broadcaster.broadcast_block(&block);
        Ok(block)
    }

    /// Abandons any proof-of-work search currently running on this node
    pub fn interrupt_mining(&self) {
        self.bump_epoch();
    }

    /// Compares the local chain with peer chains and adopts the longest valid one
    pub fn resolve(&self, chains: Vec<Vec<Block>>) -> Resolution {
        let mut state = self.write();
        let NodeState { ledger, mempool } = &mut *state;

        let resolution = resolver::resolve_many(ledger, mempool, chains);
        if resolution.is_adopted() {
            self.bump_epoch();
        }
        resolution
    }

    /// Merges peer transactions into the mempool, returning how many were new
    pub fn merge(&self, transactions: Vec<Transaction>) -> usize {
        let mut state = self.write();
        let NodeState { ledger, mempool } = &mut *state;
        mempool.merge(transactions, ledger)
    }
}
