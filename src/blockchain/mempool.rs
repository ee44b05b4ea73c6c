use log::debug;

use std::collections::HashSet;

use super::amount::Balance;
use super::block::Block;
use super::chain::Ledger;
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError, TransactionId};
use super::validator;

/// Pending transactions awaiting inclusion in a block.
///
/// Keyed by transaction identity so resubmissions are idempotent; insertion
/// order is kept so mining is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    entries: Vec<Transaction>,
    ids: HashSet<TransactionId>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.ids.contains(id)
    }

    /// Validates and inserts a transaction
    ///
    /// # Returns
    ///
    /// The canonical pending transaction; resubmitting one that is already
    /// pending returns the stored copy without validating again
    pub fn submit(&mut self, transaction: Transaction, ledger: &Ledger) -> Result<Transaction, TransactionError> {
        let id = transaction.id();
        if self.ids.contains(&id) {
            if let Some(existing) = self.entries.iter().find(|tx| tx.id() == id) {
                return Ok(existing.clone());
            }
        }

        validator::validate(&transaction, ledger, self)?;

        self.ids.insert(id);
        self.entries.push(transaction.clone());
        Ok(transaction)
    }

    /// Best-effort insert of peer transactions
    ///
    /// # Returns
    ///
    /// The number of transactions that were not pending before and passed
    /// validation
    pub fn merge<I>(&mut self, incoming: I, ledger: &Ledger) -> usize
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut accepted = 0;
        for transaction in incoming {
            if self.contains(&transaction.id()) {
                continue;
            }
            match self.submit(transaction, ledger) {
                Ok(_) => accepted += 1,
                Err(err) => debug!("Skipping merged transaction: {}", err),
            }
        }
        accepted
    }

    /// Snapshot of the pending set for mining; nothing is removed until the
    /// mined block is appended
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.entries.clone()
    }

    /// What remains of `balance` once every pending transfer from `address`
    /// is paid
    pub fn spendable(&self, address: &Address, balance: Balance) -> Balance {
        self.entries
            .iter()
            .filter(|tx| &tx.sender == address)
            .fold(balance, |left, tx| left.debit(tx.amount))
    }

    /// Drops every pending transaction included in `block`, then re-validates
    /// the rest against `ledger`, which must already hold the block. Entries
    /// whose funds the block spent through other transactions go too.
    ///
    /// # Returns
    ///
    /// The number of dropped transactions
    pub fn remove_included(&mut self, block: &Block, ledger: &Ledger) -> usize {
        let included: HashSet<TransactionId> = block.transactions.iter().map(Transaction::id).collect();
        let before = self.entries.len();

        self.entries.retain(|tx| !included.contains(&tx.id()));
        self.ids.retain(|id| !included.contains(id));
        self.reconcile(ledger);

        before - self.entries.len()
    }

    /// Re-validates every entry against a freshly adopted chain, in insertion
    /// order, dropping confirmed and no-longer-solvent transactions
    ///
    /// # Returns
    ///
    /// The number of dropped transactions
    pub fn reconcile(&mut self, ledger: &Ledger) -> usize {
        let previous = std::mem::take(&mut self.entries);
        self.ids.clear();

        let before = previous.len();
        for transaction in previous {
            if let Err(err) = self.submit(transaction, ledger) {
                debug!("Dropping pending transaction after chain change: {}", err);
            }
        }

        before - self.entries.len()
    }
}
