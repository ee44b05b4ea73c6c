use thiserror::Error;

use std::collections::{HashMap, HashSet};

use super::amount::{Amount, Balance};
use super::block::Block;
use super::crypto::Address;
use super::transaction::TransactionId;

/// Errors raised while replaying a block against account balances
#[derive(Debug, Error, PartialEq)]
pub enum AccountError {
    #[error("Insufficient funds for {address}: required {required}, available {available}")]
    InsufficientFunds {
        address: Address,
        required: Amount,
        available: Balance,
    },

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(TransactionId),
}

/// Balances and confirmed transaction identities derived from a chain.
///
/// Updated incrementally on append and rebuilt from scratch when the chain is
/// replaced, so it always matches a full rescan of the blocks it was fed.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    balances: HashMap<Address, Balance>,
    confirmed: HashSet<TransactionId>,
}

impl AccountState {
    /// Creates an empty account state
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the balance of an address; unknown addresses hold zero
    pub fn balance_of(&self, address: &Address) -> Balance {
        self.balances.get(address).copied().unwrap_or_default()
    }

    /// Whether a non-reward transaction with this identity is already confirmed
    pub fn contains_transaction(&self, id: &TransactionId) -> bool {
        self.confirmed.contains(id)
    }

    /// Checks that a block can be applied: no replayed transactions and no
    /// sender spending more than they hold at that point of the block
    pub fn check_block(&self, block: &Block) -> Result<(), AccountError> {
        let mut pending: HashMap<&Address, Balance> = HashMap::new();
        let mut seen: HashSet<TransactionId> = HashSet::new();

        for transaction in &block.transactions {
            if !transaction.is_reward() {
                let id = transaction.id();
                if self.confirmed.contains(&id) || !seen.insert(id.clone()) {
                    return Err(AccountError::DuplicateTransaction(id));
                }

                let sender = pending
                    .entry(&transaction.sender)
                    .or_insert_with(|| self.balance_of(&transaction.sender));
                if !sender.covers(transaction.amount) {
                    return Err(AccountError::InsufficientFunds {
                        address: transaction.sender.clone(),
                        required: transaction.amount,
                        available: *sender,
                    });
                }
                *sender = sender.debit(transaction.amount);
            }

            let receiver = pending
                .entry(&transaction.receiver)
                .or_insert_with(|| self.balance_of(&transaction.receiver));
            *receiver = receiver.credit(transaction.amount);
        }

        Ok(())
    }

    /// Applies a block that already passed `check_block`
    pub fn apply_block(&mut self, block: &Block) {
        for transaction in &block.transactions {
            if !transaction.is_reward() {
                let sender = self.balances.entry(transaction.sender.clone()).or_default();
                *sender = sender.debit(transaction.amount);
                self.confirmed.insert(transaction.id());
            }

            let receiver = self.balances.entry(transaction.receiver.clone()).or_default();
            *receiver = receiver.credit(transaction.amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;
    use crate::blockchain::transaction::Transaction;

    fn block_with(index: u64, transactions: Vec<Transaction>) -> Block {
        Block::new(index, 0, transactions, String::new(), 0)
    }

    #[test]
    fn test_replay_credits_and_debits() {
        let alice = Wallet::generate();
        let bob = Address::from("bob");

        let blocks = vec![
            block_with(1, vec![Transaction::new_reward(alice.address().clone(), Amount::from_whole(100))]),
            block_with(
                2,
                vec![
                    Transaction::new_reward(Address::from("miner"), Amount::from_whole(100)),
                    Transaction::new_signed(&alice, bob.clone(), Amount::from_whole(40)),
                ],
            ),
        ];

        let mut state = AccountState::new();
        for block in &blocks {
            state.check_block(block).unwrap();
            state.apply_block(block);
        }
        assert_eq!(state.balance_of(alice.address()), Balance::from_cents(6000));
        assert_eq!(state.balance_of(&bob), Balance::from_cents(4000));
        assert_eq!(state.balance_of(&Address::from("nobody")), Balance::ZERO);
        assert_eq!(state.balance_of(&Address::from("miner")), Balance::from_cents(10_000));
    }

    #[test]
    fn test_overspend_is_rejected() {
        let alice = Wallet::generate();
        let block = block_with(
            1,
            vec![
                Transaction::new_reward(Address::from("miner"), Amount::from_whole(100)),
                Transaction::new_signed(&alice, Address::from("bob"), Amount::from_whole(1)),
            ],
        );

        let state = AccountState::new();
        assert!(matches!(
            state.check_block(&block),
            Err(AccountError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_funds_received_earlier_in_block_can_be_spent() {
        let alice = Wallet::generate();
        let block = block_with(
            1,
            vec![
                Transaction::new_reward(alice.address().clone(), Amount::from_whole(100)),
                Transaction::new_signed(&alice, Address::from("bob"), Amount::from_whole(100)),
            ],
        );

        assert_eq!(AccountState::new().check_block(&block), Ok(()));
    }

    #[test]
    fn test_replayed_transaction_is_rejected() {
        let alice = Wallet::generate();
        let transfer = Transaction::new_signed(&alice, Address::from("bob"), Amount::from_whole(10));

        let first = block_with(
            1,
            vec![
                Transaction::new_reward(alice.address().clone(), Amount::from_whole(100)),
                transfer.clone(),
            ],
        );
        let mut state = AccountState::new();
        state.check_block(&first).unwrap();
        state.apply_block(&first);
        assert!(state.contains_transaction(&transfer.id()));

        let replay = block_with(
            2,
            vec![Transaction::new_reward(Address::from("miner"), Amount::from_whole(100)), transfer],
        );
        assert!(matches!(
            state.check_block(&replay),
            Err(AccountError::DuplicateTransaction(_))
        ));
    }
}
