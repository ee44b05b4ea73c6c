use super::chain::Ledger;
use super::mempool::Mempool;
use super::transaction::{Transaction, TransactionError};

/// Validates a candidate transaction against the ledger and pending pool.
///
/// Checks run in order: structure, signature, replay of a confirmed
/// transaction, then solvency. Solvency counts what the sender already
/// committed to other pending transactions.
pub fn validate(
    transaction: &Transaction,
    ledger: &Ledger,
    mempool: &Mempool,
) -> Result<(), TransactionError> {
    transaction.validate_signed()?;

    let id = transaction.id();
    if ledger.contains_transaction(&id) {
        return Err(TransactionError::AlreadyConfirmed(id));
    }

    let available = mempool.spendable(&transaction.sender, ledger.balance_of(&transaction.sender));
    if !available.covers(transaction.amount) {
        return Err(TransactionError::InsufficientFunds {
            required: transaction.amount,
            available,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::amount::{Amount, Balance};
    use crate::blockchain::chain::ChainConfig;
    use crate::blockchain::crypto::{Address, Wallet};
    use crate::blockchain::miner::{proof_of_work, BlockTemplate};

    fn funded_ledger(wallet: &Wallet) -> Ledger {
        let mut ledger = Ledger::new(ChainConfig {
            difficulty: 1,
            mining_reward: Amount::from_whole(100),
        });
        let template = BlockTemplate::new(
            ledger.tip(),
            wallet.address(),
            Amount::from_whole(100),
            Vec::new(),
            ledger.tip().timestamp + 1,
        );
        let block = proof_of_work(template, 1, || false).unwrap();
        ledger.append(block).unwrap();
        ledger
    }

    #[test]
    fn test_unfunded_sender_is_insolvent() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let ledger = Ledger::new(ChainConfig::default());
        let mempool = Mempool::new();

        let transaction =
            Transaction::new_signed(&alice, bob.address().clone(), Amount::from_whole(50));

        assert_eq!(
            validate(&transaction, &ledger, &mempool),
            Err(TransactionError::InsufficientFunds {
                required: Amount::from_whole(50),
                available: Balance::ZERO,
            })
        );
    }

    #[test]
    fn test_pending_spends_count_against_balance() {
        let alice = Wallet::generate();
        let ledger = funded_ledger(&alice);
        let mut mempool = Mempool::new();

        let first = Transaction::new_signed(&alice, Address::from("bob"), Amount::from_whole(70));
        assert_eq!(validate(&first, &ledger, &mempool), Ok(()));
        mempool.submit(first, &ledger).unwrap();

        let second = Transaction::new_signed(&alice, Address::from("carol"), Amount::from_whole(40));
        assert!(matches!(
            validate(&second, &ledger, &mempool),
            Err(TransactionError::InsufficientFunds { .. })
        ));

        let third = Transaction::new_signed(&alice, Address::from("carol"), Amount::from_whole(30));
        assert_eq!(validate(&third, &ledger, &mempool), Ok(()));
    }

    #[test]
    fn test_structure_is_checked_before_signature() {
        let alice = Wallet::generate();
        let ledger = funded_ledger(&alice);
        let mut transaction =
            Transaction::new_signed(&alice, alice.address().clone(), Amount::from_whole(1));
        transaction.signature = None;

        assert_eq!(
            validate(&transaction, &ledger, &Mempool::new()),
            Err(TransactionError::SelfTransfer)
        );
    }

    #[test]
    fn test_reward_from_network_is_refused() {
        let ledger = Ledger::new(ChainConfig::default());
        let reward = Transaction::new_reward(Address::from("me"), Amount::from_whole(100));

        assert_eq!(
            validate(&reward, &ledger, &Mempool::new()),
            Err(TransactionError::ForgedReward)
        );
    }
}
