use log::{debug, info, warn};

use super::block::Block;
use super::chain::Ledger;
use super::mempool::Mempool;

/// Outcome of comparing the local chain with peer chains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A longer valid chain replaced the local one
    Adopted { length: usize, dropped_pending: usize },

    /// The local chain was kept
    Kept { length: usize },
}

impl Resolution {
    pub fn is_adopted(&self) -> bool {
        matches!(self, Resolution::Adopted { .. })
    }
}

/// Longest-chain rule against a single peer chain
pub fn resolve(ledger: &mut Ledger, mempool: &mut Mempool, peer_chain: Vec<Block>) -> Resolution {
    resolve_many(ledger, mempool, std::iter::once(peer_chain))
}

/// Adopts the longest valid candidate strictly longer than the local chain.
///
/// Equal length never replaces. Candidates are validated only when they would
/// beat the best seen so far, and the ledger is replaced at most once.
pub fn resolve_many<I>(ledger: &mut Ledger, mempool: &mut Mempool, candidates: I) -> Resolution
where
    I: IntoIterator<Item = Vec<Block>>,
{
    let mut best = None;
    let mut best_length = ledger.len();

    for candidate in candidates {
        if candidate.len() <= best_length {
            debug!(
                "Ignoring peer chain of length {} (best so far {})",
                candidate.len(),
                best_length
            );
            continue;
        }

        match Ledger::validate_chain(candidate, ledger.config()) {
            Ok(validated) => {
                best_length = validated.len();
                best = Some(validated);
            }
            Err(err) => warn!("Rejected peer chain: {}", err),
        }
    }

    match best {
        Some(validated) => {
            ledger.install(validated);
            let dropped_pending = mempool.reconcile(ledger);
            info!(
                "Adopted peer chain of length {}, dropped {} pending transactions",
                ledger.len(),
                dropped_pending
            );
            Resolution::Adopted {
                length: ledger.len(),
                dropped_pending,
            }
        }
        None => Resolution::Kept {
            length: ledger.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::amount::{Amount, Balance};
    use crate::blockchain::chain::ChainConfig;
    use crate::blockchain::crypto::{Address, Wallet};
    use crate::blockchain::miner::{proof_of_work, BlockTemplate};
    use crate::blockchain::transaction::Transaction;

    fn config() -> ChainConfig {
        ChainConfig {
            difficulty: 1,
            mining_reward: Amount::from_whole(100),
        }
    }

    fn extend(ledger: &mut Ledger, miner: &str, count: usize) {
        for _ in 0..count {
            let template = BlockTemplate::new(
                ledger.tip(),
                &Address::from(miner),
                ledger.config().mining_reward,
                Vec::new(),
                ledger.tip().timestamp + 1,
            );
            let block = proof_of_work(template, ledger.config().difficulty, || false).unwrap();
            ledger.append(block).unwrap();
        }
    }

    #[test]
    fn test_equal_length_is_kept() {
        let mut ours = Ledger::new(config());
        let mut theirs = Ledger::new(config());
        extend(&mut ours, "us", 1);
        extend(&mut theirs, "them", 1);
        let ours_before = ours.blocks().to_vec();

        let outcome = resolve(&mut ours, &mut Mempool::new(), theirs.blocks().to_vec());

        assert_eq!(outcome, Resolution::Kept { length: 2 });
        assert_eq!(ours.blocks(), ours_before.as_slice());
    }

    #[test]
    fn test_shorter_is_kept() {
        let mut ours = Ledger::new(config());
        extend(&mut ours, "us", 3);
        let theirs = Ledger::new(config());

        let outcome = resolve(&mut ours, &mut Mempool::new(), theirs.blocks().to_vec());
        assert_eq!(outcome, Resolution::Kept { length: 4 });
    }

    #[test]
    fn test_longer_invalid_is_kept() {
        let mut ours = Ledger::new(config());
        extend(&mut ours, "us", 1);
        let mut theirs = Ledger::new(config());
        extend(&mut theirs, "them", 3);

        let mut forged = theirs.blocks().to_vec();
        forged[3].transactions[0].amount = Amount::from_whole(1_000);

        let outcome = resolve(&mut ours, &mut Mempool::new(), forged);
        assert_eq!(outcome, Resolution::Kept { length: 2 });
    }

    #[test]
    fn test_longest_valid_candidate_wins() {
        let mut ours = Ledger::new(config());
        let mut medium = Ledger::new(config());
        let mut long = Ledger::new(config());
        let mut longest = Ledger::new(config());
        extend(&mut medium, "medium", 2);
        extend(&mut long, "long", 4);
        extend(&mut longest, "longest", 5);

        let mut broken = longest.blocks().to_vec();
        broken[5].nonce += 1;

        let outcome = resolve_many(
            &mut ours,
            &mut Mempool::new(),
            vec![medium.blocks().to_vec(), broken, long.blocks().to_vec()],
        );

        assert_eq!(outcome, Resolution::Adopted { length: 5, dropped_pending: 0 });
        assert_eq!(ours.blocks(), long.blocks());
        assert_eq!(ours.balance_of(&Address::from("long")), Balance::from_cents(40_000));
    }

    #[test]
    fn test_adoption_drops_confirmed_pending_transactions() {
        let funder = Wallet::generate();

        // Both start from the same funding block, then ours grows by one
        let mut theirs = Ledger::new(config());
        extend(&mut theirs, funder.address().as_str(), 1);
        let mut ours = Ledger::new(config());
        ours.replace(theirs.blocks().to_vec()).unwrap();
        extend(&mut ours, "us", 1);

        let transfer = Transaction::new_signed(&funder, Address::from("bob"), Amount::from_whole(30));
        let mut our_pool = Mempool::new();
        our_pool.submit(transfer.clone(), &ours).unwrap();

        // Theirs confirms the transfer and grows to length 5
        let template = BlockTemplate::new(
            theirs.tip(),
            &Address::from("them"),
            Amount::from_whole(100),
            vec![transfer.clone()],
            theirs.tip().timestamp + 1,
        );
        theirs.append(proof_of_work(template, 1, || false).unwrap()).unwrap();
        extend(&mut theirs, "them", 2);
        assert_eq!(ours.len(), 3);
        assert_eq!(theirs.len(), 5);

        let outcome = resolve(&mut ours, &mut our_pool, theirs.blocks().to_vec());

        assert_eq!(outcome, Resolution::Adopted { length: 5, dropped_pending: 1 });
        assert!(!our_pool.contains(&transfer.id()));
        assert_eq!(ours.blocks(), theirs.blocks());
    }
}
