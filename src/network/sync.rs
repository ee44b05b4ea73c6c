use futures::future::join_all;
use log::{debug, error, info};
use tokio::task::JoinHandle;

use std::sync::Arc;
use std::time::Duration;

use super::PeerNetwork;
use crate::blockchain::{Node, Resolution};

/// What one round of peer sync did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub resolution: Resolution,

    /// Peer transactions that were new to the local mempool
    pub merged: usize,

    /// Peers that did not answer this round
    pub failed_peers: Vec<String>,
}

/// Fetches every peer's chain and mempool, adopts the longest valid chain
/// and merges the peer transactions.
///
/// Individual peer failures are counted against the peer and otherwise
/// ignored.
pub async fn sync_once(node: &Arc<Node>, network: &PeerNetwork) -> SyncReport {
    let peers = network.registry().list();
    let transport = network.transport();

    let chains = join_all(peers.iter().map(|peer| transport.fetch_chain(peer))).await;
    let mempools = join_all(peers.iter().map(|peer| transport.fetch_mempool(peer))).await;

    let mut candidates = Vec::with_capacity(peers.len());
    let mut pending = Vec::new();
    let mut failed_peers = Vec::new();

    for (peer, (chain, mempool)) in peers.iter().zip(chains.into_iter().zip(mempools)) {
        // A chain is worth resolving against even when the mempool fetch failed
        let contact = match (chain, mempool) {
            (Ok(chain), Ok(transactions)) => {
                candidates.push(chain);
                pending.extend(transactions);
                Ok(())
            }
            (Ok(chain), Err(err)) => {
                candidates.push(chain);
                Err(err)
            }
            (Err(err), _) => Err(err),
        };

        if contact.is_err() {
            failed_peers.push(peer.clone());
        }
        network.record(peer, &contact);
    }

    // Validation checks every signature in every candidate, so keep it off
    // the async workers
    let worker = Arc::clone(node);
    let outcome = tokio::task::spawn_blocking(move || {
        let resolution = worker.resolve(candidates);
        (resolution, worker.merge(pending))
    })
    .await;
    let (resolution, merged) = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Sync task failed: {}", err);
            (
                Resolution::Kept {
                    length: node.chain_length(),
                },
                0,
            )
        }
    };

    if resolution.is_adopted() || merged > 0 {
        info!("Sync: {:?}, merged {} transactions", resolution, merged);
    } else {
        debug!("Sync: {:?}, {} peers failed", resolution, failed_peers.len());
    }

    SyncReport {
        resolution,
        merged,
        failed_peers,
    }
}

/// Runs `sync_once` every `interval` until the runtime shuts down
pub fn spawn_sync_task(node: Arc<Node>, network: PeerNetwork, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if network.registry().is_empty() {
                continue;
            }
            sync_once(&node, &network).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Address, Amount, ChainConfig, Transaction, Wallet};
    use crate::network::peers::{PeerRegistry, MAX_FAILURES};
    use crate::network::testing::LocalTransport;

    fn config() -> ChainConfig {
        ChainConfig {
            difficulty: 1,
            mining_reward: Amount::from_whole(100),
        }
    }

    fn network_with(transport: Arc<LocalTransport>, peers: &[&str]) -> PeerNetwork {
        let registry = Arc::new(PeerRegistry::new("http://localhost:5000"));
        for peer in peers {
            registry.add(peer).unwrap();
        }
        PeerNetwork::new(registry, transport)
    }

    #[actix_web::test]
    async fn test_sync_adopts_longer_chain_and_merges_mempool() {
        let local = Arc::new(Node::new(config()));
        let remote = Arc::new(Node::new(config()));

        let funder = Wallet::generate();
        remote.mine(funder.address().as_str()).unwrap();
        remote.mine("remote").unwrap();
        let transfer = Transaction::new_signed(&funder, Address::from("bob"), Amount::from_whole(40));
        remote.submit_transaction(transfer.clone()).unwrap();

        let transport = Arc::new(LocalTransport::default());
        transport.attach("http://localhost:5001", remote.clone());
        let network = network_with(transport, &["localhost:5001"]);

        let report = sync_once(&local, &network).await;

        assert_eq!(report.resolution, Resolution::Adopted { length: 3, dropped_pending: 0 });
        assert_eq!(report.merged, 1);
        assert!(report.failed_peers.is_empty());
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.mempool(), vec![transfer]);
    }

    #[actix_web::test]
    async fn test_chain_is_used_when_only_mempool_fetch_fails() {
        let local = Arc::new(Node::new(config()));
        let remote = Arc::new(Node::new(config()));
        let funder = Wallet::generate();
        remote.mine(funder.address().as_str()).unwrap();
        remote
            .submit_transaction(Transaction::new_signed(&funder, Address::from("bob"), Amount::from_whole(10)))
            .unwrap();

        let transport = Arc::new(LocalTransport::default());
        transport.attach("http://localhost:5001", remote.clone());
        transport
            .broken_mempools
            .lock()
            .unwrap()
            .push("http://localhost:5001".to_string());
        let network = network_with(transport, &["localhost:5001"]);

        let report = sync_once(&local, &network).await;

        assert_eq!(report.resolution, Resolution::Adopted { length: 2, dropped_pending: 0 });
        assert_eq!(report.merged, 0);
        assert_eq!(report.failed_peers, vec!["http://localhost:5001".to_string()]);
        assert_eq!(local.chain(), remote.chain());
        assert!(local.mempool().is_empty());
    }

    #[actix_web::test]
    async fn test_unreachable_peer_is_dropped_after_repeated_failures() {
        let local = Arc::new(Node::new(config()));
        local.mine("local").unwrap();
        let transport = Arc::new(LocalTransport::default());
        let network = network_with(transport, &["localhost:5001"]);

        for round in 1..=MAX_FAILURES {
            let report = sync_once(&local, &network).await;
            assert_eq!(report.failed_peers, vec!["http://localhost:5001".to_string()]);
            assert_eq!(report.resolution, Resolution::Kept { length: 2 });
            assert_eq!(network.registry().is_empty(), round == MAX_FAILURES);
        }
    }

    #[actix_web::test]
    async fn test_equal_length_peer_does_not_replace() {
        let local = Arc::new(Node::new(config()));
        local.mine("local").unwrap();
        let before = local.chain();

        let remote = Arc::new(Node::new(config()));
        remote.mine("remote").unwrap();
        let transport = Arc::new(LocalTransport::default());
        transport.attach("http://localhost:5001", remote);
        let network = network_with(transport, &["localhost:5001"]);

        let report = sync_once(&local, &network).await;

        assert_eq!(report.resolution, Resolution::Kept { length: 2 });
        assert_eq!(local.chain(), before);
    }
}
